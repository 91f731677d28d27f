use serde::{Deserialize, Serialize};

/// Control messages a page can post to the controller.
///
/// Wire form is `{"type": "SKIP_WAITING"}` / `{"type": "CLEAR_CACHE"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting controller now instead of when all pages close.
    SkipWaiting,
    /// Delete every cache store, whatever its version.
    ClearCache,
}

impl ControlMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Activated { evicted: Vec<String> },
    Cleared { stores: Vec<String> },
    /// The message does not apply in the controller's current state.
    Ignored,
}
