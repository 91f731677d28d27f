/// Versioned store names of a single controller deployment.
///
/// Any store whose name is not one of these two is stale for this deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_store: String,
    pub api_store: String,
}

impl CacheNames {
    pub fn new(app_name: &str, version: &str) -> Self {
        let version = version.trim_start_matches('v');
        Self {
            static_store: format!("{}-static-v{}", app_name, version),
            api_store: format!("{}-api-v{}", app_name, version),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_store || name == self.api_store
    }
}
