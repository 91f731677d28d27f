use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_expired: bool,
}

fn default_true() -> bool {
    true
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Expiration date as a calendar date, when the backend sent a parseable one.
    /// Accepts both plain dates and full timestamps.
    pub fn expires_on(&self) -> Option<NaiveDate> {
        let raw = self.expiration_date.as_deref()?;
        let date_part = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }
}

/// Body of `POST /api/v1/students/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewStudent {
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Response of `GET /api/v1/students/programs/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgramList {
    #[serde(default)]
    pub programs: Vec<String>,
}

/// Response of `GET /api/v1/cards/students/{matricule}/secure-card`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureCard {
    pub student: Student,
    pub qr_code_base64: String,
    pub signature: String,
    pub card_url: String,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub message: String,
}

/// Body of the synthesized 503 returned when card data is unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineNotice {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QrVerificationRequest<'a> {
    pub qr_content: &'a str,
}

/// Response of `POST /api/v1/cards/verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrVerification {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub student: Option<Student>,
}
