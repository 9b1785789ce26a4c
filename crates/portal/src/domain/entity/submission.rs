use app_core::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SUBMISSIONS_COLLECTION: &str = "verification_submissions";
pub const PENDING_STATUS: &str = "pending";

pub const SPECIALIZATION_CATALOG: &[&str] = &[
    "General Medicine",
    "Pediatrics",
    "Cardiology",
    "Dermatology",
    "Obstetrics and Gynecology",
    "Neurology",
    "Orthopedics",
    "Psychiatry",
];

pub const DEFAULT_CITY: &str = "Naga City";
pub const DEFAULT_PROVINCE: &str = "Camarines Sur";

/// Returns the catalog spelling of `name`, if it is a known specialization.
pub fn catalog_specialization(name: &str) -> Option<&'static str> {
    let wanted = name.trim();
    SPECIALIZATION_CATALOG.iter().copied().find(|entry| entry.eq_ignore_ascii_case(wanted))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Clinic {
    pub name: String,
    pub street: String,
    pub city: String,
    pub province: String,
}

impl Default for Clinic {
    fn default() -> Self {
        Self {
            name: String::new(),
            street: String::new(),
            city: DEFAULT_CITY.to_string(),
            province: DEFAULT_PROVINCE.to_string(),
        }
    }
}

impl Clinic {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.street.trim().is_empty()
    }
}

/// The onboarding packet a doctor submits for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSubmission {
    pub uid: String,
    pub email: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub suffix: String,
    pub titles: String,
    pub specializations: Vec<String>,
    pub clinics: Vec<Clinic>,
    pub document_url: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl VerificationSubmission {
    pub fn into_data(self) -> Result<Map<String, Value>, AppError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::Internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(catalog_specialization(" pediatrics "), Some("Pediatrics"));
        assert_eq!(catalog_specialization("OBSTETRICS AND GYNECOLOGY"), Some("Obstetrics and Gynecology"));
        assert_eq!(catalog_specialization("Astrology"), None);
    }

    #[test]
    fn test_clinic_defaults_and_completeness() {
        let mut clinic = Clinic::default();
        assert_eq!(clinic.city, DEFAULT_CITY);
        assert_eq!(clinic.province, DEFAULT_PROVINCE);
        assert!(!clinic.is_complete());

        clinic.name = "Bicol Family Clinic".into();
        assert!(!clinic.is_complete());
        clinic.street = "  ".into();
        assert!(!clinic.is_complete());
        clinic.street = "12 Panganiban Dr.".into();
        assert!(clinic.is_complete());
    }

    #[test]
    fn test_submission_serializes_camel_case() {
        let submission = VerificationSubmission {
            uid: "uid-1".into(),
            email: "doc@example.com".into(),
            first_name: "Ana".into(),
            middle_name: String::new(),
            last_name: "Cruz".into(),
            suffix: String::new(),
            titles: "MD".into(),
            specializations: vec!["Cardiology".into()],
            clinics: vec![Clinic { name: "A".into(), street: "B".into(), ..Clinic::default() }],
            document_url: "http://files/credentials/uid-1/1_prc.png".into(),
            status: PENDING_STATUS.into(),
            created_at: Utc::now(),
        };

        let data = submission.into_data().unwrap();

        assert_eq!(data["status"], "pending");
        assert_eq!(data["firstName"], "Ana");
        assert_eq!(data["documentUrl"], "http://files/credentials/uid-1/1_prc.png");
        assert_eq!(data["clinics"][0]["province"], DEFAULT_PROVINCE);
        assert!(data.contains_key("createdAt"));
    }
}
