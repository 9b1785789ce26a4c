use std::fmt;

use serde::{Deserialize, Serialize};

use super::submission::Clinic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Personal,
    Specialization,
    Clinics,
    DocumentAndConsent,
    Submitting,
    Submitted,
}

impl WizardStep {
    /// Position shown to the user. The submit phases stay on the last page.
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::Personal => 1,
            WizardStep::Specialization => 2,
            WizardStep::Clinics => 3,
            WizardStep::DocumentAndConsent | WizardStep::Submitting | WizardStep::Submitted => 4,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Personal => "Personal Details",
            WizardStep::Specialization => "Doctor Information",
            WizardStep::Clinics => "Clinic Information",
            WizardStep::DocumentAndConsent | WizardStep::Submitting | WizardStep::Submitted => {
                "Verification & Consent"
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, WizardStep::Submitting | WizardStep::Submitted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalDetails {
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub suffix: String,
}

impl PersonalDetails {
    /// Splits a display name so its last word becomes the last name.
    pub fn from_display_name(display_name: Option<&str>) -> Self {
        let words: Vec<&str> = display_name.unwrap_or_default().split_whitespace().collect();
        match words.split_last() {
            Some((last, rest)) if !rest.is_empty() => Self {
                first_name: rest.join(" "),
                last_name: (*last).to_string(),
                ..Self::default()
            },
            Some((only, _)) => Self { first_name: (*only).to_string(), ..Self::default() },
            None => Self::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.last_name.trim().is_empty()
    }
}

/// The credential image chosen on the last page. Bytes never leave the
/// process except through the blob store.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDocument {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for CredentialDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDocument")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingDraft {
    pub personal: PersonalDetails,
    pub titles: String,
    pub specializations: Vec<String>,
    pub clinics: Vec<Clinic>,
    pub document: Option<CredentialDocument>,
    pub consent: bool,
}

impl OnboardingDraft {
    pub fn prefilled(personal: PersonalDetails) -> Self {
        Self {
            personal,
            titles: String::new(),
            specializations: Vec::new(),
            clinics: vec![Clinic::default()],
            document: None,
            consent: false,
        }
    }
}
