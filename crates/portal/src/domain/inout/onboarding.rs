use serde::Deserialize;
use validator::Validate;

use crate::domain::entity::submission::Clinic;
use crate::domain::entity::wizard::{OnboardingDraft, PersonalDetails, WizardStep};

// ╔════════════════════════════╗
// ║        Open Wizard         ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct OpenWizardInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Addresses the draft of one signed-in doctor.
#[derive(Debug, Validate)]
pub struct WizardInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardView {
    pub step: WizardStep,
    pub draft: OnboardingDraft,
    pub warning: Option<String>,
}

// ╔════════════════════════════╗
// ║        Edit Wizard         ║
// ╚════════════════════════════╝

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WizardEdit {
    SetPersonal(PersonalDetails),
    SetTitles { titles: String },
    AddSpecialization { name: String },
    RemoveSpecialization { name: String },
    AddClinic,
    UpdateClinic { index: usize, clinic: Clinic },
    RemoveClinic { index: usize },
    ClearDocument,
    SetConsent { agreed: bool },
}

#[derive(Debug, Validate)]
pub struct EditWizardInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
    pub edit: WizardEdit,
}

// ╔════════════════════════════╗
// ║      Select Document       ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct SelectDocumentInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
    #[validate(length(min = 1, max = 255, message = "file name must be 1 to 255 characters"))]
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

// ╔════════════════════════════╗
// ║         Navigation         ║
// ╚════════════════════════════╝

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOutput {
    Moved(WizardView),
    /// Backing out of the first page closes the wizard. The draft is kept.
    Dismissed,
}

// ╔════════════════════════════╗
// ║          Submit            ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct SubmitInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { submission_key: String, document_url: String },
    Blocked { warning: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgressOutput {
    pub percent: u8,
    pub in_flight: bool,
}

// ╔════════════════════════════╗
// ║          Status            ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct StatusInput {
    #[validate(length(min = 1, message = "handle cannot be empty"))]
    pub handle: String,
    pub email: String,
}
