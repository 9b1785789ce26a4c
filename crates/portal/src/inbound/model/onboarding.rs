use app_core::error::AppError;
use axum::extract::Multipart;
use serde::Serialize;

use crate::domain::entity::wizard::{OnboardingDraft, WizardStep};
use crate::domain::inout::onboarding::{SubmitOutcome, UploadProgressOutput, WizardView};

const DOCUMENT_FIELD: &str = "document";
const MISSING_FILE_MSG: &str = "Please choose a file to upload.";

// ╔════════════════════════════╗
// ║    Wizard                  ║
// ╚════════════════════════════╝

#[derive(Serialize)]
pub struct WizardResponse {
    pub step: WizardStep,
    pub step_number: u8,
    pub step_title: &'static str,
    pub draft: OnboardingDraft,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<WizardView> for WizardResponse {
    fn from(view: WizardView) -> Self {
        Self {
            step: view.step,
            step_number: view.step.number(),
            step_title: view.step.title(),
            draft: view.draft,
            warning: view.warning,
        }
    }
}

#[derive(Serialize)]
pub struct BackResponse {
    pub dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wizard: Option<WizardResponse>,
}

// ╔════════════════════════════╗
// ║    Document                ║
// ╚════════════════════════════╝

pub struct DocumentUploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUploadRequest {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(DOCUMENT_FIELD) {
                continue;
            }
            let file_name = field.file_name().unwrap_or(DOCUMENT_FIELD).to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?.to_vec();
            return Ok(Self { file_name, content_type, bytes });
        }

        Err(AppError::ValidationStr(MISSING_FILE_MSG.to_string()))
    }
}

// ╔════════════════════════════╗
// ║    Submit                  ║
// ╚════════════════════════════╝

#[derive(Serialize)]
pub struct SubmitResponse {
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Submitted { submission_key, document_url } => Self {
                submitted: true,
                submission_id: Some(submission_key),
                document_url: Some(document_url),
                warning: None,
            },
            SubmitOutcome::Blocked { warning } => {
                Self { submitted: false, submission_id: None, document_url: None, warning: Some(warning) }
            }
        }
    }
}

#[derive(Serialize)]
pub struct UploadProgressResponse {
    pub percent: u8,
    pub in_flight: bool,
}

impl From<UploadProgressOutput> for UploadProgressResponse {
    fn from(output: UploadProgressOutput) -> Self {
        Self { percent: output.percent, in_flight: output.in_flight }
    }
}
