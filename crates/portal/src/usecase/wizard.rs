//! The four-page onboarding wizard as a pure state machine.
//!
//! Forward moves are gated by a predicate on the current page and report a
//! warning instead of failing. Backward moves are unconditional. Once a
//! submission starts, the draft is frozen until it either completes or
//! fails back onto the last page.

use app_core::error::AppError;

use crate::domain::entity::submission::{Clinic, catalog_specialization};
use crate::domain::entity::wizard::{CredentialDocument, OnboardingDraft, PersonalDetails, WizardStep};
use crate::domain::inout::gate::capitalize_first;
use crate::domain::inout::onboarding::WizardEdit;

pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_DOCUMENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

const REQUIRED_FIELDS_MSG: &str = "Please fill in all required fields before continuing.";
const DOCUMENT_MISSING_MSG: &str = "Please upload your PRC ID first!";
const CONSENT_MSG: &str = "You must agree to the consent form.";
const SUBMIT_EARLY_MSG: &str = "Please complete every step before submitting.";
const LOCKED_MSG: &str = "Your verification is already being submitted.";
const SUBMITTED_MSG: &str = "Your verification has already been submitted.";
const UNKNOWN_SPECIALIZATION_MSG: &str = "Please choose a specialization from the list.";
const LAST_CLINIC_MSG: &str = "At least one clinic is required.";
const CLINIC_INDEX_MSG: &str = "Clinic not found";
const DOCUMENT_EMPTY_MSG: &str = "The selected file is empty.";
const DOCUMENT_TOO_LARGE_MSG: &str = "File too large (max 5MB)";
const DOCUMENT_TYPE_MSG: &str = "Invalid file format. Only JPEG, PNG, and WebP images are allowed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved(WizardStep),
    /// The page predicate failed; the step is unchanged.
    Blocked { step: WizardStep, warning: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Back {
    Moved(WizardStep),
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitCheck {
    /// Now `Submitting`; carries the frozen draft to send.
    Ready(Box<OnboardingDraft>),
    Blocked(&'static str),
}

/// Builds a credential document, sniffing the type from the file name when
/// the client did not send a usable one.
pub fn credential_document(
    file_name: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Result<CredentialDocument, AppError> {
    if bytes.is_empty() {
        return Err(AppError::ValidationStr(DOCUMENT_EMPTY_MSG.to_string()));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(AppError::ValidationStr(DOCUMENT_TOO_LARGE_MSG.to_string()));
    }

    let content_type = content_type
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty() && value != "application/octet-stream")
        .unwrap_or_else(|| mime_guess::from_path(file_name).first_or_octet_stream().to_string());

    if !ALLOWED_DOCUMENT_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::ValidationStr(DOCUMENT_TYPE_MSG.to_string()));
    }

    Ok(CredentialDocument {
        file_name: file_name.trim().to_string(),
        content_type,
        size: bytes.len(),
        bytes,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingWizard {
    step: WizardStep,
    draft: OnboardingDraft,
}

impl OnboardingWizard {
    pub fn new(draft: OnboardingDraft) -> Self {
        Self { step: WizardStep::Personal, draft }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &OnboardingDraft {
        &self.draft
    }

    /// The warning that would block leaving `step`, if any.
    fn check(&self, step: WizardStep) -> Option<&'static str> {
        let draft = &self.draft;
        match step {
            WizardStep::Personal if !draft.personal.is_complete() => Some(REQUIRED_FIELDS_MSG),
            WizardStep::Specialization if draft.specializations.is_empty() => Some(REQUIRED_FIELDS_MSG),
            WizardStep::Clinics if draft.clinics.is_empty() || !draft.clinics.iter().all(Clinic::is_complete) => {
                Some(REQUIRED_FIELDS_MSG)
            }
            WizardStep::DocumentAndConsent if draft.document.is_none() => Some(DOCUMENT_MISSING_MSG),
            WizardStep::DocumentAndConsent if !draft.consent => Some(CONSENT_MSG),
            _ => None,
        }
    }

    /// Moves one page forward when the current page is complete. The last
    /// page only reports what is missing; leaving it is `begin_submit`.
    pub fn advance(&mut self) -> Transition {
        let next = match self.step {
            WizardStep::Personal => WizardStep::Specialization,
            WizardStep::Specialization => WizardStep::Clinics,
            WizardStep::Clinics => WizardStep::DocumentAndConsent,
            step => {
                return match self.check(step) {
                    Some(warning) => Transition::Blocked { step, warning },
                    None => Transition::Moved(step),
                };
            }
        };

        match self.check(self.step) {
            Some(warning) => Transition::Blocked { step: self.step, warning },
            None => {
                self.step = next;
                Transition::Moved(next)
            }
        }
    }

    pub fn back(&mut self) -> Result<Back, AppError> {
        self.ensure_editable()?;
        let previous = match self.step {
            WizardStep::Personal => return Ok(Back::Dismissed),
            WizardStep::Specialization => WizardStep::Personal,
            WizardStep::Clinics => WizardStep::Specialization,
            _ => WizardStep::Clinics,
        };
        self.step = previous;
        Ok(Back::Moved(previous))
    }

    fn ensure_editable(&self) -> Result<(), AppError> {
        if !self.step.is_locked() {
            return Ok(());
        }
        let message = if self.step == WizardStep::Submitting { LOCKED_MSG } else { SUBMITTED_MSG };
        Err(AppError::Conflict(message.to_string()))
    }

    pub fn apply(&mut self, edit: WizardEdit) -> Result<(), AppError> {
        self.ensure_editable()?;
        let draft = &mut self.draft;

        match edit {
            WizardEdit::SetPersonal(personal) => {
                draft.personal = PersonalDetails {
                    first_name: capitalize_first(&personal.first_name),
                    middle_name: capitalize_first(&personal.middle_name),
                    last_name: capitalize_first(&personal.last_name),
                    suffix: capitalize_first(&personal.suffix),
                };
            }
            WizardEdit::SetTitles { titles } => draft.titles = titles.trim().to_string(),
            WizardEdit::AddSpecialization { name } => {
                let entry = catalog_specialization(&name)
                    .ok_or_else(|| AppError::ValidationStr(UNKNOWN_SPECIALIZATION_MSG.to_string()))?;
                if !draft.specializations.iter().any(|existing| existing == entry) {
                    draft.specializations.push(entry.to_string());
                }
            }
            WizardEdit::RemoveSpecialization { name } => {
                draft.specializations.retain(|existing| !existing.eq_ignore_ascii_case(name.trim()));
            }
            WizardEdit::AddClinic => draft.clinics.push(Clinic::default()),
            WizardEdit::UpdateClinic { index, clinic } => {
                let slot = draft
                    .clinics
                    .get_mut(index)
                    .ok_or_else(|| AppError::NotFound(CLINIC_INDEX_MSG.to_string()))?;
                *slot = clinic;
            }
            WizardEdit::RemoveClinic { index } => {
                if index >= draft.clinics.len() {
                    return Err(AppError::NotFound(CLINIC_INDEX_MSG.to_string()));
                }
                if draft.clinics.len() == 1 {
                    return Err(AppError::ValidationStr(LAST_CLINIC_MSG.to_string()));
                }
                draft.clinics.remove(index);
            }
            WizardEdit::ClearDocument => draft.document = None,
            WizardEdit::SetConsent { agreed } => draft.consent = agreed,
        }

        Ok(())
    }

    pub fn select_document(&mut self, document: CredentialDocument) -> Result<(), AppError> {
        self.ensure_editable()?;
        self.draft.document = Some(document);
        Ok(())
    }

    /// Enters `Submitting` when every page is complete. Pages are re-checked
    /// because edits stay possible on the last page.
    pub fn begin_submit(&mut self) -> Result<SubmitCheck, AppError> {
        self.ensure_editable()?;
        if self.step != WizardStep::DocumentAndConsent {
            return Ok(SubmitCheck::Blocked(SUBMIT_EARLY_MSG));
        }

        let pages = [
            WizardStep::Personal,
            WizardStep::Specialization,
            WizardStep::Clinics,
            WizardStep::DocumentAndConsent,
        ];
        if let Some(warning) = pages.into_iter().find_map(|page| self.check(page)) {
            return Ok(SubmitCheck::Blocked(warning));
        }

        self.step = WizardStep::Submitting;
        Ok(SubmitCheck::Ready(Box::new(self.draft.clone())))
    }

    pub fn complete(&mut self) {
        if self.step == WizardStep::Submitting {
            self.step = WizardStep::Submitted;
        }
    }

    /// Returns to the last page with the draft intact.
    pub fn fail(&mut self) {
        if self.step == WizardStep::Submitting {
            self.step = WizardStep::DocumentAndConsent;
        }
    }
}
