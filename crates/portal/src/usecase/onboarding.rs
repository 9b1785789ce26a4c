use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use app_core::error::AppError;
use app_core::storage::{BlobStore, ProgressReporter};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::watch;
use validator::Validate;

use crate::domain::entity::account::{Account, DoctorState, Portal, VerificationState};
use crate::domain::entity::progress::OnboardingProgress;
use crate::domain::entity::submission::{PENDING_STATUS, SUBMISSIONS_COLLECTION, VerificationSubmission};
use crate::domain::entity::wizard::{OnboardingDraft, PersonalDetails, WizardStep};
use crate::domain::inout::prelude::*;
use crate::outbound::records::RecordStore;
use crate::usecase::resolver::RecordResolver;
use crate::usecase::watcher::{StatusWatcher, WatchHandle};
use crate::usecase::wizard::{self, Back, OnboardingWizard, SubmitCheck, Transition};

const NO_ACCOUNT_MSG: &str = "No doctor account found. Please sign up first.";
const ALREADY_SUBMITTED_MSG: &str = "Your verification has already been submitted.";
const NO_DRAFT_MSG: &str = "No verification form is open.";
const SUBMITTING_MSG: &str = "Your verification is being submitted.";
const MISSING_DOCUMENT_MSG: &str = "Please upload your PRC ID first!";

const CREDENTIALS_DIR: &str = "credentials";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnboardingUseCase: Send + Sync {
    async fn open(&self, input: OpenWizardInput) -> Result<WizardView, AppError>;
    async fn view(&self, input: WizardInput) -> Result<WizardView, AppError>;
    async fn discard(&self, input: WizardInput) -> Result<(), AppError>;
    async fn edit(&self, input: EditWizardInput) -> Result<WizardView, AppError>;
    async fn select_document(&self, input: SelectDocumentInput) -> Result<WizardView, AppError>;
    async fn advance(&self, input: WizardInput) -> Result<WizardView, AppError>;
    async fn back(&self, input: WizardInput) -> Result<BackOutput, AppError>;
    async fn submit(&self, input: SubmitInput) -> Result<SubmitOutcome, AppError>;
    async fn upload_progress(&self, input: WizardInput) -> Result<UploadProgressOutput, AppError>;
    async fn status(&self, input: StatusInput) -> Result<OnboardingProgress, AppError>;
    async fn watch(&self, input: StatusInput) -> Result<WatchHandle, AppError>;
}

type Drafts = Arc<Mutex<HashMap<String, DraftSlot>>>;

struct DraftSlot {
    wizard: OnboardingWizard,
    upload: Option<watch::Receiver<u8>>,
}

impl DraftSlot {
    fn view(&self, warning: Option<&str>) -> WizardView {
        WizardView {
            step: self.wizard.step(),
            draft: self.wizard.draft().clone(),
            warning: warning.map(str::to_string),
        }
    }
}

/// Holds a draft in the submitting phase until [`settle`](Self::settle).
/// Dropped unsettled, as when the request is cancelled mid-upload, it puts
/// the draft back on its last page.
struct SubmitGuard {
    drafts: Drafts,
    handle: String,
    settled: bool,
}

impl SubmitGuard {
    fn new(drafts: Drafts, handle: &str) -> Self {
        Self { drafts, handle: handle.to_string(), settled: false }
    }

    /// Forward on success, back to the last page otherwise.
    fn settle(mut self, succeeded: bool) {
        self.finish(succeeded);
    }

    fn finish(&mut self, succeeded: bool) {
        self.settled = true;
        let Ok(mut drafts) = self.drafts.lock() else {
            tracing::error!(handle = %self.handle, "draft lock poisoned");
            return;
        };
        match drafts.get_mut(&self.handle) {
            Some(slot) if succeeded => slot.wizard.complete(),
            Some(slot) => slot.wizard.fail(),
            None => tracing::warn!(handle = %self.handle, "draft vanished during submission"),
        }
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(handle = %self.handle, "verification submission abandoned");
            self.finish(false);
        }
    }
}

/// Server-side wizard drafts, one per identity handle. A draft is evicted
/// once its account is recorded as submitted.
#[derive(Clone)]
pub struct OnboardingService {
    records: Arc<dyn RecordStore>,
    blob: Arc<dyn BlobStore>,
    resolver: RecordResolver,
    drafts: Drafts,
}

impl OnboardingService {
    pub fn new(records: Arc<dyn RecordStore>, blob: Arc<dyn BlobStore>) -> Self {
        let resolver = RecordResolver::new(records.clone());
        Self { records, blob, resolver, drafts: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, DraftSlot>>, AppError> {
        self.drafts.lock().map_err(|_| {
            tracing::error!("draft lock poisoned");
            AppError::Internal
        })
    }

    fn with_slot<R>(&self, handle: &str, f: impl FnOnce(&mut DraftSlot) -> Result<R, AppError>) -> Result<R, AppError> {
        let mut drafts = self.lock()?;
        let slot = drafts
            .get_mut(handle)
            .ok_or_else(|| AppError::NotFound(NO_DRAFT_MSG.to_string()))?;
        f(slot)
    }

    async fn doctor(&self, handle: &str, email: &str) -> Result<(Account, DoctorState), AppError> {
        let account = self
            .resolver
            .resolve(Portal::Doctor, handle, email)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(NO_ACCOUNT_MSG.to_string()))?;

        let state = match account.state {
            VerificationState::Doctor(state) => state,
            _ => DoctorState::Unsubmitted,
        };
        Ok((account, state))
    }

    /// Marks the account as awaiting review. The submission record is what
    /// reviewers read, so a failure here is only logged.
    async fn mark_pending(&self, account: &Account) -> bool {
        let mut patch = Map::new();
        patch.insert("status".into(), Value::String(PENDING_STATUS.to_string()));
        match self.records.update(Portal::Doctor.collection(), &account.key, patch).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %account.key, error = %err, "failed to mark doctor account pending");
                false
            }
        }
    }

    /// Drops a submitted draft. Drafts still being edited or uploaded stay.
    fn evict_submitted(&self, handle: &str) {
        let Ok(mut drafts) = self.lock() else {
            return;
        };
        if drafts.get(handle).is_some_and(|slot| slot.wizard.step() == WizardStep::Submitted) {
            drafts.remove(handle);
            tracing::debug!(%handle, "submitted draft evicted");
        }
    }

    async fn send(
        &self,
        handle: &str,
        account: &Account,
        draft: OnboardingDraft,
        progress: ProgressReporter,
    ) -> Result<(String, String), AppError> {
        let document = draft
            .document
            .ok_or_else(|| AppError::ValidationStr(MISSING_DOCUMENT_MSG.to_string()))?;

        let path = format!(
            "{CREDENTIALS_DIR}/{handle}/{}_{}",
            Utc::now().timestamp_millis(),
            safe_file_name(&document.file_name)
        );
        let upload = self
            .blob
            .upload_resumable(&path, document.bytes, &document.content_type, progress)
            .await?;
        let document_url = self.blob.download_reference(&upload).await?;
        tracing::info!(%handle, path = %upload.path, size = upload.size, "credential document uploaded");

        let PersonalDetails { first_name, middle_name, last_name, suffix } = draft.personal;
        let submission = VerificationSubmission {
            uid: handle.to_string(),
            email: account.email.clone(),
            first_name,
            middle_name,
            last_name,
            suffix,
            titles: draft.titles,
            specializations: draft.specializations,
            clinics: draft.clinics,
            document_url: document_url.clone(),
            status: PENDING_STATUS.to_string(),
            created_at: Utc::now(),
        };
        let submission_key = self.records.create(SUBMISSIONS_COLLECTION, submission.into_data()?).await?;

        Ok((submission_key, document_url))
    }
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() { "document".to_string() } else { cleaned.to_string() }
}

#[async_trait]
impl OnboardingUseCase for OnboardingService {
    async fn open(&self, input: OpenWizardInput) -> Result<WizardView, AppError> {
        input.validate()?;

        if let Ok(view) = self.with_slot(&input.handle, |slot| Ok(slot.view(None))) {
            return Ok(view);
        }

        let (account, state) = self.doctor(&input.handle, &input.email).await?;
        if state != DoctorState::Unsubmitted {
            return Err(AppError::Conflict(ALREADY_SUBMITTED_MSG.to_string()));
        }

        let display_name = input.display_name.or(account.profile.display_name);
        let personal = match (account.profile.first_name, account.profile.last_name) {
            (Some(first_name), Some(last_name)) => PersonalDetails { first_name, last_name, ..PersonalDetails::default() },
            _ => PersonalDetails::from_display_name(display_name.as_deref()),
        };

        let slot = DraftSlot { wizard: OnboardingWizard::new(OnboardingDraft::prefilled(personal)), upload: None };
        let view = slot.view(None);
        self.lock()?.entry(input.handle.clone()).or_insert(slot);

        tracing::info!(handle = %input.handle, "verification form opened");

        Ok(view)
    }

    async fn view(&self, input: WizardInput) -> Result<WizardView, AppError> {
        input.validate()?;

        self.with_slot(&input.handle, |slot| Ok(slot.view(None)))
    }

    async fn discard(&self, input: WizardInput) -> Result<(), AppError> {
        input.validate()?;

        let mut drafts = self.lock()?;
        if drafts.get(&input.handle).is_some_and(|slot| slot.wizard.step() == WizardStep::Submitting) {
            return Err(AppError::Conflict(SUBMITTING_MSG.to_string()));
        }
        drafts.remove(&input.handle);

        Ok(())
    }

    async fn edit(&self, input: EditWizardInput) -> Result<WizardView, AppError> {
        input.validate()?;

        self.with_slot(&input.handle, |slot| {
            slot.wizard.apply(input.edit)?;
            Ok(slot.view(None))
        })
    }

    async fn select_document(&self, input: SelectDocumentInput) -> Result<WizardView, AppError> {
        input.validate()?;

        let document = wizard::credential_document(&input.file_name, input.content_type.as_deref(), input.bytes)?;
        self.with_slot(&input.handle, |slot| {
            slot.wizard.select_document(document)?;
            Ok(slot.view(None))
        })
    }

    async fn advance(&self, input: WizardInput) -> Result<WizardView, AppError> {
        input.validate()?;

        self.with_slot(&input.handle, |slot| {
            let warning = match slot.wizard.advance() {
                Transition::Moved(_) => None,
                Transition::Blocked { warning, .. } => Some(warning),
            };
            Ok(slot.view(warning))
        })
    }

    async fn back(&self, input: WizardInput) -> Result<BackOutput, AppError> {
        input.validate()?;

        self.with_slot(&input.handle, |slot| {
            Ok(match slot.wizard.back()? {
                Back::Moved(_) => BackOutput::Moved(slot.view(None)),
                Back::Dismissed => BackOutput::Dismissed,
            })
        })
    }

    async fn submit(&self, input: SubmitInput) -> Result<SubmitOutcome, AppError> {
        input.validate()?;

        let (account, state) = self.doctor(&input.handle, &input.email).await?;
        if state != DoctorState::Unsubmitted {
            return Err(AppError::Conflict(ALREADY_SUBMITTED_MSG.to_string()));
        }

        let (reporter, upload) = ProgressReporter::channel();
        let check = self.with_slot(&input.handle, |slot| {
            let check = slot.wizard.begin_submit()?;
            if matches!(check, SubmitCheck::Ready(_)) {
                slot.upload = Some(upload);
            }
            Ok(check)
        })?;
        let draft = match check {
            SubmitCheck::Ready(draft) => *draft,
            SubmitCheck::Blocked(warning) => return Ok(SubmitOutcome::Blocked { warning: warning.to_string() }),
        };

        tracing::info!(handle = %input.handle, "verification submission started");

        let guard = SubmitGuard::new(self.drafts.clone(), &input.handle);
        let sent = self.send(&input.handle, &account, draft, reporter).await;
        guard.settle(sent.is_ok());

        let (submission_key, document_url) = sent.inspect_err(|err| {
            tracing::warn!(handle = %input.handle, error = %err, "verification submission failed");
        })?;
        // Until the account shows as pending, the submitted draft blocks a
        // second submission.
        if self.mark_pending(&account).await {
            self.evict_submitted(&input.handle);
        }

        tracing::info!(handle = %input.handle, %submission_key, "verification submitted");

        Ok(SubmitOutcome::Submitted { submission_key, document_url })
    }

    async fn upload_progress(&self, input: WizardInput) -> Result<UploadProgressOutput, AppError> {
        input.validate()?;

        self.with_slot(&input.handle, |slot| {
            Ok(UploadProgressOutput {
                percent: slot.upload.as_ref().map_or(0, |rx| *rx.borrow()),
                in_flight: slot.wizard.step() == WizardStep::Submitting,
            })
        })
    }

    async fn status(&self, input: StatusInput) -> Result<OnboardingProgress, AppError> {
        input.validate()?;

        let (_, state) = self.doctor(&input.handle, &input.email).await?;
        if state != DoctorState::Unsubmitted {
            self.evict_submitted(&input.handle);
        }

        Ok(OnboardingProgress::for_state(state))
    }

    async fn watch(&self, input: StatusInput) -> Result<WatchHandle, AppError> {
        input.validate()?;

        let (account, state) = self.doctor(&input.handle, &input.email).await?;
        let subscription = self.records.subscribe(Portal::Doctor.collection(), &account.key).await?;

        tracing::info!(handle = %input.handle, key = %account.key, "status watch started");

        Ok(StatusWatcher::spawn(subscription, state))
    }
}
