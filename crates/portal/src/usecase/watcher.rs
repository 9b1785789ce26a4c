//! Live view of a doctor's verification status.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::domain::entity::account::{Account, DoctorState, Portal, VerificationState};
use crate::domain::entity::progress::OnboardingProgress;
use crate::outbound::records::{Snapshot, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotification {
    Approved,
}

/// Edge detector over successive doctor states. The first observation is
/// the baseline and never notifies.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<DoctorState>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, state: DoctorState) -> Option<StatusNotification> {
        match self.last.replace(state) {
            Some(previous) if previous != DoctorState::Approved && state == DoctorState::Approved => {
                Some(StatusNotification::Approved)
            }
            _ => None,
        }
    }
}

fn doctor_state(snapshot: &Snapshot) -> DoctorState {
    match snapshot {
        Snapshot::Exists(doc) => match Account::from_document(Portal::Doctor, doc).state {
            VerificationState::Doctor(state) => state,
            _ => DoctorState::Unsubmitted,
        },
        Snapshot::Missing => DoctorState::Unsubmitted,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Progress(OnboardingProgress),
    Notification(StatusNotification),
}

/// Owns the background watch. Dropping it stops the task, which releases the
/// record subscription.
#[derive(Debug)]
pub struct WatchHandle {
    progress: watch::Receiver<OnboardingProgress>,
    notifications: mpsc::UnboundedReceiver<StatusNotification>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn current(&self) -> OnboardingProgress {
        self.progress.borrow().clone()
    }

    /// Waits for the next progress change or notification. `None` once the
    /// watch has ended.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        enum Woke {
            Progress(bool),
            Notification(Option<StatusNotification>),
        }

        let woke = tokio::select! {
            biased;
            changed = self.progress.changed() => Woke::Progress(changed.is_ok()),
            note = self.notifications.recv() => Woke::Notification(note),
        };

        match woke {
            Woke::Progress(true) => Some(WatchEvent::Progress(self.progress.borrow_and_update().clone())),
            Woke::Notification(Some(note)) => Some(WatchEvent::Notification(note)),
            Woke::Progress(false) | Woke::Notification(None) => None,
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct StatusWatcher;

impl StatusWatcher {
    pub fn spawn(mut subscription: Subscription, initial: DoctorState) -> WatchHandle {
        let (progress_tx, progress) = watch::channel(OnboardingProgress::for_state(initial));
        let (notify_tx, notifications) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut tracker = StatusTracker::new();
            while let Some(snapshot) = subscription.recv().await {
                let state = doctor_state(&snapshot);
                progress_tx.send_if_modified(|current| {
                    if current.state == state {
                        return false;
                    }
                    *current = OnboardingProgress::for_state(state);
                    true
                });

                if let Some(note) = tracker.observe(state) {
                    tracing::info!(?note, "doctor verification status changed");
                    if notify_tx.send(note).is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("status watch ended");
        });

        WatchHandle { progress, notifications, task }
    }
}
