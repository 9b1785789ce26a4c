use app_core::error::AppError;
use app_core::extractors::{AppJson, AppMultipart};
use app_core::response::Response;
use axum::debug_handler;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::domain::entity::progress::OnboardingProgress;
use crate::domain::entity::session::SessionContext;
use crate::domain::inout::prelude::*;
use crate::inbound::model::prelude::*;
use crate::inbound::state::PortalState;
use crate::usecase::watcher::{StatusNotification, WatchEvent};

const SUBMITTED_MSG: &str = "Your verification has been submitted!";
const APPROVED_MSG: &str = "Your account has just been approved!";
const EVENT_PROGRESS: &str = "progress";
const EVENT_APPROVED: &str = "approved";

#[debug_handler]
pub async fn open_wizard(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .open(OpenWizardInput { handle: session.handle, email: session.email, display_name: session.display_name })
        .await
        .map(WizardResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn view_wizard(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .view(WizardInput { handle: session.handle })
        .await
        .map(WizardResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn discard_wizard(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .discard(WizardInput { handle: session.handle })
        .await
        .map(|_| Response::from(AcknowledgedResponse { success: true }))
}

#[debug_handler]
pub async fn edit_wizard(
    State(state): State<PortalState>,
    session: SessionContext,
    AppJson(edit): AppJson<WizardEdit>,
) -> impl IntoResponse {
    state
        .onboarding
        .edit(EditWizardInput { handle: session.handle, edit })
        .await
        .map(WizardResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn select_document(
    State(state): State<PortalState>,
    session: SessionContext,
    AppMultipart(multipart): AppMultipart,
) -> impl IntoResponse {
    let req = DocumentUploadRequest::from_multipart(multipart).await?;

    state
        .onboarding
        .select_document(SelectDocumentInput {
            handle: session.handle,
            file_name: req.file_name,
            content_type: req.content_type,
            bytes: req.bytes,
        })
        .await
        .map(WizardResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn next_step(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .advance(WizardInput { handle: session.handle })
        .await
        .map(WizardResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn previous_step(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .back(WizardInput { handle: session.handle })
        .await
        .map(|output| match output {
            BackOutput::Moved(view) => BackResponse { dismissed: false, wizard: Some(view.into()) },
            BackOutput::Dismissed => BackResponse { dismissed: true, wizard: None },
        })
        .map(Response::from)
}

#[debug_handler]
pub async fn submit(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .submit(SubmitInput { handle: session.handle, email: session.email })
        .await
        .map(|outcome| match outcome {
            outcome @ SubmitOutcome::Submitted { .. } => Response::created(SubmitResponse::from(outcome), SUBMITTED_MSG),
            outcome @ SubmitOutcome::Blocked { .. } => Response::from(SubmitResponse::from(outcome)),
        })
}

#[debug_handler]
pub async fn upload_progress(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .upload_progress(WizardInput { handle: session.handle })
        .await
        .map(UploadProgressResponse::from)
        .map(Response::from)
}

#[debug_handler]
pub async fn status(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .onboarding
        .status(StatusInput { handle: session.handle, email: session.email })
        .await
        .map(Response::from)
}

fn progress_event(progress: &OnboardingProgress) -> Result<Event, axum::Error> {
    Event::default().event(EVENT_PROGRESS).json_data(progress)
}

fn watch_event(event: WatchEvent) -> Result<Event, axum::Error> {
    match event {
        WatchEvent::Progress(progress) => progress_event(&progress),
        WatchEvent::Notification(StatusNotification::Approved) => {
            Event::default().event(EVENT_APPROVED).json_data(json!({ "message": APPROVED_MSG }))
        }
    }
}

/// Streams status changes as server-sent events. The first event carries the
/// current progress; the watch ends when the client disconnects.
#[debug_handler]
pub async fn status_events(
    State(state): State<PortalState>,
    session: SessionContext,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let handle = state
        .onboarding
        .watch(StatusInput { handle: session.handle, email: session.email })
        .await?;

    let first = progress_event(&handle.current());
    let changes = stream::unfold(handle, |mut handle| async move {
        let event = handle.next_event().await?;
        Some((watch_event(event), handle))
    });

    Ok(Sse::new(stream::once(async move { first }).chain(changes)).keep_alive(KeepAlive::default()))
}
