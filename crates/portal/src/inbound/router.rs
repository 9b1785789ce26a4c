use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{Router, middleware};

use crate::inbound::http::gate::*;
use crate::inbound::http::onboarding::*;
use crate::inbound::middleware::require_session;
use crate::inbound::state::PortalState;
use crate::usecase::wizard::MAX_DOCUMENT_BYTES;

// Room for the multipart envelope around the largest accepted document.
const DOCUMENT_BODY_LIMIT: usize = MAX_DOCUMENT_BYTES + 64 * 1024;

pub fn create_router(state: PortalState) -> Router {
    let protected_routes = Router::new()
        // onboarding scope
        .route("/onboarding/wizard", post(open_wizard).get(view_wizard).patch(edit_wizard).delete(discard_wizard))
        .route("/onboarding/wizard/document", put(select_document).layer(DefaultBodyLimit::max(DOCUMENT_BODY_LIMIT)))
        .route("/onboarding/wizard/next", post(next_step))
        .route("/onboarding/wizard/back", post(previous_step))
        .route("/onboarding/wizard/submit", post(submit))
        .route("/onboarding/wizard/upload-progress", get(upload_progress))
        .route("/onboarding/status", get(status))
        .route("/onboarding/status/events", get(status_events))
        // session scope
        .route("/session/route", get(resolve_route))
        .route("/auth/verification-email", post(resend_verification))
        .route("/auth/sign-out", post(sign_out))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let public_routes = Router::new()
        .route("/auth/{portal}/sign-up", post(sign_up))
        .route("/auth/{portal}/sign-in", post(sign_in))
        .route("/auth/{portal}/social/{provider}", get(federated_start))
        .route("/auth/social/{provider}/callback", get(federated_callback))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/password-reset", post(password_reset))
        .route("/auth/password-reset/confirm", post(reset_password));

    Router::new().merge(public_routes).merge(protected_routes).with_state(state)
}
