use app_core::error::AppError;
use app_core::extractors::{AppJson, AppPath, AppQuery};
use app_core::response::Response;
use axum::debug_handler;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect};
use serde_json::json;
use tower_cookies::cookie::{SameSite, time};
use tower_cookies::{Cookie, Cookies};

use crate::domain::entity::account::Portal;
use crate::domain::entity::session::SessionContext;
use crate::domain::inout::prelude::*;
use crate::inbound::middleware::{clear_session, clear_session_on, session_cookie};
use crate::inbound::model::prelude::*;
use crate::inbound::state::PortalState;

const COOKIE_OAUTH_STATE: &str = "__oauth_state";
const KEY_OAUTH_STATE_CSRF: &str = "csrf_token";
const KEY_OAUTH_STATE_PKCE: &str = "pkce_verifier";
const KEY_OAUTH_STATE_PORTAL: &str = "portal";

const OAUTH_EXPIRED_MSG: &str = "Social sign-in expired. Please try again.";
const OAUTH_STATE_MISMATCH_MSG: &str = "Social sign-in could not be verified. Please try again.";

#[debug_handler]
pub async fn sign_up(
    State(state): State<PortalState>,
    AppPath(portal): AppPath<String>,
    AppJson(req): AppJson<SignUpRequest>,
) -> impl IntoResponse {
    let portal: Portal = portal.parse()?;

    state
        .gate
        .sign_up(SignUpInput {
            portal,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password: req.password,
            link_existing: req.link_existing,
        })
        .await
        .map(|output| Response::created(SignUpResponse { handle: output.handle }, &output.message))
}

#[debug_handler]
pub async fn sign_in(
    State(state): State<PortalState>,
    cookies: Cookies,
    AppPath(portal): AppPath<String>,
    AppJson(req): AppJson<SignInRequest>,
) -> impl IntoResponse {
    let portal: Portal = portal.parse()?;

    let output = state.gate.sign_in(SignInInput { portal, email: req.email, password: req.password }).await;
    match output {
        Ok(output) => {
            cookies.private(&state.cookie_key).add(session_cookie(output.token.clone()));
            Ok(Response::from(SignInResponse::from(output)))
        }
        Err(err) => {
            clear_session_on(&err, &cookies, &state.cookie_key);
            Err(err)
        }
    }
}

#[debug_handler]
pub async fn federated_start(
    State(state): State<PortalState>,
    cookies: Cookies,
    AppPath((portal, provider)): AppPath<(String, String)>,
) -> impl IntoResponse {
    let portal: Portal = portal.parse()?;

    state.gate.federated_start(FederatedStartInput { portal, provider }).await.and_then(|output| {
        let oauth_state = json!({
            KEY_OAUTH_STATE_CSRF: output.csrf_state,
            KEY_OAUTH_STATE_PKCE: output.pkce_verifier,
            KEY_OAUTH_STATE_PORTAL: portal.label(),
        });
        let value = serde_json::to_string(&oauth_state)?;

        let cookie = Cookie::build((COOKIE_OAUTH_STATE, value))
            .http_only(true)
            .secure(true)
            .path("/")
            .max_age(time::Duration::minutes(3))
            .same_site(SameSite::Lax)
            .build();

        cookies.private(&state.cookie_key).add(cookie);

        Ok(Redirect::to(&output.auth_url))
    })
}

/// Completes social sign-in. The portal comes from the stored state so every
/// portal shares one redirect URI per provider.
#[debug_handler]
pub async fn federated_callback(
    State(state): State<PortalState>,
    cookies: Cookies,
    AppPath(provider): AppPath<String>,
    AppQuery(query): AppQuery<FederatedCallbackRequest>,
) -> impl IntoResponse {
    if let Some(err) = query.error {
        return Err(AppError::Forbidden(format!("Social sign-in failed: {err}")));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::Forbidden("Missing authorization code".to_string()))?;

    let oauth_state_cookie = cookies
        .private(&state.cookie_key)
        .get(COOKIE_OAUTH_STATE)
        .ok_or_else(|| AppError::Forbidden(OAUTH_EXPIRED_MSG.to_string()))?;

    cookies.private(&state.cookie_key).remove(Cookie::new(COOKIE_OAUTH_STATE, ""));

    let oauth_state: serde_json::Value = serde_json::from_str(oauth_state_cookie.value())
        .map_err(|_| AppError::Forbidden(OAUTH_EXPIRED_MSG.to_string()))?;

    let stored_csrf = oauth_state[KEY_OAUTH_STATE_CSRF].as_str().unwrap_or_default();
    if stored_csrf.is_empty() || query.state != stored_csrf {
        return Err(AppError::Forbidden(OAUTH_STATE_MISMATCH_MSG.to_string()));
    }

    let portal: Portal = oauth_state[KEY_OAUTH_STATE_PORTAL]
        .as_str()
        .ok_or_else(|| AppError::Forbidden(OAUTH_STATE_MISMATCH_MSG.to_string()))?
        .parse()?;
    let pkce_verifier = oauth_state[KEY_OAUTH_STATE_PKCE]
        .as_str()
        .ok_or(AppError::Internal)?
        .to_string();

    let base_url = state.config.base_url()?;

    match state.gate.federated_callback(FederatedCallbackInput { portal, provider, code, pkce_verifier }).await {
        Ok(output) => {
            cookies.private(&state.cookie_key).add(session_cookie(output.token.clone()));
            Ok(Redirect::to(&format!("{base_url}{}", output.route.path())))
        }
        Err(err) => {
            clear_session_on(&err, &cookies, &state.cookie_key);
            Err(err)
        }
    }
}

#[debug_handler]
pub async fn verify_email(
    State(state): State<PortalState>,
    AppQuery(req): AppQuery<VerifyEmailRequest>,
) -> impl IntoResponse {
    let base_url = state.config.base_url()?;

    match state.gate.verify_email(VerifyEmailInput { code: req.code }).await {
        Ok(output) => Ok::<_, AppError>(Redirect::to(&output.redirect)),
        Err(err) => {
            tracing::warn!(error = %err, "email verification failed");
            Ok(Redirect::to(&format!("{base_url}/auth/login?error=invalid_or_expired_code")))
        }
    }
}

#[debug_handler]
pub async fn password_reset(
    State(state): State<PortalState>,
    AppJson(req): AppJson<PasswordResetRequest>,
) -> impl IntoResponse {
    state
        .gate
        .send_password_reset(PasswordResetInput { email: req.email })
        .await
        .map(|output| Response::with_message(AcknowledgedResponse { success: true }, &output.message))
}

#[debug_handler]
pub async fn reset_password(
    State(state): State<PortalState>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> impl IntoResponse {
    state
        .gate
        .reset_password(ResetPasswordInput { code: req.code, password: req.password })
        .await
        .map(|output| Response::with_message(AcknowledgedResponse { success: true }, &output.message))
}

#[debug_handler]
pub async fn resend_verification(State(state): State<PortalState>, session: SessionContext) -> impl IntoResponse {
    state
        .gate
        .resend_verification(ResendVerificationInput {
            handle: session.handle,
            email_verified: session.email_verified,
        })
        .await
        .map(|output| Response::with_message(AcknowledgedResponse { success: true }, &output.message))
}

#[debug_handler]
pub async fn sign_out(State(state): State<PortalState>, cookies: Cookies, session: SessionContext) -> impl IntoResponse {
    let result = state.gate.sign_out(SignOutInput { token: session.token }).await;
    clear_session(&cookies, &state.cookie_key);

    result.map(|_| Response::from(AcknowledgedResponse { success: true }))
}

#[debug_handler]
pub async fn resolve_route(
    State(state): State<PortalState>,
    cookies: Cookies,
    session: SessionContext,
    AppQuery(req): AppQuery<RouteRequest>,
) -> impl IntoResponse {
    let portal: Portal = req.portal.parse()?;

    let output = state
        .gate
        .resolve_route(ResolveRouteInput {
            portal,
            token: session.token,
            handle: session.handle,
            email: session.email,
            email_verified: session.email_verified,
        })
        .await;

    match output {
        Ok(output) => Ok(Response::from(RouteResponse::from(output.route))),
        Err(err) => {
            clear_session_on(&err, &cookies, &state.cookie_key);
            Err(err)
        }
    }
}
