use app_core::error::AppError;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::Request;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tower_cookies::cookie::{SameSite, time};
use tower_cookies::{Cookie, Cookies, Key};

use crate::domain::entity::session::SessionContext;
use crate::inbound::state::PortalState;

pub const COOKIE_SESSION: &str = "__portal_session";

const SIGN_IN_REQUIRED_MSG: &str = "Please sign in to continue.";
const SESSION_EXPIRED_MSG: &str = "Your session has expired. Please sign in again.";

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(SIGN_IN_REQUIRED_MSG.to_string()))
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_SESSION, token))
        .http_only(true)
        .secure(true)
        .path("/")
        .max_age(time::Duration::days(7))
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session(cookies: &Cookies, key: &Key) {
    cookies.private(key).remove(Cookie::build((COOKIE_SESSION, "")).path("/").build());
}

/// Clears the session cookie when the error means the user is signed out.
pub fn clear_session_on(err: &AppError, cookies: &Cookies, key: &Key) {
    if err.forces_sign_out() {
        clear_session(cookies, key);
    }
}

pub async fn require_session(
    State(state): State<PortalState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookies
        .private(&state.cookie_key)
        .get(COOKIE_SESSION)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized(SIGN_IN_REQUIRED_MSG.to_string()))?;

    let Some(user) = state.identity.current_session(&token).await? else {
        clear_session(&cookies, &state.cookie_key);
        return Err(AppError::Unauthorized(SESSION_EXPIRED_MSG.to_string()));
    };

    let session = SessionContext {
        token,
        handle: user.handle,
        email: user.email,
        display_name: user.display_name,
        email_verified: user.email_verified,
    };

    let (mut parts, body) = req.into_parts();
    parts.extensions.insert(session);
    let req = Request::from_parts(parts, body);

    Ok(next.run(req).await)
}
