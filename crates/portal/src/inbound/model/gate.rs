use serde::{Deserialize, Serialize};

use crate::domain::entity::route::Route;
use crate::domain::inout::gate::SignInOutput;

// ╔════════════════════════════╗
// ║    Sign Up                 ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// Confirms creating a patient profile on an identity that already exists.
    #[serde(default)]
    pub link_existing: bool,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub handle: String,
}

// ╔════════════════════════════╗
// ║    Sign In                 ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub handle: String,
    pub display_name: Option<String>,
    pub route: Route,
    pub redirect: &'static str,
}

impl From<SignInOutput> for SignInResponse {
    fn from(output: SignInOutput) -> Self {
        Self {
            handle: output.handle,
            display_name: output.display_name,
            route: output.route,
            redirect: output.route.path(),
        }
    }
}

// ╔════════════════════════════╗
// ║    Federated Sign In       ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
pub struct FederatedCallbackRequest {
    pub code: Option<String>,
    #[serde(default)]
    pub state: String,
    pub error: Option<String>,
}

// ╔════════════════════════════╗
// ║    Email Actions           ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub code: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AcknowledgedResponse {
    pub success: bool,
}

// ╔════════════════════════════╗
// ║    Route                   ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
pub struct RouteRequest {
    pub portal: String,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub route: Route,
    pub redirect: &'static str,
}

impl From<Route> for RouteResponse {
    fn from(route: Route) -> Self {
        Self { route, redirect: route.path() }
    }
}
