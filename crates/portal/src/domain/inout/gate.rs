use validator::Validate;

use crate::domain::entity::account::Portal;
use crate::domain::entity::route::Route;

/// Trims, then upper-cases the first letter. The rest is left as typed.
pub fn capitalize_first(value: &str) -> String {
    let value = value.trim();
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

// ╔════════════════════════════╗
// ║         Sign Up            ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct SignUpInput {
    pub portal: Portal,
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters long"))]
    pub password: String,
    /// Patient portal only: attach the profile to an existing identity with
    /// the same email, authenticated by `password`.
    pub link_existing: bool,
}

impl SignUpInput {
    pub fn normalized(self) -> Self {
        Self {
            first_name: capitalize_first(&self.first_name),
            last_name: capitalize_first(&self.last_name),
            email: normalize_email(&self.email),
            ..self
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug)]
pub struct SignUpOutput {
    pub handle: String,
    pub message: String,
}

// ╔════════════════════════════╗
// ║         Sign In            ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct SignInInput {
    pub portal: Portal,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password cannot be empty"))]
    pub password: String,
}

impl SignInInput {
    pub fn normalized(self) -> Self {
        Self { email: normalize_email(&self.email), ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutput {
    pub token: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub route: Route,
}

// ╔════════════════════════════╗
// ║      Federated Start       ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct FederatedStartInput {
    pub portal: Portal,
    #[validate(length(min = 1, message = "provider cannot be empty"))]
    pub provider: String,
}

#[derive(Debug)]
pub struct FederatedStartOutput {
    pub auth_url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

// ╔════════════════════════════╗
// ║     Federated Callback     ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct FederatedCallbackInput {
    pub portal: Portal,
    #[validate(length(min = 1, message = "provider cannot be empty"))]
    pub provider: String,
    #[validate(length(min = 1, message = "code cannot be empty"))]
    pub code: String,
    #[validate(length(min = 1, message = "pkce verifier cannot be empty"))]
    pub pkce_verifier: String,
}

// ╔════════════════════════════╗
// ║    Resend Verification     ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct ResendVerificationInput {
    pub handle: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutput {
    pub message: String,
}

// ╔════════════════════════════╗
// ║      Password Reset        ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct PasswordResetInput {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

#[derive(Debug, Validate)]
pub struct ResetPasswordInput {
    #[validate(length(min = 1, message = "code cannot be empty"))]
    pub code: String,
    #[validate(length(min = 6, message = "must be at least 6 characters long"))]
    pub password: String,
}

// ╔════════════════════════════╗
// ║       Verify Email         ║
// ╚════════════════════════════╝

#[derive(Debug, Validate)]
pub struct VerifyEmailInput {
    #[validate(length(min = 1, message = "code cannot be empty"))]
    pub code: String,
}

#[derive(Debug)]
pub struct VerifyEmailOutput {
    pub redirect: String,
}

// ╔════════════════════════════╗
// ║         Sign Out           ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct SignOutInput {
    pub token: String,
}

// ╔════════════════════════════╗
// ║       Resolve Route        ║
// ╚════════════════════════════╝

#[derive(Debug)]
pub struct ResolveRouteInput {
    pub portal: Portal,
    pub token: String,
    pub handle: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutput {
    pub route: Route,
}
