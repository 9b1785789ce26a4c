use app_core::error::AppError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Login,
    DoctorOnboarding,
    DoctorDashboard,
    PatientDashboard,
    StaffDashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/auth/login",
            Route::DoctorOnboarding => "/dashboard/doctor/onboarding",
            Route::DoctorDashboard => "/dashboard/doctor",
            Route::PatientDashboard => "/dashboard/patient",
            Route::StaffDashboard => "/staff/dashboard",
        }
    }
}

/// Why a signed-in user may not proceed. Every denial ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    ResendVerification,
    Suspended,
    Banned,
    InvitePending,
    AccessDenied,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::ResendVerification => "Verification email sent. Please verify before logging in.",
            Denial::Suspended => "Your account has been suspended. Please contact support.",
            Denial::Banned => "Your account has been banned.",
            Denial::InvitePending => "Verify your email first. Please check your inbox for the invite link.",
            Denial::AccessDenied => "Access denied. This account is not a staff user.",
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::ResendVerification => AppError::EmailNotVerified(denial.message().to_string()),
            _ => AppError::AccountBlocked(denial.message().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Redirect(Route),
    Denied(Denial),
}
