use crate::domain::entity::account::{Account, DoctorState, PatientState, Role, StaffState, VerificationState};
use crate::domain::entity::route::{Denial, Route, RouteDecision};

/// Maps a resolved account to where the user goes next. No record means the
/// user is sent back to the login page.
pub fn decide(account: Option<&Account>) -> RouteDecision {
    let Some(account) = account else {
        return RouteDecision::Redirect(Route::Login);
    };

    match (&account.role, account.state) {
        (Role::Doctor, VerificationState::Doctor(DoctorState::Approved)) => {
            RouteDecision::Redirect(Route::DoctorDashboard)
        }
        (Role::Doctor, VerificationState::Doctor(_)) => RouteDecision::Redirect(Route::DoctorOnboarding),

        (Role::Patient, VerificationState::Patient(state)) => match state {
            PatientState::Active => RouteDecision::Redirect(Route::PatientDashboard),
            PatientState::PendingEmailVerification => RouteDecision::Denied(Denial::ResendVerification),
            PatientState::Suspended => RouteDecision::Denied(Denial::Suspended),
            PatientState::Banned => RouteDecision::Denied(Denial::Banned),
        },

        (Role::Staff(_), VerificationState::Staff(StaffState::Active)) => RouteDecision::Redirect(Route::StaffDashboard),
        (Role::Staff(_), VerificationState::Staff(StaffState::InvitedUnverified)) => {
            RouteDecision::Denied(Denial::InvitePending)
        }

        _ => RouteDecision::Denied(Denial::AccessDenied),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::domain::entity::account::Portal;
    use crate::domain::entity::document::Document;

    fn account(portal: Portal, value: Value) -> Account {
        let Value::Object(data) = value else { unreachable!() };
        Account::from_document(portal, &Document::new("k", data, Utc::now()))
    }

    #[test]
    fn test_no_record_goes_to_login() {
        assert_eq!(decide(None), RouteDecision::Redirect(Route::Login));
    }

    #[test]
    fn test_doctor_routes() {
        let cases = [
            (json!({}), Route::DoctorOnboarding),
            (json!({"status": "Pending"}), Route::DoctorOnboarding),
            (json!({"status": "approved"}), Route::DoctorDashboard),
            (json!({"isVerified": true}), Route::DoctorDashboard),
        ];
        for (data, route) in cases {
            assert_eq!(decide(Some(&account(Portal::Doctor, data.clone()))), RouteDecision::Redirect(route), "{data}");
        }
    }

    #[test]
    fn test_patient_routes() {
        let cases = [
            (json!({"status": "Active"}), RouteDecision::Redirect(Route::PatientDashboard)),
            (json!({"status": "Pending"}), RouteDecision::Denied(Denial::ResendVerification)),
            (json!({"status": "who knows"}), RouteDecision::Denied(Denial::ResendVerification)),
            (json!({"status": "suspended"}), RouteDecision::Denied(Denial::Suspended)),
            (json!({"status": "BANNED"}), RouteDecision::Denied(Denial::Banned)),
        ];
        for (data, decision) in cases {
            assert_eq!(decide(Some(&account(Portal::Patient, data.clone()))), decision, "{data}");
        }
    }

    #[test]
    fn test_staff_routes() {
        let cases = [
            (json!({"role": "admin", "isVerified": true}), RouteDecision::Redirect(Route::StaffDashboard)),
            (json!({"role": "Owner", "status": "active"}), RouteDecision::Redirect(Route::StaffDashboard)),
            (json!({"role": "staff"}), RouteDecision::Denied(Denial::InvitePending)),
            (json!({"role": "janitor", "isVerified": true}), RouteDecision::Denied(Denial::AccessDenied)),
            (json!({"isVerified": true}), RouteDecision::Denied(Denial::AccessDenied)),
        ];
        for (data, decision) in cases {
            assert_eq!(decide(Some(&account(Portal::Staff, data.clone()))), decision, "{data}");
        }
    }

    #[test]
    fn test_empty_staff_record_is_denied() {
        let account = account(Portal::Staff, Value::Object(Map::new()));

        assert_eq!(decide(Some(&account)), RouteDecision::Denied(Denial::AccessDenied));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let accounts = [
            account(Portal::Doctor, json!({"status": "pending"})),
            account(Portal::Patient, json!({"status": "Active"})),
            account(Portal::Patient, json!({"status": "suspended"})),
            account(Portal::Staff, json!({"role": "owner", "isVerified": true})),
            account(Portal::Staff, json!({"role": "janitor"})),
        ];

        for account in &accounts {
            let first = decide(Some(account));
            assert_eq!(decide(Some(account)), first, "{account:?}");
            assert_eq!(decide(Some(&account.clone())), first, "{account:?}");
        }
        assert_eq!(decide(None), decide(None));
    }
}
