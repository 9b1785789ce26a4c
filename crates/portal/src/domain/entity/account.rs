//! Profile records and their normalized status.
//!
//! Records arrive with loosely typed status fields written by several
//! front-ends over time ("pending", "Pending", "Active", `isVerified: true`).
//! [`Account::from_document`] is the only place those strings are read; the
//! rest of the crate works with the enums below.
//!
//! | portal  | raw value (trimmed, case-insensitive)            | state                      |
//! |---------|--------------------------------------------------|----------------------------|
//! | doctor  | `isVerified: true`                               | Approved                   |
//! | doctor  | `approved`, `verified`, `active`                 | Approved                   |
//! | doctor  | `pending`, `submitted`, `under review`           | Pending                    |
//! | doctor  | absent or anything else                          | Unsubmitted                |
//! | patient | `active`                                         | Active                     |
//! | patient | `suspended`                                      | Suspended                  |
//! | patient | `banned`                                         | Banned                     |
//! | patient | `pending`, `unverified`, absent, anything else   | PendingEmailVerification   |
//! | staff   | `isVerified: true` or `status: active`           | Active                     |
//! | staff   | anything else                                    | InvitedUnverified          |
//!
//! Doctor records fall back to `profileStatus` when `status` is absent.

use std::fmt;
use std::str::FromStr;

use app_core::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Doctor,
    Patient,
    Staff,
}

impl Portal {
    pub fn collection(&self) -> &'static str {
        match self {
            Portal::Doctor => "doctors",
            Portal::Patient => "patients",
            Portal::Staff => "staff",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Portal::Doctor => "doctor",
            Portal::Patient => "patient",
            Portal::Staff => "staff",
        }
    }
}

impl FromStr for Portal {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "doctor" | "doctors" => Ok(Portal::Doctor),
            "patient" | "patients" => Ok(Portal::Patient),
            "staff" => Ok(Portal::Staff),
            other => Err(AppError::NotFound(format!("unknown portal '{other}'"))),
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Doctor,
    Patient,
    Staff(StaffRole),
    /// A staff record whose `role` field names nothing we grant access to.
    Unrecognized(String),
}

impl Role {
    fn for_staff(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or_default().trim();
        match raw.to_lowercase().as_str() {
            "owner" => Role::Staff(StaffRole::Owner),
            "admin" => Role::Staff(StaffRole::Admin),
            "staff" | "member" => Role::Staff(StaffRole::Member),
            _ => Role::Unrecognized(raw.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
            Role::Staff(StaffRole::Owner) => write!(f, "staff-owner"),
            Role::Staff(StaffRole::Admin) => write!(f, "staff-admin"),
            Role::Staff(StaffRole::Member) => write!(f, "staff-member"),
            Role::Unrecognized(raw) => write!(f, "unrecognized({raw})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorState {
    Unsubmitted,
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientState {
    PendingEmailVerification,
    Active,
    Suspended,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffState {
    InvitedUnverified,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "portal", content = "state", rename_all = "lowercase")]
pub enum VerificationState {
    Doctor(DoctorState),
    Patient(PatientState),
    Staff(StaffState),
}

impl VerificationState {
    fn normalize(portal: Portal, doc: &Document) -> Self {
        match portal {
            Portal::Doctor => VerificationState::Doctor(doctor_state(doc)),
            Portal::Patient => VerificationState::Patient(patient_state(doc.str_field("status"))),
            Portal::Staff => VerificationState::Staff(staff_state(doc)),
        }
    }
}

fn normalized(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn doctor_state(doc: &Document) -> DoctorState {
    if doc.bool_field("isVerified") == Some(true) {
        return DoctorState::Approved;
    }
    let raw = doc.str_field("status").or_else(|| doc.str_field("profileStatus"));
    match raw.map(normalized).as_deref() {
        Some("approved" | "verified" | "active") => DoctorState::Approved,
        Some("pending" | "submitted" | "under review") => DoctorState::Pending,
        _ => DoctorState::Unsubmitted,
    }
}

fn patient_state(raw: Option<&str>) -> PatientState {
    match raw.map(normalized).as_deref() {
        Some("active") => PatientState::Active,
        Some("suspended") => PatientState::Suspended,
        Some("banned") => PatientState::Banned,
        _ => PatientState::PendingEmailVerification,
    }
}

fn staff_state(doc: &Document) -> StaffState {
    let active_status = doc.str_field("status").map(normalized).as_deref() == Some("active");
    if doc.bool_field("isVerified") == Some(true) || active_status {
        StaffState::Active
    } else {
        StaffState::InvitedUnverified
    }
}

/// Presentational fields. Nothing here influences routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Profile {
    fn from_document(doc: &Document) -> Self {
        let text = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| doc.str_field(name))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            first_name: text(&["firstName"]),
            last_name: text(&["lastName"]),
            display_name: text(&["displayName", "name"]),
            avatar_url: text(&["avatarUrl", "photoURL"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Record key within the portal's collection.
    pub key: String,
    /// Identity-provider handle, absent for records created before first sign-in.
    pub identity: Option<String>,
    pub email: String,
    pub portal: Portal,
    pub role: Role,
    pub state: VerificationState,
    /// The raw `status` field, trimmed and lower-cased.
    pub status: Option<String>,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn from_document(portal: Portal, doc: &Document) -> Self {
        let role = match portal {
            Portal::Doctor => Role::Doctor,
            Portal::Patient => Role::Patient,
            Portal::Staff => Role::for_staff(doc.str_field("role")),
        };

        Self {
            key: doc.key.clone(),
            identity: doc.str_field("uid").filter(|uid| !uid.is_empty()).map(str::to_string),
            email: doc.str_field("email").map(normalized).unwrap_or_default(),
            portal,
            role,
            state: VerificationState::normalize(portal, doc),
            status: doc.str_field("status").map(normalized).filter(|status| !status.is_empty()),
            profile: Profile::from_document(doc),
            created_at: doc.created_at,
        }
    }

    /// A patient record written at sign-up and still waiting on the email
    /// link. Absent or unknown statuses do not qualify.
    pub fn awaits_email_verification(&self) -> bool {
        self.state == VerificationState::Patient(PatientState::PendingEmailVerification)
            && matches!(self.status.as_deref(), Some("pending" | "unverified"))
    }

    /// Marks the record as belonging to `handle`, used when it was found under
    /// that key.
    pub fn with_identity(mut self, handle: &str) -> Self {
        self.identity = Some(handle.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn doc(value: Value) -> Document {
        let Value::Object(data) = value else { unreachable!() };
        Document::new("rec-1", data, Utc::now())
    }

    #[test]
    fn test_portal_from_str() {
        assert_eq!("doctors".parse::<Portal>().unwrap(), Portal::Doctor);
        assert_eq!(" Patient ".parse::<Portal>().unwrap(), Portal::Patient);
        assert_eq!("staff".parse::<Portal>().unwrap(), Portal::Staff);
        assert!(matches!("admin".parse::<Portal>(), Err(AppError::NotFound(_))));
        assert_eq!(Portal::Doctor.collection(), "doctors");
    }

    #[test]
    fn test_doctor_status_mapping() {
        let cases = [
            (json!({}), DoctorState::Unsubmitted),
            (json!({"status": "Pending"}), DoctorState::Pending),
            (json!({"status": " under review "}), DoctorState::Pending),
            (json!({"status": "APPROVED"}), DoctorState::Approved),
            (json!({"status": "rejected"}), DoctorState::Unsubmitted),
            (json!({"isVerified": true}), DoctorState::Approved),
            (json!({"isVerified": false, "status": "pending"}), DoctorState::Pending),
            (json!({"profileStatus": "submitted"}), DoctorState::Pending),
            (json!({"status": "pending", "profileStatus": "approved"}), DoctorState::Pending),
        ];

        for (value, expected) in cases {
            let account = Account::from_document(Portal::Doctor, &doc(value.clone()));
            assert_eq!(account.state, VerificationState::Doctor(expected), "input {value}");
            assert_eq!(account.role, Role::Doctor);
        }
    }

    #[test]
    fn test_patient_status_mapping() {
        let cases = [
            (json!({"status": "Active"}), PatientState::Active),
            (json!({"status": "Suspended"}), PatientState::Suspended),
            (json!({"status": "banned"}), PatientState::Banned),
            (json!({"status": "Pending"}), PatientState::PendingEmailVerification),
            (json!({"status": "unverified"}), PatientState::PendingEmailVerification),
            (json!({"status": "vip"}), PatientState::PendingEmailVerification),
            (json!({}), PatientState::PendingEmailVerification),
        ];

        for (value, expected) in cases {
            let account = Account::from_document(Portal::Patient, &doc(value.clone()));
            assert_eq!(account.state, VerificationState::Patient(expected), "input {value}");
        }
    }

    #[test]
    fn test_only_pending_patients_await_email_verification() {
        let awaits = |value: Value| Account::from_document(Portal::Patient, &doc(value)).awaits_email_verification();

        assert!(awaits(json!({"status": " Pending "})));
        assert!(awaits(json!({"status": "unverified"})));
        assert!(!awaits(json!({})));
        assert!(!awaits(json!({"status": "Deactivated"})));
        assert!(!awaits(json!({"status": "Active"})));
        assert!(!Account::from_document(Portal::Doctor, &doc(json!({"status": "pending"}))).awaits_email_verification());
    }

    #[test]
    fn test_staff_role_and_state() {
        let owner = Account::from_document(Portal::Staff, &doc(json!({"role": "Owner", "isVerified": true})));
        assert_eq!(owner.role, Role::Staff(StaffRole::Owner));
        assert_eq!(owner.state, VerificationState::Staff(StaffState::Active));

        let member = Account::from_document(Portal::Staff, &doc(json!({"role": "staff", "status": "active"})));
        assert_eq!(member.role, Role::Staff(StaffRole::Member));
        assert_eq!(member.state, VerificationState::Staff(StaffState::Active));

        let invited = Account::from_document(Portal::Staff, &doc(json!({"role": "admin"})));
        assert_eq!(invited.role, Role::Staff(StaffRole::Admin));
        assert_eq!(invited.state, VerificationState::Staff(StaffState::InvitedUnverified));

        let other = Account::from_document(Portal::Staff, &doc(json!({"role": "janitor", "isVerified": true})));
        assert_eq!(other.role, Role::Unrecognized("janitor".into()));
    }

    #[test]
    fn test_identity_email_and_profile() {
        let account = Account::from_document(
            Portal::Doctor,
            &doc(json!({
                "uid": "uid-9",
                "email": "  Doc@Example.COM ",
                "firstName": "Ana",
                "lastName": "Cruz",
                "name": "Dr. Ana Cruz",
                "photoURL": "https://img/a.png",
            })),
        );

        assert_eq!(account.identity.as_deref(), Some("uid-9"));
        assert_eq!(account.email, "doc@example.com");
        assert_eq!(account.profile.display_name.as_deref(), Some("Dr. Ana Cruz"));
        assert_eq!(account.profile.avatar_url.as_deref(), Some("https://img/a.png"));

        let unlinked = Account::from_document(Portal::Doctor, &doc(json!({"email": "x@example.com"})));
        assert_eq!(unlinked.identity, None);
        assert_eq!(unlinked.with_identity("uid-1").identity.as_deref(), Some("uid-1"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Staff(StaffRole::Admin).to_string(), "staff-admin");
        assert_eq!(Role::Doctor.to_string(), "doctor");
    }
}
