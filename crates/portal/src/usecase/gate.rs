use std::sync::Arc;

use app_core::config::Config;
use app_core::error::AppError;
use app_core::oauth::{FederatedProfile, FederatedProviders};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use validator::Validate;

use crate::domain::entity::account::{Account, PatientState, Portal, VerificationState};
use crate::domain::entity::route::{Route, RouteDecision};
use crate::domain::entity::wizard::PersonalDetails;
use crate::domain::inout::prelude::*;
use crate::outbound::identity::{IdentityService, IdentityUser, Session};
use crate::outbound::records::RecordStore;
use crate::usecase::resolver::RecordResolver;
use crate::usecase::routing;

const STAFF_SIGN_UP_MSG: &str = "Staff accounts are created by invitation only.";
const EMAIL_EXISTS_MSG: &str = "This email is already registered. Try logging in instead.";
const ACCOUNT_CREATED_MSG: &str = "Account created! Please check your email to verify your account.";
const VERIFY_FIRST_MSG: &str = "Verification email sent. Please verify before logging in.";
const VERIFICATION_RESENT_MSG: &str = "Verification email resent!";
const ALREADY_VERIFIED_MSG: &str = "Your email is already verified.";
const PASSWORD_RESET_MSG: &str = "Password reset email sent! Please check your inbox.";
const PASSWORD_CHANGED_MSG: &str = "Your password has been reset. You can now log in.";
const LINK_EXISTING_MSG: &str =
    "This email already exists in our system. By creating a patient account, your original password will still apply.";
const PATIENT_LINKED_MSG: &str = "Your patient account has been created!";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GateUseCase: Send + Sync {
    async fn sign_up(&self, input: SignUpInput) -> Result<SignUpOutput, AppError>;
    async fn sign_in(&self, input: SignInInput) -> Result<SignInOutput, AppError>;
    async fn federated_start(&self, input: FederatedStartInput) -> Result<FederatedStartOutput, AppError>;
    async fn federated_callback(&self, input: FederatedCallbackInput) -> Result<SignInOutput, AppError>;
    async fn resend_verification(&self, input: ResendVerificationInput) -> Result<MessageOutput, AppError>;
    async fn send_password_reset(&self, input: PasswordResetInput) -> Result<MessageOutput, AppError>;
    async fn reset_password(&self, input: ResetPasswordInput) -> Result<MessageOutput, AppError>;
    async fn verify_email(&self, input: VerifyEmailInput) -> Result<VerifyEmailOutput, AppError>;
    async fn sign_out(&self, input: SignOutInput) -> Result<(), AppError>;
    async fn resolve_route(&self, input: ResolveRouteInput) -> Result<RouteOutput, AppError>;
}

#[derive(Clone)]
pub struct GateService {
    config: Arc<Config>,
    identity: Arc<dyn IdentityService>,
    records: Arc<dyn RecordStore>,
    resolver: RecordResolver,
    providers: FederatedProviders,
}

impl GateService {
    pub fn new(
        config: Arc<Config>,
        identity: Arc<dyn IdentityService>,
        records: Arc<dyn RecordStore>,
        providers: FederatedProviders,
    ) -> Self {
        let resolver = RecordResolver::new(records.clone());
        Self { config, identity, records, resolver, providers }
    }

    fn continue_url(&self) -> Result<String, AppError> {
        Ok(format!("{}/auth/login", self.config.base_url()?))
    }

    /// Ends a session on the way out of a failed sign-in. Failures are logged
    /// so the original error reaches the caller.
    async fn abandon(&self, token: &str) {
        if let Err(err) = self.identity.sign_out(token).await {
            tracing::warn!(error = %err, "failed to end session");
        }
    }

    async fn write_profile(
        &self,
        portal: Portal,
        handle: &str,
        email: &str,
        personal: &PersonalDetails,
        display_name: &str,
        patient_status: &str,
    ) -> Result<(), AppError> {
        let mut data = Map::new();
        data.insert("uid".into(), json!(handle));
        data.insert("email".into(), json!(email));
        data.insert("firstName".into(), json!(personal.first_name));
        data.insert("lastName".into(), json!(personal.last_name));
        data.insert("displayName".into(), json!(display_name));
        data.insert("role".into(), json!(portal.label()));
        if portal == Portal::Patient {
            data.insert("status".into(), json!(patient_status));
        }

        self.records.set(portal.collection(), handle, data).await?;
        tracing::info!(portal = portal.label(), handle, "profile record created");
        Ok(())
    }

    /// Resolves and routes a live session. Any failure ends the session.
    async fn route_session(&self, portal: Portal, token: &str, user: &IdentityUser) -> Result<SignInOutput, AppError> {
        match self.route_user(portal, user).await {
            Ok(route) => Ok(SignInOutput {
                token: token.to_string(),
                handle: user.handle.clone(),
                display_name: user.display_name.clone(),
                route,
            }),
            Err(err) => {
                self.abandon(token).await;
                Err(err)
            }
        }
    }

    async fn route_user(&self, portal: Portal, user: &IdentityUser) -> Result<Route, AppError> {
        let mut account = self
            .resolver
            .resolve(portal, &user.handle, &user.email)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(format!("No {portal} account found. Please sign up first.")))?;

        self.promote_verified_patient(&mut account, user).await?;

        match routing::decide(Some(&account)) {
            RouteDecision::Redirect(route) => {
                tracing::info!(portal = portal.label(), handle = %user.handle, route = route.path(), "session routed");
                Ok(route)
            }
            RouteDecision::Denied(denial) => {
                tracing::info!(portal = portal.label(), handle = %user.handle, ?denial, "session denied");
                Err(denial.into())
            }
        }
    }

    async fn promote_verified_patient(&self, account: &mut Account, user: &IdentityUser) -> Result<(), AppError> {
        if !account.awaits_email_verification() || !user.email_verified {
            return Ok(());
        }

        let mut patch = Map::new();
        patch.insert("status".into(), Value::String("Active".into()));
        self.records.update(account.portal.collection(), &account.key, patch).await?;
        account.state = VerificationState::Patient(PatientState::Active);
        account.status = Some("active".into());

        tracing::info!(handle = %user.handle, key = %account.key, "patient activated after email verification");
        Ok(())
    }

    async fn ensure_federated_profile(
        &self,
        portal: Portal,
        session: &Session,
        profile: &FederatedProfile,
    ) -> Result<(), AppError> {
        if portal == Portal::Staff {
            return Ok(());
        }
        let user = &session.user;
        if self.resolver.resolve(portal, &user.handle, &user.email).await?.is_some() {
            return Ok(());
        }

        let display_name = profile.display_name.clone().unwrap_or_else(|| user.email.clone());
        let personal = PersonalDetails::from_display_name(profile.display_name.as_deref());
        self.write_profile(portal, &user.handle, &user.email, &personal, &display_name, "Active")
            .await
    }
}

fn patient_status(email_verified: bool) -> &'static str {
    if email_verified { "Active" } else { "Pending" }
}

#[async_trait]
impl GateUseCase for GateService {
    async fn sign_up(&self, input: SignUpInput) -> Result<SignUpOutput, AppError> {
        let input = input.normalized();
        input.validate()?;

        if input.portal == Portal::Staff {
            return Err(AppError::Forbidden(STAFF_SIGN_UP_MSG.to_string()));
        }

        let collection = input.portal.collection();
        if !self.records.find(collection, "email", &input.email).await?.is_empty() {
            return Err(AppError::Conflict(EMAIL_EXISTS_MSG.to_string()));
        }

        let display_name = input.display_name();
        let created = self
            .identity
            .create_account(&input.email, &input.password, Some(display_name.clone()))
            .await;
        let (session, linked) = match created {
            Ok(session) => (session, false),
            Err(AppError::Conflict(_)) if input.portal == Portal::Patient => {
                if !input.link_existing {
                    return Err(AppError::Conflict(LINK_EXISTING_MSG.to_string()));
                }
                (self.identity.authenticate(&input.email, &input.password).await?, true)
            }
            Err(err) => return Err(err),
        };
        let handle = session.user.handle.clone();
        let verified = session.user.email_verified;

        let personal = PersonalDetails {
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            ..PersonalDetails::default()
        };
        let written = self
            .write_profile(input.portal, &handle, &input.email, &personal, &display_name, patient_status(verified))
            .await;
        if let Err(err) = written {
            tracing::error!(%handle, error = %err, "identity without a profile record");
            self.abandon(&session.token).await;
            return Err(err);
        }

        if !verified {
            let continue_url = self.continue_url()?;
            if let Err(err) = self.identity.send_verification_email(&handle, &continue_url).await {
                tracing::warn!(%handle, error = %err, "failed to send verification email");
            }
        }
        self.abandon(&session.token).await;

        tracing::info!(portal = input.portal.label(), %handle, linked, "account signed up");

        let message = if linked && verified { PATIENT_LINKED_MSG } else { ACCOUNT_CREATED_MSG };
        Ok(SignUpOutput { handle, message: message.to_string() })
    }

    async fn sign_in(&self, input: SignInInput) -> Result<SignInOutput, AppError> {
        let input = input.normalized();
        input.validate()?;

        let session = self.identity.authenticate(&input.email, &input.password).await?;

        if input.portal != Portal::Staff && !session.user.email_verified {
            let sent = match self.continue_url() {
                Ok(url) => self.identity.send_verification_email(&session.user.handle, &url).await,
                Err(err) => Err(err),
            };
            if let Err(err) = sent {
                tracing::warn!(handle = %session.user.handle, error = %err, "failed to send verification email");
            }
            self.abandon(&session.token).await;
            return Err(AppError::EmailNotVerified(VERIFY_FIRST_MSG.to_string()));
        }

        self.route_session(input.portal, &session.token, &session.user).await
    }

    async fn federated_start(&self, input: FederatedStartInput) -> Result<FederatedStartOutput, AppError> {
        input.validate()?;

        let details = self.providers.get(&input.provider)?.authorization_details();

        Ok(FederatedStartOutput {
            auth_url: details.url,
            csrf_state: details.csrf_state,
            pkce_verifier: details.pkce_verifier,
        })
    }

    async fn federated_callback(&self, input: FederatedCallbackInput) -> Result<SignInOutput, AppError> {
        input.validate()?;

        let provider = self.providers.get(&input.provider)?;
        let access_token = provider.exchange_code(input.code, input.pkce_verifier).await?;
        let profile = provider.fetch_profile(&access_token).await?;

        let provider_name = input.provider.to_lowercase();
        let session = self.identity.federated_sign_in(&provider_name, &profile).await?;

        if let Err(err) = self.ensure_federated_profile(input.portal, &session, &profile).await {
            self.abandon(&session.token).await;
            return Err(err);
        }

        tracing::info!(provider = %provider_name, handle = %session.user.handle, "federated sign-in");

        self.route_session(input.portal, &session.token, &session.user).await
    }

    async fn resend_verification(&self, input: ResendVerificationInput) -> Result<MessageOutput, AppError> {
        if input.email_verified {
            return Ok(MessageOutput { message: ALREADY_VERIFIED_MSG.to_string() });
        }

        let continue_url = self.continue_url()?;
        self.identity.send_verification_email(&input.handle, &continue_url).await?;

        Ok(MessageOutput { message: VERIFICATION_RESENT_MSG.to_string() })
    }

    async fn send_password_reset(&self, input: PasswordResetInput) -> Result<MessageOutput, AppError> {
        input.validate()?;

        let reset_url = format!("{}/auth/reset-password", self.config.base_url()?);
        self.identity.send_password_reset(&normalize_email(&input.email), &reset_url).await?;

        Ok(MessageOutput { message: PASSWORD_RESET_MSG.to_string() })
    }

    async fn reset_password(&self, input: ResetPasswordInput) -> Result<MessageOutput, AppError> {
        input.validate()?;

        self.identity.confirm_password_reset(input.code.trim(), &input.password).await?;

        Ok(MessageOutput { message: PASSWORD_CHANGED_MSG.to_string() })
    }

    async fn verify_email(&self, input: VerifyEmailInput) -> Result<VerifyEmailOutput, AppError> {
        input.validate()?;

        self.identity.confirm_email(input.code.trim()).await?;

        Ok(VerifyEmailOutput { redirect: format!("{}/auth/login?verified=true", self.config.base_url()?) })
    }

    async fn sign_out(&self, input: SignOutInput) -> Result<(), AppError> {
        self.identity.sign_out(&input.token).await?;
        tracing::info!("session ended");
        Ok(())
    }

    async fn resolve_route(&self, input: ResolveRouteInput) -> Result<RouteOutput, AppError> {
        let user = IdentityUser {
            handle: input.handle,
            email: input.email,
            display_name: None,
            email_verified: input.email_verified,
        };

        self.route_session(input.portal, &input.token, &user)
            .await
            .map(|output| RouteOutput { route: output.route })
    }
}

#[cfg(test)]
mod tests {
    use app_core::oauth::{AuthorizationDetails, MockFederatedProvider};
    use app_core::password::Argon2Hasher;

    use super::*;
    use crate::domain::entity::document::Document;
    use crate::outbound::identity::{LocalIdentity, MockIdentityService};
    use crate::outbound::records::{MemoryRecordStore, MockRecordStore};

    const BASE: &str = "https://portal.example.com";

    fn config() -> Arc<Config> {
        Arc::new(Config::builder_test().with("app.base_url", BASE).build())
    }

    fn data(value: Value) -> Map<String, Value> {
        let Value::Object(map) = value else { unreachable!() };
        map
    }

    struct Harness {
        gate: GateService,
        identity: Arc<LocalIdentity>,
        records: MemoryRecordStore,
    }

    fn harness() -> Harness {
        let identity = Arc::new(LocalIdentity::new(Arc::new(Argon2Hasher::default()), BASE));
        let records = MemoryRecordStore::new();
        let gate = GateService::new(config(), identity.clone(), Arc::new(records.clone()), FederatedProviders::new());
        Harness { gate, identity, records }
    }

    fn sign_up(portal: Portal, email: &str) -> SignUpInput {
        SignUpInput {
            portal,
            first_name: "ana".into(),
            last_name: "cruz".into(),
            email: email.into(),
            password: "secret1".into(),
            link_existing: false,
        }
    }

    fn sign_in(portal: Portal, email: &str) -> SignInInput {
        SignInInput { portal, email: email.into(), password: "secret1".into() }
    }

    async fn verify(h: &Harness, handle: &str) {
        let code = h.identity.issued_verification_code(handle).await.unwrap();
        h.gate.verify_email(VerifyEmailInput { code }).await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_up_writes_profile_and_sends_verification() {
        let h = harness();

        let output = h.gate.sign_up(sign_up(Portal::Patient, " Pat@Example.com ")).await.unwrap();

        assert_eq!(output.message, ACCOUNT_CREATED_MSG);
        let doc = h.records.get("patients", &output.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("email"), Some("pat@example.com"));
        assert_eq!(doc.str_field("firstName"), Some("Ana"));
        assert_eq!(doc.str_field("status"), Some("Pending"));
        assert!(h.identity.issued_verification_code(&output.handle).await.is_some());
    }

    #[tokio::test]
    async fn test_sign_up_rejects_staff_and_duplicates() {
        let h = harness();

        let staff = h.gate.sign_up(sign_up(Portal::Staff, "s@example.com")).await;
        assert!(matches!(staff, Err(AppError::Forbidden(_))));

        h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();
        let again = h.gate.sign_up(sign_up(Portal::Doctor, "DOC@example.com")).await;
        assert!(matches!(again, Err(AppError::Conflict(m)) if m == EMAIL_EXISTS_MSG));

        let short = h.gate.sign_up(SignUpInput { password: "123".into(), ..sign_up(Portal::Doctor, "x@example.com") }).await;
        assert!(matches!(short, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unverified_sign_in_resends_and_signs_out() {
        let h = harness();
        h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();

        let result = h.gate.sign_in(sign_in(Portal::Doctor, "doc@example.com")).await;

        let Err(err) = result else { panic!("expected failure") };
        assert!(err.forces_sign_out());
        assert!(matches!(err, AppError::EmailNotVerified(m) if m == VERIFY_FIRST_MSG));
    }

    #[tokio::test]
    async fn test_verified_doctor_lands_on_onboarding() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();
        verify(&h, &up.handle).await;

        let output = h.gate.sign_in(sign_in(Portal::Doctor, "doc@example.com")).await.unwrap();

        assert_eq!(output.route, Route::DoctorOnboarding);
        assert_eq!(output.handle, up.handle);
        assert!(h.identity.current_session(&output.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_verified_patient_is_promoted() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Patient, "pat@example.com")).await.unwrap();
        verify(&h, &up.handle).await;

        let output = h.gate.sign_in(sign_in(Portal::Patient, "pat@example.com")).await.unwrap();

        assert_eq!(output.route, Route::PatientDashboard);
        let doc = h.records.get("patients", &up.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Active"));
    }

    #[tokio::test]
    async fn test_wrong_portal_is_not_found_and_signs_out() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Patient, "pat@example.com")).await.unwrap();
        verify(&h, &up.handle).await;

        let result = h.gate.sign_in(sign_in(Portal::Doctor, "pat@example.com")).await;

        assert!(matches!(result, Err(AppError::AccountNotFound(m)) if m.contains("doctor")));
    }

    #[tokio::test]
    async fn test_unknown_patient_status_is_never_promoted() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Patient, "pat@example.com")).await.unwrap();
        verify(&h, &up.handle).await;
        h.records.update("patients", &up.handle, data(json!({"status": "Deactivated"}))).await.unwrap();

        let result = h.gate.sign_in(sign_in(Portal::Patient, "pat@example.com")).await;

        assert!(matches!(result, Err(AppError::EmailNotVerified(_))));
        let doc = h.records.get("patients", &up.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Deactivated"));

        h.records.set("patients", &up.handle, data(json!({"email": "pat@example.com"}))).await.unwrap();
        let result = h.gate.sign_in(sign_in(Portal::Patient, "pat@example.com")).await;
        assert!(result.is_err());
        let doc = h.records.get("patients", &up.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), None);
    }

    #[tokio::test]
    async fn test_suspended_patient_is_denied_and_signed_out() {
        let records = MemoryRecordStore::new();
        records
            .set("patients", "uid-1", data(json!({"email": "pat@example.com", "status": "Suspended"})))
            .await
            .unwrap();
        let mut identity = MockIdentityService::new();
        identity.expect_authenticate().times(1).returning(|email, _| {
            Ok(Session {
                token: "tok-1".into(),
                user: IdentityUser {
                    handle: "uid-1".into(),
                    email: email.to_string(),
                    display_name: None,
                    email_verified: true,
                },
            })
        });
        identity.expect_sign_out().times(1).returning(|_| Ok(()));
        let gate = GateService::new(config(), Arc::new(identity), Arc::new(records.clone()), FederatedProviders::new());

        let result = gate.sign_in(sign_in(Portal::Patient, "pat@example.com")).await;

        assert!(matches!(result, Err(AppError::AccountBlocked(m)) if m.contains("suspended")));
        let doc = records.get("patients", "uid-1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Suspended"));
    }

    #[tokio::test]
    async fn test_patient_profile_on_existing_identity_needs_confirmation() {
        let h = harness();
        let doctor = h.gate.sign_up(sign_up(Portal::Doctor, "ana@example.com")).await.unwrap();
        verify(&h, &doctor.handle).await;

        let unconfirmed = h.gate.sign_up(sign_up(Portal::Patient, "ana@example.com")).await;
        assert!(matches!(unconfirmed, Err(AppError::Conflict(m)) if m == LINK_EXISTING_MSG));
        assert!(h.records.find("patients", "email", "ana@example.com").await.unwrap().is_empty());

        let wrong_password = h
            .gate
            .sign_up(SignUpInput {
                password: "not-it".into(),
                link_existing: true,
                ..sign_up(Portal::Patient, "ana@example.com")
            })
            .await;
        assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));

        let linked = h
            .gate
            .sign_up(SignUpInput { link_existing: true, ..sign_up(Portal::Patient, "ana@example.com") })
            .await
            .unwrap();

        assert_eq!(linked.handle, doctor.handle);
        assert_eq!(linked.message, PATIENT_LINKED_MSG);
        let doc = h.records.get("patients", &doctor.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Active"));
        let output = h.gate.sign_in(sign_in(Portal::Patient, "ana@example.com")).await.unwrap();
        assert_eq!(output.route, Route::PatientDashboard);
        let output = h.gate.sign_in(sign_in(Portal::Doctor, "ana@example.com")).await.unwrap();
        assert_eq!(output.route, Route::DoctorOnboarding);
    }

    #[tokio::test]
    async fn test_doctor_sign_up_on_existing_identity_conflicts() {
        let h = harness();
        h.gate.sign_up(sign_up(Portal::Patient, "ana@example.com")).await.unwrap();

        let result = h
            .gate
            .sign_up(SignUpInput { link_existing: true, ..sign_up(Portal::Doctor, "ana@example.com") })
            .await;

        assert!(matches!(result, Err(AppError::Conflict(m)) if m != LINK_EXISTING_MSG));
    }

    #[tokio::test]
    async fn test_denied_route_signs_out_session() {
        let mut identity = MockIdentityService::new();
        identity.expect_sign_out().times(1).returning(|_| Ok(()));
        let mut records = MockRecordStore::new();
        records.expect_get().returning(|_, key| {
            Ok(Some(Document::new(
                key,
                data(json!({"role": "janitor", "isVerified": true})),
                chrono::Utc::now(),
            )))
        });
        let gate = GateService::new(config(), Arc::new(identity), Arc::new(records), FederatedProviders::new());

        let result = gate
            .resolve_route(ResolveRouteInput {
                portal: Portal::Staff,
                token: "t".into(),
                handle: "uid-1".into(),
                email: "s@example.com".into(),
                email_verified: true,
            })
            .await;

        assert!(matches!(result, Err(AppError::AccountBlocked(m)) if m.starts_with("Access denied")));
    }

    #[tokio::test]
    async fn test_record_store_outage_surfaces_and_signs_out() {
        let mut identity = MockIdentityService::new();
        identity.expect_sign_out().times(1).returning(|_| Ok(()));
        let mut records = MockRecordStore::new();
        records.expect_get().returning(|_, _| Err(AppError::Network("record store unreachable".into())));
        let gate = GateService::new(config(), Arc::new(identity), Arc::new(records), FederatedProviders::new());

        let result = gate
            .resolve_route(ResolveRouteInput {
                portal: Portal::Doctor,
                token: "t".into(),
                handle: "uid-1".into(),
                email: "doc@example.com".into(),
                email_verified: true,
            })
            .await;

        let Err(err) = result else { panic!("expected failure") };
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_password_reset_and_verify_redirect() {
        let h = harness();

        let reset = h.gate.send_password_reset(PasswordResetInput { email: "nobody@example.com".into() }).await.unwrap();
        assert_eq!(reset.message, PASSWORD_RESET_MSG);

        let up = h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();
        let code = h.identity.issued_verification_code(&up.handle).await.unwrap();
        let verified = h.gate.verify_email(VerifyEmailInput { code: code.clone() }).await.unwrap();
        assert_eq!(verified.redirect, format!("{BASE}/auth/login?verified=true"));

        let reused = h.gate.verify_email(VerifyEmailInput { code }).await;
        assert!(reused.is_err());
    }

    #[tokio::test]
    async fn test_reset_password_with_emailed_code() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();
        verify(&h, &up.handle).await;
        h.gate.send_password_reset(PasswordResetInput { email: "Doc@Example.com".into() }).await.unwrap();
        let code = h.identity.issued_reset_code(&up.handle).await.unwrap();

        let short = h.gate.reset_password(ResetPasswordInput { code: code.clone(), password: "abc".into() }).await;
        assert!(matches!(short, Err(AppError::Validation(_))));

        let done = h.gate.reset_password(ResetPasswordInput { code, password: "fresh42".into() }).await.unwrap();
        assert_eq!(done.message, PASSWORD_CHANGED_MSG);

        let old = h.gate.sign_in(sign_in(Portal::Doctor, "doc@example.com")).await;
        assert!(matches!(old, Err(AppError::InvalidCredentials)));
        let new = h
            .gate
            .sign_in(SignInInput { password: "fresh42".into(), ..sign_in(Portal::Doctor, "doc@example.com") })
            .await
            .unwrap();
        assert_eq!(new.route, Route::DoctorOnboarding);
    }

    #[tokio::test]
    async fn test_resend_verification() {
        let h = harness();
        let up = h.gate.sign_up(sign_up(Portal::Doctor, "doc@example.com")).await.unwrap();

        let done = h
            .gate
            .resend_verification(ResendVerificationInput { handle: up.handle.clone(), email_verified: true })
            .await
            .unwrap();
        assert_eq!(done.message, ALREADY_VERIFIED_MSG);

        let sent = h
            .gate
            .resend_verification(ResendVerificationInput { handle: up.handle, email_verified: false })
            .await
            .unwrap();
        assert_eq!(sent.message, VERIFICATION_RESENT_MSG);
    }

    fn google() -> FederatedProviders {
        let mut provider = MockFederatedProvider::new();
        provider.expect_authorization_details().returning(|| AuthorizationDetails {
            url: "https://accounts.google.com/o/oauth2/v2/auth?state=s".into(),
            csrf_state: "s".into(),
            pkce_verifier: "v".into(),
        });
        provider.expect_exchange_code().returning(|code, _| Ok(format!("token-{code}")));
        provider.expect_fetch_profile().returning(|_| {
            Ok(FederatedProfile {
                subject: "g-1".into(),
                email: "ana@example.com".into(),
                display_name: Some("Ana Maria Cruz".into()),
                avatar_url: None,
            })
        });
        let mut providers = FederatedProviders::new();
        providers.register("google", Arc::new(provider));
        providers
    }

    #[tokio::test]
    async fn test_federated_flow_creates_profile() {
        let identity = Arc::new(LocalIdentity::new(Arc::new(Argon2Hasher::default()), BASE));
        let records = MemoryRecordStore::new();
        let gate = GateService::new(config(), identity, Arc::new(records.clone()), google());

        let start = gate
            .federated_start(FederatedStartInput { portal: Portal::Patient, provider: "Google".into() })
            .await
            .unwrap();
        assert_eq!(start.csrf_state, "s");

        let output = gate
            .federated_callback(FederatedCallbackInput {
                portal: Portal::Patient,
                provider: "google".into(),
                code: "abc".into(),
                pkce_verifier: start.pkce_verifier,
            })
            .await
            .unwrap();

        assert_eq!(output.route, Route::PatientDashboard);
        let doc = records.get("patients", &output.handle).await.unwrap().unwrap();
        assert_eq!(doc.str_field("firstName"), Some("Ana Maria"));
        assert_eq!(doc.str_field("lastName"), Some("Cruz"));
        assert_eq!(doc.str_field("status"), Some("Active"));
    }

    #[tokio::test]
    async fn test_federated_staff_is_never_created() {
        let identity = Arc::new(LocalIdentity::new(Arc::new(Argon2Hasher::default()), BASE));
        let records = MemoryRecordStore::new();
        let gate = GateService::new(config(), identity, Arc::new(records.clone()), google());

        let result = gate
            .federated_callback(FederatedCallbackInput {
                portal: Portal::Staff,
                provider: "google".into(),
                code: "abc".into(),
                pkce_verifier: "v".into(),
            })
            .await;

        assert!(matches!(result, Err(AppError::AccountNotFound(_))));
        assert!(records.find("staff", "email", "ana@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let h = harness();

        let result = h.gate.federated_start(FederatedStartInput { portal: Portal::Doctor, provider: "github".into() }).await;

        assert!(matches!(result, Err(AppError::OAuth(_))));
    }
}
