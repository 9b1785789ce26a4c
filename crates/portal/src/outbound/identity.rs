//! Contract for the identity provider plus a local, in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;

use app_core::error::AppError;
use app_core::oauth::FederatedProfile;
use app_core::password::Hasher;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

const EMAIL_TAKEN_MSG: &str = "An account with this email already exists.";
const INVALID_LINK_MSG: &str = "This verification link is invalid or has already been used.";
const INVALID_RESET_MSG: &str = "This password reset link is invalid or has already been used.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: IdentityUser,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<Session, AppError>;

    /// Fails with [`AppError::InvalidCredentials`] for an unknown email or a
    /// wrong password alike.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AppError>;

    /// The live user behind `token`, or `None` when the session is gone.
    async fn current_session(&self, token: &str) -> Result<Option<IdentityUser>, AppError>;

    async fn send_verification_email(&self, handle: &str, continue_url: &str) -> Result<(), AppError>;

    /// Applies the one-time code from a verification link.
    async fn confirm_email(&self, code: &str) -> Result<(), AppError>;

    /// Issues a reset code for a known email, linked from `reset_url`.
    /// Unknown emails succeed without effect.
    async fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<(), AppError>;

    /// Applies a reset code and ends every session of its owner.
    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<(), AppError>;

    async fn sign_out(&self, token: &str) -> Result<(), AppError>;

    async fn federated_sign_in(&self, provider: &str, profile: &FederatedProfile) -> Result<Session, AppError>;
}

struct LocalUser {
    user: IdentityUser,
    password_hash: Option<String>,
}

#[derive(Default)]
struct Directory {
    users: HashMap<String, LocalUser>,
    handles_by_email: HashMap<String, String>,
    sessions: HashMap<String, String>,
    verification_codes: HashMap<String, String>,
    reset_codes: HashMap<String, String>,
}

impl Directory {
    fn open_session(&mut self, handle: &str) -> Result<Session, AppError> {
        let user = self.users.get(handle).ok_or(AppError::Internal)?.user.clone();
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), handle.to_string());
        Ok(Session { token, user })
    }
}

/// Identity provider backed by process memory. Emails are not delivered; the
/// links they would carry are written to the log.
pub struct LocalIdentity {
    hasher: Arc<dyn Hasher>,
    link_base: String,
    directory: RwLock<Directory>,
}

impl LocalIdentity {
    /// `link_base` is the public origin of this API, used in emailed links.
    pub fn new(hasher: Arc<dyn Hasher>, link_base: impl Into<String>) -> Self {
        let link_base: String = link_base.into();
        Self {
            hasher,
            link_base: link_base.trim_end_matches('/').to_string(),
            directory: RwLock::new(Directory::default()),
        }
    }

    #[cfg(test)]
    pub(crate) async fn issued_verification_code(&self, handle: &str) -> Option<String> {
        let directory = self.directory.read().await;
        directory
            .verification_codes
            .iter()
            .find(|(_, owner)| owner.as_str() == handle)
            .map(|(code, _)| code.clone())
    }

    #[cfg(test)]
    pub(crate) async fn issued_reset_code(&self, handle: &str) -> Option<String> {
        let directory = self.directory.read().await;
        directory
            .reset_codes
            .iter()
            .find(|(_, owner)| owner.as_str() == handle)
            .map(|(code, _)| code.clone())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<Session, AppError> {
        let email = normalize_email(email);
        let password_hash = self.hasher.hash(password)?;

        let mut directory = self.directory.write().await;
        if directory.handles_by_email.contains_key(&email) {
            return Err(AppError::Conflict(EMAIL_TAKEN_MSG.to_string()));
        }

        let handle = Uuid::new_v4().simple().to_string();
        let user = IdentityUser { handle: handle.clone(), email: email.clone(), display_name, email_verified: false };
        directory.handles_by_email.insert(email, handle.clone());
        directory
            .users
            .insert(handle.clone(), LocalUser { user, password_hash: Some(password_hash) });

        tracing::info!(%handle, "identity account created");
        directory.open_session(&handle)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = normalize_email(email);
        let (handle, password_hash) = {
            let directory = self.directory.read().await;
            let handle = directory.handles_by_email.get(&email).ok_or(AppError::InvalidCredentials)?;
            let hash = directory.users.get(handle).and_then(|local| local.password_hash.clone());
            (handle.clone(), hash.ok_or(AppError::InvalidCredentials)?)
        };

        if !self.hasher.verify(password, &password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        self.directory.write().await.open_session(&handle)
    }

    async fn current_session(&self, token: &str) -> Result<Option<IdentityUser>, AppError> {
        let directory = self.directory.read().await;
        Ok(directory
            .sessions
            .get(token)
            .and_then(|handle| directory.users.get(handle))
            .map(|local| local.user.clone()))
    }

    async fn send_verification_email(&self, handle: &str, continue_url: &str) -> Result<(), AppError> {
        let mut directory = self.directory.write().await;
        let email = directory
            .users
            .get(handle)
            .map(|local| local.user.email.clone())
            .ok_or_else(|| AppError::NotFound(format!("identity {handle}")))?;

        let code = Uuid::new_v4().simple().to_string();
        directory.verification_codes.insert(code.clone(), handle.to_string());

        let link = format!("{}/auth/verify-email?code={code}", self.link_base);
        tracing::info!(%email, %link, continue_url, "verification email issued");
        Ok(())
    }

    async fn confirm_email(&self, code: &str) -> Result<(), AppError> {
        let mut directory = self.directory.write().await;
        let handle = directory
            .verification_codes
            .remove(code)
            .ok_or_else(|| AppError::Forbidden(INVALID_LINK_MSG.to_string()))?;
        let local = directory.users.get_mut(&handle).ok_or(AppError::Internal)?;
        local.user.email_verified = true;

        tracing::info!(%handle, "email verified");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let mut directory = self.directory.write().await;
        let Some(handle) = directory.handles_by_email.get(&email).cloned() else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let code = Uuid::new_v4().simple().to_string();
        directory.reset_codes.insert(code.clone(), handle);

        let link = format!("{}?code={code}", reset_url.trim_end_matches('/'));
        tracing::info!(%email, %link, "password reset email issued");
        Ok(())
    }

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<(), AppError> {
        let password_hash = self.hasher.hash(new_password)?;

        let mut directory = self.directory.write().await;
        let handle = directory
            .reset_codes
            .remove(code)
            .ok_or_else(|| AppError::Forbidden(INVALID_RESET_MSG.to_string()))?;
        let local = directory.users.get_mut(&handle).ok_or(AppError::Internal)?;
        local.password_hash = Some(password_hash);
        directory.sessions.retain(|_, owner| *owner != handle);

        tracing::info!(%handle, "password reset");
        Ok(())
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        if let Some(handle) = self.directory.write().await.sessions.remove(token) {
            tracing::info!(%handle, "signed out");
        }
        Ok(())
    }

    async fn federated_sign_in(&self, provider: &str, profile: &FederatedProfile) -> Result<Session, AppError> {
        let email = normalize_email(&profile.email);

        let mut directory = self.directory.write().await;
        let handle = match directory.handles_by_email.get(&email).cloned() {
            Some(handle) => {
                let local = directory.users.get_mut(&handle).ok_or(AppError::Internal)?;
                // The provider vouches for the address.
                local.user.email_verified = true;
                if local.user.display_name.is_none() {
                    local.user.display_name = profile.display_name.clone();
                }
                handle
            },
            None => {
                let handle = Uuid::new_v4().simple().to_string();
                let user = IdentityUser {
                    handle: handle.clone(),
                    email: email.clone(),
                    display_name: profile.display_name.clone(),
                    email_verified: true,
                };
                directory.handles_by_email.insert(email, handle.clone());
                directory
                    .users
                    .insert(handle.clone(), LocalUser { user, password_hash: None });
                tracing::info!(%handle, provider, subject = %profile.subject, "identity account created from federated sign-in");
                handle
            },
        };

        directory.open_session(&handle)
    }
}

#[cfg(test)]
mod tests {
    use app_core::password::Argon2Hasher;

    use super::*;

    fn identity() -> LocalIdentity {
        LocalIdentity::new(Arc::new(Argon2Hasher::new()), "http://localhost:8000/")
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let identity = identity();

        let created = identity.create_account(" Doc@Example.com ", "secret1", None).await.unwrap();
        assert_eq!(created.user.email, "doc@example.com");
        assert!(!created.user.email_verified);

        let session = identity.authenticate("doc@example.com", "secret1").await.unwrap();
        assert_eq!(session.user.handle, created.user.handle);
        assert_ne!(session.token, created.token);

        let current = identity.current_session(&session.token).await.unwrap().unwrap();
        assert_eq!(current.handle, created.user.handle);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let identity = identity();
        identity.create_account("a@example.com", "secret1", None).await.unwrap();

        let result = identity.create_account("A@example.com", "other12", None).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email() {
        let identity = identity();
        identity.create_account("a@example.com", "secret1", None).await.unwrap();

        assert!(matches!(identity.authenticate("a@example.com", "nope").await, Err(AppError::InvalidCredentials)));
        assert!(matches!(identity.authenticate("b@example.com", "secret1").await, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_verification_code_is_single_use() {
        let identity = identity();
        let session = identity.create_account("a@example.com", "secret1", None).await.unwrap();

        identity
            .send_verification_email(&session.user.handle, "http://localhost:3000/auth/login")
            .await
            .unwrap();
        let code = identity.issued_verification_code(&session.user.handle).await.unwrap();

        identity.confirm_email(&code).await.unwrap();
        let user = identity.current_session(&session.token).await.unwrap().unwrap();
        assert!(user.email_verified);

        assert!(matches!(identity.confirm_email(&code).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_sign_out_ends_session() {
        let identity = identity();
        let session = identity.create_account("a@example.com", "secret1", None).await.unwrap();

        identity.sign_out(&session.token).await.unwrap();
        identity.sign_out(&session.token).await.unwrap();

        assert!(identity.current_session(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_password_reset_for_unknown_email_is_silent() {
        let identity = identity();

        assert!(identity.send_password_reset("ghost@example.com", "http://localhost:3000/auth/reset-password").await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_replaces_password_and_ends_sessions() {
        let identity = identity();
        let created = identity.create_account("a@example.com", "secret1", None).await.unwrap();
        identity
            .send_password_reset("A@example.com", "http://localhost:3000/auth/reset-password")
            .await
            .unwrap();
        let code = identity.issued_reset_code(&created.user.handle).await.unwrap();

        identity.confirm_password_reset(&code, "fresh42").await.unwrap();

        assert!(identity.current_session(&created.token).await.unwrap().is_none());
        assert!(matches!(identity.authenticate("a@example.com", "secret1").await, Err(AppError::InvalidCredentials)));
        assert!(identity.authenticate("a@example.com", "fresh42").await.is_ok());
        assert!(matches!(identity.confirm_password_reset(&code, "again42").await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_federated_sign_in_links_existing_account() {
        let identity = identity();
        let created = identity.create_account("ana@example.com", "secret1", None).await.unwrap();
        let profile = FederatedProfile {
            subject: "g-1".into(),
            email: "Ana@Example.com".into(),
            display_name: Some("Ana Cruz".into()),
            avatar_url: None,
        };

        let session = identity.federated_sign_in("google", &profile).await.unwrap();

        assert_eq!(session.user.handle, created.user.handle);
        assert!(session.user.email_verified);
        assert_eq!(session.user.display_name.as_deref(), Some("Ana Cruz"));
        // Password sign-in keeps working for a linked account.
        assert!(identity.authenticate("ana@example.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn test_federated_only_account_has_no_password() {
        let identity = identity();
        let profile =
            FederatedProfile { subject: "g-2".into(), email: "ben@example.com".into(), display_name: None, avatar_url: None };

        let session = identity.federated_sign_in("google", &profile).await.unwrap();

        assert!(session.user.email_verified);
        assert!(matches!(identity.authenticate("ben@example.com", "").await, Err(AppError::InvalidCredentials)));
    }
}
