//! Signup, login, identity refresh and password reset.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use terra_auth::{
    PasswordError, Principal, PrincipalProfile, ResetState, ResetToken, Signup, TokenCodec, check_password,
    hash_password, hash_reset_token, reset_token_ttl, verify_against_dummy, verify_password,
};

use super::{Actor, ServiceError};
use crate::mailer::{Mailer, OutgoingMail};
use crate::store::CredentialStore;

/// The only response forgot-password ever gives.
pub const FORGOT_PASSWORD_ACK: &str = "If the email exists, a reset link was sent.";

/// Token plus the caller's projection, returned by signup and login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: PrincipalProfile,
}

#[derive(Clone)]
pub struct CredentialService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenCodec>,
    mailer: Arc<dyn Mailer>,
    app_url: String,
}

impl CredentialService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenCodec>,
        mailer: Arc<dyn Mailer>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            tokens,
            mailer,
            app_url: app_url.into(),
        }
    }

    #[instrument(skip_all, fields(username = %signup.username), err)]
    pub async fn signup(&self, signup: Signup) -> Result<AuthSession, ServiceError> {
        let signup = signup.validated()?;
        let password_hash = hash_blocking(signup.password.clone()).await?;

        let principal = Principal::register(&signup, password_hash, Utc::now());
        self.credentials.insert(principal.clone()).await?;

        tracing::info!(principal_id = %principal.id, "principal registered");
        self.session_for(&principal)
    }

    /// Unknown username and wrong password are indistinguishable, in both
    /// message and verification cost.
    #[instrument(skip(self, password), err)]
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSession, ServiceError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::Validation("username and password are required".to_string()));
        }

        let Some(principal) = self.credentials.find_by_username(username).await? else {
            let password = password.to_string();
            let _ = tokio::task::spawn_blocking(move || verify_against_dummy(&password)).await;
            return Err(ServiceError::InvalidCredentials);
        };

        verify_blocking(password.to_string(), principal.password_hash.clone()).await?;
        self.session_for(&principal)
    }

    /// Verify a bearer token and return the identity it carries.
    pub fn authenticate(&self, token: &str) -> Result<Actor, ServiceError> {
        let claims = self.tokens.validate(token, Utc::now()).map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            ServiceError::Unauthenticated
        })?;
        Ok(Actor::from(claims))
    }

    pub async fn me(&self, actor: &Actor) -> Result<PrincipalProfile, ServiceError> {
        self.credentials
            .get(actor.id)
            .await?
            .map(|p| p.profile())
            .ok_or(ServiceError::Unauthenticated)
    }

    /// Always succeeds for a well-formed email, registered or not.
    ///
    /// Store and mailer failures past the lookup are logged, never surfaced.
    #[instrument(skip_all, err)]
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ServiceError::Validation("email: is required".to_string()));
        }

        let principal = match self.credentials.find_by_email(&email).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::debug!("password reset requested for unknown email");
                return Ok(());
            }
            Err(err) => {
                tracing::error!(error = %err, "password reset lookup failed");
                return Ok(());
            }
        };

        let token = ResetToken::generate();
        let reset = ResetState {
            token_hash: token.hash.clone(),
            expires_at: Utc::now() + reset_token_ttl(),
        };
        if let Err(err) = self.credentials.set_reset_token(principal.id, reset).await {
            tracing::error!(principal_id = %principal.id, error = %err, "failed to store reset token");
            return Ok(());
        }

        let link = format!("{}/reset-password?token={}", self.app_url, token.plaintext);
        let mail = OutgoingMail {
            to: principal.email.clone(),
            subject: "Reset your password".to_string(),
            html: format!(r#"<p>Click to reset password:</p><p><a href="{link}">{link}</a></p>"#),
        };
        if let Err(err) = self.mailer.send(mail).await {
            tracing::warn!(principal_id = %principal.id, error = %err, "reset mail not delivered");
        }

        Ok(())
    }

    #[instrument(skip_all, err)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        let token = token.trim();
        if token.is_empty() || new_password.is_empty() {
            return Err(ServiceError::Validation("token and newPassword are required".to_string()));
        }
        check_password(new_password)?;

        let token_hash = hash_reset_token(token);

        // Skip the hashing cost for tokens that cannot succeed.
        if self.credentials.find_by_reset_token(&token_hash, Utc::now()).await?.is_none() {
            return Err(ServiceError::InvalidResetToken);
        }

        let new_hash = hash_blocking(new_password.to_string()).await?;
        let consumed = self
            .credentials
            .consume_reset_token(&token_hash, Utc::now(), new_hash)
            .await?;

        match consumed {
            Some(principal_id) => {
                tracing::info!(%principal_id, "password reset");
                Ok(())
            }
            None => Err(ServiceError::InvalidResetToken),
        }
    }

    fn session_for(&self, principal: &Principal) -> Result<AuthSession, ServiceError> {
        let token = self
            .tokens
            .issue(principal.id, &principal.username, principal.role, Utc::now())?;
        Ok(AuthSession {
            token,
            user: principal.profile(),
        })
    }
}

async fn hash_blocking(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("hashing task failed: {e}")))?
        .map_err(ServiceError::from)
}

async fn verify_blocking(password: String, password_hash: String) -> Result<(), ServiceError> {
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| ServiceError::Internal(format!("verification task failed: {e}")))?;

    match verified {
        Ok(()) => Ok(()),
        Err(PasswordError::Mismatch) => Err(ServiceError::InvalidCredentials),
        Err(err) => {
            tracing::error!(error = %err, "stored password hash unusable");
            Err(ServiceError::from(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::InMemoryMailer;
    use crate::services::testing::signup;
    use crate::store::InMemoryCredentialStore;
    use chrono::Duration;
    use terra_auth::{Hs256TokenCodec, PermissionMatrix, Role};

    struct Fixture {
        store: Arc<InMemoryCredentialStore>,
        mailer: Arc<InMemoryMailer>,
        service: CredentialService,
    }

    fn fixture_with(mailer: InMemoryMailer) -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mailer = Arc::new(mailer);
        let tokens = Arc::new(Hs256TokenCodec::new(b"test-secret", Duration::hours(1)));
        let service = CredentialService::new(store.clone(), tokens, mailer.clone(), "http://app.test");
        Fixture { store, mailer, service }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryMailer::new())
    }

    fn token_from(mail: &OutgoingMail) -> String {
        let marker = "token=";
        let start = mail.html.find(marker).unwrap() + marker.len();
        mail.html[start..].chars().take_while(|c| c.is_ascii_hexdigit()).collect()
    }

    #[tokio::test]
    async fn signup_creates_standard_principal_and_session() {
        let f = fixture();
        let session = f.service.signup(signup("dana")).await.unwrap();

        assert_eq!(session.user.role, Role::User);
        assert_eq!(session.user.permissions, PermissionMatrix::default());

        let actor = f.service.authenticate(&session.token).unwrap();
        assert_eq!(actor.id, session.user.id);
        assert_eq!(actor.role, Role::User);

        let stored = f.store.get(actor.id).await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
        assert_ne!(stored.password_hash, "password-123");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let f = fixture();
        f.service.signup(signup("dana")).await.unwrap();
        let err = f.service.signup(signup("dana")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_errors_do_not_reveal_which_part_was_wrong() {
        let f = fixture();
        f.service.signup(signup("dana")).await.unwrap();

        let wrong_password = f.service.login("dana", "not-the-password").await.unwrap_err();
        let unknown_user = f.service.login("nobody", "password-123").await.unwrap_err();
        assert_eq!(wrong_password, ServiceError::InvalidCredentials);
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());

        let session = f.service.login(" dana ", "password-123").await.unwrap();
        assert_eq!(session.user.username, "dana");
    }

    #[tokio::test]
    async fn me_reads_the_store_not_the_token() {
        let f = fixture();
        let session = f.service.signup(signup("dana")).await.unwrap();
        let actor = f.service.authenticate(&session.token).unwrap();

        let patch = terra_auth::PermissionPatch::from_grants([(terra_auth::Resource::Cities, terra_auth::Action::Delete)]);
        f.store.merge_permissions(actor.id, &patch, Utc::now()).await.unwrap();

        let me = f.service.me(&actor).await.unwrap();
        assert!(me.permissions.allows(terra_auth::Resource::Cities, terra_auth::Action::Delete));
    }

    #[tokio::test]
    async fn garbage_token_is_unauthenticated() {
        let f = fixture();
        assert_eq!(f.service.authenticate("not.a.jwt"), Err(ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn forgot_password_is_silent_about_unknown_emails() {
        let f = fixture();
        f.service.signup(signup("dana")).await.unwrap();

        assert_eq!(f.service.forgot_password("ghost@example.com").await, Ok(()));
        assert!(f.mailer.sent().is_empty());

        assert_eq!(f.service.forgot_password(" DANA@example.com ").await, Ok(()));
        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dana@example.com");
        assert!(sent[0].html.contains("http://app.test/reset-password?token="));
    }

    #[tokio::test]
    async fn mailer_failure_does_not_change_the_outcome() {
        let f = fixture_with(InMemoryMailer::failing());
        f.service.signup(signup("dana")).await.unwrap();
        assert_eq!(f.service.forgot_password("dana@example.com").await, Ok(()));
    }

    #[tokio::test]
    async fn reset_token_works_exactly_once() {
        let f = fixture();
        f.service.signup(signup("dana")).await.unwrap();
        f.service.forgot_password("dana@example.com").await.unwrap();
        let token = token_from(&f.mailer.sent()[0]);
        assert_eq!(token.len(), 64);

        // Only the digest is stored.
        let stored = f.store.find_by_username("dana").await.unwrap().unwrap();
        let reset = stored.reset.unwrap();
        assert_ne!(reset.token_hash, token);
        assert_eq!(reset.token_hash, hash_reset_token(&token));

        f.service.reset_password(&token, "brand-new-pass").await.unwrap();
        assert_eq!(
            f.service.reset_password(&token, "another-pass-1").await,
            Err(ServiceError::InvalidResetToken)
        );

        assert!(f.service.login("dana", "password-123").await.is_err());
        assert!(f.service.login("dana", "brand-new-pass").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resets_consume_the_token_once() {
        let f = fixture();
        f.service.signup(signup("dana")).await.unwrap();
        f.service.forgot_password("dana@example.com").await.unwrap();
        let token = token_from(&f.mailer.sent()[0]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = f.service.clone();
                let token = token.clone();
                let password = format!("concurrent-pass-{i}");
                tokio::spawn(async move {
                    let outcome = service.reset_password(&token, &password).await;
                    (password, outcome)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for h in handles {
            match h.await.unwrap() {
                (password, Ok(())) => winners.push(password),
                (_, Err(ServiceError::InvalidResetToken)) => {}
                (_, Err(other)) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners.len(), 1);

        assert!(f.service.login("dana", &winners[0]).await.is_ok());
        assert!(f.store.find_by_username("dana").await.unwrap().unwrap().reset.is_none());
    }

    #[tokio::test]
    async fn reset_rejects_short_password_and_unknown_token() {
        let f = fixture();
        assert!(matches!(
            f.service.reset_password("abc", "short").await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(
            f.service.reset_password("abc", "long-enough-pass").await,
            Err(ServiceError::InvalidResetToken)
        );
    }

    #[tokio::test]
    async fn expired_reset_token_is_refused() {
        let f = fixture();
        let session = f.service.signup(signup("dana")).await.unwrap();
        let token = ResetToken::generate();
        f.store
            .set_reset_token(
                session.user.id,
                ResetState {
                    token_hash: token.hash.clone(),
                    expires_at: Utc::now() - Duration::seconds(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            f.service.reset_password(&token.plaintext, "long-enough-pass").await,
            Err(ServiceError::InvalidResetToken)
        );
    }
}
