//! Service wiring: stores, token codec, mailer and the application services.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use terra_auth::{Hs256TokenCodec, TokenCodec};
use terra_infra::{
    AppConfig, CredentialService, CredentialStore, InMemoryCredentialStore, InMemoryPermissionRequestStore,
    LogMailer, Mailer, PermissionGuard, PermissionRequestService, PermissionRequestStore, Persistence,
    PostgresCredentialStore, PostgresPermissionRequestStore, ServiceError, StoreError, UserAdminService,
    services::seed_admin, store::apply_schema,
};

use crate::throttle::{LoginThrottle, ThrottleConfig};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare schema: {0}")]
    Schema(#[from] StoreError),

    #[error("failed to seed administrator: {0}")]
    Seed(#[from] ServiceError),
}

#[derive(Clone)]
pub struct AppServices {
    pub tokens: Arc<dyn TokenCodec>,
    pub guard: PermissionGuard,
    pub credentials: CredentialService,
    pub requests: PermissionRequestService,
    pub users: UserAdminService,
    pub login_throttle: Arc<LoginThrottle>,
}

impl AppServices {
    /// Wire services over the given stores.
    pub fn new(
        config: &AppConfig,
        credential_store: Arc<dyn CredentialStore>,
        request_store: Arc<dyn PermissionRequestStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tokens: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(
            config.jwt_secret.as_bytes(),
            chrono::Duration::seconds(config.jwt_expires_in_secs),
        ));

        Self {
            tokens: tokens.clone(),
            guard: PermissionGuard::new(credential_store.clone()),
            credentials: CredentialService::new(credential_store.clone(), tokens, mailer, config.app_url.clone()),
            requests: PermissionRequestService::new(request_store, credential_store.clone()),
            users: UserAdminService::new(credential_store),
            login_throttle: Arc::new(LoginThrottle::new(ThrottleConfig {
                max_attempts: config.login_rate_limit_max,
                window: Duration::from_secs(config.login_rate_limit_window_secs),
            })),
        }
    }

    /// Fresh in-memory stores (dev/tests).
    pub fn in_memory(config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryPermissionRequestStore::new()),
            mailer,
        )
    }
}

/// Build services from configuration: pick stores, prepare schema, seed the
/// bootstrap administrator.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

    let (credential_store, request_store): (Arc<dyn CredentialStore>, Arc<dyn PermissionRequestStore>) =
        match &config.persistence {
            Persistence::InMemory => {
                tracing::info!("using in-memory stores");
                (
                    Arc::new(InMemoryCredentialStore::new()),
                    Arc::new(InMemoryPermissionRequestStore::new()),
                )
            }
            Persistence::Postgres { database_url } => {
                tracing::info!("using postgres stores");
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(database_url)
                    .await?;
                apply_schema(&pool).await?;
                (
                    Arc::new(PostgresCredentialStore::new(pool.clone())),
                    Arc::new(PostgresPermissionRequestStore::new(pool)),
                )
            }
        };

    if let Some(admin) = &config.bootstrap_admin {
        seed_admin(credential_store.as_ref(), admin).await?;
    }

    Ok(AppServices::new(config, credential_store, request_store, mailer))
}
