//! Infrastructure layer: stores, mailer, config, and the application services
//! built on top of them.

pub mod config;
pub mod mailer;
pub mod services;
pub mod store;

pub use config::{AppConfig, BootstrapAdmin, ConfigError, Persistence};
pub use mailer::{InMemoryMailer, LogMailer, MailError, Mailer, OutgoingMail};
pub use services::{
    Actor, AuthSession, CredentialService, PendingRequest, PermissionGuard, PermissionRequestService, ServiceError,
    UserAdminService,
};
pub use store::{
    CredentialStore, InMemoryCredentialStore, InMemoryPermissionRequestStore, PermissionRequestStore,
    PostgresCredentialStore, PostgresPermissionRequestStore, StoreError,
};
