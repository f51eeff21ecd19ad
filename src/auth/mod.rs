// Authentication module
// Manages the market token lifecycle: registration, storage and refresh

mod client;
mod manager;
mod scheduler;
mod store;
mod types;

pub use client::AuthorityClient;
pub use manager::AuthManager;
pub use scheduler::{
    CycleReport, RefreshHandle, RefreshOutcome, RefreshScheduler, VerifyOutcome,
    DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_THRESHOLD_SECS,
};
pub use store::{CredentialStore, TOKEN_FILE};
pub use types::{TokenPair, TokenResponse};
