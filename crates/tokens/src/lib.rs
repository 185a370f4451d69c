//! `sentra-tokens` — refresh-token issuance, rotation and reuse detection.
//!
//! The ledger is the one part of the engine with mutable, concurrency-
//! sensitive state. All mutation funnels through the repository's
//! conditional write, so the single-writer guarantee per token holds even
//! behind multiple service instances.

pub mod config;
pub mod ledger;
pub mod repository;
pub mod sweep;
pub mod token;

pub use config::{LedgerConfig, TokenReuseAction};
pub use ledger::{LedgerError, RefreshTokenLedger, Validation};
pub use repository::{RepositoryError, TokenRepository};
pub use sweep::{InactivitySweep, SweepHandle};
pub use token::{RefreshToken, TokenState, generate_token_value};
