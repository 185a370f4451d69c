//! Infrastructure layer: storage adapters and token crypto.

pub mod jwt;
pub mod memory;
pub mod postgres;

pub use jwt::Hs256Codec;
pub use memory::{InMemoryPermissionStore, InMemoryPrincipalStore, InMemoryTokenRepository};
pub use postgres::PgTokenRepository;
