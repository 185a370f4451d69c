//! `sentra-auth` — authorization resolution engine (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: principal and
//! permission data arrive through the store contracts in [`stores`], and the
//! decision surface is a plain value (`Allow`/`Deny`), never an error.

pub mod claims;
pub mod evaluator;
pub mod permission;
pub mod policy;
pub mod registry;
pub mod requirement;
pub mod resolver;
pub mod stores;

pub use claims::{JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use evaluator::{AuthorizationEvaluator, Decision, Subject};
pub use permission::{ModuleName, Permission, PermissionName};
pub use policy::{PolicyError, PolicySet, compile_policies};
pub use registry::{PermissionRegistry, RegistryError, builtin};
pub use requirement::{Requirement, RequirementError};
pub use resolver::{PermissionResolver, ResolverConfig};
pub use stores::{PermissionStore, PrincipalStore, StoreError};
