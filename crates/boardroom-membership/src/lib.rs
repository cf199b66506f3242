//! Membership and authorization consistency engine.
//!
//! Grants and revokes actor access to workspaces, projects and teams, enforces the
//! `owner > admin > member` hierarchy, and keeps memberships consistent across nested
//! scopes. All state lives in a [`boardroom_storage::MembershipStore`]; the engine itself
//! is stateless and cheap to clone.

pub mod cascade;
pub mod config;
mod context;
mod engine;
mod error;
pub mod policy;
pub mod transfer;
pub mod validator;

pub use cascade::RemovalReport;
pub use config::{ConfigError, EngineConfig, TransferMode};
pub use context::ActorContext;
pub use engine::MembershipEngine;
pub use error::{EngineError, ErrorKind};
pub use transfer::OwnershipTransfer;
