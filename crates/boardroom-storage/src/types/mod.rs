//! Type definitions for boardroom storage.

mod ids;
mod memberships;
mod roles;
mod scopes;

pub use ids::*;
pub use memberships::*;
pub use roles::*;
pub use scopes::*;
