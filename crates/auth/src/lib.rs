//! `intake-auth` — authorization decisions for the delivery workflow.
//!
//! This crate is intentionally decoupled from HTTP, tokens and storage: callers
//! resolve the acting principal however they like and ask `authorize` whether
//! it may perform an action on a tree owned by some store.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use permissions::Action;
pub use principal::Principal;
pub use roles::Role;
