//! The trusted type-checking kernel.
//!
//! Terms use de Bruijn indices and are checked against an append-only
//! [`env::Environment`]. Nothing here knows about namespaces, sections or
//! persisted units; those live in the session layer.

pub mod def_eq;
pub mod env;
pub mod error;
pub mod expr;
pub mod level;
pub mod local_ctx;
pub mod name;
pub mod tc;
pub mod whnf;
