//! A type-checking kernel for a small dependently typed language with a
//! non-cumulative universe hierarchy, dependent functions and pairs, and
//! hierarchical namespaces.

pub mod church;
pub mod config;
pub mod kernel;
pub mod logging;
pub mod scope;
pub mod session;
pub mod unit;
