//! Commands module
//!
//! Operations exposed over HTTP. Each one is transport-agnostic; the
//! `server` module only maps them to routes and status codes.

pub mod check;
pub mod hash;

pub use check::*;
pub use hash::*;
