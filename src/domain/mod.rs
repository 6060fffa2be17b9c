//! Domain types: the export session, the inbound request and relay outcomes.

pub mod error;
pub mod inbound;
pub mod render;
pub mod session;
