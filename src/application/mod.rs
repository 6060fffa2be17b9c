//! Relay pipeline: request composition, response interpretation and page rewriting.

pub mod error;
pub mod redirect;
pub mod relay;
pub mod rewrite;
pub mod upstream;
