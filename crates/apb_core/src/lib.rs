//! APB Core - Backend logic for the archival photo batch pipeline
//!
//! This crate contains all business logic with zero UI dependencies:
//! batch registry, per-batch configuration, spreadsheet mapping, metadata
//! embedding, image processing and the step orchestrator. It is used by
//! the `apb` command line tool.

pub mod config;
pub mod embed;
pub mod imaging;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod storage;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
