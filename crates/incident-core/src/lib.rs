//! incident-core: domain types, configuration, errors and boundary
//! normalization for the incident board.
//!
//! This crate holds everything the board and its transports share: the
//! incident and remediation model, the normalized `BoardError` taxonomy,
//! `BoardConfig`, and the single parsing step that turns loosely shaped wire
//! payloads into canonical types.

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use error::BoardError;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "incident-core"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_label_is_stable() {
        assert_eq!(crate_label(), "incident-core");
    }
}
