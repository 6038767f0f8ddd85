//! Built-in subtask test suites.
//!
//! Each suite module exposes `register(&TestRegistry)`. [`register_all`] is
//! the bootstrap called before any lookup, both by the harness process and
//! by anything running tests in-process.

pub mod selfcheck;

use crate::registry::TestRegistry;

/// Register every built-in suite.
pub fn register_all(registry: &TestRegistry) {
    selfcheck::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_populates_selfcheck() {
        let registry = TestRegistry::new();
        register_all(&registry);
        assert!(registry.tickets().contains(&selfcheck::TICKET_ID.to_string()));
    }
}
