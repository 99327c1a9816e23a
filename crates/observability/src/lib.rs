//! Tracing setup shared by every binary and test suite that hosts processes.

/// Initialize process-wide tracing (JSON, `RUST_LOG` filtered).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Install a human-readable subscriber that writes through the test harness.
///
/// Idempotent, so every test can call it.
pub fn init_for_tests() {
    tracing::init_for_tests();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_level_setup_tolerates_repeat_calls() {
        super::init();
        super::init_for_tests();
        super::init();
    }
}
