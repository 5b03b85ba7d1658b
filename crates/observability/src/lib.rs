//! Shared tracing setup for binaries and tests.

/// Initialize process-wide structured logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Human-readable logging captured by the test harness.
pub fn init_for_tests() {
    tracing::init_test_writer();
}

/// Subscriber configuration (filters, formatters).
pub mod tracing;
