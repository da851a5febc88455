//! Process-wide logging setup shared by the binaries.

/// Tracing subscriber configuration (filters, JSON output).
pub mod tracing;

/// Initialize structured logging.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init();
}
