//! Output drivers (dry-run console, Linux sysfs GPIO)
//!
//! The scheduler only ever talks to an [`OutputDriver`]: it asserts or clears
//! a numbered output directly, there is no per-pin dispatch table.

use crate::error::DriverError;

/// Driver trait - every output backend implements this
///
/// Note: All methods take &self to support `Arc<dyn OutputDriver>`.
/// Calls are expected to be fast and idempotent for repeated identical calls,
/// since the scheduler makes them while holding its table lock.
pub trait OutputDriver: Send + Sync {
    /// Get the driver name (e.g., "console", "sysfs")
    fn name(&self) -> &str;

    /// Drive the output HIGH
    fn assert(&self, index: u8) -> Result<(), DriverError>;

    /// Drive the output LOW
    fn clear(&self, index: u8) -> Result<(), DriverError>;

    /// Release every line the driver claimed (called once at shutdown)
    fn release_all(&self) -> Result<(), DriverError>;
}

pub mod console;
pub mod sysfs;

pub use console::ConsoleDriver;
pub use sysfs::SysfsGpioDriver;
