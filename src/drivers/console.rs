//! Console driver - logs every output change instead of touching hardware

use super::OutputDriver;
use crate::error::DriverError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Output level as last driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// ConsoleDriver logs all output changes to console/logs
///
/// This is useful for:
/// - Running the gateway on a machine without GPIO
/// - Checking alias and group wiring before connecting loads
/// - Tests, which inspect the recorded levels and history
pub struct ConsoleDriver {
    name: String,
    levels: Mutex<BTreeMap<u8, Level>>,
    history: Mutex<Vec<(u8, Level)>>,
    /// Indices that refuse writes, to exercise fault paths
    faulty: Mutex<BTreeSet<u8>>,
    released: Mutex<bool>,
}

impl ConsoleDriver {
    /// Create a new ConsoleDriver with a given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            levels: Mutex::new(BTreeMap::new()),
            history: Mutex::new(Vec::new()),
            faulty: Mutex::new(BTreeSet::new()),
            released: Mutex::new(false),
        }
    }

    /// Make every subsequent write to `index` fail
    pub fn mark_faulty(&self, index: u8) {
        self.faulty.lock().insert(index);
    }

    /// Last level written to `index` (None if never written)
    pub fn level(&self, index: u8) -> Option<Level> {
        self.levels.lock().get(&index).copied()
    }

    pub fn is_high(&self, index: u8) -> bool {
        self.level(index) == Some(Level::High)
    }

    /// Every write in order
    pub fn history(&self) -> Vec<(u8, Level)> {
        self.history.lock().clone()
    }

    /// Number of LOW writes to `index`
    pub fn clear_count(&self, index: u8) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|(i, l)| *i == index && *l == Level::Low)
            .count()
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    fn write(&self, index: u8, level: Level) -> Result<(), DriverError> {
        if self.faulty.lock().contains(&index) {
            return Err(DriverError::Rejected {
                index,
                reason: "marked faulty".to_string(),
            });
        }

        let previous = self.levels.lock().insert(index, level);
        self.history.lock().push((index, level));

        if previous != Some(level) {
            info!(
                "🔌 [{}] {} output {} -> {:?}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                self.name,
                index,
                level
            );
        } else {
            debug!(driver = %self.name, index, ?level, "ConsoleDriver repeat write");
        }
        Ok(())
    }
}

impl OutputDriver for ConsoleDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn assert(&self, index: u8) -> Result<(), DriverError> {
        self.write(index, Level::High)
    }

    fn clear(&self, index: u8) -> Result<(), DriverError> {
        self.write(index, Level::Low)
    }

    fn release_all(&self) -> Result<(), DriverError> {
        let count = self.history.lock().len();
        info!(
            "🛑 ConsoleDriver '{}' released ({} writes recorded)",
            self.name, count
        );
        *self.released.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_driver_records_levels() {
        let driver = ConsoleDriver::new("test");
        assert_eq!(driver.name(), "test");
        assert_eq!(driver.level(4), None);

        driver.assert(4).unwrap();
        assert!(driver.is_high(4));

        driver.assert(4).unwrap();
        driver.clear(4).unwrap();
        assert_eq!(driver.level(4), Some(Level::Low));
        assert_eq!(
            driver.history(),
            vec![(4, Level::High), (4, Level::High), (4, Level::Low)]
        );
        assert_eq!(driver.clear_count(4), 1);
    }

    #[test]
    fn test_console_driver_faulty_index() {
        let driver = ConsoleDriver::new("faulty");
        driver.mark_faulty(7);

        assert!(matches!(
            driver.assert(7),
            Err(DriverError::Rejected { index: 7, .. })
        ));
        assert_eq!(driver.level(7), None);
        assert!(driver.history().is_empty());

        // Other indices are unaffected
        driver.assert(8).unwrap();
        assert!(driver.is_high(8));
    }

    #[test]
    fn test_console_driver_release() {
        let driver = ConsoleDriver::new("release");
        assert!(!driver.is_released());
        driver.release_all().unwrap();
        assert!(driver.is_released());
    }
}
