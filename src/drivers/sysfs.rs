//! Linux sysfs GPIO driver
//!
//! Exports each line on first use, sets it as an output and writes `1`/`0`
//! to its `value` file. Lines are unexported again by [`release_all`].
//!
//! Kernels from 6.6 on number the Raspberry Pi header lines from a chip base
//! (512 on most boards), so the BCM index is offset by `base` before use.
//!
//! [`release_all`]: OutputDriver::release_all

use super::OutputDriver;
use crate::error::DriverError;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default sysfs GPIO class directory
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

pub struct SysfsGpioDriver {
    root: PathBuf,
    base: u32,
    exported: Mutex<BTreeSet<u8>>,
}

impl SysfsGpioDriver {
    pub fn new(root: impl Into<PathBuf>, base: u32) -> Self {
        Self {
            root: root.into(),
            base,
            exported: Mutex::new(BTreeSet::new()),
        }
    }

    fn line(&self, index: u8) -> u32 {
        self.base + u32::from(index)
    }

    fn line_dir(&self, index: u8) -> PathBuf {
        self.root.join(format!("gpio{}", self.line(index)))
    }

    fn write_attr(path: &Path, value: &str, index: u8) -> Result<(), DriverError> {
        fs::write(path, value).map_err(|e| DriverError::Io {
            index,
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Export the line and make it an output, once per process
    fn claim(&self, index: u8) -> Result<(), DriverError> {
        let mut exported = self.exported.lock();
        if exported.contains(&index) {
            return Ok(());
        }

        let dir = self.line_dir(index);
        if !dir.exists() {
            Self::write_attr(&self.root.join("export"), &self.line(index).to_string(), index)?;
            debug!("Exported GPIO line {}", self.line(index));
        }
        Self::write_attr(&dir.join("direction"), "out", index)?;

        exported.insert(index);
        Ok(())
    }

    fn set(&self, index: u8, high: bool) -> Result<(), DriverError> {
        self.claim(index)?;
        let value = if high { "1" } else { "0" };
        Self::write_attr(&self.line_dir(index).join("value"), value, index)
    }
}

impl OutputDriver for SysfsGpioDriver {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn assert(&self, index: u8) -> Result<(), DriverError> {
        self.set(index, true)
    }

    fn clear(&self, index: u8) -> Result<(), DriverError> {
        self.set(index, false)
    }

    fn release_all(&self) -> Result<(), DriverError> {
        let lines: Vec<u8> = std::mem::take(&mut *self.exported.lock())
            .into_iter()
            .collect();
        let mut failed = Vec::new();

        for index in &lines {
            let line = self.line(*index).to_string();
            if let Err(e) = fs::write(self.root.join("unexport"), &line) {
                warn!("Failed to unexport GPIO line {}: {}", line, e);
                failed.push(line);
            }
        }

        info!("Released {} GPIO line(s)", lines.len() - failed.len());
        if failed.is_empty() {
            Ok(())
        } else {
            Err(DriverError::Release(format!(
                "could not unexport lines {}",
                failed.join(", ")
            )))
        }
    }
}
