//! Live activation table and auto-off timers
//!
//! The table of asserted outputs is the only shared mutable state in the
//! engine. Every read and write takes the same lock, for the table access
//! only: deferred deactivations sleep without it and re-acquire it to act.
//!
//! Each activation gets a fresh generation number. A deferred deactivation
//! remembers the generation it was scheduled for and does nothing if the
//! entry has since been stopped or re-activated, so a stale timer can never
//! clear a newer activation of the same output. Superseded timers are also
//! aborted eagerly; the generation check is what guarantees correctness when
//! the abort loses the race with a timer that already woke up.

use crate::config::OutputRange;
use crate::drivers::OutputDriver;
use crate::error::DriverError;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// How long an activation holds its output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hold {
    For(Duration),
    Indefinite,
}

/// Longest timer the scheduler arms; longer holds are shortened to this
pub const MAX_HOLD: Duration = Duration::from_secs(365 * 24 * 3600);

impl Hold {
    /// The hold actually applied: finite holds are shortened to [`MAX_HOLD`]
    pub fn capped(self) -> Hold {
        match self {
            Hold::For(d) => Hold::For(d.min(MAX_HOLD)),
            Hold::Indefinite => Hold::Indefinite,
        }
    }
}

impl Serialize for Hold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Hold::For(d) => serializer.serialize_f64(d.as_secs_f64()),
            Hold::Indefinite => serializer.serialize_str("indefinite"),
        }
    }
}

/// Remaining hold time reported by [`ActivationScheduler::status`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Remaining {
    Seconds(f64),
    Indefinite,
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Seconds(s) => serializer.serialize_f64(*s),
            Remaining::Indefinite => serializer.serialize_str("indefinite"),
        }
    }
}

/// Snapshot of every asserted output
pub type StatusSnapshot = BTreeMap<u8, Remaining>;

/// Receipt for a successful activation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub index: u8,
    pub generation: u64,
    pub hold: Hold,
}

struct ActiveEntry {
    /// None for an indefinite hold
    expiry: Option<Instant>,
    generation: u64,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct Table {
    entries: HashMap<u8, ActiveEntry>,
    next_generation: u64,
}

pub struct ActivationScheduler {
    driver: Arc<dyn OutputDriver>,
    table: Arc<Mutex<Table>>,
    runtime: Handle,
}

impl ActivationScheduler {
    /// Create a scheduler on the current Tokio runtime.
    ///
    /// Nothing survives a restart, so every output in `range` is driven LOW once.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(driver: Arc<dyn OutputDriver>, range: OutputRange) -> Self {
        Self::with_runtime(driver, range, Handle::current())
    }

    pub fn with_runtime(driver: Arc<dyn OutputDriver>, range: OutputRange, runtime: Handle) -> Self {
        let mut failed = 0usize;
        for index in range.indices() {
            if let Err(e) = driver.clear(index) {
                warn!("Failed to drive output {} LOW at startup: {}", index, e);
                failed += 1;
            }
        }
        info!(
            "Scheduler ready on driver '{}' (outputs {}..={} driven LOW, {} failed)",
            driver.name(),
            range.min,
            range.max,
            failed
        );

        Self {
            driver,
            table: Arc::new(Mutex::new(Table::default())),
            runtime,
        }
    }

    /// Assert an output and (re)record its expiry.
    ///
    /// Re-activating an active output is allowed: the hardware write repeats,
    /// the expiry is overwritten and the previous timer becomes stale.
    pub fn activate(&self, index: u8, hold: Hold) -> Result<Activation, DriverError> {
        let hold = hold.capped();
        let mut table = self.table.lock();
        self.driver.assert(index)?;

        table.next_generation += 1;
        let generation = table.next_generation;

        let (expiry, timer) = match hold {
            Hold::For(duration) => {
                let deadline = Instant::now() + duration;
                let timer = self.schedule_deactivation(index, generation, deadline);
                (Some(deadline), Some(timer))
            }
            Hold::Indefinite => (None, None),
        };

        let previous = table.entries.insert(
            index,
            ActiveEntry {
                expiry,
                generation,
                timer,
            },
        );
        if let Some(timer) = previous.and_then(|p| p.timer) {
            timer.abort();
        }

        debug!(index, generation, ?hold, "Output activated");
        Ok(Activation {
            index,
            generation,
            hold,
        })
    }

    /// Clear an output and forget it. Stopping an inactive output is a no-op
    /// success; returns whether it was active.
    ///
    /// If the driver fails, the entry is kept since the line may still be HIGH.
    pub fn stop(&self, index: u8) -> Result<bool, DriverError> {
        let mut table = self.table.lock();
        self.driver.clear(index)?;

        match table.entries.remove(&index) {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                debug!(index, "Output stopped");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clear every active output. Returns the outputs the driver refused to clear;
    /// those stay in the table.
    pub fn stop_all(&self) -> Vec<(u8, DriverError)> {
        let mut table = self.table.lock();
        let indices: Vec<u8> = table.entries.keys().copied().collect();
        let mut failures = Vec::new();

        for index in indices {
            match self.driver.clear(index) {
                Ok(()) => {
                    if let Some(timer) = table.entries.remove(&index).and_then(|e| e.timer) {
                        timer.abort();
                    }
                }
                Err(e) => {
                    warn!("Failed to clear output {}: {}", index, e);
                    failures.push((index, e));
                }
            }
        }

        info!("All outputs stopped ({} still active)", table.entries.len());
        failures
    }

    /// Remaining time per asserted output
    ///
    /// An expired entry whose timer has not fired yet is reported with 0.
    pub fn status(&self) -> StatusSnapshot {
        let table = self.table.lock();
        let now = Instant::now();

        table
            .entries
            .iter()
            .map(|(index, entry)| {
                let remaining = match entry.expiry {
                    Some(expiry) => {
                        Remaining::Seconds(expiry.saturating_duration_since(now).as_secs_f64())
                    }
                    None => Remaining::Indefinite,
                };
                (*index, remaining)
            })
            .collect()
    }

    pub fn is_active(&self, index: u8) -> bool {
        self.table.lock().entries.contains_key(&index)
    }

    /// Stop everything and hand the lines back to the system
    pub fn shutdown(&self) -> Result<(), DriverError> {
        let failures = self.stop_all();
        if !failures.is_empty() {
            warn!("{} output(s) could not be cleared at shutdown", failures.len());
        }
        self.driver.release_all()
    }

    fn schedule_deactivation(&self, index: u8, generation: u64, deadline: Instant) -> AbortHandle {
        let table = Arc::clone(&self.table);
        let driver = Arc::clone(&self.driver);

        self.runtime
            .spawn(async move {
                tokio::time::sleep_until(deadline).await;

                let mut table = table.lock();
                let current = table.entries.get(&index).map(|e| e.generation);
                if current != Some(generation) {
                    trace!(index, generation, ?current, "Stale auto-off ignored");
                    return;
                }

                match driver.clear(index) {
                    Ok(()) => {
                        table.entries.remove(&index);
                        info!("⏱️  Output {} auto-off", index);
                    }
                    Err(e) => {
                        // Leave the entry so status still shows the output as held
                        warn!("Auto-off failed for output {}: {}", index, e);
                        if let Some(entry) = table.entries.get_mut(&index) {
                            entry.timer = None;
                        }
                    }
                }
            })
            .abort_handle()
    }
}

impl Drop for ActivationScheduler {
    fn drop(&mut self) {
        for entry in self.table.lock().entries.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ConsoleDriver;

    fn make_scheduler() -> (Arc<ConsoleDriver>, ActivationScheduler) {
        let driver = Arc::new(ConsoleDriver::new("test"));
        let scheduler = ActivationScheduler::new(driver.clone(), OutputRange::default());
        (driver, scheduler)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn remaining_secs(status: &StatusSnapshot, index: u8) -> Option<f64> {
        match status.get(&index) {
            Some(Remaining::Seconds(s)) => Some(*s),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_drives_every_output_low() {
        let (driver, scheduler) = make_scheduler();

        for index in 2..=27 {
            assert_eq!(driver.clear_count(index), 1, "output {index}");
        }
        assert_eq!(driver.level(1), None);
        assert!(scheduler.status().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finite_activation_expires() {
        let (driver, scheduler) = make_scheduler();

        scheduler.activate(4, Hold::For(secs(0.5))).unwrap();
        assert!(driver.is_high(4));

        let remaining = remaining_secs(&scheduler.status(), 4).unwrap();
        assert!(remaining > 0.0 && remaining <= 0.5);

        tokio::time::sleep(secs(0.6)).await;
        assert!(!scheduler.status().contains_key(&4));
        assert!(!driver.is_high(4));
        assert_eq!(driver.clear_count(4), 2); // startup + auto-off
    }

    #[tokio::test(start_paused = true)]
    async fn test_indefinite_hold_survives() {
        let (driver, scheduler) = make_scheduler();

        scheduler.activate(6, Hold::Indefinite).unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert_eq!(scheduler.status().get(&6), Some(&Remaining::Indefinite));
        assert!(driver.is_high(6));

        assert!(scheduler.stop(6).unwrap());
        assert!(scheduler.status().is_empty());
        assert!(!driver.is_high(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_clear_reactivation() {
        let (driver, scheduler) = make_scheduler();

        scheduler.activate(4, Hold::For(secs(5.0))).unwrap();
        tokio::time::sleep(secs(1.0)).await;
        scheduler.stop(4).unwrap();
        scheduler.activate(4, Hold::For(secs(5.0))).unwrap();

        tokio::time::sleep(secs(4.2)).await; // t = 5.2
        assert!(scheduler.is_active(4));
        assert!(driver.is_high(4));

        tokio::time::sleep(secs(1.0)).await; // t = 6.2
        assert!(!scheduler.is_active(4));
        assert!(!driver.is_high(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivation_overwrites_expiry() {
        let (driver, scheduler) = make_scheduler();

        let first = scheduler.activate(9, Hold::For(secs(1.0))).unwrap();
        tokio::time::sleep(secs(0.5)).await;
        let second = scheduler.activate(9, Hold::For(secs(2.0))).unwrap();
        assert!(second.generation > first.generation);

        tokio::time::sleep(secs(1.0)).await; // first deadline passed
        assert!(driver.is_high(9));
        let remaining = remaining_secs(&scheduler.status(), 9).unwrap();
        assert!(remaining > 0.9 && remaining <= 1.0);

        tokio::time::sleep(secs(1.1)).await;
        assert!(!scheduler.is_active(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_indefinite_reactivation_cancels_timer() {
        let (driver, scheduler) = make_scheduler();

        scheduler.activate(3, Hold::For(secs(1.0))).unwrap();
        scheduler.activate(3, Hold::Indefinite).unwrap();

        tokio::time::sleep(secs(2.0)).await;
        assert_eq!(scheduler.status().get(&3), Some(&Remaining::Indefinite));
        assert!(driver.is_high(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (driver, scheduler) = make_scheduler();

        assert!(!scheduler.stop(8).unwrap());
        assert!(!scheduler.stop(8).unwrap());
        assert!(scheduler.status().is_empty());
        assert!(!driver.is_high(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_clears_everything() {
        let (driver, scheduler) = make_scheduler();

        scheduler.activate(4, Hold::For(secs(10.0))).unwrap();
        scheduler.activate(5, Hold::Indefinite).unwrap();

        assert!(scheduler.stop_all().is_empty());
        assert!(scheduler.status().is_empty());
        assert!(!driver.is_high(4));
        assert!(!driver.is_high(5));

        // Idempotent
        assert!(scheduler.stop_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_hold_is_capped() {
        let (_driver, scheduler) = make_scheduler();

        let activation = scheduler
            .activate(4, Hold::For(MAX_HOLD * 10))
            .unwrap();
        assert_eq!(activation.hold, Hold::For(MAX_HOLD));

        let remaining = remaining_secs(&scheduler.status(), 4).unwrap();
        assert!(remaining <= MAX_HOLD.as_secs_f64());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_assert_records_nothing() {
        let (driver, scheduler) = make_scheduler();
        driver.mark_faulty(12);

        assert!(scheduler.activate(12, Hold::For(secs(1.0))).is_err());
        assert!(!scheduler.is_active(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_driver() {
        let (driver, scheduler) = make_scheduler();
        scheduler.activate(4, Hold::Indefinite).unwrap();

        scheduler.shutdown().unwrap();
        assert!(!driver.is_high(4));
        assert!(driver.is_released());
    }

    #[test]
    fn test_remaining_serialization() {
        let mut status = StatusSnapshot::new();
        status.insert(4, Remaining::Seconds(1.5));
        status.insert(5, Remaining::Indefinite);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"4": 1.5, "5": "indefinite"}));
    }
}
