use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::disk::DiskLocation;

/// How a background maintenance task paces itself.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceConfig {
    /// Delay between passes.
    pub interval: Duration,
    /// Age past which `.tmp` files are considered abandoned.
    pub tmp_max_age: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            tmp_max_age: Duration::from_secs(3600),
        }
    }
}

/// Background maintenance for a disk location: periodic crash-recovery
/// sweep plus eviction to the size budget.
///
/// The worker stops when the handle is dropped. A writer never evicts
/// synchronously; this task is the only thing reclaiming space.
pub struct Maintenance {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Maintenance {
    /// Run one immediate pass, then keep a background worker going.
    pub fn spawn(location: Arc<DiskLocation>, config: MaintenanceConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            run_pass(&location, &config);
            while !sleep_interruptible(&worker_stop, config.interval) {
                run_pass(&location, &config);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the worker and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_pass(location: &DiskLocation, config: &MaintenanceConfig) {
    match location.sweep(config.tmp_max_age) {
        Ok(stats) => debug!(?stats, "maintenance sweep"),
        Err(err) => warn!(error = %err, "maintenance sweep failed"),
    }
    match location.evict_to_budget() {
        Ok(stats) if stats.evicted > 0 => {
            debug!(
                evicted = stats.evicted,
                reclaimed = stats.reclaimed,
                "maintenance eviction"
            );
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "maintenance eviction failed"),
    }
}

/// Sleep in small slices so a stop request is honored promptly.
/// Returns `true` when stopping.
fn sleep_interruptible(stop: &AtomicBool, total: Duration) -> bool {
    let slice = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
    stop.load(Ordering::SeqCst)
}
