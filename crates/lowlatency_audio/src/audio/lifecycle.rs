//! Idle teardown of the shared output device
//!
//! A single background thread owns one cancel-and-reschedule deadline. Every
//! request pushes it one grace period out, so the device is released once a
//! full grace period passes without a request.
//!
//! Lock order is always device, then timer state. The worker holds the device
//! lock while it re-checks the deadline, so a teardown can never interleave
//! with a request that holds the device.

use crate::audio::backend::AudioBackend;
use crate::audio::AudioError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Output device shared between the engine and the lifecycle monitor
pub type SharedDevice<B> = Arc<Mutex<B>>;

/// Lock the shared device, mapping poisoning to [`AudioError::DevicePoisoned`]
pub fn lock_device<B>(device: &Mutex<B>) -> Result<MutexGuard<'_, B>, AudioError> {
    device.lock().map_err(|_| AudioError::DevicePoisoned)
}

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct MonitorShared {
    timer: Mutex<TimerState>,
    wake: Condvar,
    teardowns: AtomicUsize,
}

impl MonitorShared {
    fn lock_timer(&self) -> Option<MutexGuard<'_, TimerState>> {
        self.timer.lock().ok()
    }
}

/// Background thread that releases the device after an idle grace period
#[derive(Debug)]
pub struct DeviceLifecycleMonitor {
    shared: Arc<MonitorShared>,
    delay: Duration,
    worker: Option<JoinHandle<()>>,
}

impl DeviceLifecycleMonitor {
    /// Start the monitor thread for `device` with a fixed teardown delay
    pub fn spawn<B: AudioBackend + 'static>(
        device: SharedDevice<B>,
        delay: Duration,
    ) -> Result<Self, AudioError> {
        let shared = Arc::new(MonitorShared::default());
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("audio-lifecycle".to_string())
            .spawn(move || run_monitor(&device, &worker_shared))
            .map_err(AudioError::MonitorSpawn)?;

        log::debug!("Device lifecycle monitor started ({} ms delay)", delay.as_millis());
        Ok(Self {
            shared,
            delay,
            worker: Some(worker),
        })
    }

    /// Restart the grace period
    ///
    /// Replaces any pending deadline, whether or not one was armed. Callers
    /// hold the device lock.
    pub fn arm(&self) {
        let Some(mut timer) = self.shared.lock_timer() else {
            log::warn!("Lifecycle timer lock is poisoned, idle teardown disabled");
            return;
        };
        timer.deadline = Some(Instant::now() + self.delay);
        drop(timer);
        self.shared.wake.notify_all();
    }

    /// Check whether a teardown deadline is pending
    pub fn is_armed(&self) -> bool {
        self.shared
            .lock_timer()
            .is_some_and(|timer| timer.deadline.is_some())
    }

    /// Number of times the monitor has released the device
    pub fn teardown_count(&self) -> usize {
        self.shared.teardowns.load(Ordering::SeqCst)
    }

    /// Stop the monitor thread and wait for it to exit
    ///
    /// Must not be called while holding the device lock: the worker may be
    /// waiting for it.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        if let Some(mut timer) = self.shared.lock_timer() {
            timer.shutdown = true;
        }
        self.shared.wake.notify_all();

        if worker.join().is_err() {
            log::error!("Device lifecycle monitor thread panicked");
        } else {
            log::debug!("Device lifecycle monitor stopped");
        }
    }
}

impl Drop for DeviceLifecycleMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_monitor<B: AudioBackend>(device: &Mutex<B>, shared: &MonitorShared) {
    loop {
        if !wait_for_deadline(shared) {
            return;
        }

        // Device first, then timer, same as the request path
        let Ok(mut backend) = device.lock() else {
            log::error!("Audio device lock is poisoned, lifecycle monitor exiting");
            return;
        };
        let Some(mut timer) = shared.lock_timer() else {
            return;
        };
        if timer.shutdown {
            return;
        }
        // A request may have rearmed while we waited for the device
        match timer.deadline {
            Some(deadline) if Instant::now() >= deadline => timer.deadline = None,
            _ => continue,
        }
        drop(timer);

        if backend.is_device_acquired() {
            backend.release_device();
            shared.teardowns.fetch_add(1, Ordering::SeqCst);
            log::info!("Audio device idle, released");
        }
    }
}

/// Block until the armed deadline passes; false on shutdown
fn wait_for_deadline(shared: &MonitorShared) -> bool {
    let Some(mut timer) = shared.lock_timer() else {
        return false;
    };

    loop {
        if timer.shutdown {
            return false;
        }
        match timer.deadline {
            None => {
                timer = match shared.wake.wait(timer) {
                    Ok(guard) => guard,
                    Err(_) => return false,
                };
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                timer = match shared.wake.wait_timeout(timer, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(_) => return false,
                };
            }
        }
    }
}
