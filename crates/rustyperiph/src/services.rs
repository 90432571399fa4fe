//! Periodic GATT notifications
//!
//! Simulated heart-rate and battery values pushed to the GATT layer from a
//! background thread. This runs beside the session dispatcher and never
//! touches session state.

use crate::gap::{UUID_BAS, UUID_HRS};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Heart Rate Measurement flags: sensor contact supported and detected
const HRM_FLAGS_SENSOR_CONTACT: u8 = 0x06;

const HEART_RATE_MIN: u8 = 90;
const HEART_RATE_LIMIT: u8 = 160;
const BATTERY_FULL: u8 = 100;

/// GATT collaborator receiving notification values
pub trait GattNotifier: Send {
    /// Notify subscribers of `service_id` with `value`
    fn notify(&mut self, service_id: u16, value: &[u8]);
}

/// A source of periodic notification values
pub trait ServiceSimulator: Send {
    /// 16-bit UUID of the service the values belong to
    fn service_id(&self) -> u16;

    /// Advance the simulation and encode the new value
    fn next_value(&mut self) -> Vec<u8>;
}

/// Heart rate cycling through 90..=159 bpm
#[derive(Debug, Clone)]
pub struct HeartRateSimulator {
    bpm: u8,
}

impl Default for HeartRateSimulator {
    fn default() -> Self {
        Self {
            bpm: HEART_RATE_MIN,
        }
    }
}

impl HeartRateSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bpm(&self) -> u8 {
        self.bpm
    }

    pub fn tick(&mut self) -> u8 {
        self.bpm += 1;
        if self.bpm == HEART_RATE_LIMIT {
            self.bpm = HEART_RATE_MIN;
        }
        self.bpm
    }
}

impl ServiceSimulator for HeartRateSimulator {
    fn service_id(&self) -> u16 {
        UUID_HRS
    }

    fn next_value(&mut self) -> Vec<u8> {
        vec![HRM_FLAGS_SENSOR_CONTACT, self.tick()]
    }
}

/// Battery level draining by one percent per tick, recharged when empty
#[derive(Debug, Clone)]
pub struct BatterySimulator {
    level: u8,
}

impl Default for BatterySimulator {
    fn default() -> Self {
        Self {
            level: BATTERY_FULL,
        }
    }
}

impl BatterySimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn tick(&mut self) -> u8 {
        self.level = self.level.saturating_sub(1);
        if self.level == 0 {
            self.level = BATTERY_FULL;
        }
        self.level
    }
}

impl ServiceSimulator for BatterySimulator {
    fn service_id(&self) -> u16 {
        UUID_BAS
    }

    fn next_value(&mut self) -> Vec<u8> {
        vec![self.tick()]
    }
}

/// Background thread notifying every simulator once per period
///
/// The thread stops on [`stop`](Self::stop) or when the notifier is dropped.
pub struct PeriodicNotifier {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicNotifier {
    pub fn spawn<N>(
        period: Duration,
        mut notifier: N,
        mut simulators: Vec<Box<dyn ServiceSimulator>>,
    ) -> Self
    where
        N: GattNotifier + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::spawn(move || loop {
            match stopped.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    for simulator in simulators.iter_mut() {
                        let value = simulator.next_value();
                        log::trace!(
                            "Notify 0x{:04x}: {}",
                            simulator.service_id(),
                            hex::encode(&value)
                        );
                        notifier.notify(simulator.service_id(), &value);
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The thread may already be gone
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Notification thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PeriodicNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}
