use crate::gap::{DutyCycle, EXT_ADV_DATA_MAX, HCI_ERR_CONN_ACCEPT_TIMEOUT, LEGACY_ADV_DATA_MAX};
use std::time::Duration;

/// Default pause between a link going away and advertising again
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before a released set is re-armed
    pub settle_delay: Duration,
    /// Duty cycle used until a user command selects another one
    pub default_duty: DutyCycle,
    /// Maximum number of advertising sets the registry will create
    pub max_advertising_sets: usize,
    /// Maximum number of local identities, including the default one
    pub max_identities: usize,
    /// Name appended to payloads of sets created with `use_name`
    pub device_name: String,
    /// Reason code sent with a user-requested disconnect
    pub disconnect_reason: u8,
    /// Use the extended advertising payload limit
    pub extended_advertising: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            default_duty: DutyCycle::Low,
            max_advertising_sets: 4,
            max_identities: 2,
            device_name: String::new(),
            disconnect_reason: HCI_ERR_CONN_ACCEPT_TIMEOUT,
            extended_advertising: false,
        }
    }
}

impl SessionConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_default_duty(mut self, duty: DutyCycle) -> Self {
        self.default_duty = duty;
        self
    }

    pub fn with_max_advertising_sets(mut self, max: usize) -> Self {
        self.max_advertising_sets = max;
        self
    }

    pub fn with_max_identities(mut self, max: usize) -> Self {
        self.max_identities = max;
        self
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_disconnect_reason(mut self, reason: u8) -> Self {
        self.disconnect_reason = reason;
        self
    }

    pub fn with_extended_advertising(mut self, enabled: bool) -> Self {
        self.extended_advertising = enabled;
        self
    }

    /// Advertising payload limit in bytes
    pub fn payload_limit(&self) -> usize {
        if self.extended_advertising {
            EXT_ADV_DATA_MAX
        } else {
            LEGACY_ADV_DATA_MAX
        }
    }
}
