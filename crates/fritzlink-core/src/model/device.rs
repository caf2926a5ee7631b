// Normalized actor records.
//
// Everything here is in SI terms: degrees C, watts, kilowatt hours,
// volts. Raw wire scalings live in fritzlink-aha; the convert module
// maps between the two. Readings a device could not take are `None`
// rather than zero so consumers can tell "off" from "unknown".

use chrono::{DateTime, Utc};
use serde::Serialize;

use fritzlink_aha::HkrTarget;

use super::Ain;

/// A normalized device from the gateway inventory.
///
/// Capability payloads are present exactly when the corresponding
/// element appeared on the wire; the bitmask is advisory only (firmware
/// omits bits for features it clearly serves in the same document).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub ain: Ain,
    /// Gateway-internal numeric id, when reported.
    pub internal_id: Option<String>,
    pub name: String,
    /// False covers both "not present" and an absent element.
    pub present: bool,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub firmware: Option<String>,
    pub capabilities: FunctionBitmask,
    pub switch: Option<SwitchState>,
    pub power: Option<PowerReading>,
    pub temperature: Option<TemperatureReading>,
    pub thermostat: Option<ThermostatState>,
    pub alert: Option<AlertState>,
    pub buttons: Vec<ButtonState>,
    pub humidity: Option<HumidityReading>,
    pub battery: Option<BatteryState>,
}

impl DeviceRecord {
    /// Non-empty display name, falling back to the AIN.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.ain.as_str()
        } else {
            &self.name
        }
    }
}

/// Switchable outlet state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchState {
    pub on: Option<bool>,
    pub mode: Option<SwitchMode>,
    /// UI lock (gateway web interface).
    pub locked: Option<bool>,
    /// Hardware button lock on the device itself.
    pub device_locked: Option<bool>,
}

/// Outlet switching mode as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchMode {
    /// Timer or calendar controlled ("auto").
    Auto,
    /// Manually switched ("manuell").
    Manual,
}

impl SwitchMode {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "auto" => Some(SwitchMode::Auto),
            "manuell" | "manual" => Some(SwitchMode::Manual),
            _ => None,
        }
    }
}

/// Power meter readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerReading {
    pub power_watts: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub voltage_volts: Option<f64>,
}

/// Temperature sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub celsius: Option<f64>,
    /// Configured correction already contained in `celsius`.
    pub offset_celsius: Option<f64>,
}

/// Radiator thermostat (HKR) state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermostatState {
    pub current_celsius: Option<f64>,
    pub target: Option<HkrTarget>,
    pub comfort_celsius: Option<f64>,
    pub economy_celsius: Option<f64>,
    pub window_open: Option<bool>,
    pub battery_low: Option<bool>,
    pub battery_percent: Option<u8>,
    pub error_code: Option<u32>,
    pub next_change: Option<ScheduledChange>,
}

/// The next schedule switchover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledChange {
    pub at: DateTime<Utc>,
    pub target: HkrTarget,
}

/// Alarm sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertState {
    /// None while the sensor has not delivered a state yet.
    pub triggered: Option<bool>,
}

/// One push button on a multi-button actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonState {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub last_pressed: Option<DateTime<Utc>>,
}

/// Relative humidity reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HumidityReading {
    pub percent: Option<u8>,
}

/// Battery level, from the HKR block or the top-level elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryState {
    pub percent: Option<u8>,
    pub low: Option<bool>,
}

/// The `functionbitmask` attribute, kept for diagnostics.
///
/// Element presence, not this mask, decides which accessories a device
/// yields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FunctionBitmask(pub u32);

impl FunctionBitmask {
    pub const ALARM_SENSOR: u32 = 1 << 4;
    pub const BUTTON: u32 = 1 << 5;
    pub const THERMOSTAT: u32 = 1 << 6;
    pub const POWER_METER: u32 = 1 << 7;
    pub const TEMPERATURE_SENSOR: u32 = 1 << 8;
    pub const OUTLET: u32 = 1 << 9;
    pub const DECT_REPEATER: u32 = 1 << 10;
    pub const HUMIDITY_SENSOR: u32 = 1 << 20;

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn advertises_outlet(self) -> bool {
        self.has(Self::OUTLET)
    }

    pub fn advertises_thermostat(self) -> bool {
        self.has(Self::THERMOSTAT)
    }

    pub fn advertises_temperature(self) -> bool {
        self.has(Self::TEMPERATURE_SENSOR)
    }

    pub fn advertises_alarm(self) -> bool {
        self.has(Self::ALARM_SENSOR)
    }

    pub fn advertises_button(self) -> bool {
        self.has(Self::BUTTON)
    }
}

impl std::fmt::Display for FunctionBitmask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_decodes_known_bits() {
        // 896 = outlet | power meter | temperature sensor.
        let mask = FunctionBitmask(896);
        assert!(mask.advertises_outlet());
        assert!(mask.advertises_temperature());
        assert!(mask.has(FunctionBitmask::POWER_METER));
        assert!(!mask.advertises_thermostat());
        assert!(!mask.advertises_button());
    }

    #[test]
    fn switch_mode_accepts_the_german_wire_value() {
        assert_eq!(SwitchMode::parse("manuell"), Some(SwitchMode::Manual));
        assert_eq!(SwitchMode::parse("auto"), Some(SwitchMode::Auto));
        assert_eq!(SwitchMode::parse("simulated"), None);
    }

    #[test]
    fn display_name_falls_back_to_the_ain() {
        let record = DeviceRecord {
            ain: Ain::new("11959 0154321"),
            internal_id: None,
            name: String::new(),
            present: true,
            manufacturer: None,
            product: None,
            firmware: None,
            capabilities: FunctionBitmask::default(),
            switch: None,
            power: None,
            temperature: None,
            thermostat: None,
            alert: None,
            buttons: Vec::new(),
            humidity: None,
            battery: None,
        };
        assert_eq!(record.display_name(), "11959 0154321");
    }
}
