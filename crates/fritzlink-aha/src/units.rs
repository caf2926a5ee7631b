// Numeric wire conventions of the AHA interface.
//
// The gateway reports everything as scaled integers: temperatures in
// tenths or halves of a degree, power in milliwatts, energy in watt
// hours, voltage in millivolts. Decoders take the raw text content of an
// XML element (or a plain-text command body) and return `None` for
// empty or unparseable values, letting callers drop the reading.

use serde::Serialize;

/// Raw thermostat value meaning "permanently off".
pub const HKR_RAW_OFF: i64 = 253;
/// Raw thermostat value meaning "on at maximum".
pub const HKR_RAW_ON: i64 = 254;

/// Lowest raw target accepted by `sethkrtsoll` (8.0 degrees C).
pub const HKR_RAW_MIN: i64 = 16;
/// Highest raw target accepted by `sethkrtsoll` (28.0 degrees C).
pub const HKR_RAW_MAX: i64 = 56;

/// A thermostat target in wire terms: a half-degree setpoint or one of
/// the two sentinel states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HkrTarget {
    Celsius(f64),
    On,
    Off,
}

impl HkrTarget {
    /// Decode a raw half-degree value, honoring the sentinels.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            HKR_RAW_OFF => HkrTarget::Off,
            HKR_RAW_ON => HkrTarget::On,
            other => HkrTarget::Celsius(other as f64 / 2.0),
        }
    }

    /// Decode the text content of a `tsoll`-style element.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self::from_raw)
    }

    /// Encode for the `param` argument of `sethkrtsoll`.
    ///
    /// Setpoints are rounded to the nearest half degree and clamped to
    /// the range the gateway accepts (8.0 to 28.0 degrees C).
    pub fn to_raw(self) -> i64 {
        match self {
            HkrTarget::Off => HKR_RAW_OFF,
            HkrTarget::On => HKR_RAW_ON,
            #[allow(clippy::cast_possible_truncation)]
            HkrTarget::Celsius(c) => ((c * 2.0).round() as i64).clamp(HKR_RAW_MIN, HKR_RAW_MAX),
        }
    }

    /// The setpoint in degrees C, if this is not a sentinel state.
    pub fn as_celsius(self) -> Option<f64> {
        match self {
            HkrTarget::Celsius(c) => Some(c),
            HkrTarget::On | HkrTarget::Off => None,
        }
    }
}

/// Tenths of a degree C (`<celsius>`, `<offset>`, `gettemperature`).
pub fn celsius_from_deci(raw: &str) -> Option<f64> {
    parse_i64(raw).map(|v| v as f64 / 10.0)
}

/// Half degrees C without sentinel handling (`komfort`, `absenk`).
pub fn celsius_from_half(raw: &str) -> Option<f64> {
    parse_i64(raw).map(|v| v as f64 / 2.0)
}

/// Milliwatts to watts (`<power>`, `getswitchpower`).
pub fn watts_from_milliwatts(raw: &str) -> Option<f64> {
    parse_i64(raw).map(|v| v as f64 / 1000.0)
}

/// Watt hours to kilowatt hours (`<energy>`, `getswitchenergy`).
pub fn kilowatt_hours_from_watt_hours(raw: &str) -> Option<f64> {
    parse_i64(raw).map(|v| v as f64 / 1000.0)
}

/// Millivolts to volts (`<voltage>`).
pub fn volts_from_millivolts(raw: &str) -> Option<f64> {
    parse_i64(raw).map(|v| v as f64 / 1000.0)
}

/// The "0"/"1" convention used by state, lock, and alert elements.
pub fn flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_i64(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

// ── Tests ───────────────────────────────────────────────────────────
