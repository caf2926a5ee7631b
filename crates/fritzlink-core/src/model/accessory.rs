// Accessory identity.
//
// One physical device can surface several accessories (an outlet with
// a built-in sensor, a multi-button wall switch), so accessory identity
// is the AIN plus the kind plus a sub-index for repeated kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Ain;

/// What kind of accessory a capability payload maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryKind {
    Outlet,
    Thermostat,
    TemperatureSensor,
    AlarmSensor,
    Button,
}

impl AccessoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessoryKind::Outlet => "outlet",
            AccessoryKind::Thermostat => "thermostat",
            AccessoryKind::TemperatureSensor => "temperature_sensor",
            AccessoryKind::AlarmSensor => "alarm_sensor",
            AccessoryKind::Button => "button",
        }
    }

    /// Kinds that already report a current temperature on the host.
    /// A device tracked under one of these does not get a separate
    /// temperature-sensor accessory on top.
    pub fn covers_temperature(self) -> bool {
        matches!(self, AccessoryKind::Outlet | AccessoryKind::Thermostat)
    }
}

impl fmt::Display for AccessoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of one accessory across reconciliation cycles.
///
/// `index` is zero except for kinds that repeat on a single actor
/// (buttons), where it is the position within the wire document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AccessoryKey {
    pub ain: Ain,
    pub kind: AccessoryKind,
    pub index: u16,
}

impl AccessoryKey {
    pub fn new(ain: Ain, kind: AccessoryKind) -> Self {
        Self {
            ain,
            kind,
            index: 0,
        }
    }

    pub fn indexed(ain: Ain, kind: AccessoryKind, index: u16) -> Self {
        Self { ain, kind, index }
    }
}

impl fmt::Display for AccessoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}/{}", self.ain, self.kind)
        } else {
            write!(f, "{}/{}#{}", self.ain, self.kind, self.index)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
