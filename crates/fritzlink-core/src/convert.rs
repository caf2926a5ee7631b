// Wire-to-domain conversions.
//
// Maps fritzlink-aha raw devices onto normalized records. Conversion
// never fails: unparseable readings become `None` and a missing
// batterylow flag errs on the side of "low" so a dying battery is not
// reported as healthy.

use chrono::{DateTime, Utc};

use fritzlink_aha::devicelist::{RawButton, RawDevice, RawHkr, RawNextChange, RawSwitch};
use fritzlink_aha::units::{self, HkrTarget};

use crate::model::{
    Ain, BatteryState, ButtonState, DeviceRecord, FunctionBitmask, HumidityReading, PowerReading,
    ScheduledChange, SwitchMode, SwitchState, TemperatureReading, ThermostatState,
};

/// Normalize one wire device.
pub fn device_record(raw: &RawDevice) -> DeviceRecord {
    DeviceRecord {
        ain: Ain::new(raw.identifier.clone()),
        internal_id: raw.id.clone(),
        name: raw.name.as_deref().unwrap_or_default().trim().to_owned(),
        present: raw.present.as_deref().map(str::trim) == Some("1"),
        manufacturer: raw.manufacturer.clone(),
        product: raw.productname.clone(),
        firmware: raw.fwversion.clone(),
        capabilities: capabilities(raw.functionbitmask.as_deref()),
        switch: raw.switch.as_ref().map(switch_state),
        power: raw.powermeter.as_ref().map(|m| PowerReading {
            power_watts: m.power.as_deref().and_then(units::watts_from_milliwatts),
            energy_kwh: m
                .energy
                .as_deref()
                .and_then(units::kilowatt_hours_from_watt_hours),
            voltage_volts: m.voltage.as_deref().and_then(units::volts_from_millivolts),
        }),
        temperature: raw.temperature.as_ref().map(|t| TemperatureReading {
            celsius: t.celsius.as_deref().and_then(units::celsius_from_deci),
            offset_celsius: t.offset.as_deref().and_then(units::celsius_from_deci),
        }),
        thermostat: raw.hkr.as_ref().map(thermostat_state),
        alert: raw.alert.as_ref().map(|a| crate::model::AlertState {
            triggered: a.state.as_deref().and_then(units::flag),
        }),
        buttons: raw.buttons.iter().map(button_state).collect(),
        humidity: raw.humidity.as_ref().map(|h| HumidityReading {
            percent: h.rel_humidity.as_deref().and_then(parse_u8),
        }),
        battery: battery_state(raw),
    }
}

fn capabilities(raw: Option<&str>) -> FunctionBitmask {
    raw.and_then(|mask| mask.trim().parse().ok())
        .map(FunctionBitmask)
        .unwrap_or_default()
}

fn switch_state(raw: &RawSwitch) -> SwitchState {
    SwitchState {
        on: raw.state.as_deref().and_then(units::flag),
        mode: raw.mode.as_deref().and_then(SwitchMode::parse),
        locked: raw.lock.as_deref().and_then(units::flag),
        device_locked: raw.devicelock.as_deref().and_then(units::flag),
    }
}

fn thermostat_state(raw: &RawHkr) -> ThermostatState {
    ThermostatState {
        // tist carries the sentinels too on some firmware; a sentinel
        // is not a temperature.
        current_celsius: raw
            .tist
            .as_deref()
            .and_then(HkrTarget::parse)
            .and_then(HkrTarget::as_celsius),
        target: raw.tsoll.as_deref().and_then(HkrTarget::parse),
        comfort_celsius: raw.komfort.as_deref().and_then(units::celsius_from_half),
        economy_celsius: raw.absenk.as_deref().and_then(units::celsius_from_half),
        window_open: raw.windowopenactiv.as_deref().and_then(units::flag),
        battery_low: raw.batterylow.as_deref().map(conservative_low),
        battery_percent: raw.battery.as_deref().and_then(parse_u8),
        error_code: raw.errorcode.as_deref().and_then(|v| v.trim().parse().ok()),
        next_change: raw.nextchange.as_ref().and_then(scheduled_change),
    }
}

fn scheduled_change(raw: &RawNextChange) -> Option<ScheduledChange> {
    let at = raw.endperiod.as_deref().and_then(parse_timestamp)?;
    let target = raw.tchange.as_deref().and_then(HkrTarget::parse)?;
    Some(ScheduledChange { at, target })
}

fn button_state(raw: &RawButton) -> ButtonState {
    ButtonState {
        identifier: raw.identifier.clone(),
        name: raw.name.clone(),
        last_pressed: raw.lastpressedtimestamp.as_deref().and_then(parse_timestamp),
    }
}

fn battery_state(raw: &RawDevice) -> Option<BatteryState> {
    let percent = raw
        .battery
        .as_deref()
        .or_else(|| raw.hkr.as_ref().and_then(|h| h.battery.as_deref()));
    let low = raw
        .batterylow
        .as_deref()
        .or_else(|| raw.hkr.as_ref().and_then(|h| h.batterylow.as_deref()));
    if percent.is_none() && low.is_none() {
        return None;
    }
    Some(BatteryState {
        percent: percent.and_then(parse_u8),
        low: low.map(conservative_low),
    })
}

/// An unreadable batterylow flag counts as low.
fn conservative_low(raw: &str) -> bool {
    units::flag(raw).unwrap_or(true)
}

fn parse_u8(raw: &str) -> Option<u8> {
    raw.trim().parse().ok()
}

/// Epoch seconds; zero means "never" on this wire.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

// ── Tests ───────────────────────────────────────────────────────────
