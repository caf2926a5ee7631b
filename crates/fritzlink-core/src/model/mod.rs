// Domain model: normalized devices and accessory identity.

mod accessory;
mod ain;
mod device;

pub use accessory::{AccessoryKey, AccessoryKind};
pub use ain::Ain;
pub use device::{
    AlertState, BatteryState, ButtonState, DeviceRecord, FunctionBitmask, HumidityReading,
    PowerReading, ScheduledChange, SwitchMode, SwitchState, TemperatureReading, ThermostatState,
};
