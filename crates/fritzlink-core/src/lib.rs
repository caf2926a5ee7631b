//! Reconciliation and polling layer between `fritzlink-aha` and accessory hosts.
//!
//! This crate owns the domain model, the normalization of raw gateway
//! records, and the add/update/remove decisions a host acts on:
//!
//! - **[`Bridge`]** — Central facade managing the full lifecycle:
//!   [`connect()`](Bridge::connect) authenticates, runs an initial
//!   reconciliation cycle, then spawns a background poll task.
//!   [`run_cycle()`](Bridge::run_cycle) drives a single
//!   fetch -> normalize -> reconcile pass by hand.
//!
//! - **[`AccessoryHost`]** — The seam a host implements. It reports which
//!   accessories it currently tracks and receives one [`CycleReport`] per
//!   cycle telling it what to add, refresh, remove, or flag unreachable.
//!
//! - **[`reconcile()`](reconcile::reconcile)** — Pure diff over tracked
//!   accessories and a fetched inventory. Failed fetches degrade to
//!   "unreachable"; removal is reserved for devices confirmed absent.
//!
//! - **[`DeviceStore`]** — Reactive snapshot storage built on
//!   `tokio::sync::watch`. Each poll supersedes the snapshot wholesale;
//!   confirmed mutations are patched in between polls.
//!
//! - **Domain model** ([`model`]) — Normalized records ([`DeviceRecord`])
//!   in SI units, keyed by whitespace-insensitive [`Ain`], plus the
//!   [`AccessoryKey`] identity accessories are tracked under.

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{
    AccessoryHost, AccessoryMetadata, Bridge, CycleFailure, CycleOutcome, CycleReport,
};
pub use config::{BridgeConfig, DisplayOverride, DisplayRules, TlsVerification};
pub use convert::device_record;
pub use error::CoreError;
pub use reconcile::{AccessoryIntent, DisplayPolicy, Inventory, ReconciliationDiff};
pub use store::DeviceStore;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Identity
    AccessoryKey,
    AccessoryKind,
    Ain,
    // Readings
    AlertState,
    BatteryState,
    ButtonState,
    // Core record
    DeviceRecord,
    FunctionBitmask,
    HumidityReading,
    PowerReading,
    ScheduledChange,
    SwitchMode,
    SwitchState,
    TemperatureReading,
    ThermostatState,
};

// Gateway-client types that appear in this crate's public API.
pub use fritzlink_aha::{Credentials, DispatchMode, GuestWlanStatus, HkrTarget};
