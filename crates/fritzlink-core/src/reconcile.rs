// Reconciliation engine.
//
// Pure diff between the accessories a host already materializes and
// the latest inventory. No I/O, no hidden state, called once per
// cycle. The caller decides whether a cycle produced a confirmed
// inventory or failed; this module never infers that from an empty
// list, because removal is reserved for confirmed absence.

use std::collections::{HashMap, HashSet};

use crate::config::DisplayRules;
use crate::model::{AccessoryKey, AccessoryKind, Ain, DeviceRecord};

// ── Inputs ──────────────────────────────────────────────────────────

/// One cycle's inventory, as judged by the caller.
///
/// `Fetched` is authoritative even when empty. `Unavailable` stands
/// for any failed fetch; tracked accessories survive it untouched.
#[derive(Debug, Clone)]
pub enum Inventory {
    Fetched(Vec<DeviceRecord>),
    Unavailable,
}

/// Per-identifier, per-kind display choice supplied by the host.
///
/// `None` means "no opinion" and defaults to displayed; a missing
/// policy entry must never drop a device.
pub trait DisplayPolicy: Send + Sync {
    fn display(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool>;
}

impl DisplayPolicy for DisplayRules {
    fn display(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool> {
        self.lookup(ain, kind)
    }
}

/// Policy with no opinions: everything is displayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayAll;

impl DisplayPolicy for DisplayAll {
    fn display(&self, _ain: &Ain, _kind: AccessoryKind) -> Option<bool> {
        None
    }
}

// ── Outputs ─────────────────────────────────────────────────────────

/// One accessory the engine wants created, with the record backing it.
#[derive(Debug, Clone)]
pub struct AccessoryIntent {
    pub key: AccessoryKey,
    pub record: DeviceRecord,
}

/// The add/update/remove sets for one cycle.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationDiff {
    pub to_add: Vec<AccessoryIntent>,
    pub to_update: Vec<AccessoryKey>,
    pub to_remove: Vec<AccessoryKey>,
    /// Tracked accessories whose state is unknown this cycle. Only
    /// populated on `Inventory::Unavailable`.
    pub unreachable: Vec<AccessoryKey>,
}

impl ReconciliationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_update.is_empty()
            && self.to_remove.is_empty()
            && self.unreachable.is_empty()
    }

    /// A key scheduled for removal and for add/update in the same
    /// cycle, if any. The algorithm never produces one; callers treat
    /// it as an internal inconsistency.
    pub fn conflicting_key(&self) -> Option<&AccessoryKey> {
        let removals: HashSet<&AccessoryKey> = self.to_remove.iter().collect();
        self.to_add
            .iter()
            .map(|intent| &intent.key)
            .chain(self.to_update.iter())
            .find(|key| removals.contains(*key))
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Diff the tracked accessory set against the latest inventory.
///
/// Tracked accessories whose device is gone from a confirmed inventory
/// are removed, exactly once; survivors are refreshed unless the
/// policy now hides their kind, which also removes them. Devices (and
/// capability kinds) with no tracked accessory are offered as
/// additions, each kind gated independently by the policy. A plain
/// temperature sensor is only added when no outlet or thermostat
/// accessory on the same actor already reports a temperature. Buttons
/// yield one accessory per sub-index.
///
/// Capability detection is by element presence on the record; the
/// function bitmask plays no part here.
pub fn reconcile(
    tracked: &[AccessoryKey],
    inventory: &Inventory,
    policy: &dyn DisplayPolicy,
) -> ReconciliationDiff {
    let Inventory::Fetched(devices) = inventory else {
        return ReconciliationDiff {
            unreachable: tracked.to_vec(),
            ..ReconciliationDiff::default()
        };
    };

    // First record wins when the gateway repeats an AIN.
    let mut latest: HashMap<String, &DeviceRecord> = HashMap::new();
    for record in devices {
        latest.entry(record.ain.normalized()).or_insert(record);
    }

    let mut diff = ReconciliationDiff::default();

    // Actors whose temperature is already reported by a surviving
    // outlet or thermostat accessory.
    let mut covered: HashSet<String> = HashSet::new();

    for key in tracked {
        if !latest.contains_key(&key.ain.normalized()) {
            diff.to_remove.push(key.clone());
        } else if policy.display(&key.ain, key.kind) == Some(false) {
            diff.to_remove.push(key.clone());
        } else {
            if key.kind.covers_temperature() {
                covered.insert(key.ain.normalized());
            }
            diff.to_update.push(key.clone());
        }
    }

    let tracked_keys: HashSet<&AccessoryKey> = tracked.iter().collect();
    let displayed =
        |ain: &Ain, kind: AccessoryKind| policy.display(ain, kind).unwrap_or(true);

    let mut seen: HashSet<String> = HashSet::new();
    for record in devices {
        let ain = &record.ain;
        if !seen.insert(ain.normalized()) {
            continue;
        }

        let offer = |diff: &mut ReconciliationDiff, key: AccessoryKey| {
            if !tracked_keys.contains(&key) && displayed(&key.ain, key.kind) {
                diff.to_add.push(AccessoryIntent {
                    key,
                    record: record.clone(),
                });
                return true;
            }
            false
        };

        // Temperature-covering kinds first, so the sensor decision
        // below sees additions from this same cycle.
        let mut covers = covered.contains(&ain.normalized());
        if record.switch.is_some()
            && offer(&mut diff, AccessoryKey::new(ain.clone(), AccessoryKind::Outlet))
        {
            covers = true;
        }
        if record.thermostat.is_some()
            && offer(
                &mut diff,
                AccessoryKey::new(ain.clone(), AccessoryKind::Thermostat),
            )
        {
            covers = true;
        }

        if record.temperature.is_some() && !covers {
            offer(
                &mut diff,
                AccessoryKey::new(ain.clone(), AccessoryKind::TemperatureSensor),
            );
        }

        if record.alert.is_some() {
            offer(
                &mut diff,
                AccessoryKey::new(ain.clone(), AccessoryKind::AlarmSensor),
            );
        }

        for position in 0..record.buttons.len() {
            let Ok(index) = u16::try_from(position) else {
                continue;
            };
            offer(
                &mut diff,
                AccessoryKey::indexed(ain.clone(), AccessoryKind::Button, index),
            );
        }
    }

    diff
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;

    use crate::model::{
        AlertState, ButtonState, FunctionBitmask, SwitchState, TemperatureReading,
        ThermostatState,
    };

    use super::*;

    fn record(ain: &str, name: &str) -> DeviceRecord {
        DeviceRecord {
            ain: Ain::new(ain),
            internal_id: None,
            name: name.to_owned(),
            present: true,
            manufacturer: Some("AVM".to_owned()),
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
        }
    }

    fn outlet(ain: &str, name: &str) -> DeviceRecord {
        let mut r = record(ain, name);
        r.switch = Some(SwitchState {
            on: Some(true),
            mode: None,
            locked: None,
            device_locked: None,
        });
        r.temperature = Some(TemperatureReading {
            celsius: Some(23.5),
            offset_celsius: None,
        });
        r
    }

    fn thermostat(ain: &str, name: &str) -> DeviceRecord {
        let mut r = record(ain, name);
        r.thermostat = Some(ThermostatState {
            current_celsius: Some(19.5),
            target: None,
            comfort_celsius: None,
            economy_celsius: None,
            window_open: None,
            battery_low: None,
            battery_percent: None,
            error_code: None,
            next_change: None,
        });
        r.temperature = Some(TemperatureReading {
            celsius: Some(19.5),
            offset_celsius: None,
        });
        r
    }

    fn sensor(ain: &str, name: &str) -> DeviceRecord {
        let mut r = record(ain, name);
        r.temperature = Some(TemperatureReading {
            celsius: Some(21.0),
            offset_celsius: None,
        });
        r
    }

    fn key(ain: &str, kind: AccessoryKind) -> AccessoryKey {
        AccessoryKey::new(Ain::new(ain), kind)
    }

    fn added_keys(diff: &ReconciliationDiff) -> Vec<AccessoryKey> {
        diff.to_add.iter().map(|i| i.key.clone()).collect()
    }

    /// Policy backed by explicit (ain, kind) entries.
    struct TablePolicy(HashMap<(String, AccessoryKind), bool>);

    impl TablePolicy {
        fn hide(ain: &str, kind: AccessoryKind) -> Self {
            let mut table = HashMap::new();
            table.insert((Ain::new(ain).normalized(), kind), false);
            Self(table)
        }
    }

    impl DisplayPolicy for TablePolicy {
        fn display(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool> {
            self.0.get(&(ain.normalized(), kind)).copied()
        }
    }

    #[test]
    fn fresh_inventory_offers_every_kind_once() {
        let inventory = Inventory::Fetched(vec![
            outlet("08761 0116993", "Outlet"),
            thermostat("11959 0154321", "Valve"),
            sensor("11657 0043029", "Sensor"),
        ]);

        let diff = reconcile(&[], &inventory, &DisplayAll);

        assert_eq!(
            added_keys(&diff),
            vec![
                key("08761 0116993", AccessoryKind::Outlet),
                key("11959 0154321", AccessoryKind::Thermostat),
                key("11657 0043029", AccessoryKind::TemperatureSensor),
            ]
        );
        assert!(diff.to_update.is_empty());
        assert!(diff.to_remove.is_empty());
        assert!(diff.unreachable.is_empty());
    }

    #[test]
    fn covering_kinds_suppress_the_bare_temperature_sensor() {
        // Both records expose a <temperature> element, yet neither may
        // produce a standalone sensor accessory.
        let inventory = Inventory::Fetched(vec![
            outlet("08761 0116993", "Outlet"),
            thermostat("11959 0154321", "Valve"),
        ]);

        let diff = reconcile(&[], &inventory, &DisplayAll);

        assert!(
            added_keys(&diff)
                .iter()
                .all(|k| k.kind != AccessoryKind::TemperatureSensor)
        );
    }

    #[test]
    fn tracked_covering_kind_keeps_suppressing_the_sensor() {
        let tracked = [key("08761 0116993", AccessoryKind::Outlet)];
        let inventory = Inventory::Fetched(vec![outlet("087610116993", "Outlet")]);

        let diff = reconcile(&tracked, &inventory, &DisplayAll);

        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_update, tracked.to_vec());
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn disappeared_device_is_removed_not_updated() {
        let tracked = [
            key("08761 0116993", AccessoryKind::Outlet),
            key("11959 0154321", AccessoryKind::Thermostat),
        ];
        let inventory = Inventory::Fetched(vec![outlet("08761 0116993", "Outlet")]);

        let diff = reconcile(&tracked, &inventory, &DisplayAll);

        assert_eq!(
            diff.to_remove,
            vec![key("11959 0154321", AccessoryKind::Thermostat)]
        );
        assert_eq!(
            diff.to_update,
            vec![key("08761 0116993", AccessoryKind::Outlet)]
        );
    }

    #[test]
    fn whitespace_variants_are_one_device() {
        let tracked = [key("087610116993", AccessoryKind::Outlet)];
        let inventory = Inventory::Fetched(vec![outlet("08761 0116993", "Outlet")]);

        let diff = reconcile(&tracked, &inventory, &DisplayAll);

        assert!(diff.to_remove.is_empty());
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_update.len(), 1);
    }

    #[test]
    fn soft_failure_flags_unreachable_and_removes_nothing() {
        let tracked = [
            key("08761 0116993", AccessoryKind::Outlet),
            key("11959 0154321", AccessoryKind::Thermostat),
        ];

        let diff = reconcile(&tracked, &Inventory::Unavailable, &DisplayAll);

        assert_eq!(diff.unreachable, tracked.to_vec());
        assert!(diff.to_remove.is_empty());
        assert!(diff.to_update.is_empty());
        assert!(diff.to_add.is_empty());
    }

    #[test]
    fn confirmed_empty_inventory_removes_everything() {
        let tracked = [
            key("08761 0116993", AccessoryKind::Outlet),
            key("11959 0154321", AccessoryKind::Thermostat),
        ];

        let diff = reconcile(&tracked, &Inventory::Fetched(Vec::new()), &DisplayAll);

        assert_eq!(diff.to_remove, tracked.to_vec());
        assert!(diff.unreachable.is_empty());
    }

    #[test]
    fn policy_hiding_a_tracked_kind_removes_it_and_uncovers_the_sensor() {
        let tracked = [key("08761 0116993", AccessoryKind::Outlet)];
        let inventory = Inventory::Fetched(vec![outlet("08761 0116993", "Outlet")]);
        let policy = TablePolicy::hide("08761 0116993", AccessoryKind::Outlet);

        let diff = reconcile(&tracked, &inventory, &policy);

        assert_eq!(diff.to_remove, tracked.to_vec());
        // With the outlet gone nothing reports the temperature, so the
        // bare sensor is offered instead.
        assert_eq!(
            added_keys(&diff),
            vec![key("08761 0116993", AccessoryKind::TemperatureSensor)]
        );
        assert!(diff.conflicting_key().is_none());
    }

    #[test]
    fn hidden_kind_is_never_offered() {
        let inventory = Inventory::Fetched(vec![thermostat("11959 0154321", "Valve")]);
        let policy = TablePolicy::hide("11959 0154321", AccessoryKind::Thermostat);

        let diff = reconcile(&[], &inventory, &policy);

        // The thermostat is suppressed and thus no longer covers the
        // temperature element.
        assert_eq!(
            added_keys(&diff),
            vec![key("11959 0154321", AccessoryKind::TemperatureSensor)]
        );
    }

    #[test]
    fn buttons_get_one_accessory_per_sub_index() {
        let mut device = record("13096 0007307", "Wall Button");
        device.buttons = vec![
            ButtonState {
                identifier: Some("13096 0007307-1".to_owned()),
                name: Some("Top".to_owned()),
                last_pressed: None,
            },
            ButtonState {
                identifier: Some("13096 0007307-2".to_owned()),
                name: Some("Bottom".to_owned()),
                last_pressed: None,
            },
        ];
        let inventory = Inventory::Fetched(vec![device]);

        let diff = reconcile(&[], &inventory, &DisplayAll);

        assert_eq!(
            added_keys(&diff),
            vec![
                AccessoryKey::indexed(Ain::new("13096 0007307"), AccessoryKind::Button, 0),
                AccessoryKey::indexed(Ain::new("13096 0007307"), AccessoryKind::Button, 1),
            ]
        );
    }

    #[test]
    fn alarm_sensors_are_offered_alongside_other_kinds() {
        let mut device = sensor("05333 0077221", "Contact");
        device.alert = Some(AlertState {
            triggered: Some(false),
        });
        let inventory = Inventory::Fetched(vec![device]);

        let diff = reconcile(&[], &inventory, &DisplayAll);

        assert_eq!(
            added_keys(&diff),
            vec![
                key("05333 0077221", AccessoryKind::TemperatureSensor),
                key("05333 0077221", AccessoryKind::AlarmSensor),
            ]
        );
    }

    #[test]
    fn repeated_ains_fold_into_the_first_record() {
        let first = outlet("08761 0116993", "First");
        let duplicate = outlet("087610116993", "Duplicate");
        let inventory = Inventory::Fetched(vec![first, duplicate]);

        let diff = reconcile(&[], &inventory, &DisplayAll);

        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].record.name, "First");
    }

    #[test]
    fn display_rules_act_as_a_policy() {
        let rules: DisplayRules = serde_json::from_value(serde_json::json!({
            "hidden": ["11959 0154321"],
        }))
        .unwrap();
        let inventory = Inventory::Fetched(vec![
            outlet("08761 0116993", "Outlet"),
            thermostat("119590154321", "Hidden Valve"),
        ]);

        let diff = reconcile(&[], &inventory, &rules);

        assert_eq!(
            added_keys(&diff),
            vec![key("08761 0116993", AccessoryKind::Outlet)]
        );
    }
}
