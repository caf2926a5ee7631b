// ── Reactive device snapshot ──
//
// Holds the latest normalized inventory and broadcasts replacements to
// subscribers via a `watch` channel. The inventory is superseded
// wholesale each cycle; `patch` exists only so mutating commands can
// reflect their effect locally before the next poll confirms it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::model::{Ain, DeviceRecord};

pub struct DeviceStore {
    snapshot: watch::Sender<Arc<Vec<DeviceRecord>>>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (last_refresh, _) = watch::channel(None);
        Self {
            snapshot,
            last_refresh,
        }
    }

    /// Replace the whole inventory with this cycle's records.
    pub fn replace_all(&self, records: Vec<DeviceRecord>) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(records));
        self.last_refresh.send_modify(|t| *t = Some(Utc::now()));
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<DeviceRecord>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DeviceRecord>>> {
        self.snapshot.subscribe()
    }

    /// Look up one device by AIN, whitespace-insensitively.
    pub fn get(&self, ain: &Ain) -> Option<DeviceRecord> {
        self.snapshot
            .borrow()
            .iter()
            .find(|record| record.ain == *ain)
            .cloned()
    }

    /// Apply a local edit to one record, notifying subscribers when the
    /// device exists. Returns whether it did.
    pub fn patch(&self, ain: &Ain, edit: impl FnOnce(&mut DeviceRecord)) -> bool {
        let mut found = false;
        self.snapshot.send_if_modified(|snap| {
            let mut records = snap.as_ref().clone();
            let Some(record) = records.iter_mut().find(|r| r.ain == *ain) else {
                return false;
            };
            edit(record);
            *snap = Arc::new(records);
            found = true;
            true
        });
        found
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.borrow().is_empty()
    }

    /// When the last confirmed inventory arrived, or `None` before the
    /// first one.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    /// How long ago the last confirmed inventory arrived.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_refresh().map(|t| Utc::now() - t)
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use crate::model::FunctionBitmask;

    use super::*;

    fn record(ain: &str, name: &str) -> DeviceRecord {
        DeviceRecord {
            ain: Ain::new(ain),
            internal_id: None,
            name: name.to_owned(),
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
        }
    }

    #[test]
    fn starts_empty_with_no_refresh_timestamp() {
        let store = DeviceStore::new();
        assert!(store.is_empty());
        assert!(store.last_refresh().is_none());
        assert!(store.data_age().is_none());
    }

    #[test]
    fn replace_all_supersedes_the_snapshot() {
        let store = DeviceStore::new();
        store.replace_all(vec![record("a", "One"), record("b", "Two")]);
        assert_eq!(store.len(), 2);

        store.replace_all(vec![record("c", "Three")]);
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "Three");
        assert!(store.last_refresh().is_some());
    }

    #[test]
    fn get_ignores_identifier_whitespace() {
        let store = DeviceStore::new();
        store.replace_all(vec![record("08761 0116993", "Outlet")]);
        let hit = store.get(&Ain::new("087610116993")).unwrap();
        assert_eq!(hit.name, "Outlet");
    }

    #[test]
    fn subscribers_see_replacements() {
        let store = DeviceStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.replace_all(vec![record("a", "One")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[test]
    fn patch_edits_one_record_in_place() {
        let store = DeviceStore::new();
        store.replace_all(vec![record("a", "One"), record("b", "Two")]);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        let hit = store.patch(&Ain::new("a"), |r| r.name = "Renamed".to_owned());
        assert!(hit);
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.get(&Ain::new("a")).unwrap().name, "Renamed");
        assert_eq!(store.get(&Ain::new("b")).unwrap().name, "Two");
    }

    #[test]
    fn patch_on_an_unknown_device_changes_nothing() {
        let store = DeviceStore::new();
        store.replace_all(vec![record("a", "One")]);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert!(!store.patch(&Ain::new("zzz"), |r| r.name.clear()));
        assert!(!rx.has_changed().unwrap());
    }
}
