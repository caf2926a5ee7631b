// ── Bridge lifecycle ──
//
// Owns the gateway client, the reactive store, and the periodic
// fetch -> normalize -> reconcile cycle. The accessory host plugs in
// through the `AccessoryHost` trait and receives one `CycleReport` per
// cycle; everything it needs to materialize or destroy accessories is
// in the report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fritzlink_aha::{AhaClient, GuestWlanStatus, HkrTarget, TransportConfig};

use crate::config::{BridgeConfig, DisplayRules};
use crate::convert;
use crate::error::CoreError;
use crate::model::{AccessoryKey, AccessoryKind, Ain, DeviceRecord};
use crate::reconcile::{DisplayPolicy, Inventory, ReconciliationDiff, reconcile};
use crate::store::DeviceStore;

// ── Host seam ────────────────────────────────────────────────────────

/// Descriptive fields an update intent refreshes on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryMetadata {
    pub name: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub firmware: Option<String>,
}

impl AccessoryMetadata {
    pub fn of(record: &DeviceRecord) -> Self {
        Self {
            name: record.display_name().to_owned(),
            manufacturer: record.manufacturer.clone(),
            product: record.product.clone(),
            firmware: record.firmware.clone(),
        }
    }
}

/// What one cycle decided, handed to the host's `apply`.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub diff: ReconciliationDiff,
    /// The records backing this cycle. On degraded cycles this is the
    /// previous confirmed snapshot.
    pub records: Arc<Vec<DeviceRecord>>,
}

/// The accessory consumer the bridge drives.
///
/// Implementations materialize host-side accessory objects; the bridge
/// never learns what those look like.
pub trait AccessoryHost: Send + Sync {
    /// Accessories currently materialized on the host.
    fn tracked(&self) -> Vec<AccessoryKey>;

    /// The host's display choice for one accessory, if it has one.
    /// Configured rules take precedence over this.
    fn is_displayed(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool> {
        let _ = (ain, kind);
        None
    }

    /// Cached descriptive fields, used to drop no-op update intents.
    fn cached_metadata(&self, ain: &Ain) -> Option<AccessoryMetadata> {
        let _ = ain;
        None
    }

    /// Receive one cycle's outcome.
    fn apply(&self, report: CycleReport);
}

/// Configured rules first, then the host's opinion.
struct CombinedPolicy<'a> {
    rules: &'a DisplayRules,
    host: &'a dyn AccessoryHost,
}

impl DisplayPolicy for CombinedPolicy<'_> {
    fn display(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool> {
        self.rules
            .lookup(ain, kind)
            .or_else(|| self.host.is_displayed(ain, kind))
    }
}

// ── Cycle outcome ────────────────────────────────────────────────────

/// Why a cycle could not confirm the inventory.
///
/// All of these are non-fatal: the tracked accessories are flagged
/// unreachable and the next scheduled cycle starts from a clean state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleFailure {
    #[error("gateway unreachable: {0}")]
    Transport(String),
    #[error("login rejected, blocked for {block_time_secs}s")]
    AuthRejected { block_time_secs: u64 },
    #[error("session rejected again after re-authentication")]
    SessionInvalid,
    #[error("unusable inventory response: {0}")]
    Malformed(String),
}

/// Result of one fetch -> normalize -> reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Inventory confirmed and applied.
    Synced {
        devices: usize,
        added: usize,
        updated: usize,
        removed: usize,
    },
    /// The fetch failed; tracked accessories were flagged unreachable,
    /// none were removed.
    Degraded(CycleFailure),
}

fn classify_failure(err: &fritzlink_aha::Error) -> CycleFailure {
    use fritzlink_aha::Error as Aha;
    match err {
        Aha::AuthRejected { block_time_secs } => CycleFailure::AuthRejected {
            block_time_secs: *block_time_secs,
        },
        Aha::SessionInvalid => CycleFailure::SessionInvalid,
        Aha::MalformedResponse { message, .. } => CycleFailure::Malformed(message.clone()),
        Aha::Api { message, .. } => CycleFailure::Malformed(message.clone()),
        other => CycleFailure::Transport(other.to_string()),
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Create it, `connect()` to
/// authenticate and start polling, `shutdown()` to stop. Individual
/// cycles can also be driven by hand with [`run_cycle`](Self::run_cycle).
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    client: AhaClient,
    store: Arc<DeviceStore>,
    host: Arc<dyn AccessoryHost>,
    display: DisplayRules,
    poll_interval: Duration,
    cancel: CancellationToken,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Build a bridge from configuration. Does not connect -- call
    /// [`connect()`](Self::connect) to authenticate and start polling.
    pub fn new(config: &BridgeConfig, host: Arc<dyn AccessoryHost>) -> Result<Self, CoreError> {
        config.validate()?;
        let transport = TransportConfig {
            tls: config.tls.to_tls_mode(),
            timeout: config.timeout(),
        };
        let client = AhaClient::new(
            config.url.clone(),
            config.credentials.clone(),
            config.dispatch_mode(),
            &transport,
        )?;
        Ok(Self::assemble(
            client,
            config.display.clone(),
            config.poll_interval(),
            host,
        ))
    }

    /// Wire up an existing client. For callers that build their own
    /// transport; configuration defaults do not apply.
    pub fn with_client(
        client: AhaClient,
        display: DisplayRules,
        poll_interval: Duration,
        host: Arc<dyn AccessoryHost>,
    ) -> Self {
        Self::assemble(client, display, poll_interval, host)
    }

    fn assemble(
        client: AhaClient,
        display: DisplayRules,
        poll_interval: Duration,
        host: Arc<dyn AccessoryHost>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                client,
                store: Arc::new(DeviceStore::new()),
                host,
                display,
                poll_interval,
                cancel: CancellationToken::new(),
                poll_handle: Mutex::new(None),
            }),
        }
    }

    /// The reactive device store.
    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    /// The underlying gateway client.
    pub fn client(&self) -> &AhaClient {
        &self.inner.client
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate, run the initial cycle, and start the poll task.
    ///
    /// Login failures are hard errors here; once connected, cycle
    /// failures only degrade (see [`CycleOutcome`]).
    pub async fn connect(&self) -> Result<CycleOutcome, CoreError> {
        self.inner.client.login().await?;
        debug!("gateway session established");

        let outcome = self.run_cycle().await?;

        let mut slot = self.inner.poll_handle.lock().await;
        if slot.is_none() && !self.inner.poll_interval.is_zero() {
            *slot = Some(tokio::spawn(poll_task(
                self.clone(),
                self.inner.poll_interval,
                self.inner.cancel.clone(),
            )));
        }
        drop(slot);

        info!(devices = self.inner.store.len(), "connected to gateway");
        Ok(outcome)
    }

    /// Stop polling and end the gateway session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.poll_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Err(e) = self.inner.client.logout().await {
            warn!(error = %e, "logout failed (non-fatal)");
        }
        debug!("bridge shut down");
    }

    // ── Reconciliation cycle ─────────────────────────────────────────

    /// One fetch -> normalize -> reconcile pass.
    ///
    /// A failed fetch degrades the cycle: the store keeps its previous
    /// snapshot and tracked accessories are flagged unreachable instead
    /// of removed. `Err` is reserved for internal inconsistencies.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CoreError> {
        let tracked = self.inner.host.tracked();

        let (inventory, failure) = match self.inner.client.device_list().await {
            Ok(raw) => {
                let records: Vec<DeviceRecord> = raw.iter().map(convert::device_record).collect();
                self.inner.store.replace_all(records.clone());
                (Inventory::Fetched(records), None)
            }
            Err(e) => {
                warn!(error = %e, "inventory fetch failed, keeping tracked accessories");
                (Inventory::Unavailable, Some(classify_failure(&e)))
            }
        };

        let policy = CombinedPolicy {
            rules: &self.inner.display,
            host: self.inner.host.as_ref(),
        };
        let mut diff = reconcile(&tracked, &inventory, &policy);

        if let Some(key) = diff.conflicting_key() {
            return Err(CoreError::ReconciliationInconsistency {
                message: format!("{key} is scheduled for removal and refresh in the same cycle"),
            });
        }

        // An update that would write back identical descriptive fields
        // is dropped before it reaches the host.
        if let Inventory::Fetched(records) = &inventory {
            let mut latest: HashMap<String, &DeviceRecord> = HashMap::new();
            for record in records {
                latest.entry(record.ain.normalized()).or_insert(record);
            }
            diff.to_update.retain(|key| {
                latest.get(&key.ain.normalized()).is_none_or(|record| {
                    self.inner.host.cached_metadata(&key.ain).as_ref()
                        != Some(&AccessoryMetadata::of(record))
                })
            });
        }

        let outcome = match failure {
            None => CycleOutcome::Synced {
                devices: self.inner.store.len(),
                added: diff.to_add.len(),
                updated: diff.to_update.len(),
                removed: diff.to_remove.len(),
            },
            Some(failure) => CycleOutcome::Degraded(failure),
        };

        debug!(
            added = diff.to_add.len(),
            updated = diff.to_update.len(),
            removed = diff.to_remove.len(),
            unreachable = diff.unreachable.len(),
            "reconciliation cycle complete"
        );

        self.inner.host.apply(CycleReport {
            diff,
            records: self.inner.store.snapshot(),
        });

        Ok(outcome)
    }

    // ── Mutations ────────────────────────────────────────────────────
    //
    // Routed through the dispatcher, so in serialized mode they are
    // ordered with respect to polling reads. Each confirmed mutation is
    // reflected in the store right away rather than waiting for the
    // next cycle.

    /// Switch an outlet on or off. Returns the confirmed state.
    pub async fn set_switch(&self, ain: &Ain, on: bool) -> Result<bool, CoreError> {
        let state = self.inner.client.set_switch(ain.as_str(), on).await?;
        self.inner.store.patch(ain, |record| {
            if let Some(switch) = record.switch.as_mut() {
                switch.on = Some(state);
            }
        });
        Ok(state)
    }

    /// Flip an outlet. Returns the confirmed state.
    pub async fn toggle_switch(&self, ain: &Ain) -> Result<bool, CoreError> {
        let state = self.inner.client.toggle_switch(ain.as_str()).await?;
        self.inner.store.patch(ain, |record| {
            if let Some(switch) = record.switch.as_mut() {
                switch.on = Some(state);
            }
        });
        Ok(state)
    }

    /// Set a thermostat target. Returns the confirmed target.
    pub async fn set_target_temperature(
        &self,
        ain: &Ain,
        target: HkrTarget,
    ) -> Result<HkrTarget, CoreError> {
        let confirmed = self
            .inner
            .client
            .set_target_temperature(ain.as_str(), target)
            .await?;
        self.inner.store.patch(ain, |record| {
            if let Some(thermostat) = record.thermostat.as_mut() {
                thermostat.target = Some(confirmed);
            }
        });
        Ok(confirmed)
    }

    /// Current guest WLAN state.
    pub async fn guest_wlan(&self) -> Result<GuestWlanStatus, CoreError> {
        Ok(self.inner.client.guest_wlan().await?)
    }

    /// Enable or disable the guest WLAN.
    pub async fn set_guest_wlan(&self, enabled: bool) -> Result<GuestWlanStatus, CoreError> {
        Ok(self.inner.client.set_guest_wlan(enabled).await?)
    }
}

// ── Poll task ────────────────────────────────────────────────────────

/// Periodically run reconciliation cycles until cancelled.
///
/// A slow cycle delays the next tick instead of overlapping it; one
/// cycle always finishes, success or failure, before the next begins.
async fn poll_task(bridge: Bridge, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match bridge.run_cycle().await {
                    Ok(CycleOutcome::Synced { devices, added, updated, removed }) => {
                        debug!(devices, added, updated, removed, "periodic cycle complete");
                    }
                    Ok(CycleOutcome::Degraded(failure)) => {
                        warn!(failure = %failure, "periodic cycle degraded");
                    }
                    Err(e) => warn!(error = %e, "periodic cycle failed"),
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
