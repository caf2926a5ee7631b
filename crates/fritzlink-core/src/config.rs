// ── Runtime bridge configuration ──
//
// These types describe *how* to reach a gateway and which accessories
// to surface. They deserialize straight from a host's JSON config block
// but never touch disk themselves; the host constructs a `BridgeConfig`
// and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use fritzlink_aha::{Credentials, DispatchMode, TlsMode};

use crate::error::CoreError;
use crate::model::{AccessoryKind, Ain};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. Default: gateways ship self-signed certs.
    #[default]
    DangerAcceptInvalid,
}

impl TlsVerification {
    pub(crate) fn to_tls_mode(&self) -> TlsMode {
        match self {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Which accessories to surface.
///
/// Anything not mentioned here is displayed; only explicit entries hide.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisplayRules {
    /// AINs never surfaced, whatever their capabilities.
    #[serde(default)]
    pub hidden: Vec<Ain>,
    /// Per-accessory overrides.
    #[serde(default)]
    pub overrides: Vec<DisplayOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayOverride {
    pub ain: Ain,
    pub kind: AccessoryKind,
    pub display: bool,
}

impl DisplayRules {
    /// The configured choice for one accessory, if any.
    pub fn lookup(&self, ain: &Ain, kind: AccessoryKind) -> Option<bool> {
        if self.hidden.contains(ain) {
            return Some(false);
        }
        self.overrides
            .iter()
            .find(|o| o.ain == *ain && o.kind == kind)
            .map(|o| o.display)
    }
}

/// Configuration for one gateway connection.
///
/// Built by the host, passed to `Bridge` -- core never reads files.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Gateway root URL.
    #[serde(default = "default_url")]
    pub url: Url,
    pub credentials: Credentials,
    #[serde(default)]
    pub tls: TlsVerification,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Reconciliation cycle cadence in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Let invocations overlap instead of running one at a time.
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub display: DisplayRules,
}

fn default_url() -> Url {
    Url::parse("http://fritz.box").expect("default gateway URL parses")
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl BridgeConfig {
    /// A config with the given credentials and every tunable at its
    /// default.
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            tls: TlsVerification::default(),
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            concurrent: false,
            display: DisplayRules::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        if self.concurrent {
            DispatchMode::Concurrent
        } else {
            DispatchMode::Serialized
        }
    }

    /// Reject configs the gateway or the poller cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig {
                message: format!("unsupported URL scheme '{}'", self.url.scheme()),
            });
        }
        if self.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig {
                message: "timeout_secs must be at least 1".into(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::InvalidConfig {
                message: "poll_interval_secs must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
