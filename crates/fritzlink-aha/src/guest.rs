// Guest WLAN endpoints via POST /data.lua
//
// data.lua is the UI's own form endpoint: requests are form-encoded
// with xhr=1 and a page selector, answers are loosely-shaped JSON. The
// guest state lives under data.guestAccess; the active flag arrives as
// a bool, a number, or a "0"/"1" string depending on firmware, so
// extraction goes through serde_json::Value instead of a fixed struct.

use serde_json::Value;
use tracing::debug;

use crate::client::AhaClient;
use crate::error::Error;
use crate::session;

/// Guest WLAN state as reported by the gateway UI backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestWlanStatus {
    pub active: bool,
    pub ssid: Option<String>,
}

impl AhaClient {
    /// Read the guest WLAN state.
    ///
    /// `POST /data.lua` with `page=wGuest`.
    pub async fn guest_wlan(&self) -> Result<GuestWlanStatus, Error> {
        debug!("reading guest WLAN state");
        let form = [
            ("xhr", "1".to_owned()),
            ("page", "wGuest".to_owned()),
            ("no_sidrenew", String::new()),
        ];
        let body = self.execute_data(&form).await?;
        parse_guest_status(&body)
    }

    /// Switch the guest WLAN on or off; returns the resulting state.
    ///
    /// `POST /data.lua` with `page=wGuest` and `apply`; the checkbox
    /// field is present-with-"on" to enable and empty to disable, the
    /// way the UI submits it.
    pub async fn set_guest_wlan(&self, enabled: bool) -> Result<GuestWlanStatus, Error> {
        debug!(enabled, "switching guest WLAN");
        let form = [
            ("xhr", "1".to_owned()),
            ("page", "wGuest".to_owned()),
            (
                "activate_guest_access",
                if enabled { "on".to_owned() } else { String::new() },
            ),
            ("apply", String::new()),
        ];
        let body = self.execute_data(&form).await?;
        parse_guest_status(&body)
    }
}

fn parse_guest_status(body: &str) -> Result<GuestWlanStatus, Error> {
    let doc: Value = serde_json::from_str(body).map_err(|e| Error::MalformedResponse {
        message: format!("data.lua returned invalid JSON: {e}"),
        body: session::preview(body),
    })?;

    let guest = doc
        .get("data")
        .and_then(|data| data.get("guestAccess"))
        .ok_or_else(|| Error::MalformedResponse {
            message: "data.lua response has no data.guestAccess".into(),
            body: session::preview(body),
        })?;

    let active = guest
        .get("active")
        .and_then(flexible_bool)
        .ok_or_else(|| Error::MalformedResponse {
            message: "guestAccess carries no usable active flag".into(),
            body: session::preview(body),
        })?;

    let ssid = guest
        .get("ssid")
        .and_then(Value::as_str)
        .map(str::to_owned);

    Ok(GuestWlanStatus { active, ssid })
}

fn flexible_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
