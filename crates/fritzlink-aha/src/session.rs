// Session handshake against /login_sid.lua
//
// The gateway hands out a 16-hex-digit session token (SID) after a
// challenge-response exchange. The response is an MD5 over the UTF-16LE
// encoding of "<challenge>-<password>" -- a scheme kept for compatibility
// with very old firmware, which is why it tolerates non-ASCII passwords.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// The sentinel token the gateway returns when no session exists.
pub const INVALID_SID: &str = "0000000000000000";

/// A session token handed out by the gateway.
///
/// The all-zero token is the gateway's way of saying "not authenticated";
/// [`SessionId::is_valid`] treats it (and the empty string) as absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// True unless this is the all-zero sentinel or empty.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0 != INVALID_SID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An established session.
#[derive(Debug, Clone)]
pub struct Session {
    pub sid: SessionId,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(sid: SessionId) -> Self {
        Self {
            sid,
            established_at: Utc::now(),
        }
    }
}

/// Username/password pair used for the handshake.
///
/// Old firmware allows password-only logins, so `username` may be empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

/// `<SessionInfo>` document returned by every /login_sid.lua request.
#[derive(Debug, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "SID")]
    pub sid: String,
    #[serde(rename = "Challenge", default)]
    pub challenge: String,
    #[serde(rename = "BlockTime", default)]
    pub block_time: u64,
    #[serde(rename = "Rights", default)]
    pub rights: Option<SessionRights>,
}

/// Granted permissions, as alternating `<Name>`/`<Access>` elements.
#[derive(Debug, Default, Deserialize)]
pub struct SessionRights {
    #[serde(rename = "Name", default)]
    pub names: Vec<String>,
    #[serde(rename = "Access", default)]
    pub access: Vec<String>,
}

// ── Challenge response ──────────────────────────────────────────────

/// Compute the login response for a challenge.
///
/// `<challenge>-<lowercase hex MD5 of UTF-16LE("<challenge>-<password>")>`
pub fn challenge_response(challenge: &str, password: &SecretString) -> String {
    let merged = format!("{challenge}-{}", password.expose_secret());
    let utf16le: Vec<u8> = merged.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let digest = Md5::digest(&utf16le);
    format!("{challenge}-{}", hex::encode(digest))
}

// ── Handshake ───────────────────────────────────────────────────────

/// Authenticate against `GET /login_sid.lua`.
///
/// First fetch reads the current challenge; if the gateway already
/// considers this client logged in (some setups disable passwords on the
/// LAN side), that session is reused without a second round trip.
/// Otherwise the computed response is submitted and the resulting SID
/// checked against the all-zero sentinel.
pub async fn authenticate(
    http: &reqwest::Client,
    base_url: &Url,
    credentials: &Credentials,
) -> Result<Session, Error> {
    let url = base_url.join("login_sid.lua").map_err(Error::InvalidUrl)?;

    debug!("requesting login challenge");
    let info = fetch_session_info(http, url.clone()).await?;

    let sid = SessionId::new(info.sid);
    if sid.is_valid() {
        debug!("gateway reports an existing session");
        return Ok(Session::new(sid));
    }

    let response = challenge_response(&info.challenge, &credentials.password);
    let mut login_url = url;
    login_url
        .query_pairs_mut()
        .append_pair("username", &credentials.username)
        .append_pair("response", &response);

    let info = fetch_session_info(http, login_url).await?;
    let sid = SessionId::new(info.sid);
    if !sid.is_valid() {
        return Err(Error::AuthRejected {
            block_time_secs: info.block_time,
        });
    }

    debug!("login successful");
    Ok(Session::new(sid))
}

/// End a session via `GET /login_sid.lua?logout=1&sid=...`.
///
/// The gateway answers with a fresh challenge document; only transport
/// failures are surfaced.
pub async fn logout(http: &reqwest::Client, base_url: &Url, sid: &SessionId) -> Result<(), Error> {
    let mut url = base_url.join("login_sid.lua").map_err(Error::InvalidUrl)?;
    url.query_pairs_mut()
        .append_pair("logout", "1")
        .append_pair("sid", sid.as_str());

    debug!("logging out");
    let resp = http.get(url).send().await.map_err(Error::Transport)?;
    let _ = resp.text().await;
    Ok(())
}

async fn fetch_session_info(http: &reqwest::Client, url: Url) -> Result<SessionInfo, Error> {
    let resp = http.get(url).send().await.map_err(Error::Transport)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Api {
            command: "login_sid".into(),
            message: format!("HTTP {status}"),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;
    quick_xml::de::from_str(&body).map_err(|e| Error::MalformedResponse {
        message: format!("invalid SessionInfo document: {e}"),
        body: preview(&body),
    })
}

// ── Session rejection sniffing ──────────────────────────────────────

/// Detect a body that means "your session is gone" regardless of status.
///
/// The gateway does not always answer a stale SID with 403: it may serve
/// its HTML login page, or a `SessionInfo` document carrying the all-zero
/// token, where the caller expected a payload.
pub(crate) fn session_rejection(body: &str) -> Option<Error> {
    let head = body.trim_start();
    let html = {
        let lower: String = head.chars().take(32).flat_map(char::to_lowercase).collect();
        lower.starts_with("<!doctype html") || lower.starts_with("<html")
    };
    let zero_sid =
        body.contains("<SID>0000000000000000</SID>") || body.trim() == INVALID_SID;
    (html || zero_sid).then_some(Error::SessionInvalid)
}

/// Truncate a body for error diagnostics.
pub(crate) fn preview(body: &str) -> String {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}

// ── Tests ───────────────────────────────────────────────────────────
