// AHA HTTP client and command dispatcher
//
// Wraps `reqwest::Client` with session injection, response
// classification, and the re-authentication retry. All typed endpoint
// surfaces (homeauto commands, guest WLAN) are implemented as inherent
// methods in separate files to keep this module focused on dispatch
// mechanics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::session::{self, Credentials, Session, SessionId};
use crate::transport::TransportConfig;

/// How invocations reach the gateway.
///
/// Old gateway firmware corrupts interleaved requests on a single
/// session, so the safe default runs them strictly one after another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One invocation at a time, in arrival order.
    #[default]
    Serialized,
    /// Invocations fly as soon as they are made.
    Concurrent,
}

/// A single gateway command: name plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AhaCommand {
    name: &'static str,
    ain: Option<String>,
    param: Option<String>,
}

impl AhaCommand {
    fn bare(name: &'static str) -> Self {
        Self {
            name,
            ain: None,
            param: None,
        }
    }

    fn for_actor(name: &'static str, ain: &str) -> Self {
        Self {
            name,
            ain: Some(ain.to_owned()),
            param: None,
        }
    }

    fn with_param(name: &'static str, ain: &str, param: String) -> Self {
        Self {
            name,
            ain: Some(ain.to_owned()),
            param: Some(param),
        }
    }

    /// `switchcmd=getdevicelistinfos` -- the full actor inventory.
    pub fn device_list_infos() -> Self {
        Self::bare("getdevicelistinfos")
    }

    /// `switchcmd=getswitchlist` -- comma-separated outlet AINs.
    pub fn switch_list() -> Self {
        Self::bare("getswitchlist")
    }

    /// `switchcmd=getswitchstate`
    pub fn switch_state(ain: &str) -> Self {
        Self::for_actor("getswitchstate", ain)
    }

    /// `switchcmd=setswitchon`
    pub fn set_switch_on(ain: &str) -> Self {
        Self::for_actor("setswitchon", ain)
    }

    /// `switchcmd=setswitchoff`
    pub fn set_switch_off(ain: &str) -> Self {
        Self::for_actor("setswitchoff", ain)
    }

    /// `switchcmd=setswitchtoggle`
    pub fn toggle_switch(ain: &str) -> Self {
        Self::for_actor("setswitchtoggle", ain)
    }

    /// `switchcmd=getswitchpower`
    pub fn switch_power(ain: &str) -> Self {
        Self::for_actor("getswitchpower", ain)
    }

    /// `switchcmd=getswitchenergy`
    pub fn switch_energy(ain: &str) -> Self {
        Self::for_actor("getswitchenergy", ain)
    }

    /// `switchcmd=gettemperature`
    pub fn temperature(ain: &str) -> Self {
        Self::for_actor("gettemperature", ain)
    }

    /// `switchcmd=gethkrtsoll`
    pub fn target_temperature(ain: &str) -> Self {
        Self::for_actor("gethkrtsoll", ain)
    }

    /// `switchcmd=sethkrtsoll&param=<raw half-degrees or sentinel>`
    pub fn set_target_temperature(ain: &str, target: crate::units::HkrTarget) -> Self {
        Self::with_param("sethkrtsoll", ain, target.to_raw().to_string())
    }

    /// `switchcmd=gethkrkomfort`
    pub fn comfort_temperature(ain: &str) -> Self {
        Self::for_actor("gethkrkomfort", ain)
    }

    /// `switchcmd=gethkrabsenk`
    pub fn economy_temperature(ain: &str) -> Self {
        Self::for_actor("gethkrabsenk", ain)
    }

    /// `switchcmd=getbatterycharge`
    pub fn battery_charge(ain: &str) -> Self {
        Self::for_actor("getbatterycharge", ain)
    }

    /// The `switchcmd` name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The target actor, if the command addresses one.
    pub fn ain(&self) -> Option<&str> {
        self.ain.as_deref()
    }

    /// The extra `param` argument, if the command carries one.
    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }
}

/// What a dispatch sends: a homeauto command or a data.lua form.
#[derive(Clone, Copy)]
enum Call<'a> {
    Switch(&'a AhaCommand),
    Data(&'a [(&'a str, String)]),
}

impl Call<'_> {
    fn label(&self) -> &'static str {
        match self {
            Call::Switch(cmd) => cmd.name,
            Call::Data(_) => "data.lua",
        }
    }
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    mode: DispatchMode,
    /// The single shared session slot. Only (re)authentication writes it.
    session: RwLock<Option<Session>>,
    /// Hands out turns in [`DispatchMode::Serialized`].
    chain: Mutex<()>,
    /// Single-flight guard: at most one login runs at any time.
    auth: Mutex<()>,
    /// In-flight invocation gauge, for diagnostics.
    pending: AtomicUsize,
}

/// Client for the gateway's home automation HTTP interface.
///
/// Cheaply cloneable; all clones share the session slot, so a
/// re-authentication performed for one caller benefits every other.
/// Sessions are established lazily on the first invocation and replaced
/// in-place when the gateway rejects one mid-flight.
#[derive(Clone)]
pub struct AhaClient {
    inner: Arc<ClientInner>,
}

impl AhaClient {
    /// Create a client from a [`TransportConfig`].
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        mode: DispatchMode,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials, mode))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Credentials,
        mode: DispatchMode,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                credentials,
                mode,
                session: RwLock::new(None),
                chain: Mutex::new(()),
                auth: Mutex::new(()),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The configured dispatch mode.
    pub fn mode(&self) -> DispatchMode {
        self.inner.mode
    }

    /// The underlying HTTP client (for auxiliary flows such as TR-064
    /// digest requests that bypass session dispatch).
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// The currently held session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// How many invocations are currently in flight or queued.
    pub fn pending_invocations(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    /// Establish a session now instead of on the first invocation.
    ///
    /// Reuses the held session when one exists.
    pub async fn login(&self) -> Result<Session, Error> {
        self.ensure_session(None).await
    }

    /// End the held session, if any.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(held) = self.inner.session.write().await.take() else {
            return Ok(());
        };
        session::logout(&self.inner.http, &self.inner.base_url, &held.sid).await
    }

    /// Dispatch a command and return the raw response body.
    ///
    /// Takes a queue turn in serialized mode, injects the session token,
    /// and performs the single re-authentication retry when the gateway
    /// rejects the session mid-flight.
    pub async fn execute(&self, command: &AhaCommand) -> Result<String, Error> {
        self.dispatch(Call::Switch(command)).await
    }

    /// Dispatch a `data.lua` form post through the same machinery.
    pub(crate) async fn execute_data(&self, form: &[(&str, String)]) -> Result<String, Error> {
        self.dispatch(Call::Data(form)).await
    }

    // ── Dispatch pipeline ────────────────────────────────────────────

    async fn dispatch(&self, call: Call<'_>) -> Result<String, Error> {
        let _pending = PendingGuard::arm(&self.inner.pending);
        match self.inner.mode {
            DispatchMode::Serialized => {
                let _turn = self.inner.chain.lock().await;
                self.dispatch_with_reauth(call).await
            }
            DispatchMode::Concurrent => self.dispatch_with_reauth(call).await,
        }
    }

    /// One attempt, plus exactly one retry behind a fresh session.
    async fn dispatch_with_reauth(&self, call: Call<'_>) -> Result<String, Error> {
        let session = self.active_session().await?;
        match self.send(call, &session).await {
            Err(err) if err.is_session_invalid() => {
                debug!(command = call.label(), "session rejected, re-authenticating");
                let fresh = self.ensure_session(Some(&session.sid)).await?;
                match self.send(call, &fresh).await {
                    Ok(body) => Ok(body),
                    Err(err) => {
                        // A failed retry leaves nothing trustworthy
                        // behind; the next invocation authenticates
                        // from scratch.
                        self.inner.session.write().await.take();
                        Err(err)
                    }
                }
            }
            other => other,
        }
    }

    async fn active_session(&self) -> Result<Session, Error> {
        if let Some(session) = self.inner.session.read().await.clone() {
            return Ok(session);
        }
        self.ensure_session(None).await
    }

    /// Single-flight (re-)authentication.
    ///
    /// Callers name the SID they saw rejected; if another caller already
    /// replaced it while we waited for the flight lock, that replacement
    /// is reused without hitting the login endpoint again. A failed
    /// login empties the slot.
    async fn ensure_session(&self, rejected: Option<&SessionId>) -> Result<Session, Error> {
        let _flight = self.inner.auth.lock().await;

        if let Some(current) = self.inner.session.read().await.clone() {
            if rejected != Some(&current.sid) {
                return Ok(current);
            }
        }

        match session::authenticate(&self.inner.http, &self.inner.base_url, &self.inner.credentials)
            .await
        {
            Ok(fresh) => {
                *self.inner.session.write().await = Some(fresh.clone());
                Ok(fresh)
            }
            Err(err) => {
                self.inner.session.write().await.take();
                Err(err)
            }
        }
    }

    async fn send(&self, call: Call<'_>, session: &Session) -> Result<String, Error> {
        let request = match call {
            Call::Switch(command) => {
                debug!(
                    command = command.name(),
                    ain = command.ain(),
                    "dispatching gateway command"
                );
                self.inner.http.get(self.command_url(command, &session.sid)?)
            }
            Call::Data(form) => {
                debug!("posting data.lua form");
                let url = self
                    .inner
                    .base_url
                    .join("data.lua")
                    .map_err(Error::InvalidUrl)?;
                let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(form.len() + 1);
                pairs.push(("sid", session.sid.as_str()));
                pairs.extend(form.iter().map(|(k, v)| (*k, v.as_str())));
                self.inner.http.post(url).form(&pairs)
            }
        };

        let resp = request.send().await.map_err(Error::Transport)?;
        classify_response(call.label(), resp).await
    }

    fn command_url(&self, command: &AhaCommand, sid: &SessionId) -> Result<Url, Error> {
        let mut url = self
            .inner
            .base_url
            .join("webservices/homeautoswitch.lua")
            .map_err(Error::InvalidUrl)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sid", sid.as_str());
            query.append_pair("switchcmd", command.name());
            if let Some(ain) = command.ain() {
                query.append_pair("ain", ain);
            }
            if let Some(param) = command.param() {
                query.append_pair("param", param);
            }
        }
        Ok(url)
    }
}

impl std::fmt::Debug for AhaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AhaClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("mode", &self.inner.mode)
            .field("pending", &self.pending_invocations())
            .finish_non_exhaustive()
    }
}

/// Classify a gateway response into a body or an error.
///
/// 403 and login-page/zero-SID bodies both mean the session is gone and
/// share the re-auth path; the literal `inval` body is the gateway's
/// answer to unknown actors and bad parameters.
async fn classify_response(command: &str, resp: reqwest::Response) -> Result<String, Error> {
    let status = resp.status();
    if status == StatusCode::FORBIDDEN {
        return Err(Error::SessionInvalid);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            command: command.to_owned(),
            message: format!("HTTP {status}: {}", session::preview(&body)),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;
    if let Some(err) = session::session_rejection(&body) {
        return Err(err);
    }
    if body.trim() == "inval" {
        return Err(Error::Api {
            command: command.to_owned(),
            message: "gateway reports an invalid actor or parameter".into(),
        });
    }

    trace!(command, bytes = body.len(), "gateway response");
    Ok(body)
}

/// RAII in-flight counter: increments on arm, decrements on every exit.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn arm(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
