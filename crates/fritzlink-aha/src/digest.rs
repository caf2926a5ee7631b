// HTTP digest authentication (RFC 2617, MD5)
//
// The gateway's secondary SOAP surface sits behind digest auth rather
// than session tokens. This module keeps the challenge state for one
// endpoint: inject an Authorization header while a challenge is held,
// bump the nonce counter per request, and reset it whenever the server
// rotates the nonce. Retry policy is one retry per request, driven by
// [`send_with_digest`].

use std::sync::Mutex;

use md5::{Digest, Md5};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::session::Credentials;

/// Where the interceptor stands with the protected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPhase {
    /// No challenge seen yet; requests go out bare.
    NoChallenge,
    /// A challenge is held; requests carry an Authorization header.
    Challenged,
    /// The server accepted a digest-authorized request.
    Authorized,
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub stale: bool,
}

impl DigestChallenge {
    /// The qop value we answer with: `auth` when offered, else none
    /// (RFC 2069 compatibility mode).
    fn preferred_qop(&self) -> Option<&str> {
        self.qop
            .as_deref()?
            .split(',')
            .map(str::trim)
            .find(|q| *q == "auth")
    }
}

/// Parse the value of a `WWW-Authenticate` header.
///
/// Splits on commas outside quoted strings; `qop` may be a quoted list.
pub fn parse_challenge(header: &str) -> Result<DigestChallenge, Error> {
    let rest = header
        .trim_start()
        .strip_prefix("Digest")
        .or_else(|| header.trim_start().strip_prefix("digest"))
        .ok_or_else(|| rejected("challenge is not a Digest scheme"))?;

    let mut realm = None;
    let mut nonce = None;
    let mut qop = None;
    let mut opaque = None;
    let mut stale = false;

    for part in split_unquoted_commas(rest) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_owned();
        match key.trim().to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "nonce" => nonce = Some(value),
            "qop" => qop = Some(value),
            "opaque" => opaque = Some(value),
            "stale" => stale = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    Ok(DigestChallenge {
        realm: realm.ok_or_else(|| rejected("challenge has no realm"))?,
        nonce: nonce.ok_or_else(|| rejected("challenge has no nonce"))?,
        qop,
        opaque,
        stale,
    })
}

fn split_unquoted_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

struct DigestState {
    phase: DigestPhase,
    challenge: Option<DigestChallenge>,
    /// Requests answered under the current nonce.
    nonce_count: u32,
}

/// Challenge-state holder for one digest-protected endpoint.
///
/// Thread-safe; the transport hook calls [`decorate`](Self::decorate)
/// before each request and [`send_with_digest`] drives the retry.
pub struct DigestInterceptor {
    credentials: Credentials,
    state: Mutex<DigestState>,
}

impl DigestInterceptor {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: Mutex::new(DigestState {
                phase: DigestPhase::NoChallenge,
                challenge: None,
                nonce_count: 0,
            }),
        }
    }

    pub fn phase(&self) -> DigestPhase {
        self.lock().phase
    }

    /// Before-hook: attach an Authorization header when a challenge is
    /// held. Each call burns one nonce count and a fresh cnonce.
    pub fn decorate(
        &self,
        builder: reqwest::RequestBuilder,
        method: &Method,
        request_uri: &str,
    ) -> reqwest::RequestBuilder {
        match self.authorization(method.as_str(), request_uri) {
            Some(header) => builder.header(AUTHORIZATION, header),
            None => builder,
        }
    }

    /// After-hook for a 401: adopt the (possibly rotated) challenge.
    ///
    /// A nonce change resets the counter; the same nonce keeps counting,
    /// which covers servers that 401 a bad response without rotating.
    pub fn accept_challenge(&self, header: Option<&str>) -> Result<(), Error> {
        let header = header.ok_or_else(|| rejected("401 without a WWW-Authenticate header"))?;
        let fresh = parse_challenge(header)?;

        let mut state = self.lock();
        let rotated = state
            .challenge
            .as_ref()
            .is_none_or(|held| held.nonce != fresh.nonce);
        if rotated {
            trace!(stale = fresh.stale, "adopting rotated digest nonce");
            state.nonce_count = 0;
        }
        state.challenge = Some(fresh);
        state.phase = DigestPhase::Challenged;
        Ok(())
    }

    /// After-hook for a success: a digest-authorized request went
    /// through.
    pub fn note_authorized(&self) {
        let mut state = self.lock();
        if state.challenge.is_some() {
            state.phase = DigestPhase::Authorized;
        }
    }

    fn authorization(&self, method: &str, request_uri: &str) -> Option<String> {
        let mut state = self.lock();
        if state.challenge.is_none() {
            return None;
        }
        state.nonce_count += 1;
        let nc = state.nonce_count;
        let challenge = state.challenge.as_ref()?;

        let qop = challenge.preferred_qop();
        let cnonce = random_cnonce();
        let response = digest_response(
            &self.credentials.username,
            &self.credentials.password,
            &challenge.realm,
            &challenge.nonce,
            method,
            request_uri,
            qop,
            nc,
            &cnonce,
        );

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm=MD5, response=\"{}\"",
            self.credentials.username, challenge.realm, challenge.nonce, request_uri, response,
        );
        if let Some(qop) = qop {
            header.push_str(&format!(", qop={qop}, nc={nc:08x}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        Some(header)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DigestState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DigestInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestInterceptor")
            .field("username", &self.credentials.username)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Send a request through an interceptor, retrying exactly once after a
/// fresh challenge. A second consecutive 401 is an authentication
/// failure, not another retry.
pub async fn send_with_digest(
    http: &reqwest::Client,
    interceptor: &DigestInterceptor,
    method: Method,
    url: Url,
) -> Result<reqwest::Response, Error> {
    let request_uri = request_uri(&url);
    let mut challenged = false;

    loop {
        let builder = interceptor.decorate(
            http.request(method.clone(), url.clone()),
            &method,
            &request_uri,
        );
        let resp = builder.send().await.map_err(Error::Transport)?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            interceptor.note_authorized();
            return Ok(resp);
        }
        if challenged {
            return Err(rejected("credentials rejected after challenge retry"));
        }

        debug!(url = %url, "digest challenge received, retrying once");
        let header = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        interceptor.accept_challenge(header.as_deref())?;
        challenged = true;
    }
}

/// The request-URI as it appears in the digest hash: path plus query.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    }
}

/// The RFC 2617 response hash. Pure, so the documented test vector can
/// pin it down.
#[allow(clippy::too_many_arguments)]
pub fn digest_response(
    username: &str,
    password: &SecretString,
    realm: &str,
    nonce: &str,
    method: &str,
    request_uri: &str,
    qop: Option<&str>,
    nonce_count: u32,
    cnonce: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{username}:{realm}:{}",
        password.expose_secret()
    ));
    let ha2 = md5_hex(&format!("{method}:{request_uri}"));
    match qop {
        Some(qop) => md5_hex(&format!(
            "{ha1}:{nonce}:{nonce_count:08x}:{cnonce}:{qop}:{ha2}"
        )),
        None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    }
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

fn random_cnonce() -> String {
    let mut buf = [0u8; 8];
    rand::thread_rng().fill(&mut buf);
    hex::encode(buf)
}

fn rejected(message: &str) -> Error {
    Error::DigestRejected {
        message: message.to_owned(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn creds() -> Credentials {
        Credentials::new("Mufasa", "Circle Of Life")
    }

    #[test]
    fn response_matches_the_rfc_2617_vector() {
        let password = SecretString::from("Circle Of Life".to_owned());
        let response = digest_response(
            "Mufasa",
            &password,
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
            Some("auth"),
            1,
            "0a4f113b",
        );
        assert_eq!(response, "6629fae49393a05397450978507c4ef1");
    }

    #[test]
    fn challenge_parses_quoted_lists_and_flags() {
        let challenge = parse_challenge(
            r#"Digest realm="HTTPS Access", nonce="0BD6D66CD6067B48", qop="auth,auth-int", opaque="5C1EA52D", stale=TRUE, algorithm=MD5"#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "HTTPS Access");
        assert_eq!(challenge.nonce, "0BD6D66CD6067B48");
        assert_eq!(challenge.preferred_qop(), Some("auth"));
        assert_eq!(challenge.opaque.as_deref(), Some("5C1EA52D"));
        assert!(challenge.stale);
    }

    #[test]
    fn challenge_without_nonce_is_rejected() {
        let err = parse_challenge(r#"Digest realm="x""#).unwrap_err();
        assert!(matches!(err, Error::DigestRejected { .. }));

        let err = parse_challenge("Basic realm=\"x\"").unwrap_err();
        assert!(matches!(err, Error::DigestRejected { .. }));
    }

    #[test]
    fn phases_advance_no_challenge_to_authorized() {
        let interceptor = DigestInterceptor::new(creds());
        assert_eq!(interceptor.phase(), DigestPhase::NoChallenge);

        // Bare requests carry no header.
        assert!(interceptor.authorization("GET", "/x").is_none());

        interceptor
            .accept_challenge(Some(r#"Digest realm="r", nonce="n1", qop="auth""#))
            .unwrap();
        assert_eq!(interceptor.phase(), DigestPhase::Challenged);

        assert!(interceptor.authorization("GET", "/x").is_some());
        interceptor.note_authorized();
        assert_eq!(interceptor.phase(), DigestPhase::Authorized);
    }

    #[test]
    fn nonce_rotation_resets_the_counter() {
        let interceptor = DigestInterceptor::new(creds());
        interceptor
            .accept_challenge(Some(r#"Digest realm="r", nonce="n1", qop="auth""#))
            .unwrap();

        let first = interceptor.authorization("GET", "/x").unwrap();
        let second = interceptor.authorization("GET", "/x").unwrap();
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));

        // Same nonce again: counting continues.
        interceptor
            .accept_challenge(Some(r#"Digest realm="r", nonce="n1", qop="auth""#))
            .unwrap();
        let third = interceptor.authorization("GET", "/x").unwrap();
        assert!(third.contains("nc=00000003"));

        // Rotated nonce: counter starts over.
        interceptor
            .accept_challenge(Some(r#"Digest realm="r", nonce="n2", qop="auth""#))
            .unwrap();
        let fourth = interceptor.authorization("GET", "/x").unwrap();
        assert!(fourth.contains("nc=00000001"));
        assert!(fourth.contains("nonce=\"n2\""));
    }

    #[test]
    fn rfc_2069_mode_omits_qop_fields() {
        let interceptor = DigestInterceptor::new(creds());
        interceptor
            .accept_challenge(Some(r#"Digest realm="r", nonce="n1""#))
            .unwrap();
        let header = interceptor.authorization("GET", "/x").unwrap();
        assert!(!header.contains("qop="));
        assert!(!header.contains("cnonce="));
    }
}
