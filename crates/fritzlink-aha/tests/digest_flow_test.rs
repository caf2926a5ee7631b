#![allow(clippy::unwrap_used)]
// Integration tests for the digest interceptor retry flow.

use reqwest::Method;
use url::Url;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fritzlink_aha::Credentials;
use fritzlink_aha::digest::{DigestInterceptor, DigestPhase, digest_response, send_with_digest};
use fritzlink_aha::error::Error;

const CHALLENGE: &str =
    r#"Digest realm="HTTPS Access", nonce="7EB52D9A2B02D401", algorithm=MD5, qop="auth""#;

fn interceptor() -> DigestInterceptor {
    DigestInterceptor::new(Credentials::new("dslf-config", "gurkensalat"))
}

#[tokio::test]
async fn first_challenge_is_answered_with_one_retry() {
    let server = MockServer::start().await;

    // Authorized requests succeed; everything else gets the challenge.
    Mock::given(method("GET"))
        .and(path("/tr064/control"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tr064/control"))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE))
        .expect(1)
        .mount(&server)
        .await;

    let auth = interceptor();
    let url = Url::parse(&format!("{}/tr064/control", server.uri())).unwrap();
    let resp = send_with_digest(&reqwest::Client::new(), &auth, Method::GET, url)
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(auth.phase(), DigestPhase::Authorized);
}

#[tokio::test]
async fn retried_request_carries_a_verifiable_response_hash() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tr064/control"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tr064/control"))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE))
        .mount(&server)
        .await;

    let auth = interceptor();
    let url = Url::parse(&format!("{}/tr064/control", server.uri())).unwrap();
    send_with_digest(&reqwest::Client::new(), &auth, Method::GET, url)
        .await
        .unwrap();

    // Recompute the hash from the header's own cnonce and compare.
    let requests = server.received_requests().await.unwrap();
    let header = requests
        .iter()
        .find_map(|r| r.headers.get("authorization"))
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();

    let field = |name: &str| -> String {
        let start = header.find(&format!("{name}=")).unwrap() + name.len() + 1;
        header[start..]
            .trim_start_matches('"')
            .chars()
            .take_while(|c| *c != '"' && *c != ',')
            .collect()
    };

    let expected = digest_response(
        "dslf-config",
        &secrecy::SecretString::from("gurkensalat".to_owned()),
        "HTTPS Access",
        "7EB52D9A2B02D401",
        "GET",
        "/tr064/control",
        Some("auth"),
        1,
        &field("cnonce"),
    );
    assert_eq!(field("response"), expected);
    assert_eq!(field("nc"), "00000001");
}

#[tokio::test]
async fn second_consecutive_challenge_is_an_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tr064/control"))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE))
        .expect(2)
        .mount(&server)
        .await;

    let auth = interceptor();
    let url = Url::parse(&format!("{}/tr064/control", server.uri())).unwrap();
    let err = send_with_digest(&reqwest::Client::new(), &auth, Method::GET, url)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DigestRejected { .. }), "got: {err:?}");
    assert_eq!(auth.phase(), DigestPhase::Challenged);
}

#[tokio::test]
async fn unprotected_endpoints_stay_in_no_challenge() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/open"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let auth = interceptor();
    let url = Url::parse(&format!("{}/open", server.uri())).unwrap();
    send_with_digest(&reqwest::Client::new(), &auth, Method::GET, url)
        .await
        .unwrap();

    assert_eq!(auth.phase(), DigestPhase::NoChallenge);
}
