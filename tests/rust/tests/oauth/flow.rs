//! Authorization-code flow tests against a mocked provider.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tests::{start_gateway, test_oauth_router, TestGateway};

struct OAuthFixture {
    gateway: TestGateway,
    provider: MockServer,
    temp: TempDir,
}

impl OAuthFixture {
    fn token_path(&self) -> std::path::PathBuf {
        self.temp.path().join("oauth_tokens.json")
    }
}

async fn oauth_gateway() -> OAuthFixture {
    let provider = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let oauth = test_oauth_router(
        &format!("{}/authorize", provider.uri()),
        &format!("{}/token", provider.uri()),
        "http://test.local/oauth/auth/callback",
        &temp.path().join("oauth_tokens.json"),
    );
    let gateway = start_gateway(Some(oauth)).await;
    OAuthFixture {
        gateway,
        provider,
        temp,
    }
}

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Start the flow and pull the issued state out of the redirect.
async fn begin_flow(fixture: &OAuthFixture) -> String {
    let response = no_redirect_client()
        .get(format!("{}/oauth/auth", fixture.gateway.url))
        .send()
        .await
        .expect("auth start request");
    assert_eq!(response.status(), 307);

    let location = response
        .headers()
        .get("location")
        .expect("redirect location")
        .to_str()
        .unwrap();
    let url = Url::parse(location).expect("redirect is a valid URL");
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("redirect carries a state parameter")
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_start_redirects_to_provider() {
    let fixture = oauth_gateway().await;

    let response = no_redirect_client()
        .get(format!("{}/oauth/auth", fixture.gateway.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 307);

    let location = response.headers()["location"].to_str().unwrap();
    let url = Url::parse(location).unwrap();
    assert!(location.starts_with(&format!("{}/authorize", fixture.provider.uri())));

    let params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(params.contains(&("response_type".to_string(), "code".to_string())));
    assert!(params.contains(&("client_id".to_string(), "test-client-id".to_string())));
    assert!(params.contains(&(
        "redirect_uri".to_string(),
        "http://test.local/oauth/auth/callback".to_string()
    )));
    assert!(params.iter().any(|(k, v)| k == "state" && !v.is_empty()));

    fixture.gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_exchanges_code_and_persists_token() {
    let fixture = oauth_gateway().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=test-code"))
        .and(body_string_contains("client_secret=test-client-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued-access-token",
            "token_type": "Bearer",
            "refresh_token": "issued-refresh-token",
            "expires_in": 3600,
            "scope": "mcp"
        })))
        .expect(1)
        .mount(&fixture.provider)
        .await;

    let state = begin_flow(&fixture).await;

    let response = reqwest::get(format!(
        "{}/oauth/auth/callback?code=test-code&state={}",
        fixture.gateway.url, state
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 200);

    let raw = std::fs::read_to_string(fixture.token_path()).expect("token file persisted");
    let token: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(token["access_token"], "issued-access-token");
    assert_eq!(token["refresh_token"], "issued-refresh-token");

    let status: Value = reqwest::get(format!("{}/oauth/auth/status", fixture.gateway.url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["authorized"], true);
    assert_eq!(status["expired"], false);
    assert_eq!(status["scope"], "mcp");

    fixture.gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_rejects_unknown_state() {
    let fixture = oauth_gateway().await;

    let response = reqwest::get(format!(
        "{}/oauth/auth/callback?code=test-code&state=never-issued",
        fixture.gateway.url
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 400);
    assert!(!fixture.token_path().exists());

    fixture.gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn state_is_consumed_by_the_first_callback() {
    let fixture = oauth_gateway().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued-access-token",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&fixture.provider)
        .await;

    let state = begin_flow(&fixture).await;
    let callback = format!(
        "{}/oauth/auth/callback?code=test-code&state={}",
        fixture.gateway.url, state
    );

    let first = reqwest::get(&callback).await.unwrap();
    assert_eq!(first.status(), 200);

    let second = reqwest::get(&callback).await.unwrap();
    assert_eq!(second.status(), 400);

    fixture.gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_denial_is_reported() {
    let fixture = oauth_gateway().await;

    let response = reqwest::get(format!(
        "{}/oauth/auth/callback?error=access_denied&error_description=user%20said%20no",
        fixture.gateway.url
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 400);
    let body = response.text().await.unwrap();
    assert!(body.contains("access_denied"));

    fixture.gateway.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_exchange_is_a_bad_gateway() {
    let fixture = oauth_gateway().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("provider exploded"))
        .mount(&fixture.provider)
        .await;

    let state = begin_flow(&fixture).await;
    let response = reqwest::get(format!(
        "{}/oauth/auth/callback?code=test-code&state={}",
        fixture.gateway.url, state
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 502);
    assert!(!fixture.token_path().exists());

    fixture.gateway.shutdown().await;
}
