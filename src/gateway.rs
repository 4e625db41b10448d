//! Remote API gateway: the single entry point for card-issuer calls.
//!
//! Resolves the bearer credential from the token store, merges it into the
//! Authorization header, and normalizes error bodies into
//! [`GatewayError::Request`]. Callers never attach Authorization
//! themselves.

use std::sync::Arc;

use regex::Regex;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::config::ApiConfig;
use crate::error::GatewayError;
use crate::onboarding::Profile;
use crate::token::TokenStore;

/// Partner/program identifier header sent on every request.
const PARTNER_HEADER: &str = "x-partner-id";

pub struct ApiGateway {
    client: Client,
    base_url: String,
    partner_id: String,
    tokens: Arc<TokenStore>,
}

impl ApiGateway {
    pub fn new(api: &ApiConfig, tokens: Arc<TokenStore>) -> Self {
        Self {
            client: Client::builder()
                .timeout(api.request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: api.base_url.as_str().trim_end_matches('/').to_string(),
            partner_id: api.partner_id.clone(),
            tokens,
        }
    }

    /// Send a request and return the parsed JSON body.
    ///
    /// The bearer credential is attached only when present, so the same
    /// entry point serves the pre-auth challenge endpoints. Non-success
    /// statuses are normalized: the JSON error body's `message` (then
    /// `error`) field wins, falling back to `"<status> <path>"`. A
    /// successful empty or unparseable body becomes an empty object.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(PARTNER_HEADER, &self.partner_id);
        if let Some(bearer) = self.tokens.credential() {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", bearer.expose_secret()),
            );
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = extract_error_message(&text)
                .unwrap_or_else(|| format!("{} {}", status.as_u16(), path));
            let message = redact_sensitive_detail(&message);
            tracing::debug!(%method, path, status = status.as_u16(), "Gateway request failed");
            return Err(GatewayError::Request {
                status: status.as_u16(),
                message,
                path: path.to_string(),
            });
        }

        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({})))
    }

    /// Fetch the latest user-state snapshot.
    pub async fn fetch_profile(&self) -> Result<Profile, GatewayError> {
        let path = "/v1/users/me";
        let value = self.request(Method::GET, path, None).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Ask the auth service for a signing challenge.
    pub async fn request_nonce(&self, address: &str, chain_id: u64) -> Result<Value, GatewayError> {
        self.request(
            Method::POST,
            "/v1/auth/nonce",
            Some(&json!({ "address": address, "chainId": chain_id })),
        )
        .await
    }

    /// Record the user's terms acceptance.
    pub async fn accept_terms(&self) -> Result<(), GatewayError> {
        self.request(
            Method::POST,
            "/v1/users/terms",
            Some(&json!({ "accepted": true })),
        )
        .await
        .map(|_| ())
    }

    /// Submit the source-of-funds questionnaire answer.
    pub async fn answer_source_of_funds(&self, source: &str) -> Result<(), GatewayError> {
        self.request(
            Method::POST,
            "/v1/users/source-of-funds",
            Some(&json!({ "source": source })),
        )
        .await
        .map(|_| ())
    }

    /// Start phone verification for the given number.
    pub async fn start_phone_verification(&self, phone_number: &str) -> Result<(), GatewayError> {
        self.request(
            Method::POST,
            "/v1/users/phone",
            Some(&json!({ "phoneNumber": phone_number })),
        )
        .await
        .map(|_| ())
    }

    /// Confirm phone verification with the received code.
    pub async fn confirm_phone_verification(&self, code: &str) -> Result<(), GatewayError> {
        self.request(
            Method::POST,
            "/v1/users/phone/verify",
            Some(&json!({ "code": code })),
        )
        .await
        .map(|_| ())
    }

    /// Register the user's configured safe address.
    pub async fn configure_safe(&self, safe_address: &str) -> Result<(), GatewayError> {
        self.request(
            Method::POST,
            "/v1/users/safe",
            Some(&json!({ "safeAddress": safe_address })),
        )
        .await
        .map(|_| ())
    }

    /// Place the card order for a fully onboarded user.
    pub async fn order_card(&self) -> Result<Value, GatewayError> {
        self.request(Method::POST, "/v1/cards", Some(&json!({}))).await
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    for field in ["message", "error"] {
        if let Some(message) = parsed.get(field).and_then(Value::as_str)
            && !message.trim().is_empty()
        {
            return Some(message.trim().to_string());
        }
    }
    None
}

/// Mask bearer/token material before an error message is surfaced.
pub(crate) fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|secret)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::token::{Clock, SystemClock, TokenStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn gateway(base_url: &str, tokens: Arc<TokenStore>) -> ApiGateway {
        let api = ApiConfig {
            base_url: url::Url::parse(base_url).unwrap(),
            partner_id: "partner_test".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        ApiGateway::new(&api, tokens)
    }

    fn token_store() -> Arc<TokenStore> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Arc::new(TokenStore::new(
            Arc::new(MemoryStorage::new()),
            clock,
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn attaches_bearer_only_when_present() {
        let mut server = mockito::Server::new_async().await;
        let anonymous = server
            .mock("GET", "/v1/ping")
            .match_header("authorization", mockito::Matcher::Missing)
            .match_header("x-partner-id", "partner_test")
            .with_body("{}")
            .create_async()
            .await;

        let tokens = token_store();
        let gw = gateway(&server.url(), tokens.clone());
        gw.request(Method::GET, "/v1/ping", None).await.unwrap();
        anonymous.assert_async().await;

        let authed = server
            .mock("GET", "/v1/ping")
            .match_header("authorization", "Bearer abc")
            .with_body("{}")
            .create_async()
            .await;
        tokens.set_credential(Some("abc"), None).unwrap();
        gw.request(Method::GET, "/v1/ping", None).await.unwrap();
        authed.assert_async().await;
    }

    #[tokio::test]
    async fn error_bodies_prefer_message_then_error_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/a")
            .with_status(422)
            .with_body(r#"{"message":"kyc already submitted"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/b")
            .with_status(400)
            .with_body(r#"{"error":"bad address"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/c")
            .with_status(500)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let gw = gateway(&server.url(), token_store());

        let err = gw.request(Method::GET, "/v1/a", None).await.unwrap_err();
        match err {
            GatewayError::Request {
                status, message, path,
            } => {
                assert_eq!(status, 422);
                assert_eq!(message, "kyc already submitted");
                assert_eq!(path, "/v1/a");
            }
            other => panic!("expected Request error, got {other:?}"),
        }

        let err = gw.request(Method::GET, "/v1/b", None).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Request { ref message, .. } if message == "bad address"
        ));

        let err = gw.request(Method::GET, "/v1/c", None).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Request { ref message, .. } if message == "500 /v1/c"
        ));
    }

    #[tokio::test]
    async fn empty_success_body_becomes_empty_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/users/terms")
            .with_status(204)
            .with_body("")
            .create_async()
            .await;

        let gw = gateway(&server.url(), token_store());
        gw.accept_terms().await.unwrap();
    }

    #[tokio::test]
    async fn fetch_profile_decodes_wire_format() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/me")
            .with_body(
                r#"{"id":"usr_7","kycStatus":"approved","isPhoneValidated":true,
                    "termsAccepted":true,"isSourceOfFundsAnswered":true,
                    "safeConfigured":false,"hasCard":false}"#,
            )
            .create_async()
            .await;

        let gw = gateway(&server.url(), token_store());
        let profile = gw.fetch_profile().await.unwrap();
        assert_eq!(profile.id, "usr_7");
        assert!(profile.kyc_status.is_approved());
        assert!(!profile.safe_configured);
    }

    #[test]
    fn redaction_masks_bearer_and_token_material() {
        let message = "refresh failed: bearer eyJabc.def token=abc123 api_key: xyz987";
        let redacted = redact_sensitive_detail(message);
        assert!(!redacted.contains("eyJabc.def"));
        assert!(!redacted.contains("abc123"));
        assert!(!redacted.contains("xyz987"));
    }
}
