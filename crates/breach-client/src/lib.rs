//! HTTP client for the LoginGuards breach-check API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use loginguards_core::SecretString;
use policy_engine::{BreachCheckError, BreachChecker, Verdict};

const API_KEY_HEADER: &str = "x-api-key";
const CHECK_PATH: &str = "/check/plain";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Field names the API has used for the verdict, in the order they are consulted.
const VERDICT_FIELDS: [&str; 4] = ["compromised", "breached", "is_compromised", "isCompromised"];

#[derive(Debug, Clone)]
pub struct HttpBreachClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CheckBody<'a> {
    password: &'a str,
}

impl HttpBreachClient {
    pub fn new(base_url: &str) -> Result<Self, BreachCheckError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("loginguards/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| BreachCheckError::Transport(err.to_string()))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Best-effort reachability probe; any HTTP answer counts as reachable.
    pub async fn ping(&self, credential: Option<&SecretString>) -> bool {
        let mut request = self.http.head(&self.base_url).timeout(PROBE_TIMEOUT);
        if let Some(credential) = credential {
            request = request.header(API_KEY_HEADER, credential.expose_secret());
        }
        match request.send().await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err.without_url(), "breach API probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl BreachChecker for HttpBreachClient {
    async fn check(
        &self,
        password: &SecretString,
        credential: &SecretString,
        timeout: Duration,
    ) -> Result<Verdict, BreachCheckError> {
        let response = self
            .http
            .post(format!("{}{CHECK_PATH}", self.base_url))
            .header(API_KEY_HEADER, credential.expose_secret())
            .json(&CheckBody {
                password: password.expose_secret(),
            })
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = status_error(response.status()) {
            return Err(err);
        }

        let body: Value = response.json().await.map_err(|err| {
            if err.is_decode() {
                BreachCheckError::MalformedResponse(err.without_url().to_string())
            } else {
                classify_transport(err)
            }
        })?;
        normalize_verdict(&body)
    }
}

fn classify_transport(err: reqwest::Error) -> BreachCheckError {
    if err.is_timeout() {
        BreachCheckError::Timeout
    } else {
        BreachCheckError::Transport(err.without_url().to_string())
    }
}

fn status_error(status: StatusCode) -> Option<BreachCheckError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(BreachCheckError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Some(BreachCheckError::RateLimited),
        status if !status.is_success() => Some(BreachCheckError::Status(status.as_u16())),
        _ => None,
    }
}

/// Reduces the API body to one verdict.
///
/// The first boolean among [`VERDICT_FIELDS`] wins; failing that a numeric
/// `count` (breach occurrences) is used. A body with none of these is an
/// error, never an implicit "clean".
pub fn normalize_verdict(body: &Value) -> Result<Verdict, BreachCheckError> {
    let object = body.as_object().ok_or_else(|| {
        BreachCheckError::MalformedResponse("response body is not an object".to_string())
    })?;
    for field in VERDICT_FIELDS {
        if let Some(compromised) = object.get(field).and_then(Value::as_bool) {
            return Ok(Verdict { compromised });
        }
    }
    if let Some(count) = object.get("count").and_then(Value::as_f64) {
        return Ok(Verdict {
            compromised: count > 0.0,
        });
    }
    Err(BreachCheckError::MalformedResponse(
        "no verdict field in response".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_normalize_known_field_names() {
        assert_eq!(
            normalize_verdict(&json!({"compromised": true})).unwrap(),
            Verdict { compromised: true }
        );
        assert_eq!(
            normalize_verdict(&json!({"breached": false, "compromised": true})).unwrap(),
            Verdict { compromised: true }
        );
        assert_eq!(
            normalize_verdict(&json!({"isCompromised": false})).unwrap(),
            Verdict { compromised: false }
        );
        assert_eq!(
            normalize_verdict(&json!({"is_compromised": true})).unwrap(),
            Verdict { compromised: true }
        );
        assert_eq!(
            normalize_verdict(&json!({"count": 12})).unwrap(),
            Verdict { compromised: true }
        );
        assert_eq!(
            normalize_verdict(&json!({"count": 0})).unwrap(),
            Verdict { compromised: false }
        );
    }

    #[test]
    fn test_normalize_rejects_unknown_shapes() {
        assert!(matches!(
            normalize_verdict(&json!({"status": "fine"})),
            Err(BreachCheckError::MalformedResponse(_))
        ));
        assert!(matches!(
            normalize_verdict(&json!({"compromised": "yes"})),
            Err(BreachCheckError::MalformedResponse(_))
        ));
        assert!(matches!(
            normalize_verdict(&json!([true])),
            Err(BreachCheckError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(status_error(StatusCode::OK), None);
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            Some(BreachCheckError::Unauthorized)
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS),
            Some(BreachCheckError::RateLimited)
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY),
            Some(BreachCheckError::Status(502))
        );
    }

    fn local_client(base: &str) -> HttpBreachClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpBreachClient::with_client(http, base)
    }

    /// Serves exactly one canned HTTP response and returns the raw request it saw.
    async fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let read = socket.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..read]);
                let text = String::from_utf8_lossy(&seen);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|value| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if seen.len() >= header_end + 4 + length {
                        break;
                    }
                }
                if read == 0 {
                    break;
                }
            }
            let reply = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&seen).to_string()
        });
        (base, handle)
    }

    #[tokio::test]
    async fn test_check_sends_credential_header_and_parses_verdict() {
        let (base, server) = one_shot_server("HTTP/1.1 200 OK", r#"{"compromised":true}"#).await;
        let client = local_client(&base);
        let verdict = client
            .check(
                &SecretString::from("hunter2"),
                &SecretString::from("lg_key"),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(verdict.compromised);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /check/plain"));
        assert!(request.to_ascii_lowercase().contains("x-api-key: lg_key"));
        assert!(request.contains(r#"{"password":"hunter2"}"#));
    }

    #[tokio::test]
    async fn test_check_maps_unauthorized() {
        let (base, _server) =
            one_shot_server("HTTP/1.1 401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let client = local_client(&base);
        let err = client
            .check(
                &SecretString::from("hunter2"),
                &SecretString::from("wrong"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err, BreachCheckError::Unauthorized);
    }

    #[tokio::test]
    async fn test_check_unreachable_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = local_client(&base);
        let err = client
            .check(
                &SecretString::from("hunter2"),
                &SecretString::from("lg_key"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BreachCheckError::Transport(_) | BreachCheckError::Timeout
        ));
        assert!(!err.to_string().contains("hunter2"));
    }
}
