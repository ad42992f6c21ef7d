//! Wire protocol between the password filter and the decision service.
//!
//! Newline-delimited UTF-8 JSON in both directions:
//! request `{"password": "..."}` (optionally `username`, `op`),
//! response `{"allow": bool, "reason": "..."}`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::CoreError;
use crate::secret::SecretString;

/// Longest accepted request line, newline excluded.
pub const MAX_REQUEST_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Ok,
    Compromised,
    BadRequest,
    NoCredential,
    ApiError,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Ok => "ok",
            Reason::Compromised => "compromised",
            Reason::BadRequest => "bad_request",
            Reason::NoCredential => "no_credential",
            Reason::ApiError => "api_error",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub allow: bool,
    pub reason: Reason,
}

impl DecisionResponse {
    pub fn bad_request() -> Self {
        Self {
            allow: false,
            reason: Reason::BadRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordOp {
    Change,
    Reset,
}

/// An inbound request. Only `password` is required; the filter also sends
/// the account name and whether this is a change or an administrative reset.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub password: SecretString,
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    op: Option<String>,
}

impl DecisionRequest {
    pub fn op(&self) -> Option<PasswordOp> {
        match self.op.as_deref() {
            Some("change") => Some(PasswordOp::Change),
            Some("reset") | Some("set") => Some(PasswordOp::Reset),
            _ => None,
        }
    }
}

/// Optional fields of the wrong type are ignored rather than failing the request.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_owned))
}

/// Why a line could not be decoded. Carries no input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRequest {
    NotUtf8,
    Syntax,
    Shape,
    Oversized,
}

impl fmt::Display for MalformedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            MalformedRequest::NotUtf8 => "not utf-8",
            MalformedRequest::Syntax => "invalid json",
            MalformedRequest::Shape => "missing string password",
            MalformedRequest::Oversized => "line too long",
        };
        f.write_str(value)
    }
}

pub fn decode_request(line: &[u8]) -> Result<DecisionRequest, MalformedRequest> {
    if line.len() > MAX_REQUEST_LINE {
        return Err(MalformedRequest::Oversized);
    }
    let text = std::str::from_utf8(line).map_err(|_| MalformedRequest::NotUtf8)?;
    if !text.trim_start().starts_with('{') {
        // serde would accept a JSON array in place of the object.
        return Err(match serde_json::from_str::<serde::de::IgnoredAny>(text) {
            Ok(_) => MalformedRequest::Shape,
            Err(_) => MalformedRequest::Syntax,
        });
    }
    serde_json::from_str(text).map_err(|err| match err.classify() {
        serde_json::error::Category::Data => MalformedRequest::Shape,
        _ => MalformedRequest::Syntax,
    })
}

pub fn encode_response(response: &DecisionResponse) -> String {
    let mut line = serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"allow":false,"reason":"bad_request"}"#.to_string()
    });
    line.push('\n');
    line
}

#[derive(Serialize)]
struct OutboundRequest<'a> {
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

/// Sends one request over an already connected stream and reads one response line.
pub async fn exchange<S>(
    stream: S,
    password: &SecretString,
    username: Option<&str>,
) -> Result<DecisionResponse, CoreError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = zeroize::Zeroizing::new(
        serde_json::to_string(&OutboundRequest {
            password: password.expose_secret(),
            username,
        })
        .map_err(|err| CoreError::Ipc(format!("serialize request: {err}")))?,
    );
    payload.push('\n');

    let mut stream = BufReader::new(stream);
    stream
        .get_mut()
        .write_all(payload.as_bytes())
        .await
        .map_err(|err| CoreError::Ipc(format!("write request: {err}")))?;
    stream
        .get_mut()
        .flush()
        .await
        .map_err(|err| CoreError::Ipc(format!("flush request: {err}")))?;

    let mut line = String::new();
    let read = stream
        .read_line(&mut line)
        .await
        .map_err(|err| CoreError::Ipc(format!("read response: {err}")))?;
    if read == 0 {
        return Err(CoreError::Ipc("service closed the connection".to_string()));
    }
    serde_json::from_str(line.trim_end())
        .map_err(|err| CoreError::Ipc(format!("parse response: {err}")))
}

/// Connects to the service endpoint and performs one exchange.
pub async fn send_request(
    endpoint: &str,
    password: &SecretString,
    username: Option<&str>,
) -> Result<DecisionResponse, CoreError> {
    let stream = connect(endpoint).await?;
    exchange(stream, password, username).await
}

#[cfg(unix)]
async fn connect(endpoint: &str) -> Result<tokio::net::UnixStream, CoreError> {
    tokio::net::UnixStream::connect(endpoint)
        .await
        .map_err(|err| CoreError::Ipc(format!("connect to service at {endpoint}: {err}")))
}

#[cfg(windows)]
async fn connect(
    endpoint: &str,
) -> Result<tokio::net::windows::named_pipe::NamedPipeClient, CoreError> {
    use std::time::Duration;
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    for _ in 0..20 {
        match ClientOptions::new().open(endpoint) {
            Ok(client) => return Ok(client),
            Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) => {
                return Err(CoreError::Ipc(format!(
                    "connect to service at {endpoint}: {err}"
                )))
            }
        }
    }
    Err(CoreError::Ipc(format!("service pipe {endpoint} stayed busy")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_well_formed_request() {
        let request =
            decode_request(br#"{"password":"Correct1","username":"CORP\\alice","op":"change"}"#)
                .unwrap();
        assert_eq!(request.password.expose_secret(), "Correct1");
        assert_eq!(request.username.as_deref(), Some("CORP\\alice"));
        assert_eq!(request.op(), Some(PasswordOp::Change));
    }

    #[test]
    fn test_decode_ignores_extra_and_mistyped_optional_fields() {
        let request = decode_request(br#"{"password":"x","username":42,"extra":[1]}"#).unwrap();
        assert_eq!(request.password.expose_secret(), "x");
        assert!(request.username.is_none());
        assert!(request.op().is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert_eq!(decode_request(b"not json").unwrap_err(), MalformedRequest::Syntax);
        assert_eq!(decode_request(b"{}").unwrap_err(), MalformedRequest::Shape);
        assert_eq!(
            decode_request(br#"{"password": 5}"#).unwrap_err(),
            MalformedRequest::Shape
        );
        assert_eq!(
            decode_request(br#"{"password": null}"#).unwrap_err(),
            MalformedRequest::Shape
        );
        assert_eq!(decode_request(b"[\"pw\"]").unwrap_err(), MalformedRequest::Shape);
        assert_eq!(decode_request(&[0xff, 0xfe]).unwrap_err(), MalformedRequest::NotUtf8);
        let long = vec![b' '; MAX_REQUEST_LINE + 1];
        assert_eq!(decode_request(&long).unwrap_err(), MalformedRequest::Oversized);
    }

    #[test]
    fn test_response_wire_format() {
        let response = DecisionResponse {
            allow: false,
            reason: Reason::ApiError,
        };
        assert_eq!(
            encode_response(&response),
            "{\"allow\":false,\"reason\":\"api_error\"}\n"
        );
        assert_eq!(
            encode_response(&DecisionResponse::bad_request()),
            "{\"allow\":false,\"reason\":\"bad_request\"}\n"
        );
    }

    #[tokio::test]
    async fn test_exchange_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let responder = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            let request = decode_request(line.trim_end().as_bytes()).unwrap();
            assert_eq!(request.password.expose_secret(), "pw\"quoted");
            assert_eq!(request.username.as_deref(), Some("bob"));
            let reply = encode_response(&DecisionResponse {
                allow: true,
                reason: Reason::Ok,
            });
            server.get_mut().write_all(reply.as_bytes()).await.unwrap();
        });

        let response = exchange(client, &SecretString::from("pw\"quoted"), Some("bob"))
            .await
            .unwrap();
        assert!(response.allow);
        assert_eq!(response.reason, Reason::Ok);
        responder.await.unwrap();
    }
}
