use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

const SNIPPET_CHARS: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("上游请求失败: {status}{}", detail_suffix(.message))]
    Status {
        service: &'static str,
        status: StatusCode,
        message: Option<String>,
    },
    #[error("{service} 返回非 JSON 响应。")]
    NonJson {
        service: &'static str,
        status: StatusCode,
        snippet: String,
    },
    #[error("{message}")]
    Rejected {
        service: &'static str,
        message: String,
        code: Option<String>,
    },
    #[error("{service} returned no content")]
    EmptyContent { service: &'static str },
    #[error("invalid {service} endpoint: {source}")]
    Endpoint {
        service: &'static str,
        #[source]
        source: url::ParseError,
    },
}

fn detail_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

impl UpstreamError {
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }

    pub fn endpoint(service: &'static str, source: url::ParseError) -> Self {
        Self::Endpoint { service, source }
    }
}

/// A response body that was fully read but not yet interpreted.
#[derive(Debug)]
pub struct RawBody {
    pub status: StatusCode,
    pub bytes: Vec<u8>,
}

pub async fn read_body(service: &'static str, resp: reqwest::Response) -> Result<RawBody, UpstreamError> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|source| UpstreamError::transport(service, source))?;
    Ok(RawBody {
        status,
        bytes: bytes.to_vec(),
    })
}

impl RawBody {
    pub fn ensure_success(&self, service: &'static str) -> Result<(), UpstreamError> {
        if self.status.is_success() {
            return Ok(());
        }
        Err(UpstreamError::Status {
            service,
            status: self.status,
            message: extract_error_message(&self.bytes),
        })
    }

    /// Decodes the body as JSON. Empty and malformed bodies are reported as
    /// [`UpstreamError::NonJson`] and logged with a short snippet.
    pub fn json<T: DeserializeOwned>(&self, service: &'static str) -> Result<T, UpstreamError> {
        serde_json::from_slice::<T>(&self.bytes).map_err(|err| {
            let snippet = truncate_chars_lossy(&self.bytes, SNIPPET_CHARS);
            tracing::warn!(
                service,
                status = %self.status,
                %snippet,
                error = %err,
                "upstream returned non-json body"
            );
            UpstreamError::NonJson {
                service,
                status: self.status,
                snippet,
            }
        })
    }
}

pub fn truncate_chars_lossy(bytes: &[u8], max_chars: usize) -> String {
    let s = String::from_utf8_lossy(bytes);
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push('…');
    }
    out
}

pub fn extract_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    // OpenAI-style: { "error": { "message": "..." } }
    if let Some(msg) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return Some(msg.to_owned());
    }
    // Gateway-style: { "error": "..." }
    if let Some(msg) = value
        .get("error")
        .and_then(|m| m.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return Some(msg.to_owned());
    }
    // Fallback: { "message": "..." } or { "msg": "..." }
    ["message", "msg"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(|m| m.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    })
}

/// Field decoders for provider replies whose scalar types drift between
/// success and error payloads (`null`, numbers sent as strings, ...).
/// Anything that does not fit decodes to the type's default.
pub mod lenient {
    use serde::de::{Deserialize, DeserializeOwned, Deserializer};
    use serde_json::Value;

    pub fn int<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            Value::Bool(b) => i64::from(b),
            _ => 0,
        })
    }

    pub fn float<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Bool(b) => b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    /// `null` or a mismatched shape become `T::default()`.
    pub fn or_default<'de, D, T>(de: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(de)?;
        if value.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Optional code that may arrive as a string or a number.
    pub fn opt_code<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Optional message; objects are searched for `message`/`msg`.
    pub fn opt_message<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(de)?;
        let text = match &value {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => ["message", "msg"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        };
        Ok(text
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_error_message_reads_known_shapes() {
        assert_eq!(
            extract_error_message(br#"{"error":{"message":" bad key "}}"#).as_deref(),
            Some("bad key")
        );
        assert_eq!(
            extract_error_message(br#"{"success":false,"error":"appid not authorized"}"#)
                .as_deref(),
            Some("appid not authorized")
        );
        assert_eq!(
            extract_error_message(r#"{"code":1,"msg":"余额不足"}"#.as_bytes()).as_deref(),
            Some("余额不足")
        );
        assert_eq!(extract_error_message(b"<html>502</html>"), None);
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_chars_lossy("abcdef".as_bytes(), 3), "abc…");
        assert_eq!(truncate_chars_lossy("中文".as_bytes(), 5), "中文");
    }

    #[test]
    fn json_reports_non_json_bodies() {
        let body = RawBody {
            status: StatusCode::OK,
            bytes: b"<html>oops</html>".to_vec(),
        };
        let err = body.json::<Value>("test").unwrap_err();
        assert!(matches!(err, UpstreamError::NonJson { ref snippet, .. } if snippet == "<html>oops</html>"));

        let empty = RawBody {
            status: StatusCode::OK,
            bytes: Vec::new(),
        };
        assert!(matches!(
            empty.json::<Value>("test"),
            Err(UpstreamError::NonJson { .. })
        ));
    }

    #[test]
    fn ensure_success_keeps_provider_message() {
        let body = RawBody {
            status: StatusCode::UNAUTHORIZED,
            bytes: br#"{"error":{"message":"invalid api key"}}"#.to_vec(),
        };
        match body.ensure_success("glm") {
            Err(UpstreamError::Status {
                status, message, ..
            }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message.as_deref(), Some("invalid api key"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_error_shows_provider_message() {
        let body = RawBody {
            status: StatusCode::TOO_MANY_REQUESTS,
            bytes: br#"{"error":{"message":"rate limited"}}"#.to_vec(),
        };
        let err = body.ensure_success("glm").unwrap_err();
        assert_eq!(err.to_string(), "上游请求失败: 429 Too Many Requests (rate limited)");

        let bare = RawBody {
            status: StatusCode::BAD_GATEWAY,
            bytes: b"<html>bad gateway</html>".to_vec(),
        };
        let err = bare.ensure_success("glm").unwrap_err();
        assert_eq!(err.to_string(), "上游请求失败: 502 Bad Gateway");
    }
}
