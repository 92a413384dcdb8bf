use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::upstream::{UpstreamError, read_body};

const SERVICE: &str = "chat completion";

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// One system + user round trip. Returns the trimmed content of the first
/// choice; an empty completion is an error.
pub async fn chat_completion(
    http: &reqwest::Client,
    ai: &AiConfig,
    system: &str,
    user: &str,
    temperature: f32,
) -> Result<String, UpstreamError> {
    let req = ChatCompletionsRequest {
        model: &ai.model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        temperature,
    };

    let resp = http
        .post(ai.endpoint.clone())
        .bearer_auth(&ai.api_key)
        .json(&req)
        .send()
        .await
        .map_err(|source| UpstreamError::transport(SERVICE, source))?;

    let body = read_body(SERVICE, resp).await?;
    body.ensure_success(SERVICE)?;
    let resp: ChatCompletionsResponse = body.json(SERVICE)?;

    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .ok_or(UpstreamError::EmptyContent { service: SERVICE })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ai_config(server: &MockServer) -> AiConfig {
        AiConfig {
            endpoint: Url::parse(&format!("{}/v4/chat/completions", server.uri())).unwrap(),
            model: "glm-test".to_owned(),
            api_key: "test-key".to_owned(),
        }
    }

    #[tokio::test]
    async fn returns_trimmed_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "glm-test",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "  你好  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let out = chat_completion(&http, &ai_config(&server), "sys", "hello", 0.7)
            .await
            .unwrap();
        assert_eq!(out, "你好");
    }

    #[tokio::test]
    async fn non_success_status_carries_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "rate limited"}})),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = chat_completion(&http, &ai_config(&server), "s", "u", 0.7)
            .await
            .unwrap_err();
        match err {
            UpstreamError::Status {
                status, message, ..
            } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(message.as_deref(), Some("rate limited"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_body_is_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = chat_completion(&http, &ai_config(&server), "s", "u", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NonJson { .. }));
    }

    #[tokio::test]
    async fn blank_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = chat_completion(&http, &ai_config(&server), "s", "u", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::EmptyContent { .. }));
    }
}
