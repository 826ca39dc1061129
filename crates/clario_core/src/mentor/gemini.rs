//! Google Generative Language `generateContent` client.

use crate::config::ModelSettings;
use crate::error::AppError;
use crate::mentor::provider::{Conversation, ModelProvider, TurnRole};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn wire_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    }
}

fn build_request<'a>(conversation: &'a Conversation, prompt: &'a str) -> GenerateRequest<'a> {
    let mut contents: Vec<Content<'a>> = conversation
        .history
        .iter()
        .map(|turn| Content {
            role: wire_role(turn.role),
            parts: vec![Part { text: &turn.text }],
        })
        .collect();
    contents.push(Content {
        role: wire_role(TurnRole::User),
        parts: vec![Part { text: prompt }],
    });
    GenerateRequest { contents }
}

fn extract_reply(response: GenerateResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|part| part.text.filter(|text| !text.trim().is_empty()))
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, AppError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::invalid_data(format!("{} is not set", settings.api_key_env))
            })?;

        Self::new(&settings.endpoint, &settings.name, api_key)
    }

    fn new(endpoint: &str, model: &str, api_key: String) -> Result<Self, AppError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| AppError::upstream(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn request_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl ModelProvider for GeminiClient {
    fn send(
        &self,
        conversation: &Conversation,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Option<String>, AppError> {
        let body = build_request(conversation, prompt);
        debug!(
            "sending {} turns to model {}",
            body.contents.len(),
            self.model
        );

        let response = self
            .http
            .post(self.request_url())
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::timeout(format!("model call exceeded {timeout:?}"))
                } else {
                    AppError::upstream(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(AppError::upstream(format!(
                "model returned {status}: {}",
                detail.trim()
            )));
        }

        let parsed: GenerateResponse = response.json().map_err(|err| {
            if err.is_timeout() {
                AppError::timeout(format!("model call exceeded {timeout:?}"))
            } else {
                AppError::upstream(format!("unreadable model response: {err}"))
            }
        })?;

        Ok(extract_reply(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::{GeminiClient, GenerateResponse, build_request, extract_reply};
    use crate::mentor::provider::{Conversation, ModelProvider, Turn, TurnRole};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..read]);
            if let Some(end) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves one canned HTTP response and hands back the raw request.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            sender.send(request).ok();
        });
        (endpoint, receiver)
    }

    fn client(endpoint: &str) -> GeminiClient {
        GeminiClient::new(endpoint, "gemini-test", "test-key".to_string()).unwrap()
    }

    #[test]
    fn send_posts_conversation_and_returns_reply() {
        let (endpoint, requests) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Keep going."}]}}]}"#,
        );

        let reply = client(&endpoint)
            .send(&Conversation::default(), "how am I doing?", Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply.as_deref(), Some("Keep going."));

        let request = requests.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request.starts_with("POST /models/gemini-test:generateContent "));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains("how am I doing?"));
    }

    #[test]
    fn send_without_candidates_is_none() {
        let (endpoint, _requests) = serve_once("200 OK", r#"{"candidates":[]}"#);

        let reply = client(&endpoint)
            .send(&Conversation::default(), "hello", Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply, None);
    }

    #[test]
    fn send_maps_server_error_to_upstream() {
        let (endpoint, _requests) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);

        let err = client(&endpoint)
            .send(&Conversation::default(), "hello", Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.code(), "upstream_error");
        assert!(err.message().contains("500"));
    }

    #[test]
    fn send_maps_silent_server_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let err = client(&endpoint)
            .send(&Conversation::default(), "hello", Duration::from_millis(300))
            .unwrap_err();
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn request_lists_history_then_prompt() {
        let conversation = Conversation {
            history: vec![
                Turn {
                    role: TurnRole::User,
                    text: "hi".to_string(),
                },
                Turn {
                    role: TurnRole::Model,
                    text: "hello".to_string(),
                },
            ],
        };

        let value = serde_json::to_value(build_request(&conversation, "how am I doing?")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "hi" }] },
                    { "role": "model", "parts": [{ "text": "hello" }] },
                    { "role": "user", "parts": [{ "text": "how am I doing?" }] }
                ]
            })
        );
    }

    #[test]
    fn extract_reply_takes_first_candidate_text() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "Keep going." }] } },
                { "content": { "role": "model", "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();

        assert_eq!(extract_reply(response).as_deref(), Some("Keep going."));
    }

    #[test]
    fn extract_reply_is_none_without_candidates() {
        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(extract_reply(empty), None);

        let blocked: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        assert_eq!(extract_reply(blocked), None);
    }
}
