//! Realtime recognition client for the DashScope Gummy service.
//!
//! Speaks the duplex WebSocket task protocol: a JSON `run-task` envelope
//! opens the task, audio frames travel as binary messages, and the
//! service replies with JSON events (`task-started`, `result-generated`,
//! `task-finished`, `task-failed`).

use crate::recognition::client::{RecognizerConnector, RecognizerStream};
use crate::recognition::types::{
    FailureReason, IncrementalResult, RecognitionEvent, SessionRequest, Word,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::Message;

/// Timeout for the TCP connect and TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the service to acknowledge the task.
const TASK_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout during the streaming phase; keeps `poll_event` short so
/// the session loop stays responsive to the stop flag.
const POLL_READ_TIMEOUT: Duration = Duration::from_millis(50);

type WsSocket = tungstenite::WebSocket<native_tls::TlsStream<TcpStream>>;

/// Connector for the DashScope realtime endpoint.
pub struct DashScopeConnector;

impl DashScopeConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DashScopeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognizerConnector for DashScopeConnector {
    fn open(&self, request: &SessionRequest) -> Result<Box<dyn RecognizerStream>, FailureReason> {
        let stream = DashScopeStream::open(request)?;
        Ok(Box::new(stream))
    }
}

/// One open recognition task.
pub struct DashScopeStream {
    socket: WsSocket,
    task_id: String,
    finished: bool,
}

impl DashScopeStream {
    fn open(request: &SessionRequest) -> Result<Self, FailureReason> {
        let mut socket = connect_websocket(&request.endpoint, &request.api_key)?;
        let task_id = uuid::Uuid::new_v4().simple().to_string();

        let mut parameters = json!({
            "format": "pcm",
            "sample_rate": 16000,
            "transcription_enabled": true,
            "translation_enabled": !request.target_languages.is_empty(),
            "translation_target_languages": request.target_languages,
            "semantic_punctuation_enabled": request.semantic_punctuation,
        });
        if !request.source_language.is_empty() && request.source_language != "auto" {
            parameters["source_language"] = json!(request.source_language);
        }

        let run_task = json!({
            "header": {
                "action": "run-task",
                "task_id": task_id,
                "streaming": "duplex",
            },
            "payload": {
                "task_group": "audio",
                "task": "asr",
                "function": "recognition",
                "model": request.model,
                "parameters": parameters,
                "input": {},
            },
        });

        socket
            .send(Message::Text(run_task.to_string()))
            .map_err(|e| FailureReason::Network(format!("failed to start task: {}", e)))?;

        wait_for_task_started(&mut socket)?;
        set_read_timeout(&mut socket, POLL_READ_TIMEOUT)?;

        log::info!("recognition task {} started", task_id);
        Ok(Self {
            socket,
            task_id,
            finished: false,
        })
    }

    fn handle_message(&mut self, text: &str) -> Result<Option<RecognitionEvent>, FailureReason> {
        let message: ServerMessage = serde_json::from_str(text)
            .map_err(|e| FailureReason::Unknown(format!("unparseable service message: {}", e)))?;

        match message.header.event.as_str() {
            "result-generated" => {
                let output = message.payload.and_then(|p| p.output);
                Ok(output.map(|output| output.into_event(&message.header.task_id)))
            }
            "task-finished" => {
                self.finished = true;
                Ok(None)
            }
            "task-failed" => {
                self.finished = true;
                Err(classify_task_failure(
                    message.header.error_code.as_deref(),
                    message.header.error_message.as_deref(),
                ))
            }
            // task-started during streaming would be a protocol hiccup;
            // ignore it like any other unknown event.
            other => {
                log::debug!("ignoring service event '{}'", other);
                Ok(None)
            }
        }
    }
}

impl RecognizerStream for DashScopeStream {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), FailureReason> {
        self.socket
            .send(Message::Binary(frame.to_vec()))
            .map_err(|e| FailureReason::Network(format!("failed to send audio frame: {}", e)))
    }

    fn poll_event(&mut self) -> Result<Option<RecognitionEvent>, FailureReason> {
        if self.finished {
            return Ok(None);
        }

        match self.socket.read() {
            Ok(Message::Text(text)) => self.handle_message(&text),
            Ok(Message::Binary(data)) => {
                // The service occasionally wraps JSON in a binary frame.
                match String::from_utf8(data) {
                    Ok(text) => self.handle_message(&text),
                    Err(_) => Ok(None),
                }
            }
            Ok(Message::Close(_)) => {
                self.finished = true;
                Err(FailureReason::Network(
                    "connection closed by server".to_string(),
                ))
            }
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => Ok(None),
            Err(e) => {
                self.finished = true;
                Err(FailureReason::Network(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        if !self.finished {
            let finish_task = json!({
                "header": {
                    "action": "finish-task",
                    "task_id": self.task_id,
                    "streaming": "duplex",
                },
                "payload": { "input": {} },
            });
            if let Err(e) = self.socket.send(Message::Text(finish_task.to_string())) {
                log::debug!("finish-task send failed: {}", e);
            }
        }
        let _ = self.socket.close(None);
        log::info!("recognition task {} closed", self.task_id);
    }
}

/// Establish the TLS WebSocket connection with bearer authentication.
fn connect_websocket(endpoint: &str, api_key: &str) -> Result<WsSocket, FailureReason> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| FailureReason::Network(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    if parsed.scheme() != "wss" {
        return Err(FailureReason::Network(format!(
            "unsupported endpoint scheme '{}'",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| FailureReason::Network("endpoint has no host".to_string()))?
        .to_string();
    let port = parsed.port().unwrap_or(443);

    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()
        .map_err(|e| FailureReason::Network(format!("failed to resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| FailureReason::Network(format!("failed to resolve {}", host)))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|e| FailureReason::Network(format!("connect failed: {}", e)))?;
    tcp_stream
        .set_read_timeout(Some(TASK_START_TIMEOUT))
        .and_then(|_| tcp_stream.set_write_timeout(Some(CONNECT_TIMEOUT)))
        .and_then(|_| tcp_stream.set_nodelay(true))
        .map_err(|e| FailureReason::Network(format!("socket setup failed: {}", e)))?;

    let connector = native_tls::TlsConnector::new()
        .map_err(|e| FailureReason::Network(format!("TLS setup failed: {}", e)))?;
    let tls_stream = connector
        .connect(&host, tcp_stream)
        .map_err(|e| FailureReason::Network(format!("TLS handshake failed: {}", e)))?;

    let mut ws_request = endpoint
        .into_client_request()
        .map_err(|e| FailureReason::Network(format!("invalid WebSocket request: {}", e)))?;
    let bearer = format!("bearer {}", api_key);
    ws_request.headers_mut().insert(
        "Authorization",
        bearer
            .parse()
            .map_err(|_| FailureReason::Auth("API key contains invalid characters".to_string()))?,
    );

    let (socket, _response) = tungstenite::client::client(ws_request, tls_stream).map_err(|e| {
        let text = e.to_string();
        if text.contains("401") || text.contains("403") {
            FailureReason::Auth(text)
        } else {
            FailureReason::Network(format!("WebSocket handshake failed: {}", text))
        }
    })?;

    Ok(socket)
}

/// Block until the service acknowledges the task.
fn wait_for_task_started(socket: &mut WsSocket) -> Result<(), FailureReason> {
    let deadline = Instant::now() + TASK_START_TIMEOUT;

    loop {
        if Instant::now() >= deadline {
            return Err(FailureReason::Network(
                "timed out waiting for task-started".to_string(),
            ));
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Close(frame)) => {
                return Err(FailureReason::Network(format!(
                    "connection closed during task start: {:?}",
                    frame
                )));
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => continue,
            Err(e) => return Err(FailureReason::Network(e.to_string())),
        };

        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(_) => continue,
        };

        match message.header.event.as_str() {
            "task-started" => return Ok(()),
            "task-failed" => {
                return Err(classify_task_failure(
                    message.header.error_code.as_deref(),
                    message.header.error_message.as_deref(),
                ));
            }
            _ => continue,
        }
    }
}

fn set_read_timeout(socket: &mut WsSocket, timeout: Duration) -> Result<(), FailureReason> {
    socket
        .get_mut()
        .get_ref()
        .set_read_timeout(Some(timeout))
        .map_err(|e| FailureReason::Network(format!("failed to set read timeout: {}", e)))
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Map a task-failed report onto the retry taxonomy.
fn classify_task_failure(code: Option<&str>, message: Option<&str>) -> FailureReason {
    let code = code.unwrap_or("");
    let message = message.unwrap_or("task failed");
    let description = if code.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", code, message)
    };

    let lowered = code.to_lowercase();
    if lowered.contains("apikey")
        || lowered.contains("unauthorized")
        || lowered.contains("accessdenied")
        || lowered.contains("invalidparameter.apikey")
    {
        FailureReason::Auth(description)
    } else if lowered.contains("throttl") || lowered.contains("timeout") {
        FailureReason::Network(description)
    } else {
        FailureReason::Unknown(description)
    }
}

// Wire-format structures.

#[derive(Debug, Deserialize)]
struct ServerMessage {
    header: ServerHeader,
    payload: Option<ServerPayload>,
}

#[derive(Debug, Deserialize)]
struct ServerHeader {
    #[serde(default)]
    event: String,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerPayload {
    output: Option<ServerOutput>,
}

#[derive(Debug, Deserialize)]
struct ServerOutput {
    transcription: Option<WireResult>,
    #[serde(default)]
    translations: Vec<WireTranslation>,
}

impl ServerOutput {
    fn into_event(self, task_id: &str) -> RecognitionEvent {
        let mut translations = HashMap::new();
        for translation in self.translations {
            translations.insert(translation.lang.clone(), translation.result.into_result());
        }
        RecognitionEvent {
            request_id: task_id.to_string(),
            transcription: self.transcription.map(WireResult::into_result),
            translations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTranslation {
    #[serde(default)]
    lang: String,
    #[serde(flatten)]
    result: WireResult,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    words: Vec<WireWord>,
    #[serde(default)]
    sentence_end: bool,
    #[serde(default)]
    stash: Option<WireStash>,
}

impl WireResult {
    fn into_result(self) -> IncrementalResult {
        IncrementalResult {
            words: self.words.into_iter().map(WireWord::into_word).collect(),
            is_sentence_end: self.sentence_end,
            stash: self
                .stash
                .map(|stash| stash.words.into_iter().map(WireWord::into_word).collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStash {
    #[serde(default)]
    words: Vec<WireWord>,
}

#[derive(Debug, Deserialize)]
struct WireWord {
    #[serde(default)]
    text: String,
    #[serde(default)]
    punctuation: String,
    #[serde(default)]
    fixed: bool,
}

impl WireWord {
    fn into_word(self) -> Word {
        Word {
            text: format!("{}{}", self.text, self.punctuation),
            is_fixed: self.fixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_generated() {
        let raw = r#"{
            "header": {"event": "result-generated", "task_id": "abc123"},
            "payload": {
                "output": {
                    "transcription": {
                        "sentence_id": 0,
                        "words": [
                            {"text": "他", "fixed": true},
                            {"text": "好", "punctuation": "。", "fixed": false}
                        ],
                        "sentence_end": false
                    },
                    "translations": [
                        {
                            "lang": "en",
                            "sentence_id": 0,
                            "words": [{"text": "hello", "fixed": true}],
                            "sentence_end": true,
                            "stash": {"words": [{"text": "next", "fixed": false}]}
                        }
                    ]
                },
                "usage": {"duration": 3}
            }
        }"#;

        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.header.event, "result-generated");

        let event = message
            .payload
            .unwrap()
            .output
            .unwrap()
            .into_event(&message.header.task_id);
        assert_eq!(event.request_id, "abc123");

        let transcription = event.transcription.unwrap();
        assert_eq!(transcription.words.len(), 2);
        assert_eq!(transcription.words[0].text, "他");
        assert!(transcription.words[0].is_fixed);
        assert_eq!(transcription.words[1].text, "好。");
        assert!(!transcription.words[1].is_fixed);
        assert!(!transcription.is_sentence_end);

        let english = &event.translations["en"];
        assert!(english.is_sentence_end);
        assert_eq!(english.words[0].text, "hello");
        let stash = english.stash.as_ref().unwrap();
        assert_eq!(stash[0].text, "next");
        assert!(!stash[0].is_fixed);
    }

    #[test]
    fn test_parse_task_failed_header() {
        let raw = r#"{
            "header": {
                "event": "task-failed",
                "task_id": "abc",
                "error_code": "InvalidApiKey",
                "error_message": "The API key is invalid"
            }
        }"#;

        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let reason = classify_task_failure(
            message.header.error_code.as_deref(),
            message.header.error_message.as_deref(),
        );
        assert!(matches!(reason, FailureReason::Auth(_)));
    }

    #[test]
    fn test_classify_throttling_as_network() {
        let reason = classify_task_failure(Some("Throttling.RateQuota"), Some("slow down"));
        assert!(matches!(reason, FailureReason::Network(_)));
    }

    #[test]
    fn test_classify_unknown_failure() {
        let reason = classify_task_failure(Some("InternalError"), Some("boom"));
        assert!(matches!(reason, FailureReason::Unknown(_)));
    }

    #[test]
    fn test_classify_without_code() {
        let reason = classify_task_failure(None, None);
        assert_eq!(reason, FailureReason::Unknown("task failed".to_string()));
    }
}
