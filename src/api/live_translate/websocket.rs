//! WebSocket connection and wire format for Gemini Live speech translation

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use std::net::TcpStream;
use std::time::Duration;

use super::types::SessionConfig;
use crate::audio::{AudioFormat, EncodedChunk};

pub type LiveSocket = tungstenite::WebSocket<native_tls::TlsStream<TcpStream>>;

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Create TLS WebSocket connection to Gemini Live API
pub fn connect_websocket(api_key: &str) -> Result<LiveSocket> {
    let ws_url = format!("{}?key={}", LIVE_ENDPOINT, api_key);

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    // Resolve hostname to IP address first
    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    // Blocking with a long timeout during the handshake
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Short read timeout so the worker can interleave reads with outbound audio
pub fn set_socket_short_timeout(socket: &mut LiveSocket, timeout: Duration) -> Result<()> {
    let stream = socket.get_mut();
    let tcp_stream = stream.get_mut();
    tcp_stream.set_read_timeout(Some(timeout))?;
    Ok(())
}

/// System prompt steering the model to act as an interpreter
pub fn build_system_instruction(config: &SessionConfig) -> String {
    let source = config.source_language.trim();
    let mut text = if source.is_empty() || source.eq_ignore_ascii_case("auto") {
        format!(
            "You are a real-time interpreter. Translate everything the user says into {}. ",
            config.target_language
        )
    } else {
        format!(
            "You are a real-time interpreter. The user speaks {}. Translate everything they say into {}. ",
            source, config.target_language
        )
    };

    text.push_str(
        "Speak ONLY the translation. Do NOT answer questions, add commentary, or respond conversationally. ",
    );

    if !config.instructions.trim().is_empty() {
        text.push_str("Additional instructions: ");
        text.push_str(config.instructions.trim());
    }

    text.trim_end().to_string()
}

/// Build the session setup message
pub fn build_setup_message(model: &str, config: &SessionConfig) -> serde_json::Value {
    serde_json::json!({
        "setup": {
            "model": format!("models/{}", model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {
                            "voiceName": config.voice
                        }
                    }
                },
                "thinkingConfig": {
                    "thinkingBudget": 0  // Disable thinking for lower latency
                }
            },
            "systemInstruction": {
                "parts": [{
                    "text": build_system_instruction(config)
                }]
            }
        }
    })
}

/// Send session setup message
pub fn send_setup_message(socket: &mut LiveSocket, model: &str, config: &SessionConfig) -> Result<()> {
    let setup = build_setup_message(model, config);
    socket.write(tungstenite::Message::Text(setup.to_string().into()))?;
    socket.flush()?;
    Ok(())
}

/// Build the realtime input message for one encoded chunk
pub fn build_audio_message(chunk: &EncodedChunk) -> serde_json::Value {
    let b64_audio = general_purpose::STANDARD.encode(chunk.data());
    serde_json::json!({
        "realtimeInput": {
            "mediaChunks": [{
                "data": b64_audio,
                "mimeType": chunk.format().to_mime()
            }]
        }
    })
}

/// Send audio chunk to the WebSocket
pub fn send_audio_chunk(socket: &mut LiveSocket, chunk: &EncodedChunk) -> Result<()> {
    let msg = build_audio_message(chunk);
    socket.write(tungstenite::Message::Text(msg.to_string().into()))?;
    socket.flush()?;
    Ok(())
}

/// What a server message means to the session
#[derive(Debug, PartialEq)]
pub enum ServerMessage {
    SetupComplete,
    /// Synthesized speech, in message order
    Audio(Vec<EncodedChunk>),
    /// Model output was cut off by new user speech
    Interrupted,
    TurnComplete,
    /// Server will drop the connection soon
    GoAway(String),
    Error(String),
    /// Audio turn in which no part could be read (bad base64 or mime type)
    Malformed(String),
    Other,
}

/// Parse one text frame from the server
pub fn parse_server_message(msg: &str) -> ServerMessage {
    let json = match serde_json::from_str::<serde_json::Value>(msg) {
        Ok(json) => json,
        Err(_) => return ServerMessage::Other,
    };

    if json.get("setupComplete").is_some() {
        return ServerMessage::SetupComplete;
    }

    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return ServerMessage::Error(message.to_string());
        }
        return ServerMessage::Error(error.to_string());
    }

    if let Some(go_away) = json.get("goAway") {
        let time_left = go_away
            .get("timeLeft")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        return ServerMessage::GoAway(time_left);
    }

    let Some(server_content) = json.get("serverContent") else {
        return ServerMessage::Other;
    };

    if let Some(parts) = server_content
        .get("modelTurn")
        .and_then(|t| t.get("parts"))
        .and_then(|p| p.as_array())
    {
        let mut chunks = Vec::new();
        let mut last_bad = None;
        for part in parts {
            let Some(inline_data) = part.get("inlineData") else {
                continue;
            };
            let mime = inline_data
                .get("mimeType")
                .and_then(|m| m.as_str())
                .unwrap_or("audio/pcm");
            let Some(data_b64) = inline_data.get("data").and_then(|d| d.as_str()) else {
                continue;
            };

            // A bad part is skipped on its own; its neighbours still play
            let decoded = AudioFormat::from_mime(mime)
                .map_err(|e| e.to_string())
                .and_then(|format| {
                    general_purpose::STANDARD
                        .decode(data_b64)
                        .map(|bytes| EncodedChunk::new(bytes, format))
                        .map_err(|e| format!("bad base64 audio: {}", e))
                });
            match decoded {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    log::warn!("[GeminiLive] Skipping unreadable audio part: {}", e);
                    last_bad = Some(e);
                }
            }
        }
        if !chunks.is_empty() {
            return ServerMessage::Audio(chunks);
        }
        if let Some(e) = last_bad {
            return ServerMessage::Malformed(e);
        }
    }

    if server_content
        .get("interrupted")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return ServerMessage::Interrupted;
    }

    let flag = |key: &str| server_content.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
    if flag("turnComplete") || flag("generationComplete") {
        return ServerMessage::TurnComplete;
    }

    ServerMessage::Other
}
