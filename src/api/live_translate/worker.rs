//! Socket worker thread for a live translation session
//!
//! The worker owns the websocket. Outbound audio reaches it over a channel and
//! everything the server says goes back out through the event sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tungstenite::Message;

use super::types::{Outbound, RemoteEvent, RemoteEventSink, SessionConfig};
use super::websocket::{
    connect_websocket, parse_server_message, send_audio_chunk, send_setup_message,
    set_socket_short_timeout, LiveSocket, ServerMessage,
};

/// Read timeout while waiting for setup acknowledgment
const SETUP_POLL: Duration = Duration::from_millis(100);
/// Read timeout in the streaming loop; bounds outbound latency
const STREAM_POLL: Duration = Duration::from_millis(20);

pub struct WorkerParams {
    pub api_key: String,
    pub model: String,
    pub config: SessionConfig,
    pub events: RemoteEventSink,
    pub outbound: Receiver<Outbound>,
    pub shutdown: Arc<AtomicBool>,
}

/// How the streaming loop ended
enum Exit {
    Closed,
    Failed(String),
}

fn is_timeout(e: &tungstenite::Error) -> bool {
    matches!(e, tungstenite::Error::Io(io)
        if io.kind() == std::io::ErrorKind::WouldBlock
            || io.kind() == std::io::ErrorKind::TimedOut)
}

fn message_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.as_str().to_string()),
        // The service frequently sends JSON in binary frames
        Message::Binary(data) => String::from_utf8(data.to_vec()).ok(),
        _ => None,
    }
}

/// Run one session to completion. Emits exactly one terminal event.
pub fn run_session_worker(params: WorkerParams) {
    let WorkerParams {
        api_key,
        model,
        config,
        events,
        outbound,
        shutdown,
    } = params;

    log::info!("[GeminiLive] Connecting...");
    let mut socket = match connect_websocket(&api_key) {
        Ok(s) => s,
        Err(e) => {
            events(RemoteEvent::Error(format!("Connection failed: {}", e)));
            return;
        }
    };

    if let Err(e) = send_setup_message(&mut socket, &model, &config) {
        let _ = socket.close(None);
        events(RemoteEvent::Error(format!("Setup failed: {}", e)));
        return;
    }

    match wait_for_setup(&mut socket, &shutdown) {
        Ok(true) => {}
        Ok(false) => {
            let _ = socket.close(None);
            events(RemoteEvent::Closed);
            return;
        }
        Err(e) => {
            let _ = socket.close(None);
            events(RemoteEvent::Error(e));
            return;
        }
    }

    if let Err(e) = set_socket_short_timeout(&mut socket, STREAM_POLL) {
        let _ = socket.close(None);
        events(RemoteEvent::Error(format!("Socket configuration failed: {}", e)));
        return;
    }

    log::info!("[GeminiLive] Session open (voice {})", config.voice);
    events(RemoteEvent::Opened);

    let exit = stream_loop(&mut socket, &events, &outbound, &shutdown);

    let _ = socket.close(None);
    let _ = socket.flush();

    match exit {
        Exit::Closed => {
            log::info!("[GeminiLive] Session closed");
            events(RemoteEvent::Closed);
        }
        Exit::Failed(e) => {
            log::error!("[GeminiLive] Session failed: {}", e);
            events(RemoteEvent::Error(e));
        }
    }
}

/// Ok(true) once the server acknowledges setup, Ok(false) if shut down first
fn wait_for_setup(socket: &mut LiveSocket, shutdown: &AtomicBool) -> Result<bool, String> {
    set_socket_short_timeout(socket, SETUP_POLL).map_err(|e| e.to_string())?;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }

        match socket.read() {
            Ok(Message::Close(frame)) => {
                let close_info = frame
                    .map(|f| format!("code={}, reason={}", f.code, f.reason))
                    .unwrap_or("no frame".to_string());
                return Err(format!("Connection closed by server: {}", close_info));
            }
            Ok(msg) => {
                let Some(text) = message_text(msg) else {
                    continue;
                };
                match parse_server_message(&text) {
                    ServerMessage::SetupComplete => return Ok(true),
                    ServerMessage::Error(e) => return Err(format!("Server returned error: {}", e)),
                    _ => {}
                }
            }
            Err(ref e) if is_timeout(e) => {}
            Err(e) => return Err(format!("Setup failed: {}", e)),
        }
    }
}

fn stream_loop(
    socket: &mut LiveSocket,
    events: &RemoteEventSink,
    outbound: &Receiver<Outbound>,
    shutdown: &AtomicBool,
) -> Exit {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Exit::Closed;
        }

        // Send everything queued, in capture order
        loop {
            match outbound.try_recv() {
                Ok(Outbound::Audio(chunk)) => {
                    if let Err(e) = send_audio_chunk(socket, &chunk) {
                        return Exit::Failed(format!("Send failed: {}", e));
                    }
                }
                Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => return Exit::Closed,
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Close(frame)) => {
                if let Some(f) = frame {
                    log::info!("[GeminiLive] Server closed: code={}, reason={}", f.code, f.reason);
                }
                return Exit::Closed;
            }
            Ok(msg) => {
                let Some(text) = message_text(msg) else {
                    continue;
                };
                match parse_server_message(&text) {
                    ServerMessage::Audio(chunks) => {
                        for chunk in chunks {
                            events(RemoteEvent::Message(chunk));
                        }
                    }
                    ServerMessage::Error(e) => return Exit::Failed(format!("Server error: {}", e)),
                    ServerMessage::Malformed(e) => {
                        log::warn!(
                            "[GeminiLive] Dropping audio turn with no readable parts: {}",
                            e
                        );
                    }
                    ServerMessage::GoAway(time_left) => {
                        log::warn!("[GeminiLive] Server going away in {}", time_left);
                    }
                    ServerMessage::Interrupted => log::debug!("[GeminiLive] Output interrupted"),
                    ServerMessage::TurnComplete => log::debug!("[GeminiLive] Turn complete"),
                    ServerMessage::SetupComplete | ServerMessage::Other => {}
                }
            }
            Err(ref e) if is_timeout(e) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Exit::Closed;
            }
            Err(e) => return Exit::Failed(e.to_string()),
        }
    }
}
