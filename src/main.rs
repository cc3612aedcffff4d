//! Console control surface: Enter toggles the session, `q` quits.

use std::io::BufRead;
use std::sync::mpsc;
use std::time::Duration;

use live_interpreter::config::{get_config_path, load_config};
use live_interpreter::{CpalBackend, GeminiLiveTransport, LiveSessionController};

enum Command {
    Toggle,
    Quit,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config();
    if config.gemini_api_key.trim().is_empty() {
        eprintln!(
            "No Gemini API key. Set GEMINI_API_KEY or add \"gemini_api_key\" to {}",
            get_config_path().display()
        );
    }

    let transport = GeminiLiveTransport::new(config.gemini_api_key.clone(), config.model.clone());
    let mut controller = LiveSessionController::new(CpalBackend::new(), transport, config.settings());
    let status_rx = controller.subscribe();

    let (cmd_tx, cmd_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let cmd = if line.trim().eq_ignore_ascii_case("q") {
                Command::Quit
            } else {
                Command::Toggle
            };
            if cmd_tx.send(cmd).is_err() {
                break;
            }
        }
        let _ = cmd_tx.send(Command::Quit);
    });

    println!(
        "Live translation to {} (voice {}). Press Enter to start/stop, q to quit.",
        config.target_language, config.voice
    );

    loop {
        controller.pump(Duration::from_millis(20));

        for status in status_rx.try_iter() {
            println!("[{}]", status);
        }

        match cmd_rx.try_recv() {
            Ok(Command::Toggle) => {
                if let Err(e) = controller.toggle(config.session_config()) {
                    println!("[Error: {}]", e);
                }
            }
            Ok(Command::Quit) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }
    }

    controller.stop();
    Ok(())
}
