pub mod live_translate;

pub use live_translate::{GeminiLiveTransport, RemoteSession};
