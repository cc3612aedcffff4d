//! Session lifecycle: one live translation session at a time.

mod controller;
mod state;

pub use controller::LiveSessionController;
pub use state::{
    ControllerEvent, LifecycleState, SessionSettings, SessionStats, SessionStatus,
};
