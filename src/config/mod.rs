//! Configuration module for live-interpreter.
//!
//! - `config_struct`: Config struct definition and defaults
//! - `io`: Config loading and saving

mod config_struct;
mod io;

pub use config_struct::Config;
pub use io::{get_config_path, load_config, load_config_from, save_config, save_config_to};
