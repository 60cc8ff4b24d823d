//! Storimp library
//!
//! Saves text notes, links and auto-captured clipboard text into folders, on top
//! of a small asynchronous key-value store shared by the CLI, the clipboard
//! poller and the clipboard bridge.

mod bridge;
mod bus;
mod cli;
mod clipboard;
mod config;
mod errors;
mod helper;
mod messages;
mod note;
mod poller;
mod repository;
mod settings;
mod store;
mod types;

// Re-export key components
pub use bridge::*;
pub use bus::*;
pub use cli::*;
pub use clipboard::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use messages::*;
pub use note::*;
pub use poller::*;
pub use repository::*;
pub use settings::*;
pub use store::*;
pub use types::*;
