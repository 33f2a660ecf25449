//! Development server with live reload.
//!
//! Serves the build directory, injects a small client script into every HTML
//! page and pushes reload notifications to connected browsers over a
//! websocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{inject_script, DevServer, DevServerConfig, ServerError};
pub use watcher::FileWatcher;
pub use websocket::{reload_client_script, ReloadHub, ReloadMessage};
