//! Chat-driven browser automation.
//!
//! A user describes a task; the agent classifies it, opens a browser and then
//! loops screenshot → model decision → browser action, streaming every step
//! back over a WebSocket.

pub mod analyzer;
pub mod brain;
pub mod classifier;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod extract;
pub mod face;
pub mod hands;
pub mod mock;
pub mod session;
pub mod types;

pub use brain::Brain;
pub use config::{AgentConfig, LaunchConfig, SessionSettings};
pub use error::{ActionError, AgentError, Result};
pub use hands::{BrowserLauncher, ChromeLauncher, PageDriver};
pub use session::{Session, SessionState};
