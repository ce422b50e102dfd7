//! CLI command implementations.

mod chat;
mod config;
mod dive;
mod doctor;
mod reference;

pub use chat::run_chat;
pub use config::run_config;
pub use dive::run_dive;
pub use doctor::run_doctor;
pub use reference::run_reference;
