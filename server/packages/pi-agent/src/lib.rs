//! Editor agent server core.

pub mod cli;
pub mod llm;
pub mod router;
pub mod session_store;
pub mod terminal;
pub mod transport;
