//! Chat backends and the transport that speaks to them.
//!
//! Each backend module owns its wire shapes; `transport` picks one based on
//! the active `BackendConfig` and normalises every outcome into a `ChatResult`.

pub mod companion;
pub mod ollama;
pub mod openai;
pub mod transport;
pub mod types;

pub use transport::{ChatTransport, PreparedRequest};
pub use types::*;
