//! PdfSage chat — Ollama client, prompt construction and the streaming relay.
//!
//! The relay forwards answer fragments from Ollama's NDJSON stream to a
//! downstream sink as they arrive, stopping on client disconnect or server
//! cancellation.

pub mod ollama;
pub mod prompt;
pub mod relay;
pub mod types;

pub use ollama::{ChunkStream, OllamaClient};
pub use relay::{ChannelSink, FragmentSink, RelayOutcome, RelayReport, StreamRelay, WriteSink};
pub use types::*;
