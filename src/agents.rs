//! Agent execution: backend contract and the per-task router facade.

pub mod backend;
pub mod router;

pub use backend::{AgentBackend, BackendFactory, BackendRegistry, Chunk, ChunkKind, ChunkStream};
pub use router::{AgentRouter, AgentSettings};
