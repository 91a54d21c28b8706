//! Memory Record - The fundamental unit of the substrate
//!
//! Each memory is a namespace-scoped piece of text with:
//! - Type (semantic, episodic, working) and provenance
//! - Tags and free-form metadata
//! - Access statistics feeding recency/frequency scoring
//! - An optional dense vector mirrored into the vector index

mod record;

pub use record::{Memory, MemorySource, MemoryType};
