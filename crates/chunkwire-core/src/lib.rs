//! chunkwire-core — payload codec, chunk planning, assembly and wire types.
//! The async sender and receiver in `chunkwire` build on this crate.

pub mod assembly;
pub mod codec;
pub mod config;
pub mod plan;
pub mod wire;

pub use codec::{deserialize, serialize, Payload, SerializationError, Value};
pub use plan::{plan, PlannedChunk};
pub use wire::{ChunkMessage, FieldId, FieldMap, FieldValue, KeyedMessage, MAX_NAMESPACE_LEN};
