//! Keyed-field messages exchanged over the channel.
//!
//! The channel carries small dictionaries of numeric field ids to typed
//! values. Which numeric id stands for which logical field is decided by
//! the application (see [`FieldMap`]); both endpoints must agree on it.
//! Every message shape here must match the receiving side byte for byte.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Longest namespace accepted on either side of the channel, in bytes.
pub const MAX_NAMESPACE_LEN: usize = 16;

/// Value carried in the CHUNK_SIZE field of a discovery request.
pub const CHUNK_SIZE_REQUEST: u32 = 1;

/// Numeric identifier of a field in a keyed message.
pub type FieldId = u32;

/// A keyed message as handed to / received from the channel.
pub type KeyedMessage = BTreeMap<FieldId, FieldValue>;

// ── Field values ──────────────────────────────────────────────────────────────

/// One typed value in a keyed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Data(Bytes),
    CString(String),
    Int(i32),
    UInt(u32),
}

impl FieldValue {
    /// Integer view of the value, if it is numeric.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(i64::from(*v)),
            FieldValue::UInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Data(_) => "data",
            FieldValue::CString(_) => "cstring",
            FieldValue::Int(_) => "int",
            FieldValue::UInt(_) => "uint",
        }
    }
}

// ── Field mapping ─────────────────────────────────────────────────────────────

/// Mapping of the logical protocol fields to their numeric wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub chunk_data: FieldId,
    pub chunk_size: FieldId,
    pub chunk_remaining: FieldId,
    pub chunk_namespace: FieldId,
    pub chunk_total: FieldId,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            chunk_data: 0,
            chunk_size: 1,
            chunk_remaining: 2,
            chunk_namespace: 3,
            chunk_total: 4,
        }
    }
}

impl FieldMap {
    /// The message a sender uses to ask for the receiver's chunk size.
    pub fn chunk_size_request(&self) -> KeyedMessage {
        KeyedMessage::from([(self.chunk_size, FieldValue::UInt(CHUNK_SIZE_REQUEST))])
    }

    /// The receiver's answer to a chunk size request.
    pub fn chunk_size_response(&self, chunk_size: u32) -> KeyedMessage {
        KeyedMessage::from([(self.chunk_size, FieldValue::UInt(chunk_size))])
    }
}

// ── Chunk message ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("message is missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} has type {found}, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// One chunk of a transfer, in the shape it travels over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    pub namespace: String,
    /// Chunks still to come after this one.
    pub remaining: u32,
    pub total: u32,
    pub data: Bytes,
}

impl ChunkMessage {
    pub fn to_message(&self, fields: &FieldMap) -> KeyedMessage {
        KeyedMessage::from([
            (fields.chunk_data, FieldValue::Data(self.data.clone())),
            (fields.chunk_remaining, FieldValue::UInt(self.remaining)),
            (fields.chunk_total, FieldValue::UInt(self.total)),
            (fields.chunk_namespace, FieldValue::CString(self.namespace.clone())),
        ])
    }

    pub fn from_message(message: &KeyedMessage, fields: &FieldMap) -> Result<Self, WireError> {
        let namespace = match find(message, fields.chunk_namespace, "namespace")? {
            FieldValue::CString(s) => s.clone(),
            other => return Err(wrong_type("namespace", "cstring", other)),
        };
        let remaining = find_count(message, fields.chunk_remaining, "remaining")?;
        let total = find_count(message, fields.chunk_total, "total")?;
        let data = match find(message, fields.chunk_data, "data")? {
            FieldValue::Data(d) => d.clone(),
            other => return Err(wrong_type("data", "data", other)),
        };

        Ok(Self {
            namespace,
            remaining,
            total,
            data,
        })
    }
}

fn find<'a>(
    message: &'a KeyedMessage,
    id: FieldId,
    field: &'static str,
) -> Result<&'a FieldValue, WireError> {
    message.get(&id).ok_or(WireError::MissingField(field))
}

fn find_count(message: &KeyedMessage, id: FieldId, field: &'static str) -> Result<u32, WireError> {
    let value = find(message, id, field)?;
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| wrong_type(field, "uint", value))
}

fn wrong_type(field: &'static str, expected: &'static str, found: &FieldValue) -> WireError {
    WireError::WrongType {
        field,
        expected,
        found: found.type_name(),
    }
}
