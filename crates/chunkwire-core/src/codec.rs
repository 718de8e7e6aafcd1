//! Payload codec: structured payloads to and from the token stream.
//!
//! A token is one byte. Every field is encoded on its own as
//!
//! ```text
//! [type: u8][key bytes][0x00][value]
//! ```
//!
//! so the receiver can decode each field without any framing beyond the
//! concatenated chunks. Value encodings per type:
//!   Null:   nothing
//!   Bool:   1 byte (0 or 1)
//!   Int:    4 bytes, i32 little-endian
//!   Data:   u16 little-endian length, then the bytes
//!   String: UTF-8 bytes, then 0x00

/// Type marker of an encoded field. Numbering is shared with the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Null = 0,
    Bool = 1,
    Int = 2,
    Data = 3,
    String = 4,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Data),
            4 => Some(Self::String),
            _ => None,
        }
    }
}

/// A single payload value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Data(Vec<u8>),
    String(String),
}

impl Value {
    fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Data(_) => DataType::Data,
            Value::String(_) => DataType::String,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Data(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// Named fields in insertion order. Serialization follows this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    fields: Vec<(String, Value)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. An existing field keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder form of [`Payload::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON rendering, byte arrays become arrays of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(k, v)| {
                let json = match v {
                    Value::Null => serde_json::Value::Null,
                    Value::Bool(b) => serde_json::Value::Bool(*b),
                    Value::Int(i) => serde_json::Value::from(*i),
                    Value::Data(d) => serde_json::Value::from(d.clone()),
                    Value::String(s) => serde_json::Value::String(s.clone()),
                };
                (k.to_string(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

impl TryFrom<serde_json::Value> for Payload {
    type Error = SerializationError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(map) = json else {
            return Err(SerializationError::NotAnObject);
        };

        let mut payload = Payload::new();
        for (key, json) in map {
            let value = json_to_value(&key, json)?;
            payload.insert(key, value);
        }
        Ok(payload)
    }
}

fn json_to_value(key: &str, json: serde_json::Value) -> Result<Value, SerializationError> {
    use serde_json::Value as Json;

    let unsupported = |kind| SerializationError::UnsupportedType {
        field: key.to_string(),
        kind,
    };

    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(b)),
        Json::String(s) => Ok(Value::String(s)),
        Json::Number(n) => n.as_i64().map(Value::Int).ok_or(unsupported("number")),
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Value::Data)
            .ok_or(unsupported("array")),
        Json::Object(_) => Err(unsupported("object")),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializationError {
    #[error("payload must be an object of fields")]
    NotAnObject,
    #[error("field {field:?} has unsupported type {kind}")]
    UnsupportedType { field: String, kind: &'static str },
    #[error("field {field:?}: integer {value} does not fit in 32 bits")]
    IntegerOutOfRange { field: String, value: i64 },
    #[error("field {field:?}: {len} bytes of data exceeds the 65535 byte limit")]
    DataTooLong { field: String, len: usize },
    #[error("field {field:?} contains a NUL byte")]
    InteriorNul { field: String },
    #[error("token stream truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("unknown type marker {marker:#04x} at offset {offset}")]
    UnknownType { marker: u8, offset: usize },
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Serialize a payload into its token stream.
pub fn serialize(payload: &Payload) -> Result<Vec<u8>, SerializationError> {
    let mut out = Vec::new();
    for (key, value) in payload.iter() {
        encode_field(&mut out, key, value)?;
    }
    Ok(out)
}

fn encode_field(out: &mut Vec<u8>, key: &str, value: &Value) -> Result<(), SerializationError> {
    out.push(value.data_type() as u8);
    push_cstring(out, key, key)?;

    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Int(i) => {
            let v = i32::try_from(*i).map_err(|_| SerializationError::IntegerOutOfRange {
                field: key.to_string(),
                value: *i,
            })?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Data(d) => {
            let len = u16::try_from(d.len()).map_err(|_| SerializationError::DataTooLong {
                field: key.to_string(),
                len: d.len(),
            })?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(d);
        }
        Value::String(s) => push_cstring(out, key, s)?,
    }
    Ok(())
}

fn push_cstring(out: &mut Vec<u8>, field: &str, s: &str) -> Result<(), SerializationError> {
    if s.as_bytes().contains(&0) {
        return Err(SerializationError::InteriorNul {
            field: field.to_string(),
        });
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode a complete token stream back into a payload.
pub fn deserialize(tokens: &[u8]) -> Result<Payload, SerializationError> {
    let mut reader = Reader { buf: tokens, pos: 0 };
    let mut payload = Payload::new();

    while !reader.is_empty() {
        let offset = reader.pos;
        let marker = reader.take(1)?[0];
        let data_type =
            DataType::from_u8(marker).ok_or(SerializationError::UnknownType { marker, offset })?;
        let key = reader.cstring()?;

        let value = match data_type {
            DataType::Null => Value::Null,
            DataType::Bool => Value::Bool(reader.take(1)?[0] != 0),
            DataType::Int => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(reader.take(4)?);
                Value::Int(i64::from(i32::from_le_bytes(raw)))
            }
            DataType::Data => {
                let raw = reader.take(2)?;
                let len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
                Value::Data(reader.take(len)?.to_vec())
            }
            DataType::String => Value::String(reader.cstring()?),
        };
        payload.insert(key, value);
    }

    Ok(payload)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SerializationError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(SerializationError::Truncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn cstring(&mut self) -> Result<String, SerializationError> {
        let start = self.pos;
        let nul = self.buf[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(SerializationError::Truncated { offset: start })?;
        let bytes = self.take(nul + 1)?;
        String::from_utf8(bytes[..nul].to_vec())
            .map_err(|_| SerializationError::InvalidUtf8 { offset: start })
    }
}
