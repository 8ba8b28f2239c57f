// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::codec;
use crate::codes::{ClientCode, Code, ServerCode};
use crate::error::EncodeError;

/// Process-unique message identifier, used for logging and correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded TPI message.
///
/// Payloads are kept as raw bytes: the protocol is ASCII in practice but
/// nothing on the wire guarantees it.
#[derive(Debug, Clone)]
pub struct Message<C> {
    id: MessageId,
    code: C,
    data: Vec<u8>,
}

/// A command on its way to the panel.
pub type ClientMessage = Message<ClientCode>;

/// A response or event received from the panel.
pub type ServerMessage = Message<ServerCode>;

impl<C: Code> Message<C> {
    pub fn new(code: C, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::next(),
            code,
            data: data.into(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn code(&self) -> C {
        self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn data_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Wire form of this message, delimiter included.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        codec::encode(self.code, &self.data)
    }
}

impl<C: Code> fmt::Display for Message<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            write!(f, "{} ({:03})", self.code.name(), self.code.value())
        } else {
            write!(
                f,
                "{} ({:03}) {}",
                self.code.name(),
                self.code.value(),
                self.data_str()
            )
        }
    }
}

/// `{"name": ..., "value": ...}` view of a code.
struct CodeRef<C>(C);

impl<C: Code> Serialize for CodeRef<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Code", 2)?;
        s.serialize_field("name", self.0.name())?;
        s.serialize_field("value", &self.0.value())?;
        s.end()
    }
}

impl<C: Code> Serialize for Message<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Message", 3)?;
        s.serialize_field("id", &self.id.0)?;
        s.serialize_field("code", &CodeRef(self.code))?;
        s.serialize_field("data", &self.data_str())?;
        s.end()
    }
}
