use std::fmt;

use bytes::Bytes;

use crate::{RouterError, RouterResult};

/// Полезная нагрузка сообщения.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Строка, как её доставил транспорт.
    Text(String),
    /// Произвольные байты.
    Bytes(Bytes),
    /// Разобранный JSON.
    Json(serde_json::Value),
}

impl Payload {
    /// Разбирает строковую нагрузку как JSON. Остальные варианты
    /// возвращаются без изменений.
    ///
    /// Ошибка разбора не глотается: она возвращается вызывающему.
    pub fn decode_json(
        self,
        channel: &str,
    ) -> RouterResult<Self> {
        match self {
            Payload::Text(text) => serde_json::from_str(&text)
                .map(Payload::Json)
                .map_err(|e| RouterError::Decode {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                }),
            other => Ok(other),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Payload::Text(s) => f.write_str(s),
            Payload::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Payload::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Bytes(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(v))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}
