//! Entry codec.
//!
//! Field rows and queued change messages are stored as bincode blobs; the
//! one-shot notification channel uses a flat JSON array
//! `[op, data, f1, v1, f2, v2, ...]` so other tooling can read it.

use bytes::Bytes;
use serde_json::Value;

use crate::FieldValues;
use crate::KeyOpFieldValues;
use crate::NotificationMessage;
use crate::ProtocolError;
use crate::Result;

/// Payload published on a table channel to wake consumers.
pub(crate) const WAKEUP_PAYLOAD: &[u8] = b"G";

pub fn encode_row(field_values: &FieldValues) -> Result<Vec<u8>> {
    bincode::serialize(field_values).map_err(|source| {
        ProtocolError::Binary {
            what: "field row",
            source,
        }
        .into()
    })
}

pub fn decode_row(raw: &[u8]) -> Result<FieldValues> {
    bincode::deserialize(raw).map_err(|source| {
        ProtocolError::Binary {
            what: "field row",
            source,
        }
        .into()
    })
}

pub fn encode_message(event: &KeyOpFieldValues) -> Result<Vec<u8>> {
    bincode::serialize(event).map_err(|source| {
        ProtocolError::Binary {
            what: "queued message",
            source,
        }
        .into()
    })
}

pub fn decode_message(raw: &[u8]) -> Result<KeyOpFieldValues> {
    bincode::deserialize(raw).map_err(|source| {
        ProtocolError::Binary {
            what: "queued message",
            source,
        }
        .into()
    })
}

pub fn encode_notification(
    operation: &str,
    data: &str,
    field_values: &[(String, String)],
) -> Result<Bytes> {
    let mut items = Vec::with_capacity(2 + field_values.len() * 2);
    items.push(Value::String(operation.to_string()));
    items.push(Value::String(data.to_string()));
    for (field, value) in field_values {
        items.push(Value::String(field.clone()));
        items.push(Value::String(value.clone()));
    }
    let raw = serde_json::to_vec(&Value::Array(items)).map_err(ProtocolError::from)?;
    Ok(Bytes::from(raw))
}

pub fn decode_notification(
    channel: &str,
    raw: &[u8],
) -> Result<NotificationMessage> {
    let items: Vec<String> = serde_json::from_slice(raw).map_err(ProtocolError::from)?;
    if items.len() < 2 || items.len() % 2 != 0 {
        return Err(ProtocolError::Malformed {
            origin: channel.to_string(),
            detail: format!("expected [op, data, field, value, ...], got {} items", items.len()),
        }
        .into());
    }

    let mut iter = items.into_iter();
    let operation = iter.next().unwrap_or_default();
    let data = iter.next().unwrap_or_default();
    let mut field_values = Vec::new();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        field_values.push((field, value));
    }

    Ok(NotificationMessage {
        operation,
        data,
        field_values,
    })
}
