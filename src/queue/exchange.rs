//! Variable exchange protocol
//!
//! Request/response conversation with a variable server (typically the OPC
//! bridge) over one queue.
//!
//! # Wire Format
//!
//! ```text
//! client: read ,Tag.A,Tag.B
//! server: Tag.A|Tag.A=12.5
//! server: Tag.B|Tag.B=1;2;3
//! server: ReadEnd
//!
//! client: write ,Tag.A=3,Tag.B=4.5
//! server: Tag.A|Tag.A=3
//! server: WriteEnd
//! ```
//!
//! Response values are decoded with [`codec::decode`](crate::codec::decode).
//! A conversation also ends early when the queue reports `CLOSED`.
//!
//! The whole request/response exchange runs under one mutex, so concurrent
//! callers never interleave their lines on the shared queue.

use super::QueueClient;
use crate::codec;
use crate::engine::wire;
use crate::error::{Result, SumoError};
use crate::lock;
use crate::types::{Value, VariableMap};
use std::sync::Mutex;

/// Variable read/write conversations over a single queue
#[derive(Debug)]
pub struct VariableExchange {
    client: Mutex<Option<QueueClient>>,
}

impl VariableExchange {
    /// Take ownership of an open queue
    pub fn new(client: QueueClient) -> Self {
        Self {
            client: Mutex::new(Some(client)),
        }
    }

    /// Read the given tags
    pub fn read_variables<S: AsRef<str>>(&self, names: &[S]) -> Result<VariableMap> {
        let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        self.converse(&format!("read ,{}", names.join(",")), wire::READ_END)
    }

    /// Write the given tag values; returns the values the server echoed back
    pub fn write_variables(&self, values: &VariableMap) -> Result<VariableMap> {
        let pairs: Vec<String> = values
            .iter()
            .map(|(name, value)| format!("{}={}", name, codec::encode(value)))
            .collect();
        self.converse(&format!("write ,{}", pairs.join(",")), wire::WRITE_END)
    }

    /// Close the underlying queue; later conversations fail with
    /// [`SumoError::QueueClosed`]
    pub fn close(&self) {
        if let Some(client) = lock(&self.client).take() {
            client.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.client).is_none()
    }

    fn converse(&self, request: &str, terminator: &str) -> Result<VariableMap> {
        let guard = lock(&self.client);
        let client = guard
            .as_ref()
            .ok_or_else(|| SumoError::QueueClosed("variable exchange".to_string()))?;

        client.send(request).into_result(client.key())?;
        tracing::trace!("Sent request on {}: {}", client.key(), request);

        let mut result = VariableMap::new();
        loop {
            let line = client.read(true);
            if line == terminator {
                break;
            }
            if line == wire::CLOSED {
                tracing::debug!("Queue {} closed before {}", client.key(), terminator);
                break;
            }
            match parse_response_line(&line) {
                Ok((tag, value)) => {
                    result.insert(tag, value);
                }
                Err(e) => tracing::warn!("Skipping response line: {}", e),
            }
        }

        Ok(result)
    }
}

/// Parse one `tag|name=value` response line
pub fn parse_response_line(line: &str) -> Result<(String, Value)> {
    let mut fields = line.split('|');
    let tag = fields.next().unwrap_or_default();
    let value = fields
        .next()
        .and_then(|assignment| assignment.split_once('='))
        .map(|(_, value)| value)
        .ok_or_else(|| SumoError::MalformedLine(line.to_string()))?;
    Ok((tag.to_string(), codec::decode(value)))
}
