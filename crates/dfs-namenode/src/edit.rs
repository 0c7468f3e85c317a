//! Edit records: the unit of the edit log.
//!
//! A record pairs a transaction id with an opaque payload. The log manager
//! never looks inside the payload; the namesystem encodes an [`EditOp`] into
//! it as JSON text so that the log stays replayable by external tooling.

use serde::{Deserialize, Serialize};

use crate::types::{SinkError, TxId};

/// A namespace mutation carried in an edit record payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum EditOp {
    /// Directory path materialization ("mkdir -p").
    #[serde(rename = "MKDIR")]
    Mkdir {
        /// Path exactly as the client supplied it
        path: String,
    },
}

impl EditOp {
    /// Encodes the operation as a JSON payload.
    pub fn encode(&self) -> Result<Vec<u8>, SinkError> {
        serde_json::to_vec(self).map_err(|e| SinkError::Serialization(e.to_string()))
    }

    /// Decodes an operation from a JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self, SinkError> {
        serde_json::from_slice(payload).map_err(|e| SinkError::Serialization(e.to_string()))
    }
}

/// One committed operation in the edit log. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    txid: TxId,
    payload: Vec<u8>,
}

impl EditRecord {
    /// Creates a record for the given transaction.
    pub fn new(txid: TxId, payload: Vec<u8>) -> Self {
        Self { txid, payload }
    }

    /// Transaction id of this record
    pub fn txid(&self) -> TxId {
        self.txid
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decodes the payload as an [`EditOp`].
    pub fn op(&self) -> Result<EditOp, SinkError> {
        EditOp::decode(&self.payload)
    }
}
