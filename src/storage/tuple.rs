use bincode::{config, Decode, Encode};
use bytes::Bytes;

use crate::{
    errors::{DbError, Result},
    storage::page::page::PageId,
};

/// Location of a stored tuple: its page and slot index within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub data: Bytes,
    // Assigned by the page on insert
    pub record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Tuple {
            data: data.into(),
            record_id: None,
        }
    }

    // Typed rows go through bincode's standard config
    pub fn encode<T: Encode>(value: &T) -> Result<Tuple> {
        let data = bincode::encode_to_vec(value, config::standard())
            .map_err(|err| DbError::Codec(err.to_string()))?;

        Ok(Tuple::new(data))
    }

    pub fn decode<T: Decode<()>>(&self) -> Result<T> {
        let (value, _) = bincode::decode_from_slice(&self.data, config::standard())
            .map_err(|err| DbError::Codec(err.to_string()))?;

        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }
}
