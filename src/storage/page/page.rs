use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use crc32fast::Hasher;

use page_constants::{
    CHECKSUM, EMPTY_SLOT, FREESPACE_POINTER, METADATA_SIZE, NUMBER_OF_SLOTS, SLOT_SIZE,
};

use crate::{
    errors::{DbError, Result},
    storage::tuple::{RecordId, Tuple},
    transaction::TransactionId,
};

pub type TableId = u32;

pub mod page_constants {
    // Constants for the slotted page structure
    // The metadata trailer sits in the last METADATA_SIZE bytes of a page
    pub const METADATA_SIZE: usize = 8;
    // Offsets within the metadata sub array
    pub const CHECKSUM: usize = 0;
    pub const NUMBER_OF_SLOTS: usize = 4;
    pub const FREESPACE_POINTER: usize = 6;

    // A slot is an (offset, length) pair of u16s, growing backwards from the trailer
    pub const SLOT_SIZE: usize = 4;
    pub const EMPTY_SLOT: u16 = u16::MAX;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_number)
    }
}

/// Decoded image of one slotted page.
///
/// Slot indices are stable for the lifetime of a tuple: deleting a tuple
/// empties its slot, and the next insert reuses the first empty slot.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    page_size: usize,
    slots: Vec<Option<Tuple>>,
    dirty: bool,
    dirtied_by: Option<TransactionId>,
}

impl Page {
    pub fn empty(id: PageId, page_size: usize) -> Page {
        Page {
            id,
            page_size,
            slots: Vec::new(),
            dirty: false,
            dirtied_by: None,
        }
    }

    /// Largest tuple an empty page of `page_size` bytes can hold.
    pub fn max_tuple_size(page_size: usize) -> usize {
        page_size.saturating_sub(METADATA_SIZE + SLOT_SIZE)
    }

    pub fn from_bytes(id: PageId, data: &[u8]) -> Result<Page> {
        let page_size = data.len();
        if page_size < METADATA_SIZE {
            return Err(corrupted(id, format!("{} bytes is smaller than the trailer", page_size)));
        }

        // Freshly allocated pages are all zeroes
        if data.iter().all(|byte| *byte == 0) {
            return Ok(Page::empty(id, page_size));
        }

        let trailer = page_size - METADATA_SIZE;
        let metadata = &data[trailer..];

        let stored = LittleEndian::read_u32(&metadata[CHECKSUM..]);
        let computed = checksum(data);
        if stored != computed {
            return Err(corrupted(
                id,
                format!("checksum {:#010x} does not match {:#010x}", stored, computed),
            ));
        }

        let number_of_slots = LittleEndian::read_u16(&metadata[NUMBER_OF_SLOTS..]) as usize;
        if number_of_slots * SLOT_SIZE > trailer {
            return Err(corrupted(id, format!("{} slots overflow the page", number_of_slots)));
        }
        let directory_start = trailer - number_of_slots * SLOT_SIZE;

        let mut slots = Vec::with_capacity(number_of_slots);
        for index in 0..number_of_slots {
            let position = slot_position(trailer, index);
            let offset = LittleEndian::read_u16(&data[position..]);
            let length = LittleEndian::read_u16(&data[position + 2..]) as usize;

            if offset == EMPTY_SLOT {
                slots.push(None);
                continue;
            }

            let start = offset as usize;
            if start + length > directory_start {
                return Err(corrupted(id, format!("slot {} points past the data region", index)));
            }

            let tuple = Tuple::new(Bytes::copy_from_slice(&data[start..start + length]))
                .with_record_id(RecordId::new(id, index as u16));
            slots.push(Some(tuple));
        }

        Ok(Page {
            id,
            page_size,
            slots,
            dirty: false,
            dirtied_by: None,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.page_size];
        let trailer = self.page_size - METADATA_SIZE;

        // Tuples are packed from the start of the page
        let mut freespace_pointer = 0usize;
        for (index, slot) in self.slots.iter().enumerate() {
            let position = slot_position(trailer, index);

            let (offset, length) = match slot {
                Some(tuple) => {
                    let start = freespace_pointer;
                    data[start..start + tuple.len()].copy_from_slice(&tuple.data);
                    freespace_pointer += tuple.len();
                    (start as u16, tuple.len() as u16)
                }
                None => (EMPTY_SLOT, 0),
            };

            LittleEndian::write_u16(&mut data[position..], offset);
            LittleEndian::write_u16(&mut data[position + 2..], length);
        }

        LittleEndian::write_u16(
            &mut data[trailer + NUMBER_OF_SLOTS..],
            self.slots.len() as u16,
        );
        LittleEndian::write_u16(
            &mut data[trailer + FREESPACE_POINTER..],
            freespace_pointer as u16,
        );

        let sum = checksum(&data);
        LittleEndian::write_u32(&mut data[trailer + CHECKSUM..], sum);

        data
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn used_bytes(&self) -> usize {
        let tuple_bytes: usize = self.tuples().map(Tuple::len).sum();
        tuple_bytes + self.slots.len() * SLOT_SIZE + METADATA_SIZE
    }

    pub fn free_space(&self) -> usize {
        self.page_size.saturating_sub(self.used_bytes())
    }

    fn first_empty_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn has_room_for(&self, tuple: &Tuple) -> bool {
        let slot_cost = match self.first_empty_slot() {
            Some(_) => 0,
            None => SLOT_SIZE,
        };

        tuple.len() + slot_cost <= self.free_space()
    }

    /// Stores the tuple in the first empty slot, appending a slot if none is free.
    pub fn insert_tuple(&mut self, tuple: Tuple) -> Result<RecordId> {
        if !self.has_room_for(&tuple) {
            return Err(DbError::PageFull { page: self.id });
        }

        let index = match self.first_empty_slot() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let record_id = RecordId::new(self.id, index as u16);
        self.slots[index] = Some(tuple.with_record_id(record_id));

        Ok(record_id)
    }

    pub fn delete_tuple(&mut self, record_id: &RecordId) -> Result<Tuple> {
        let not_found = DbError::TupleNotFound {
            page: record_id.page_id,
            slot: record_id.slot,
        };

        if record_id.page_id != self.id {
            return Err(not_found);
        }

        let tuple = self
            .slots
            .get_mut(record_id.slot as usize)
            .and_then(Option::take)
            .ok_or(not_found)?;

        // Trailing empty slots give their directory space back
        while let Some(None) = self.slots.last() {
            self.slots.pop();
        }

        Ok(tuple)
    }

    pub fn tuple(&self, slot: u16) -> Option<&Tuple> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten()
    }

    pub fn num_tuples(&self) -> usize {
        self.tuples().count()
    }

    pub fn mark_dirty(&mut self, dirty: bool, txn: Option<TransactionId>) {
        self.dirty = dirty;
        self.dirtied_by = if dirty { txn } else { None };
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Transaction that last dirtied this page, if it is dirty.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }
}

fn slot_position(trailer: usize, index: usize) -> usize {
    trailer - (index + 1) * SLOT_SIZE
}

// Covers every byte except the checksum field itself
fn checksum(data: &[u8]) -> u32 {
    let trailer = data.len() - METADATA_SIZE;
    let mut hasher = Hasher::new();
    hasher.update(&data[..trailer + CHECKSUM]);
    hasher.update(&data[trailer + NUMBER_OF_SLOTS..]);
    hasher.finalize()
}

fn corrupted(page: PageId, detail: String) -> DbError {
    DbError::Corrupted { page, detail }
}
