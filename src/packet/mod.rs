use bytes::Bytes;
use thiserror::Error;

/// Malformed packet handed to the buffer.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum PacketError {
    #[error("Packet {0} carries no elements")]
    EmptyPacket(u64),
    #[error("Packet {sequence_number} carries {elements} elements, at most {max_elements} are allowed")]
    TooManyElements {
        sequence_number: u64,
        elements: usize,
        max_elements: usize,
    },
    #[error("Packet {sequence_number} has {actual} bytes of data, expected {expected}")]
    LengthMismatch {
        sequence_number: u64,
        expected: usize,
        actual: usize,
    },
}

/// A run of `elements` consecutive fixed-size elements. Element `i` sits at
/// sequence position `sequence_number + i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_number: u64,
    pub elements: usize,
    pub data: Bytes,
}

impl Packet {
    pub fn new(sequence_number: u64, elements: usize, data: impl Into<Bytes>) -> Self {
        Packet {
            sequence_number,
            elements,
            data: data.into(),
        }
    }

    /// One past the last sequence position covered by this packet. Elements
    /// that would lie past `u64::MAX` are not covered.
    pub fn end(&self) -> u64 {
        self.sequence_number.saturating_add(self.elements as u64)
    }

    /// Bytes of the element at `position`, which must lie inside the packet.
    pub fn element(&self, position: u64, element_size: usize) -> &[u8] {
        let offset = (position - self.sequence_number) as usize * element_size;
        &self.data[offset..offset + element_size]
    }

    pub fn validate(&self, element_size: usize, max_elements: usize) -> Result<(), PacketError> {
        if self.elements == 0 {
            return Err(PacketError::EmptyPacket(self.sequence_number));
        }
        if self.elements > max_elements {
            return Err(PacketError::TooManyElements {
                sequence_number: self.sequence_number,
                elements: self.elements,
                max_elements,
            });
        }
        let expected = self.elements * element_size;
        if self.data.len() != expected {
            return Err(PacketError::LengthMismatch {
                sequence_number: self.sequence_number,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
