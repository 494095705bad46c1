//! Element encoders and decoders.
//!
//! Every element occupies a fixed-size region of a payload's data buffer.
//! Variable-length content (strings) lives in the payload heap and the
//! element stores its `(offset, length)` there. Multi-byte numbers are
//! written in the byte order of the owning file.

use crate::types::ByteOrder;
use crate::{Error, Result};

/// Writes one element into its region.
pub struct Encoder<'a> {
    bytes: &'a mut [u8],
    pos: usize,
    heap: &'a mut Vec<u8>,
    order: ByteOrder,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], heap: &'a mut Vec<u8>, order: ByteOrder) -> Self {
        Self {
            bytes,
            pos: 0,
            heap,
            order,
        }
    }

    /// Byte order of the target file.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Returns an encoder for the `len` bytes at `offset` of this region.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the range is outside the region.
    pub fn sub(&mut self, offset: usize, len: usize) -> Result<Encoder<'_>> {
        let end = region_end(offset, len, self.bytes.len())?;
        Ok(Encoder {
            bytes: &mut self.bytes[offset..end],
            pos: 0,
            heap: &mut *self.heap,
            order: self.order,
        })
    }

    /// Writes a little-endian number, converted to the file byte order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small.
    pub fn write_le(&mut self, le_bytes: &[u8]) -> Result<()> {
        let end = region_end(self.pos, le_bytes.len(), self.bytes.len())?;
        let target = &mut self.bytes[self.pos..end];
        target.copy_from_slice(le_bytes);
        if self.order == ByteOrder::BigEndian {
            target.reverse();
        }
        self.pos = end;
        Ok(())
    }

    /// Writes raw bytes without reordering.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small.
    pub fn write_raw(&mut self, raw: &[u8]) -> Result<()> {
        let end = region_end(self.pos, raw.len(), self.bytes.len())?;
        self.bytes[self.pos..end].copy_from_slice(raw);
        self.pos = end;
        Ok(())
    }

    /// Appends bytes to the heap and stores their location in the element.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small.
    pub fn write_heap(&mut self, data: &[u8]) -> Result<()> {
        let offset = self.heap.len() as u64;
        self.heap.extend_from_slice(data);
        self.write_le(&offset.to_le_bytes())?;
        self.write_le(&(data.len() as u64).to_le_bytes())
    }
}

/// Reads one element from its region.
#[derive(Clone)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    heap: &'a [u8],
    order: ByteOrder,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(bytes: &'a [u8], heap: &'a [u8], order: ByteOrder) -> Self {
        Self {
            bytes,
            pos: 0,
            heap,
            order,
        }
    }

    /// Byte order of the source file.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Returns a decoder for the `len` bytes at `offset` of this region.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the range is outside the region.
    pub fn sub(&self, offset: usize, len: usize) -> Result<Decoder<'a>> {
        let end = region_end(offset, len, self.bytes.len())?;
        Ok(Decoder {
            bytes: &self.bytes[offset..end],
            pos: 0,
            heap: self.heap,
            order: self.order,
        })
    }

    /// Reads `N` bytes and returns them in little-endian order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small.
    pub fn read_le<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = self.read_raw::<N>()?;
        if self.order == ByteOrder::BigEndian {
            out.reverse();
        }
        Ok(out)
    }

    /// Reads `N` bytes as stored.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small.
    pub fn read_raw<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = region_end(self.pos, N, self.bytes.len())?;
        let mut out = [0_u8; N];
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    /// Reads an unsigned integer of `size` bytes, zero-extended.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the region is too small or `size`
    /// is wider than eight bytes.
    pub fn read_uint(&mut self, size: usize) -> Result<u64> {
        if size > 8 {
            return Err(Error::InvalidFormat(format!(
                "integer of {size} bytes is too wide"
            )));
        }
        let end = region_end(self.pos, size, self.bytes.len())?;
        let mut le = [0_u8; 8];
        le[..size].copy_from_slice(&self.bytes[self.pos..end]);
        if self.order == ByteOrder::BigEndian {
            le[..size].reverse();
        }
        self.pos = end;
        Ok(u64::from_le_bytes(le))
    }

    /// Reads an element location and returns the referenced heap bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the location is outside the heap.
    pub fn read_heap(&mut self) -> Result<&'a [u8]> {
        let offset = u64::from_le_bytes(self.read_le()?);
        let len = u64::from_le_bytes(self.read_le()?);
        let heap = self.heap;
        let range = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(len).ok())
            .and_then(|(offset, len)| Some(offset..offset.checked_add(len)?))
            .filter(|range| range.end <= heap.len())
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "heap range {offset}+{len} outside heap of {} bytes",
                    heap.len()
                ))
            })?;
        Ok(&heap[range])
    }
}

fn region_end(offset: usize, len: usize, available: usize) -> Result<usize> {
    offset
        .checked_add(len)
        .filter(|&end| end <= available)
        .ok_or_else(|| {
            Error::InvalidFormat(format!(
                "element range {offset}+{len} exceeds region of {available} bytes"
            ))
        })
}
