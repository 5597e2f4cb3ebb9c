//! Resizable MIDI message buffer.
//!
//! A `MidiMessage` owns a byte vector whose length is the allocated capacity
//! and a separate logical `size`. Shrinking only moves `size`; growing past
//! the allocation is the only operation that reallocates, which lets the
//! input callback path reuse one buffer for every message it delivers.

use std::fmt;

use crate::error::{Error, Result};
use crate::status::data_length_for;

#[derive(Clone)]
pub struct MidiMessage {
    data: Vec<u8>,
    size: usize,
}

impl MidiMessage {
    /// Size used by [`MidiMessage::new`], enough for any channel voice message.
    pub const DEFAULT_DATA_SIZE: usize = 3;

    pub fn new() -> Self {
        Self::with_size(Self::DEFAULT_DATA_SIZE)
    }

    /// Zero-filled message of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0; size],
            size,
        }
    }

    /// Copies `bytes` into a new message; the caller keeps its slice.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            size: bytes.len(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Allocated bytes, always `>= size()`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Resize the logical view. Bytes below `min(old, new)` are preserved;
    /// bytes newly exposed by growing read as zero.
    pub fn set_size(&mut self, size: usize) {
        if size > self.data.len() {
            self.data.resize(size, 0);
        }
        if size > self.size {
            self.data[self.size..size].fill(0);
        }
        self.size = size;
    }

    pub fn get(&self, index: usize) -> Result<u8> {
        self.bounds_check(index)?;
        Ok(self.data[index])
    }

    pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
        self.bounds_check(index)?;
        self.data[index] = value;
        Ok(())
    }

    /// Copy the first `length` bytes of `source` into the front of this
    /// message, growing it if it is shorter than `length`.
    pub fn copy_from(&mut self, source: &[u8], length: usize) -> Result<()> {
        if length > source.len() {
            return Err(Error::OutOfRange(format!(
                "length {} exceeds source length {}",
                length,
                source.len()
            )));
        }
        if self.size < length {
            self.set_size(length);
        }
        self.data[..length].copy_from_slice(&source[..length]);
        Ok(())
    }

    /// Copy all of `source` into this message.
    pub fn set_data(&mut self, source: &[u8]) {
        // length == source.len() cannot be out of range
        let _ = self.copy_from(source, source.len());
    }

    /// Make this message an exact copy of `bytes`, including its size.
    ///
    /// Reuses the existing allocation when it is large enough.
    pub fn assign(&mut self, bytes: &[u8]) {
        if bytes.len() > self.data.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.size = bytes.len();
    }

    /// Copy the logical bytes into `dest`, which must hold at least `size()`
    /// bytes. Returns the number of bytes written.
    pub fn copy_into(&self, dest: &mut [u8]) -> Result<usize> {
        if dest.len() < self.size {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} bytes, message size is {}",
                dest.len(),
                self.size
            )));
        }
        dest[..self.size].copy_from_slice(self.as_slice());
        Ok(self.size)
    }

    /// Fresh allocation holding the logical bytes.
    pub fn data_copy(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, u8> {
        self.as_slice().iter()
    }

    /// Status byte with the channel bits masked off (`byte0 & 0xF0`).
    pub fn status(&self) -> Result<u8> {
        self.require(1, "status")?;
        Ok(self.data[0] & 0xF0)
    }

    /// Same as [`MidiMessage::status`]; the command of a channel message.
    pub fn command(&self) -> Result<u8> {
        self.status()
    }

    /// Channel nibble of the status byte (`byte0 & 0x0F`).
    pub fn channel(&self) -> Result<u8> {
        self.require(1, "channel")?;
        Ok(self.data[0] & 0x0F)
    }

    pub fn data1(&self) -> Result<u8> {
        self.require(2, "data1")?;
        Ok(self.data[1])
    }

    pub fn data2(&self) -> Result<u8> {
        self.require(3, "data2")?;
        Ok(self.data[2])
    }

    /// Overwrite this message with a short message.
    ///
    /// Data bytes beyond what `status` takes are ignored; the message is
    /// resized to `1 + data_length_for(status)`.
    pub fn set_message(&mut self, status: u8, data1: u8, data2: u8) -> Result<()> {
        let data_length = data_length_for(status)?;
        if data_length > 0 && data1 > 0x7F {
            return Err(Error::InvalidArgument(format!("data1 out of range: {}", data1)));
        }
        if data_length > 1 && data2 > 0x7F {
            return Err(Error::InvalidArgument(format!("data2 out of range: {}", data2)));
        }

        let bytes = [status, data1, data2];
        self.assign(&bytes[..1 + data_length]);
        Ok(())
    }

    /// Overwrite this message with a channel voice message.
    pub fn set_channel_message(
        &mut self,
        command: u8,
        channel: u8,
        data1: u8,
        data2: u8,
    ) -> Result<()> {
        if !(0x80..0xF0).contains(&command) {
            return Err(Error::InvalidArgument(format!(
                "command out of range: {:#04X}",
                command
            )));
        }
        if channel > 0x0F {
            return Err(Error::InvalidArgument(format!(
                "channel out of range: {}",
                channel
            )));
        }
        self.set_message((command & 0xF0) | channel, data1, data2)
    }

    fn bounds_check(&self, index: usize) -> Result<()> {
        if index >= self.size {
            return Err(Error::OutOfRange(format!(
                "index {} outside message of size {}",
                index, self.size
            )));
        }
        Ok(())
    }

    fn require(&self, len: usize, field: &str) -> Result<()> {
        if self.size < len {
            return Err(Error::OutOfRange(format!(
                "{} needs {} bytes, message size is {}",
                field, len, self.size
            )));
        }
        Ok(())
    }
}

impl Default for MidiMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MidiMessage {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for MidiMessage {}

impl std::hash::Hash for MidiMessage {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl From<&[u8]> for MidiMessage {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for MidiMessage {
    fn from(data: Vec<u8>) -> Self {
        let size = data.len();
        Self { data, size }
    }
}

impl AsRef<[u8]> for MidiMessage {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<'a> IntoIterator for &'a MidiMessage {
    type Item = &'a u8;
    type IntoIter = std::slice::Iter<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MidiMessage: [")?;
        for (i, byte) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", byte)?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiMessage")
            .field("size", &self.size)
            .field("capacity", &self.data.len())
            .field("bytes", &self.as_slice())
            .finish()
    }
}
