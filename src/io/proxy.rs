//! I/O Proxy
//!
//! A window of `length` bytes starting at `location` in a block file. All
//! positions are relative to the window. The proxy holds a pool slot for its
//! whole life and gives it back when dropped. The proxy holds the file by
//! `&mut`, which ends its scope before the file can be used again.

use crate::error::{Result, StoreError};
use crate::storage::{BlockFile, BlockHooks, NoHooks};

use super::ProxySlot;

/// Scoped handle over one window of a [`BlockFile`]
pub struct IoProxy<'a, H: BlockHooks = NoHooks> {
    file: &'a mut BlockFile<H>,
    /// Absolute location of the window
    location: u64,
    /// Length of the window
    length: u64,
    /// Current position, relative to the window
    position: u64,
    writable: bool,
    /// Pool slot, returned on drop
    slot: Option<ProxySlot>,
}

impl<'a, H: BlockHooks> IoProxy<'a, H> {
    /// Bind a pooled proxy to a window of `file`
    pub fn begin(
        file: &'a mut BlockFile<H>,
        location: u64,
        length: u64,
        writable: bool,
    ) -> Result<Self> {
        if writable && file.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let slot = file.pool().acquire()?;
        Ok(Self {
            file,
            location,
            length,
            position: 0,
            writable,
            slot: Some(slot),
        })
    }

    /// Release the proxy explicitly
    pub fn close(self) {}

    // =========================================================================
    // Window
    // =========================================================================

    /// Absolute location of the window in the file
    pub fn location(&self) -> u64 {
        self.location
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes between the current position and the end of the window
    pub fn remaining(&self) -> u64 {
        self.length - self.position
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Move to an absolute position within the window
    pub fn seek(&mut self, position: u64) -> Result<&mut Self> {
        if position > self.length {
            return Err(StoreError::OutOfBounds {
                offset: position,
                length: 0,
                window: self.length,
            });
        }
        self.position = position;
        Ok(self)
    }

    /// Move forward by `count` bytes
    pub fn skip(&mut self, count: u64) -> Result<&mut Self> {
        self.seek(self.position + count)
    }

    /// Move back to the start of the window
    pub fn reset(&mut self) -> &mut Self {
        self.position = 0;
        self
    }

    /// Absolute location for an access of `width` bytes at the current position
    fn claim(&self, width: u64) -> Result<u64> {
        if self.position + width > self.length {
            return Err(StoreError::OutOfBounds {
                offset: self.position,
                length: width,
                window: self.length,
            });
        }
        Ok(self.location + self.position)
    }

    fn claim_mut(&self, width: u64) -> Result<u64> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        self.claim(width)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn read_u8(&mut self) -> Result<u8> {
        let at = self.claim(1)?;
        let value = self.file.read_u8(at)?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let at = self.claim(2)?;
        let value = self.file.read_u16(at)?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let at = self.claim(4)?;
        let value = self.file.read_i32(at)?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let at = self.claim(4)?;
        let value = self.file.read_u32(at)?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let at = self.claim(8)?;
        let value = self.file.read_i64(at)?;
        self.position += 8;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let at = self.claim(8)?;
        let value = self.file.read_u64(at)?;
        self.position += 8;
        Ok(value)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let at = self.claim(4)?;
        let value = self.file.read_f32(at)?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let at = self.claim(8)?;
        let value = self.file.read_f64(at)?;
        self.position += 8;
        Ok(value)
    }

    /// Read `length` bytes into a new buffer
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        self.read_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Fill `buffer` from the current position
    pub fn read_into(&mut self, buffer: &mut [u8]) -> Result<()> {
        let at = self.claim(buffer.len() as u64)?;
        self.file.read_bytes(at, buffer)?;
        self.position += buffer.len() as u64;
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        let at = self.claim_mut(1)?;
        self.file.write_u8(at, value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        let at = self.claim_mut(2)?;
        self.file.write_u16(at, value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        let at = self.claim_mut(4)?;
        self.file.write_i32(at, value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let at = self.claim_mut(4)?;
        self.file.write_u32(at, value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        let at = self.claim_mut(8)?;
        self.file.write_i64(at, value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let at = self.claim_mut(8)?;
        self.file.write_u64(at, value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        let at = self.claim_mut(4)?;
        self.file.write_f32(at, value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        let at = self.claim_mut(8)?;
        self.file.write_f64(at, value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let at = self.claim_mut(value.len() as u64)?;
        self.file.write_bytes(at, value)?;
        self.position += value.len() as u64;
        Ok(())
    }
}

impl<'a, H: BlockHooks> Drop for IoProxy<'a, H> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.file.pool().release(slot);
        }
    }
}
