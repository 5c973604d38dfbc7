/*!
 * Copyright (c) 2022 Microsoft Corporation. All rights reserved.
 * Licensed under the MIT License. See LICENSE file in the project root for license information.
 */

//! Little-endian binary encoding used by the dataset file and the
//! distributed bin mapper exchange.

use crate::core::error::{LightGBMError, Result};
use std::io::{self, Read};

/// An interface for serializing binary data to a sink.
pub trait BinaryWriter {
    /// Append data to this binary target
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()>;

    /// Append a single byte
    fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_bytes(&[v])
    }

    /// Append a 32-bit signed integer
    fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Append a 32-bit unsigned integer
    fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Append a 64-bit unsigned integer (the on-disk `size_t`)
    fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Append a 32-bit float
    fn write_f32(&mut self, v: f32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Append a 64-bit float
    fn write_f64(&mut self, v: f64) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Append a block prefixed by its byte length
    fn write_sized_block(&mut self, block: &[u8]) -> io::Result<()> {
        self.write_u64(block.len() as u64)?;
        self.write_bytes(block)
    }
}

impl<W: io::Write> BinaryWriter for W {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }
}

/// Cursor over an in-memory block that fails loudly on short reads.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    offset: usize,
    what: &'a str,
}

impl<'a> BinaryReader<'a> {
    /// Reader over `buf`; `what` names the block in error messages.
    pub fn new(buf: &'a [u8], what: &'a str) -> Self {
        Self { buf, offset: 0, what }
    }

    /// Current offset from the start of the block
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Take the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(LightGBMError::format(format!(
                "{} is incorrect: need {} bytes at offset {}, only {} left",
                self.what,
                n,
                self.offset,
                self.remaining()
            )));
        }
        let out = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a 32-bit signed integer
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a 64-bit unsigned integer
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a 32-bit float
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read a 64-bit float
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a non-negative 32-bit count
    pub fn read_count(&mut self) -> Result<usize> {
        let v = self.read_i32()?;
        usize::try_from(v)
            .map_err(|_| LightGBMError::format(format!("{} has a negative count {}", self.what, v)))
    }

    /// Read `n` 32-bit signed integers
    pub fn read_i32_vec(&mut self, n: usize) -> Result<Vec<i32>> {
        (0..n).map(|_| self.read_i32()).collect()
    }
}

/// Read a `u64` length followed by that many bytes. Any short read is an error.
pub fn read_sized_block<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut size_buf = [0u8; 8];
    reader
        .read_exact(&mut size_buf)
        .map_err(|_| LightGBMError::format(format!("{} has the wrong size", what)))?;
    let size = usize::try_from(u64::from_le_bytes(size_buf))
        .map_err(|_| LightGBMError::format(format!("{} size does not fit in memory", what)))?;
    let mut block = Vec::new();
    let read = reader.take(size as u64).read_to_end(&mut block)?;
    if read != size {
        return Err(LightGBMError::format(format!(
            "{} is incorrect, read count: {}, expected: {}",
            what, read, size
        )));
    }
    Ok(block)
}
