//! Binary reading utilities for parsing Thermo RAW structures.
//!
//! `MemoryReader` is the sole access point for any structured load in this
//! crate (file header, run header, scan index, scan events, packets): every
//! decoder reads through one of its typed accessors rather than touching a
//! `&[u8]` directly, so bounds checking only has to live in one place.

use crate::RawError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

/// A cursor wrapper for reading binary data from a byte slice.
///
/// `create_sub_view` carves out a bounded alias over part of the same backing
/// bytes; reads against the sub-view cannot cross its own declared length even
/// though the parent slice extends further.
pub struct MemoryReader<'a> {
    cursor: Cursor<&'a [u8]>,
    /// Set on sub-views carved out of a source where one large sequential
    /// read is cheaper than many small random-access ones (record-array
    /// consumers use this as a prefetch hint). Always false for a plain
    /// in-memory slice.
    prefers_large_reads: bool,
}

impl<'a> MemoryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            prefers_large_reads: false,
        }
    }

    /// Create a reader starting at a specific offset.
    pub fn at_offset(data: &'a [u8], offset: u64) -> Self {
        let mut cursor = Cursor::new(data);
        cursor.set_position(offset);
        Self {
            cursor,
            prefers_large_reads: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn set_position(&mut self, pos: u64) {
        self.cursor.set_position(pos);
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        let len = self.cursor.get_ref().len();
        if pos >= len {
            0
        } else {
            len - pos
        }
    }

    pub fn prefers_large_reads(&self) -> bool {
        self.prefers_large_reads
    }

    fn bounds_check(&self, offset: u64, len: usize) -> Result<(), RawError> {
        let end = offset.saturating_add(len as u64);
        if end > self.cursor.get_ref().len() as u64 {
            return Err(RawError::OutOfBounds {
                offset,
                length: len,
                available: (self.cursor.get_ref().len() as u64).saturating_sub(offset),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, RawError> {
        self.bounds_check(self.cursor.position(), 1)?;
        self.cursor.read_u8().map_err(RawError::Io)
    }

    pub fn read_i8(&mut self) -> Result<i8, RawError> {
        self.bounds_check(self.cursor.position(), 1)?;
        self.cursor.read_i8().map_err(RawError::Io)
    }

    pub fn read_u16(&mut self) -> Result<u16, RawError> {
        self.bounds_check(self.cursor.position(), 2)?;
        self.cursor.read_u16::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_i16(&mut self) -> Result<i16, RawError> {
        self.bounds_check(self.cursor.position(), 2)?;
        self.cursor.read_i16::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_u32(&mut self) -> Result<u32, RawError> {
        self.bounds_check(self.cursor.position(), 4)?;
        self.cursor.read_u32::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_i32(&mut self) -> Result<i32, RawError> {
        self.bounds_check(self.cursor.position(), 4)?;
        self.cursor.read_i32::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_u64(&mut self) -> Result<u64, RawError> {
        self.bounds_check(self.cursor.position(), 8)?;
        self.cursor.read_u64::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_i64(&mut self) -> Result<i64, RawError> {
        self.bounds_check(self.cursor.position(), 8)?;
        self.cursor.read_i64::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_f32(&mut self) -> Result<f32, RawError> {
        self.bounds_check(self.cursor.position(), 4)?;
        self.cursor.read_f32::<LittleEndian>().map_err(RawError::Io)
    }

    pub fn read_f64(&mut self) -> Result<f64, RawError> {
        self.bounds_check(self.cursor.position(), 8)?;
        self.cursor.read_f64::<LittleEndian>().map_err(RawError::Io)
    }

    /// Read N bytes into a new Vec.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, RawError> {
        let pos = self.cursor.position();
        self.bounds_check(pos, n)?;
        let data = self.cursor.get_ref();
        let result = data[pos as usize..pos as usize + n].to_vec();
        self.cursor.set_position(pos + n as u64);
        Ok(result)
    }

    /// Defer reading N bytes until the returned handle is forced.
    ///
    /// Used for extended (debug) data bodies and profile/centroid sections a
    /// caller may never inspect, so summary-only reads never pay to copy them.
    pub fn read_bytes_lazy(&mut self, n: usize) -> Result<LazyBytes<'a>, RawError> {
        let pos = self.cursor.position();
        self.bounds_check(pos, n)?;
        self.cursor.set_position(pos + n as u64);
        Ok(LazyBytes {
            data: self.cursor.get_ref(),
            offset: pos as usize,
            len: n,
            cache: Rc::new(RefCell::new(None)),
        })
    }

    /// Skip N bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), RawError> {
        let new_pos = self.cursor.position() + n as u64;
        self.bounds_check(new_pos, 0)?;
        self.cursor.set_position(new_pos);
        Ok(())
    }

    /// Skip N bytes, describing what was being skipped on failure.
    pub fn skip_checked(&mut self, n: usize, what: &str) -> Result<(), RawError> {
        if self.remaining() < n {
            return Err(RawError::CorruptedData(format!(
                "failed to skip {}: need {} bytes, {} available",
                what,
                n,
                self.remaining()
            )));
        }
        self.skip(n)
    }

    /// Skip a PascalStringWin32 without copying its contents.
    pub fn skip_pascal_string(&mut self) -> Result<(), RawError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(RawError::CorruptedData(format!(
                "PascalString with negative length: {}",
                len
            )));
        }
        self.skip_checked((len as usize) * 2, "PascalString")
    }

    /// Read a fixed-size UTF-16LE string (size in bytes, not chars).
    pub fn read_utf16_fixed(&mut self, byte_len: usize) -> Result<String, RawError> {
        let bytes = self.read_bytes(byte_len)?;
        let u16s: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&u16s)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Read a PascalStringWin32: i32 length prefix, then length * 2 bytes of UTF-16LE.
    pub fn read_pascal_string(&mut self) -> Result<String, RawError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(RawError::CorruptedData(format!(
                "PascalString with negative length: {}",
                len
            )));
        }
        if len == 0 {
            return Ok(String::new());
        }
        let byte_len = (len as usize) * 2;
        self.read_utf16_fixed(byte_len)
    }

    /// A 32-bit LE count of UTF-16 code units followed by that many code
    /// units. Same wire shape as `read_pascal_string`; kept as a distinct name
    /// since callers reach for it by the general "length-prefixed string"
    /// concept rather than the Windows-specific name.
    pub fn read_string_length_prefixed(&mut self) -> Result<String, RawError> {
        self.read_pascal_string()
    }

    /// Read an array of f32 values.
    pub fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>, RawError> {
        let mut result = Vec::with_capacity(count);
        for _ in 0..count {
            result.push(self.read_f32()?);
        }
        Ok(result)
    }

    /// Read an array of f64 values.
    pub fn read_f64_array(&mut self, count: usize) -> Result<Vec<f64>, RawError> {
        let mut result = Vec::with_capacity(count);
        for _ in 0..count {
            result.push(self.read_f64()?);
        }
        Ok(result)
    }

    /// Read a fixed-size record array whose element decoder is supplied by
    /// the caller, bounds-checking the whole array up front so a truncated
    /// tail is reported once rather than mid-loop.
    pub fn read_array_of<T>(
        &mut self,
        count: usize,
        elem_size: usize,
        mut decode: impl FnMut(&mut MemoryReader<'a>) -> Result<T, RawError>,
    ) -> Result<Vec<T>, RawError> {
        self.bounds_check(self.cursor.position(), count * elem_size)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(decode(self)?);
        }
        Ok(out)
    }

    /// Read a 32-bit LE element count followed by `count * elem_size` bytes,
    /// decoding each element with the supplied closure.
    pub fn read_length_prefixed_vector<T>(
        &mut self,
        elem_size: usize,
        decode: impl FnMut(&mut MemoryReader<'a>) -> Result<T, RawError>,
    ) -> Result<Vec<T>, RawError> {
        let count = self.read_u32()? as usize;
        self.read_array_of(count, elem_size, decode)
    }

    /// Get a slice of the underlying data at the current position.
    pub fn slice(&self, len: usize) -> Result<&'a [u8], RawError> {
        let pos = self.cursor.position();
        self.bounds_check(pos, len)?;
        let data = self.cursor.get_ref();
        Ok(&data[pos as usize..pos as usize + len])
    }

    /// Create a bounded alias over `[offset, offset+length)` of the same
    /// backing bytes. Reads against the returned reader cannot cross `length`
    /// even though the parent slice may extend further; used to isolate one
    /// scan's packet bytes from its neighbors in the data stream.
    pub fn create_sub_view(&self, offset: u64, length: usize) -> Result<MemoryReader<'a>, RawError> {
        self.bounds_check(offset, length)?;
        let data = self.cursor.get_ref();
        let start = offset as usize;
        Ok(MemoryReader {
            cursor: Cursor::new(&data[start..start + length]),
            prefers_large_reads: self.prefers_large_reads,
        })
    }

    /// Return a sub-view with `prefers_large_reads` set, for callers about to
    /// hand it to a record-array reader that will benefit from prefetching
    /// the whole range in one read rather than one record at a time.
    pub fn create_sub_view_prefetched(
        &self,
        offset: u64,
        length: usize,
    ) -> Result<MemoryReader<'a>, RawError> {
        let mut view = self.create_sub_view(offset, length)?;
        view.prefers_large_reads = true;
        Ok(view)
    }
}

/// A deferred byte-range handle. The bytes are only copied out on first `.get()`,
/// and the copy is cached so repeated calls don't re-copy.
#[derive(Clone)]
pub struct LazyBytes<'a> {
    data: &'a [u8],
    offset: usize,
    len: usize,
    cache: Rc<RefCell<Option<Vec<u8>>>>,
}

impl<'a> LazyBytes<'a> {
    /// Force the load and return the bytes, caching the result.
    pub fn get(&self) -> Vec<u8> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.clone();
        }
        let bytes = self.data[self.offset..self.offset + self.len].to_vec();
        *self.cache.borrow_mut() = Some(bytes.clone());
        bytes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for LazyBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LazyBytes({} bytes at +{})", self.len, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data: Vec<u8> = vec![
            0x01, 0xA1, // u16: 0xA101
            0x39, 0x00, 0x00, 0x00, // u32: 57
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x59, 0x40, // f64: 100.0
        ];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0xA101);
        assert_eq!(reader.read_u32().unwrap(), 57);
        assert_eq!(reader.read_f64().unwrap(), 100.0);
    }

    #[test]
    fn test_read_pascal_string() {
        let data: Vec<u8> = vec![
            0x03, 0x00, 0x00, 0x00, // length: 3
            0x61, 0x00, 0x62, 0x00, 0x63, 0x00, // "abc"
        ];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_pascal_string().unwrap(), "abc");
    }

    #[test]
    fn test_read_utf16_fixed_with_nulls() {
        let data: Vec<u8> = vec![0x48, 0x00, 0x69, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_utf16_fixed(8).unwrap(), "Hi");
    }

    #[test]
    fn test_at_offset() {
        let data: Vec<u8> = vec![0x00, 0x00, 0x00, 0x00, 0x42, 0x00, 0x00, 0x00];
        let mut reader = MemoryReader::at_offset(&data, 4);
        assert_eq!(reader.read_u32().unwrap(), 0x42);
    }

    #[test]
    fn test_skip_and_remaining() {
        let data: Vec<u8> = vec![0; 100];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.remaining(), 100);
        reader.skip(50).unwrap();
        assert_eq!(reader.remaining(), 50);
        assert_eq!(reader.position(), 50);
    }

    #[test]
    fn test_out_of_bounds() {
        let data: Vec<u8> = vec![0; 4];
        let mut reader = MemoryReader::new(&data);
        assert!(matches!(reader.read_u64(), Err(RawError::OutOfBounds { .. })));
    }

    #[test]
    fn test_sub_view_is_bounded() {
        let data: Vec<u8> = (0u8..20).collect();
        let reader = MemoryReader::new(&data);
        let mut sub = reader.create_sub_view(4, 4).unwrap();
        assert_eq!(sub.read_u32().unwrap(), u32::from_le_bytes([4, 5, 6, 7]));
        assert!(matches!(sub.read_u8(), Err(RawError::OutOfBounds { .. })));
    }

    #[test]
    fn test_lazy_bytes_deferred() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let mut reader = MemoryReader::new(&data);
        let lazy = reader.read_bytes_lazy(3).unwrap();
        assert_eq!(reader.position(), 3);
        assert_eq!(lazy.get(), vec![1, 2, 3]);
    }

    #[test]
    fn test_array_of_reports_truncation_up_front() {
        let data: Vec<u8> = vec![0u8; 10];
        let mut reader = MemoryReader::new(&data);
        let result = reader.read_array_of(5, 4, |r| r.read_u32());
        assert!(matches!(result, Err(RawError::OutOfBounds { .. })));
    }
}
