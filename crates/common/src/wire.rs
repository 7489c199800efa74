//! C2: a growable byte buffer plus a typed reader/writer for the binary wire
//! format described in spec.md section 6 — little-endian, length-prefixed,
//! NUL-terminated strings, `usize`-counted vectors.

use crate::bitmap::Cpuset;
use crate::error::{Error, Result};

/// An append-only byte buffer used to assemble a wire message body.
#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn put_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_usize(&mut self, v: usize) {
        self.put_u64(v as u64);
    }

    /// NUL-terminated string; `strlen + 1` bytes written.
    pub fn put_string(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
    }

    /// hwloc-list-form bitmap, NUL-terminated; `None` encodes as `""`.
    pub fn put_cpuset(&mut self, cs: Option<&Cpuset>) {
        match cs {
            Some(cs) => self.put_string(&cs.to_list_string()),
            None => self.put_string(""),
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_usize(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }
}

/// A cursor over a received message body, for sequential typed reads.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::new(
                crate::error::Rc::ErrMsg,
                "wire message truncated",
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn get_usize(&mut self) -> Result<usize> {
        Ok(self.get_u64()? as usize)
    }

    pub fn get_string(&mut self) -> Result<String> {
        let start = self.pos;
        loop {
            let b = self.take(1)?[0];
            if b == 0 {
                break;
            }
        }
        let slice = &self.bytes[start..self.pos - 1];
        String::from_utf8(slice.to_vec())
            .map_err(|_| Error::new(crate::error::Rc::ErrMsg, "malformed UTF-8 in wire string"))
    }

    /// `""` decodes as `None`, matching [`ByteBuffer::put_cpuset`].
    pub fn get_cpuset(&mut self) -> Result<Option<Cpuset>> {
        let s = self.get_string()?;
        if s.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Cpuset::parse_list_string(&s)?))
        }
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.get_usize()?;
        Ok(self.take(n)?.to_vec())
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.put_string("hello");
        buf.put_string("");
        buf.put_string("world");
        let mut r = ByteReader::new(buf.as_slice());
        assert_eq!(r.get_string().unwrap(), "hello");
        assert_eq!(r.get_string().unwrap(), "");
        assert_eq!(r.get_string().unwrap(), "world");
    }

    #[test]
    fn cpuset_none_round_trips_as_empty_string() {
        let mut buf = ByteBuffer::new();
        buf.put_cpuset(None);
        let mut r = ByteReader::new(buf.as_slice());
        assert_eq!(r.get_cpuset().unwrap(), None);
    }

    #[test]
    fn cpuset_some_round_trips() {
        let cs = Cpuset::parse_list_string("0-3,8").unwrap();
        let mut buf = ByteBuffer::new();
        buf.put_cpuset(Some(&cs));
        let mut r = ByteReader::new(buf.as_slice());
        assert_eq!(r.get_cpuset().unwrap(), Some(cs));
    }

    #[test]
    fn integers_and_bytes_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.put_u32(42);
        buf.put_i32(-7);
        buf.put_bytes(&[1, 2, 3, 4]);
        let mut r = ByteReader::new(buf.as_slice());
        assert_eq!(r.get_u32().unwrap(), 42);
        assert_eq!(r.get_i32().unwrap(), -7);
        assert_eq!(r.get_bytes().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_message_errors_instead_of_panicking() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(r.get_u32().is_err());
    }
}
