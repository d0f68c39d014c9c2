//! Fixed-size record model.

use std::cmp::Ordering;
use std::fmt;
use std::io;
use std::io::prelude::*;

use log;

/// Total size of a record in bytes.
pub const RECORD_SIZE: usize = 100;
/// Size of the sort key prefix in bytes.
pub const KEY_SIZE: usize = 10;

/// A fixed-size record: a `KEY_SIZE` bytes key prefix followed by an opaque payload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record {
    bytes: [u8; RECORD_SIZE],
}

impl Record {
    /// Creates a record from its raw bytes.
    pub fn new(bytes: [u8; RECORD_SIZE]) -> Self {
        Record { bytes }
    }

    /// Creates a record from a slice. Returns [`None`] if the slice is not exactly `RECORD_SIZE` long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; RECORD_SIZE] = bytes.try_into().ok()?;
        Some(Record { bytes })
    }

    /// Sort key prefix.
    pub fn key(&self) -> &[u8] {
        &self.bytes[..KEY_SIZE]
    }

    /// Opaque payload following the key.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[KEY_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.bytes
    }

    /// Compares two records by their key prefixes byte-wise.
    pub fn cmp_key(&self, other: &Record) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record(key=")?;
        for byte in self.key() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// Reads a flat byte stream as a sequence of records.
/// A trailing partial record is discarded.
pub struct RecordReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        RecordReader { reader, done: false }
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        return Ok(filled);
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut bytes = [0u8; RECORD_SIZE];
        match self.fill(&mut bytes) {
            Ok(RECORD_SIZE) => Some(Ok(Record::new(bytes))),
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                log::warn!("discarding {} trailing bytes of a partial record", n);
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::cmp::Ordering;
    use std::io;

    use rstest::*;

    use super::{Record, RecordReader, RECORD_SIZE};

    /// Builds a record whose key starts with `first` and whose remaining bytes are `fill`.
    pub(crate) fn record(first: u8, fill: u8) -> Record {
        let mut bytes = [fill; RECORD_SIZE];
        bytes[0] = first;
        Record::new(bytes)
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(RECORD_SIZE - 1, 0)]
    #[case(RECORD_SIZE, 1)]
    #[case(RECORD_SIZE * 3 + 42, 3)]
    fn test_record_reader_truncates(#[case] input_len: usize, #[case] expected_count: usize) {
        let input: Vec<u8> = (0..input_len).map(|i| i as u8).collect();

        let records: io::Result<Vec<Record>> = RecordReader::new(input.as_slice()).collect();
        let records = records.unwrap();

        assert_eq!(records.len(), expected_count);
        for (idx, record) in records.iter().enumerate() {
            assert_eq!(&record.as_bytes()[..], &input[idx * RECORD_SIZE..(idx + 1) * RECORD_SIZE]);
        }
    }

    #[test]
    fn test_key_comparison_ignores_payload() {
        let mut a = record(0x10, 0xff).as_bytes().clone();
        let mut b = a.clone();
        a[50] = 0x00;
        b[50] = 0x01;

        assert_eq!(Record::new(a).cmp_key(&Record::new(b)), Ordering::Equal);
        assert_eq!(record(0x05, 0xff).cmp_key(&record(0x10, 0x00)), Ordering::Less);
    }

    #[test]
    fn test_from_slice_requires_exact_size() {
        assert!(Record::from_slice(&[0u8; RECORD_SIZE - 1]).is_none());
        assert!(Record::from_slice(&[0u8; RECORD_SIZE]).is_some());
    }
}
