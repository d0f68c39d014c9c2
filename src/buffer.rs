//! Limited record buffer.

use rayon;

use crate::record::{Record, RECORD_SIZE};

/// Record buffer builder.
#[derive(Debug, Clone, Copy)]
pub struct RecordBufferBuilder {
    buffer_limit: usize,
    preallocate: bool,
}

impl RecordBufferBuilder {
    /// Creates a builder of buffers holding up to `buffer_limit` records.
    pub fn new(buffer_limit: usize, preallocate: bool) -> Self {
        RecordBufferBuilder {
            buffer_limit: buffer_limit.max(1),
            preallocate,
        }
    }

    /// Creates a builder of buffers holding up to `bytes` worth of records.
    pub fn with_byte_limit(bytes: u64) -> Self {
        let records = usize::try_from(bytes / RECORD_SIZE as u64).unwrap_or(usize::MAX);
        Self::new(records, false)
    }

    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    /// Creates a new buffer.
    pub fn build(&self) -> RecordBuffer {
        if self.preallocate {
            RecordBuffer::with_capacity(self.buffer_limit)
        } else {
            RecordBuffer::new(self.buffer_limit)
        }
    }
}

impl Default for RecordBufferBuilder {
    fn default() -> Self {
        RecordBufferBuilder {
            buffer_limit: usize::MAX,
            preallocate: false,
        }
    }
}

/// Buffer limited by records count.
pub struct RecordBuffer {
    limit: usize,
    inner: Vec<Record>,
}

impl RecordBuffer {
    pub fn new(limit: usize) -> Self {
        RecordBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        RecordBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: Record) {
        self.inner.push(record);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }
}

impl IntoIterator for RecordBuffer {
    type Item = Record;
    type IntoIter = <Vec<Record> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Record> for RecordBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Record] {
        self.inner.as_mut_slice()
    }
}
