//! Record sorter and emitter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use rayon::slice::ParallelSliceMut;

use crate::buffer::{RecordBuffer, RecordBufferBuilder};
use crate::chunk::RecordChunk;
use crate::merger::BinaryHeapMerger;
use crate::record::Record;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Chunk I/O error.
    IO(io::Error),
    /// Output sink write or flush error.
    Output(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::TempDir(err) => err,
            SortError::ThreadPoolBuildError(err) => err,
            SortError::IO(err) => err,
            SortError::Output(err) => err,
        })
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::Output(err) => write!(f, "output writing failed: {}", err),
        }
    }
}

/// Record sorter builder. Provides methods for [`RecordSorter`] initialization.
#[derive(Debug, Clone, Default)]
pub struct RecordSorterBuilder {
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk buffer builder.
    buffer_builder: RecordBufferBuilder,
}

impl RecordSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        RecordSorterBuilder::default()
    }

    /// Builds a [`RecordSorter`] instance using provided configuration.
    pub fn build(self) -> Result<RecordSorter, SortError> {
        RecordSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.buffer_builder,
            self.rw_buf_size,
        )
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> RecordSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> RecordSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets buffer builder.
    pub fn with_buffer(mut self, buffer_builder: RecordBufferBuilder) -> RecordSorterBuilder {
        self.buffer_builder = buffer_builder;
        return self;
    }

    /// Sets chunk read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> RecordSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

/// Records sorted by key, served from memory or merged from spilled chunks.
pub enum SortedRecords {
    InMemory(<RecordBuffer as IntoIterator>::IntoIter),
    Merged(BinaryHeapMerger<RecordChunk>),
}

impl Iterator for SortedRecords {
    type Item = Result<Record, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedRecords::InMemory(records) => records.next().map(Ok),
            SortedRecords::Merged(merger) => merger.next().map(|item| item.map_err(SortError::IO)),
        }
    }
}

/// Key-ordered record sorter.
///
/// Records are accumulated in a limited buffer. Once the buffer is full it is sorted in parallel
/// and spilled to a temporary file; spilled chunks are merged when the sorted stream is consumed.
/// Input that fits a single buffer never touches the disk.
pub struct RecordSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Chunk buffer builder.
    buffer_builder: RecordBufferBuilder,
    /// Chunk file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl RecordSorter {
    /// Creates a new record sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `buffer_builder` - An instance of a buffer builder that will be used for chunk buffer creation.
    /// * `rw_buf_size` - Chunks file read/write buffer size.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        buffer_builder: RecordBufferBuilder,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, SortError> {
        return Ok(RecordSorter {
            rw_buf_size,
            buffer_builder,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts records by key. Records with equal keys keep their input order.
    /// Returns an iterator that can be used to get sorted records stream.
    pub fn sort<I>(&self, records: I) -> Result<SortedRecords, SortError>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut chunk_buf = self.buffer_builder.build();
        let mut external_chunks = Vec::new();

        for record in records.into_iter() {
            chunk_buf.push(record);

            if chunk_buf.is_full() {
                external_chunks.push(self.create_chunk(chunk_buf)?);
                chunk_buf = self.buffer_builder.build();
            }
        }

        if external_chunks.is_empty() {
            log::debug!("sorting {} records in memory", chunk_buf.len());
            self.sort_buffer(&mut chunk_buf);
            return Ok(SortedRecords::InMemory(chunk_buf.into_iter()));
        }

        if !chunk_buf.is_empty() {
            external_chunks.push(self.create_chunk(chunk_buf)?);
        }

        log::debug!("merging {} external chunks", external_chunks.len());

        return Ok(SortedRecords::Merged(BinaryHeapMerger::new(external_chunks)));
    }

    fn sort_buffer(&self, buffer: &mut RecordBuffer) {
        self.thread_pool.install(|| {
            buffer.par_sort_by(Record::cmp_key);
        });
    }

    fn create_chunk(&self, mut buffer: RecordBuffer) -> Result<RecordChunk, SortError> {
        log::debug!("sorting chunk data ...");
        self.sort_buffer(&mut buffer);

        log::debug!("saving chunk data");
        let external_chunk =
            RecordChunk::build(&self.tmp_dir, buffer, self.rw_buf_size).map_err(|err| SortError::IO(err))?;

        return Ok(external_chunk);
    }
}

/// Writes sorted records to the output one after another and flushes it.
/// Returns the number of records written.
pub fn emit<I, W>(sorted: I, writer: &mut W) -> Result<u64, SortError>
where
    I: IntoIterator<Item = Result<Record, SortError>>,
    W: Write,
{
    let mut written = 0;
    for record in sorted.into_iter() {
        let record = record?;
        writer.write_all(record.as_bytes()).map_err(SortError::Output)?;
        written += 1;
    }
    writer.flush().map_err(SortError::Output)?;

    return Ok(written);
}
