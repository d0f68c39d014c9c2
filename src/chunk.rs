use std::fs;
use std::io;
use std::io::prelude::*;

use tempfile;

use crate::record::{Record, RECORD_SIZE};

/// Sorted run of records spilled to a temporary file.
/// Records are stored back to back in their raw fixed-size form.
pub struct RecordChunk {
    reader: io::Take<io::BufReader<fs::File>>,
}

impl RecordChunk {
    /// Dumps records to a new temporary file in `dir` and opens it for reading.
    pub fn build(
        dir: &tempfile::TempDir,
        records: impl IntoIterator<Item = Record>,
        buf_size: Option<usize>,
    ) -> io::Result<Self> {
        let tmp_file = tempfile::tempfile_in(dir)?;

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        for record in records.into_iter() {
            chunk_writer.write_all(record.as_bytes())?;
        }
        chunk_writer.flush()?;

        let mut chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufReader::new(tmp_file.try_clone()?),
        };

        chunk_reader.rewind()?;
        let file_len = tmp_file.metadata()?.len();

        return Ok(RecordChunk {
            reader: chunk_reader.take(file_len),
        });
    }
}

impl Iterator for RecordChunk {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            return None;
        }

        let mut bytes = [0u8; RECORD_SIZE];
        match self.reader.read_exact(&mut bytes) {
            Ok(()) => Some(Ok(Record::new(bytes))),
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use rstest::*;

    use super::RecordChunk;
    use crate::record::test::record;
    use crate::record::Record;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_record_chunk(tmp_dir: tempfile::TempDir) {
        let saved: Vec<Record> = (0..100u8).map(|i| record(i, 255 - i)).collect();

        let chunk = RecordChunk::build(&tmp_dir, saved.clone(), Some(512)).unwrap();

        let restored: io::Result<Vec<Record>> = chunk.collect();
        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_empty_chunk(tmp_dir: tempfile::TempDir) {
        let mut chunk = RecordChunk::build(&tmp_dir, Vec::new(), None).unwrap();
        assert!(chunk.next().is_none());
    }
}
