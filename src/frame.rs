//! Shuffle wire framing.
//!
//! Every unit on the wire is exactly [`FRAME_SIZE`] bytes: one header byte followed by a record-sized payload.
//! There is no length prefix, no handshake and no version byte.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::record::{Record, RECORD_SIZE};

/// Header marking a frame carrying a record.
pub const STREAM_IN_PROGRESS: u8 = 0;
/// Header marking the terminator of a stream.
pub const STREAM_COMPLETED: u8 = 1;
/// Size of a single frame on the wire.
pub const FRAME_SIZE: usize = 1 + RECORD_SIZE;

/// Frame decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameError {
    pub header: u8,
}

impl Error for FrameError {}

impl Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown frame header: {}", self.header)
    }
}

/// A single shuffle stream unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// In-progress frame carrying a record.
    Record(Record),
    /// Stream terminator. `tag` identifies the sending server; it is not needed to count completions.
    Completed { tag: u8 },
}

impl Frame {
    pub fn is_completed(&self) -> bool {
        matches!(self, Frame::Completed { .. })
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        match self {
            Frame::Record(record) => Self::encode_record(record),
            Frame::Completed { tag } => {
                let mut buf = [0u8; FRAME_SIZE];
                buf[0] = STREAM_COMPLETED;
                buf[1] = *tag;
                buf
            }
        }
    }

    /// Encodes an in-progress frame without taking ownership of the record.
    pub fn encode_record(record: &Record) -> [u8; FRAME_SIZE] {
        let mut buf = [STREAM_IN_PROGRESS; FRAME_SIZE];
        buf[1..].copy_from_slice(record.as_bytes());
        buf
    }

    /// Decodes a frame. Terminator padding beyond the tag byte is ignored.
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Frame, FrameError> {
        match buf[0] {
            STREAM_IN_PROGRESS => {
                let mut bytes = [0u8; RECORD_SIZE];
                bytes.copy_from_slice(&buf[1..]);
                Ok(Frame::Record(Record::new(bytes)))
            }
            STREAM_COMPLETED => Ok(Frame::Completed { tag: buf[1] }),
            header => Err(FrameError { header }),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{Frame, FrameError, FRAME_SIZE, STREAM_COMPLETED, STREAM_IN_PROGRESS};
    use crate::record::test::record;

    #[test]
    fn test_record_frame_layout() {
        let record = record(0x42, 0x07);

        let encoded = Frame::Record(record.clone()).encode();

        assert_eq!(encoded[0], STREAM_IN_PROGRESS);
        assert_eq!(&encoded[1..], &record.as_bytes()[..]);
        assert_eq!(Frame::decode(&encoded), Ok(Frame::Record(record)));
    }

    #[test]
    fn test_completed_frame_layout() {
        let encoded = Frame::Completed { tag: 0xc0 }.encode();

        assert_eq!(encoded[0], STREAM_COMPLETED);
        assert_eq!(encoded[1], 0xc0);
        assert!(encoded[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_completed_padding_ignored() {
        let mut buf = [0xffu8; FRAME_SIZE];
        buf[0] = STREAM_COMPLETED;
        buf[1] = 0x80;

        assert_eq!(Frame::decode(&buf), Ok(Frame::Completed { tag: 0x80 }));
    }

    #[rstest]
    #[case(2)]
    #[case(0xff)]
    fn test_unknown_header(#[case] header: u8) {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = header;

        assert_eq!(Frame::decode(&buf), Err(FrameError { header }));
    }
}
