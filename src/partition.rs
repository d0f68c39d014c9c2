//! Range partitioner.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::record::Record;

/// Maximum number of partitions addressable by the first key byte.
pub const MAX_PARTITIONS: usize = 256;

/// Partitioner initialization error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCountError(pub usize);

impl Error for PartitionCountError {}

impl Display for PartitionCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition count must be a power of two in [1, {}], got {}",
            MAX_PARTITIONS, self.0
        )
    }
}

/// Assigns records to destinations using the high-order bits of the first key byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partitions: usize,
    n_msb: u32,
}

impl Partitioner {
    /// Creates a partitioner for `partitions` destinations.
    pub fn new(partitions: usize) -> Result<Self, PartitionCountError> {
        if partitions == 0 || partitions > MAX_PARTITIONS || !partitions.is_power_of_two() {
            return Err(PartitionCountError(partitions));
        }

        return Ok(Partitioner {
            partitions,
            n_msb: partitions.trailing_zeros(),
        });
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Number of leading key bits selecting the destination.
    pub fn n_msb(&self) -> u32 {
        self.n_msb
    }

    /// Returns the destination of a record.
    pub fn destination(&self, record: &Record) -> usize {
        if self.n_msb == 0 {
            return 0;
        }
        (record.key()[0] >> (8 - self.n_msb)) as usize
    }

    /// Self-identifying tag carried by the stream terminator of `server_id`.
    pub fn completion_tag(&self, server_id: usize) -> u8 {
        ((server_id as u32) << (8 - self.n_msb)) as u8
    }

    /// Splits the input into one bucket per destination preserving the input order.
    pub fn partition<I, E>(&self, records: I) -> Result<Vec<Vec<Record>>, E>
    where
        I: IntoIterator<Item = Result<Record, E>>,
    {
        let mut buckets: Vec<Vec<Record>> = (0..self.partitions).map(|_| Vec::new()).collect();

        for record in records.into_iter() {
            let record = record?;
            let destination = self.destination(&record);
            buckets[destination].push(record);
        }

        return Ok(buckets);
    }
}

#[cfg(test)]
mod test {
    use std::convert::Infallible;

    use rand::Rng;
    use rstest::*;

    use super::{PartitionCountError, Partitioner};
    use crate::record::{Record, RECORD_SIZE};

    fn random_records(count: usize) -> Vec<Record> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let mut bytes = [0u8; RECORD_SIZE];
                rng.fill(&mut bytes[..]);
                Record::new(bytes)
            })
            .collect()
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(6)]
    #[case(512)]
    fn test_invalid_partition_count(#[case] partitions: usize) {
        assert_eq!(Partitioner::new(partitions), Err(PartitionCountError(partitions)));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(4, 2)]
    #[case(256, 8)]
    fn test_n_msb(#[case] partitions: usize, #[case] n_msb: u32) {
        assert_eq!(Partitioner::new(partitions).unwrap().n_msb(), n_msb);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    #[case(8)]
    fn test_buckets_hold_matching_top_bits(#[case] partitions: usize) {
        let partitioner = Partitioner::new(partitions).unwrap();
        let records = random_records(500);

        let buckets = partitioner
            .partition(records.iter().cloned().map(Ok::<_, Infallible>))
            .unwrap();

        assert_eq!(buckets.len(), partitions);
        assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), records.len());
        let n_msb = partitioner.n_msb();
        for (destination, bucket) in buckets.iter().enumerate() {
            for record in bucket {
                let top_bits = if n_msb == 0 { 0 } else { record.key()[0] >> (8 - n_msb) };
                assert_eq!(top_bits as usize, destination);
            }
        }
    }

    #[test]
    fn test_partition_preserves_order_and_is_deterministic() {
        let partitioner = Partitioner::new(4).unwrap();
        let records = random_records(200);

        let first = partitioner
            .partition(records.iter().cloned().map(Ok::<_, Infallible>))
            .unwrap();
        let second = partitioner
            .partition(records.iter().cloned().map(Ok::<_, Infallible>))
            .unwrap();
        assert_eq!(first, second);

        for (destination, bucket) in first.iter().enumerate() {
            let expected: Vec<&Record> = records
                .iter()
                .filter(|r| partitioner.destination(r) == destination)
                .collect();
            assert_eq!(bucket.iter().collect::<Vec<_>>(), expected);
        }
    }

    #[rstest]
    #[case(2, 1, 0x80)]
    #[case(4, 3, 0xc0)]
    #[case(8, 5, 0xa0)]
    #[case(1, 0, 0x00)]
    fn test_completion_tag(#[case] partitions: usize, #[case] server_id: usize, #[case] tag: u8) {
        assert_eq!(Partitioner::new(partitions).unwrap().completion_tag(server_id), tag);
    }
}
