//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;

use crate::record::Record;

/// Heap entry ordered so that the max-heap pops the smallest key first,
/// and among equal keys the one from the earliest chunk.
struct HeapItem {
    record: Record,
    chunk: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .cmp_key(&other.record)
            .then(self.chunk.cmp(&other.chunk))
            .reverse()
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

/// Binary heap merger implementation.
/// Merges multiple sorted record runs into a single run sorted by key.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of records,
/// *n* is the number of chunks (inputs).
pub struct BinaryHeapMerger<C>
where
    C: IntoIterator<Item = io::Result<Record>>,
{
    items: BinaryHeap<HeapItem>,
    chunks: Vec<C::IntoIter>,
    initiated: bool,
}

impl<C> BinaryHeapMerger<C>
where
    C: IntoIterator<Item = io::Result<Record>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk records should be sorted by key otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            initiated: false,
        };
    }
}

impl<C> Iterator for BinaryHeapMerger<C>
where
    C: IntoIterator<Item = io::Result<Record>>,
{
    type Item = io::Result<Record>;

    /// Returns the next record from the inputs in ascending key order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            for (idx, chunk) in self.chunks.iter_mut().enumerate() {
                if let Some(item) = chunk.next() {
                    match item {
                        Ok(record) => self.items.push(HeapItem { record, chunk: idx }),
                        Err(err) => return Some(Err(err)),
                    }
                }
            }
            self.initiated = true;
        }

        let HeapItem { record, chunk } = self.items.pop()?;
        if let Some(item) = self.chunks[chunk].next() {
            match item {
                Ok(next) => self.items.push(HeapItem { record: next, chunk }),
                Err(err) => return Some(Err(err)),
            }
        }

        return Some(Ok(record));
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use rstest::*;

    use super::BinaryHeapMerger;
    use crate::record::test::record;
    use crate::record::Record;

    fn keys(chunks: Vec<Vec<u8>>) -> Vec<Vec<io::Result<Record>>> {
        chunks
            .into_iter()
            .map(|chunk| chunk.into_iter().map(|k| Ok(record(k, 0))).collect())
            .collect()
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(vec![vec![4, 5, 7], vec![1, 6], vec![3], vec![]], vec![1, 3, 4, 5, 6, 7])]
    #[case(vec![vec![2, 2], vec![1, 2]], vec![1, 2, 2, 2])]
    fn test_merger(#[case] chunks: Vec<Vec<u8>>, #[case] expected_keys: Vec<u8>) {
        let merger = BinaryHeapMerger::new(keys(chunks));

        let actual: io::Result<Vec<Record>> = merger.collect();
        let actual_keys: Vec<u8> = actual.unwrap().iter().map(|r| r.key()[0]).collect();

        assert_eq!(actual_keys, expected_keys);
    }

    #[test]
    fn test_merger_equal_keys_keep_chunk_order() {
        let chunks: Vec<Vec<io::Result<Record>>> =
            vec![vec![Ok(record(5, 1))], vec![Ok(record(5, 2))], vec![Ok(record(5, 3))]];

        let actual: io::Result<Vec<Record>> = BinaryHeapMerger::new(chunks).collect();

        assert_eq!(actual.unwrap(), vec![record(5, 1), record(5, 2), record(5, 3)]);
    }

    #[test]
    fn test_merger_error() {
        let chunks = vec![
            vec![Ok(record(3, 0)), Err(io::Error::new(ErrorKind::Other, "test error"))],
            vec![Ok(record(1, 0)), Ok(record(2, 0))],
        ];

        let actual: Vec<io::Result<Record>> = BinaryHeapMerger::new(chunks).collect();

        assert_eq!(actual.len(), 3);
        assert!(actual[0].is_ok());
        assert!(actual[1].is_ok());
        assert_eq!(actual[2].as_ref().unwrap_err().to_string(), "test error");
    }
}
