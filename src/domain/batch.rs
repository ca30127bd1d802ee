use std::num::NonZeroUsize;

use super::product::NormalizedRecord;

const BATCH_PREFIX: &str = "batch_";
const RESIDUAL_SUFFIX: &str = "_errors";

/// Ordered group of records delivered in one ingestion request
///
/// The sequence number only names the batch in the failure store; it does
/// not imply delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sequence: u64,
    pub records: Vec<NormalizedRecord>,
}

impl Batch {
    /// Split `records` into consecutive batches of at most `size`, numbered
    /// from `first_sequence`.
    pub fn partition(records: Vec<NormalizedRecord>, size: NonZeroUsize, first_sequence: u64) -> Vec<Self> {
        let size = size.get();
        let mut batches = Vec::with_capacity(records.len().div_ceil(size));
        let mut iter = records.into_iter().peekable();
        let mut sequence = first_sequence;

        while iter.peek().is_some() {
            let chunk: Vec<_> = iter.by_ref().take(size).collect();
            batches.push(Self { sequence, records: chunk });
            sequence += 1;
        }

        batches
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// File name of a persisted failed batch, e.g. `batch_0007.json`
pub fn batch_file_name(sequence: u64) -> String {
    format!("{BATCH_PREFIX}{sequence:04}.json")
}

/// File name of the per-record residue of a replayed batch
pub fn residual_file_name(sequence: u64) -> String {
    format!("{BATCH_PREFIX}{sequence:04}{RESIDUAL_SUFFIX}.json")
}

/// Recover the sequence number from either kind of batch file name
pub fn parse_sequence(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".json")?.strip_prefix(BATCH_PREFIX)?;
    let digits = stem.strip_suffix(RESIDUAL_SUFFIX).unwrap_or(stem);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::record;

    #[test]
    fn partitions_into_fixed_size_batches() {
        let records: Vec<_> = (0..250).map(|i| record(&format!("SKU{i}"), 1.0)).collect();
        let batches = Batch::partition(records, NonZeroUsize::new(100).unwrap(), 3);

        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        let sequences: Vec<_> = batches.iter().map(|b| b.sequence).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(sequences, vec![3, 4, 5]);
        assert_eq!(batches[2].records[0].identifier(), "SKU200");
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(Batch::partition(Vec::new(), NonZeroUsize::new(10).unwrap(), 1).is_empty());
    }

    #[test]
    fn file_names_round_trip_to_sequence() {
        assert_eq!(batch_file_name(7), "batch_0007.json");
        assert_eq!(residual_file_name(12), "batch_0012_errors.json");
        assert_eq!(parse_sequence("batch_0007.json"), Some(7));
        assert_eq!(parse_sequence("batch_12345.json"), Some(12345));
        assert_eq!(parse_sequence("batch_0012_errors.json"), Some(12));
        assert_eq!(parse_sequence("batch_.json"), None);
        assert_eq!(parse_sequence("batch_errors_log.json"), None);
        assert_eq!(parse_sequence("notes.txt"), None);
    }
}
