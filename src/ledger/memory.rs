//! In-process ledger for tests and single-machine runs.

use std::sync::{Mutex, MutexGuard};

use crate::digest::Digest;

use super::{IntegrityLedger, IntegrityRecord, LedgerError, RecordId};

/// Vec-backed ledger, append-only for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<IntegrityRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<IntegrityRecord>>, LedgerError> {
        self.records
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntegrityLedger for MemoryLedger {
    fn record(&self, record: IntegrityRecord) -> Result<RecordId, LedgerError> {
        let mut records = self.lock()?;
        records.push(record);
        Ok(RecordId(records.len() as u64 - 1))
    }

    fn lookup_input_for(&self, output: &Digest) -> Result<Option<Digest>, LedgerError> {
        let records = self.lock()?;
        Ok(records.iter().find(|r| r.output == *output).map(|r| r.input))
    }

    fn verify(&self, input: &Digest, output: &Digest) -> Result<bool, LedgerError> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .any(|r| r.input == *input && r.output == *output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_with_domain;

    fn digest(tag: u8) -> Digest {
        hash_with_domain(tag, b"ledger test")
    }

    #[test]
    fn test_record_then_verify() {
        let ledger = MemoryLedger::new();
        let record = IntegrityRecord {
            input: digest(1),
            output: digest(2),
        };
        let id = ledger.record(record).unwrap();
        assert_eq!(id, RecordId(0));
        assert!(ledger.verify(&digest(1), &digest(2)).unwrap());
        assert!(!ledger.verify(&digest(1), &digest(3)).unwrap());
        assert!(!ledger.verify(&digest(3), &digest(2)).unwrap());
    }

    #[test]
    fn test_duplicates_get_distinct_ids() {
        let ledger = MemoryLedger::new();
        let record = IntegrityRecord {
            input: digest(1),
            output: digest(2),
        };
        assert_eq!(ledger.record(record).unwrap(), RecordId(0));
        assert_eq!(ledger.record(record).unwrap(), RecordId(1));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_lookup_resolves_earliest_match() {
        let ledger = MemoryLedger::new();
        ledger
            .record(IntegrityRecord {
                input: digest(1),
                output: digest(9),
            })
            .unwrap();
        ledger
            .record(IntegrityRecord {
                input: digest(2),
                output: digest(9),
            })
            .unwrap();
        assert_eq!(ledger.lookup_input_for(&digest(9)).unwrap(), Some(digest(1)));
        assert_eq!(ledger.lookup_input_for(&digest(8)).unwrap(), None);
    }
}
