use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{InvoiceRecord, RecordStore, check_business_ref, check_overwrite};
use crate::core::{DocumentNumber, Series, SifenError};

/// In-process store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, Vec<InvoiceRecord>>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, SifenError> {
    m.lock()
        .map_err(|_| SifenError::Store("record store lock poisoned".into()))
}

impl RecordStore for MemoryRecordStore {
    fn allocate_number(&self, series: &Series) -> Result<DocumentNumber, SifenError> {
        let mut counters = lock(&self.counters)?;
        let next = counters.entry(series.key()).or_insert(0);
        let candidate = *next + 1;
        let number = series.number(candidate)?;
        *next = candidate;
        Ok(number)
    }

    fn history(&self, business_ref: &str) -> Result<Vec<InvoiceRecord>, SifenError> {
        Ok(lock(&self.records)?
            .get(business_ref)
            .cloned()
            .unwrap_or_default())
    }

    fn get(&self, business_ref: &str, attempt: u32) -> Result<Option<InvoiceRecord>, SifenError> {
        Ok(lock(&self.records)?
            .get(business_ref)
            .and_then(|h| h.iter().find(|r| r.attempt == attempt))
            .cloned())
    }

    fn begin_attempt(&self, mut draft: InvoiceRecord) -> Result<InvoiceRecord, SifenError> {
        check_business_ref(&draft.business_ref)?;
        let mut records = lock(&self.records)?;
        let history = records.entry(draft.business_ref.clone()).or_default();
        if let Some(accepted) = history.iter().find(|r| r.is_accepted()) {
            return Ok(accepted.clone());
        }
        draft.attempt = history.last().map_or(1, |r| r.attempt + 1);
        history.push(draft.clone());
        Ok(draft)
    }

    fn save(&self, record: &InvoiceRecord) -> Result<(), SifenError> {
        let mut records = lock(&self.records)?;
        let slot = records
            .get_mut(&record.business_ref)
            .and_then(|h| h.iter_mut().find(|r| r.attempt == record.attempt))
            .ok_or_else(|| {
                SifenError::Store(format!(
                    "attempt {} of {:?} does not exist",
                    record.attempt, record.business_ref
                ))
            })?;
        check_overwrite(slot, record)?;
        *slot = record.clone();
        Ok(())
    }

    fn unresolved(&self) -> Result<Vec<InvoiceRecord>, SifenError> {
        Ok(lock(&self.records)?
            .values()
            .filter_map(|h| h.last())
            .filter(|r| !r.is_accepted())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentType;
    use crate::store::tests::{draft, exercise_store};

    #[test]
    fn shared_behaviour() {
        exercise_store(&MemoryRecordStore::new());
    }

    #[test]
    fn series_are_independent() {
        let store = MemoryRecordStore::new();
        let a = Series::new(DocumentType::Invoice, 1, 1);
        let b = Series::new(DocumentType::Invoice, 1, 2);
        assert_eq!(store.allocate_number(&a).unwrap().number, 1);
        assert_eq!(store.allocate_number(&a).unwrap().number, 2);
        assert_eq!(store.allocate_number(&b).unwrap().number, 1);
        assert_eq!(store.allocate_number(&b).unwrap().to_string(), "001-002-0000002");
    }

    #[test]
    fn save_requires_existing_attempt() {
        let store = MemoryRecordStore::new();
        let mut rec = draft("pay-9");
        rec.attempt = 3;
        assert!(store.save(&rec).is_err());
    }
}
