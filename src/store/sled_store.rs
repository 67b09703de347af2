use std::collections::BTreeMap;
use std::path::Path;

use super::{InvoiceRecord, RecordStore, check_business_ref, check_overwrite};
use crate::core::{DocumentNumber, Series, SifenError};

/// Durable store on sled.
///
/// Records live in the `records` tree under `"{business_ref}\0{attempt:010}"`
/// so that one prefix scan returns a reference's history in order. Series
/// counters live in `counters` as big-endian `u64`s. Every write is a
/// compare-and-swap against the value just read, followed by a flush.
#[derive(Clone)]
pub struct SledRecordStore {
    db: sled::Db,
    records: sled::Tree,
    counters: sled::Tree,
}

fn store_err(e: impl std::fmt::Display) -> SifenError {
    SifenError::Store(e.to_string())
}

fn record_key(business_ref: &str, attempt: u32) -> String {
    format!("{business_ref}\0{attempt:010}")
}

fn decode(bytes: &[u8]) -> Result<InvoiceRecord, SifenError> {
    serde_json::from_slice(bytes).map_err(|e| SifenError::Store(format!("corrupt record: {e}")))
}

fn encode(record: &InvoiceRecord) -> Result<Vec<u8>, SifenError> {
    serde_json::to_vec(record).map_err(store_err)
}

impl SledRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SifenError> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| SifenError::Store(format!("cannot open {}: {e}", path.display())))?;
        Self::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, SifenError> {
        Ok(Self {
            records: db.open_tree("records").map_err(store_err)?,
            counters: db.open_tree("counters").map_err(store_err)?,
            db,
        })
    }

    fn flush(&self) -> Result<(), SifenError> {
        self.db.flush().map_err(store_err)?;
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn allocate_number(&self, series: &Series) -> Result<DocumentNumber, SifenError> {
        let next = self
            .counters
            .update_and_fetch(series.key(), |old| {
                let current = old
                    .and_then(|b| <[u8; 8]>::try_from(b).ok())
                    .map_or(0, u64::from_be_bytes);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(store_err)?
            .and_then(|b| <[u8; 8]>::try_from(b.as_ref()).ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| SifenError::Store(format!("counter {} unreadable", series.key())))?;
        self.flush()?;
        series.number(next)
    }

    fn history(&self, business_ref: &str) -> Result<Vec<InvoiceRecord>, SifenError> {
        self.records
            .scan_prefix(format!("{business_ref}\0"))
            .map(|item| {
                let (_key, value) = item.map_err(store_err)?;
                decode(&value)
            })
            .collect()
    }

    fn get(&self, business_ref: &str, attempt: u32) -> Result<Option<InvoiceRecord>, SifenError> {
        self.records
            .get(record_key(business_ref, attempt))
            .map_err(store_err)?
            .map(|v| decode(&v))
            .transpose()
    }

    fn begin_attempt(&self, mut draft: InvoiceRecord) -> Result<InvoiceRecord, SifenError> {
        check_business_ref(&draft.business_ref)?;
        loop {
            let history = self.history(&draft.business_ref)?;
            if let Some(accepted) = history.iter().find(|r| r.is_accepted()) {
                return Ok(accepted.clone());
            }
            draft.attempt = history.last().map_or(1, |r| r.attempt + 1);
            let key = record_key(&draft.business_ref, draft.attempt);
            let swapped = self
                .records
                .compare_and_swap(key, None::<&[u8]>, Some(encode(&draft)?))
                .map_err(store_err)?;
            if swapped.is_ok() {
                self.flush()?;
                return Ok(draft);
            }
            tracing::debug!(business_ref = %draft.business_ref, "attempt number taken, retrying");
        }
    }

    fn save(&self, record: &InvoiceRecord) -> Result<(), SifenError> {
        let key = record_key(&record.business_ref, record.attempt);
        let encoded = encode(record)?;
        loop {
            let current = self.records.get(&key).map_err(store_err)?.ok_or_else(|| {
                SifenError::Store(format!(
                    "attempt {} of {:?} does not exist",
                    record.attempt, record.business_ref
                ))
            })?;
            check_overwrite(&decode(&current)?, record)?;
            let swapped = self
                .records
                .compare_and_swap(&key, Some(current), Some(encoded.clone()))
                .map_err(store_err)?;
            if swapped.is_ok() {
                return self.flush();
            }
        }
    }

    fn unresolved(&self) -> Result<Vec<InvoiceRecord>, SifenError> {
        let mut latest = BTreeMap::new();
        for item in self.records.iter() {
            let (_key, value) = item.map_err(store_err)?;
            let record = decode(&value)?;
            latest.insert(record.business_ref.clone(), record);
        }
        Ok(latest.into_values().filter(|r| !r.is_accepted()).collect())
    }
}
