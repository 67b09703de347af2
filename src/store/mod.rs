//! Durable invoice records.
//!
//! One record per issuance attempt, keyed by business reference and attempt
//! number. Records move through `Draft → Signed → Submitted → Resolved`;
//! their authority status goes `Pending → Accepted | Rejected`. Accepted
//! records are never modified again, and no record is ever deleted: a
//! rejected attempt stays as it is and a later attempt supersedes it.

mod memory;
mod sled_store;

pub use memory::MemoryRecordStore;
pub use sled_store::SledRecordStore;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{ControlCode, DocumentNumber, FailureKind, Series, SifenError};
use crate::submit::{AuthorityResult, AuthorityStatus, MAX_URL_LEN, truncate_chars};

/// Authority status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Accepted,
    Rejected,
}

/// How far an attempt got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    Signed,
    Submitted,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Originating transaction, e.g. a payment stage id.
    pub business_ref: String,
    /// 1-based; assigned by [`RecordStore::begin_attempt`].
    pub attempt: u32,
    pub invoice_number: Option<DocumentNumber>,
    pub amount: Decimal,
    /// ISO 4217 code, or the label as received when it did not resolve.
    pub currency: String,
    /// Frozen at build time.
    pub exchange_rate: Option<Decimal>,
    pub control_code: Option<ControlCode>,
    pub security_code: Option<String>,
    pub protocol_number: Option<String>,
    pub status: RecordStatus,
    pub stage: Stage,
    pub failure: Option<FailureKind>,
    /// The signed rDE as submitted.
    pub signed_xml: Option<String>,
    pub verification_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// The triggering request as JSON, kept so a retry can rebuild the
    /// document from the same business data.
    #[serde(default)]
    pub request: Option<String>,
}

impl InvoiceRecord {
    /// A fresh draft. The store assigns the attempt number.
    pub fn draft(
        business_ref: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        exchange_rate: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            business_ref: business_ref.into(),
            attempt: 0,
            invoice_number: None,
            amount,
            currency: currency.into(),
            exchange_rate,
            control_code: None,
            security_code: None,
            protocol_number: None,
            status: RecordStatus::Pending,
            stage: Stage::Draft,
            failure: None,
            signed_xml: None,
            verification_url: None,
            created_at: now,
            submitted_at: None,
            resolved_at: None,
            updated_at: now,
            last_error: None,
            request: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == RecordStatus::Accepted
    }

    /// Store a verification URL, truncated to [`MAX_URL_LEN`] characters.
    pub fn set_verification_url(&mut self, url: &str) {
        self.verification_url = Some(truncate_chars(url, MAX_URL_LEN).to_string());
    }

    /// Fold an authority verdict into this record.
    pub fn apply_result(&mut self, result: &AuthorityResult, now: DateTime<Utc>) {
        if self.control_code.is_none() {
            self.control_code = result.control_code.clone();
        }
        if let Some(url) = &result.verification_url {
            self.set_verification_url(url);
        }
        if result.protocol_number.is_some() {
            self.protocol_number = result.protocol_number.clone();
        }
        self.updated_at = now;

        match result.status {
            AuthorityStatus::Accepted => {
                self.status = RecordStatus::Accepted;
                self.stage = Stage::Resolved;
                self.resolved_at = Some(now);
                self.failure = None;
                self.last_error = None;
            }
            AuthorityStatus::Rejected => {
                self.status = RecordStatus::Rejected;
                self.stage = Stage::Resolved;
                self.resolved_at = Some(now);
                self.failure = Some(FailureKind::Rejected);
                self.last_error = Some(match (&result.code, &result.message) {
                    (Some(code), Some(msg)) => format!("{code}: {msg}"),
                    (None, Some(msg)) => msg.clone(),
                    (Some(code), None) => format!("rejected with code {code}"),
                    (None, None) => "rejected without a message".to_string(),
                });
            }
            AuthorityStatus::Pending => {
                self.status = RecordStatus::Pending;
                self.stage = self.stage.max(Stage::Submitted);
                self.failure = None;
                self.last_error = result.message.clone();
            }
        }
    }

    /// Record a pipeline failure. Only an authority rejection resolves the
    /// record; everything else leaves it pending for a retry.
    pub fn record_failure(&mut self, error: &SifenError, now: DateTime<Utc>) {
        let kind = error.kind();
        self.failure = Some(kind);
        self.last_error = Some(error.to_string());
        self.updated_at = now;
        if kind == FailureKind::Rejected {
            self.status = RecordStatus::Rejected;
            self.stage = Stage::Resolved;
            self.resolved_at = Some(now);
        }
    }
}

/// Persistence for invoice records.
///
/// Writes for one business reference must be serialized by the caller;
/// the pipeline does so with per-reference locks. Implementations still
/// reject writes that would break the record invariants.
pub trait RecordStore: Send + Sync {
    /// Next document number of `series`. Numbers are never handed out twice.
    fn allocate_number(&self, series: &Series) -> Result<DocumentNumber, SifenError>;

    /// All attempts for `business_ref`, oldest first.
    fn history(&self, business_ref: &str) -> Result<Vec<InvoiceRecord>, SifenError>;

    fn get(&self, business_ref: &str, attempt: u32) -> Result<Option<InvoiceRecord>, SifenError>;

    /// Insert `draft` as the next attempt for its business reference.
    /// When an accepted attempt already exists it is returned instead and
    /// nothing is written.
    fn begin_attempt(&self, draft: InvoiceRecord) -> Result<InvoiceRecord, SifenError>;

    /// Overwrite an existing attempt. Fails when the stored attempt is
    /// accepted or when the write would change its control code.
    fn save(&self, record: &InvoiceRecord) -> Result<(), SifenError>;

    /// Latest attempt of every business reference that is not accepted.
    fn unresolved(&self) -> Result<Vec<InvoiceRecord>, SifenError>;

    fn latest(&self, business_ref: &str) -> Result<Option<InvoiceRecord>, SifenError> {
        Ok(self.history(business_ref)?.pop())
    }

    /// The accepted attempt for `business_ref`, if any.
    fn accepted(&self, business_ref: &str) -> Result<Option<InvoiceRecord>, SifenError> {
        Ok(self
            .history(business_ref)?
            .into_iter()
            .find(InvoiceRecord::is_accepted))
    }

    /// Apply an authority result to the attempt it belongs to: the one
    /// carrying the same control code, or the latest attempt when the result
    /// names none. If the reference already has an accepted attempt that
    /// record is returned unchanged.
    ///
    /// Fails when no attempt carries the result's control code or when the
    /// target attempt already has a verdict.
    fn upsert_result(
        &self,
        business_ref: &str,
        result: &AuthorityResult,
    ) -> Result<InvoiceRecord, SifenError> {
        let history = self.history(business_ref)?;
        if let Some(accepted) = history.iter().find(|r| r.is_accepted()) {
            return Ok(accepted.clone());
        }
        let target = match &result.control_code {
            Some(cdc) => history
                .iter()
                .rev()
                .find(|r| r.control_code.as_ref() == Some(cdc))
                .ok_or_else(|| {
                    SifenError::Store(format!(
                        "no attempt of {business_ref:?} carries control code {cdc}"
                    ))
                })?,
            None => history.last().ok_or_else(|| {
                SifenError::Store(format!("no invoice record for business reference {business_ref:?}"))
            })?,
        };
        if target.status != RecordStatus::Pending {
            return Err(SifenError::Store(format!(
                "attempt {} of {business_ref:?} is already {:?}",
                target.attempt, target.status
            )));
        }

        let mut record = target.clone();
        record.apply_result(result, Utc::now());
        self.save(&record)?;
        Ok(record)
    }
}

pub(crate) fn check_business_ref(business_ref: &str) -> Result<(), SifenError> {
    if business_ref.trim().is_empty() || business_ref.contains('\0') {
        return Err(SifenError::Store(format!(
            "invalid business reference {business_ref:?}"
        )));
    }
    Ok(())
}

/// Invariants shared by every `save` implementation.
pub(crate) fn check_overwrite(
    existing: &InvoiceRecord,
    update: &InvoiceRecord,
) -> Result<(), SifenError> {
    if existing.is_accepted() {
        return Err(SifenError::Store(format!(
            "attempt {} of {:?} is accepted and cannot change",
            existing.attempt, existing.business_ref
        )));
    }
    if existing.status == RecordStatus::Rejected && !same_verdict(existing, update) {
        return Err(SifenError::Store(format!(
            "attempt {} of {:?} is rejected and kept as issued",
            existing.attempt, existing.business_ref
        )));
    }
    if let Some(cdc) = &existing.control_code {
        if update.control_code.as_ref() != Some(cdc) {
            return Err(SifenError::Store(format!(
                "attempt {} of {:?} already carries control code {cdc}",
                existing.attempt, existing.business_ref
            )));
        }
    }
    Ok(())
}

/// Everything a verdict fixes on an attempt. Bookkeeping such as
/// `last_error` and `updated_at` may still change.
fn same_verdict(a: &InvoiceRecord, b: &InvoiceRecord) -> bool {
    a.status == b.status
        && a.stage == b.stage
        && a.failure == b.failure
        && a.invoice_number == b.invoice_number
        && a.control_code == b.control_code
        && a.security_code == b.security_code
        && a.protocol_number == b.protocol_number
        && a.signed_xml == b.signed_xml
        && a.verification_url == b.verification_url
        && a.resolved_at == b.resolved_at
}
