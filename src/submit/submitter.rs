use std::sync::Arc;

use chrono::Utc;

use super::AuthorityClient;
use crate::core::{ControlCode, SifenError};
use crate::sign::SignedDocument;
use crate::store::{InvoiceRecord, RecordStore, Stage};

/// What [`Submitter::submit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The business reference already had an accepted document; nothing
    /// was sent.
    AlreadyAccepted(InvoiceRecord),
    /// One submission was made. The record carries the verdict or the
    /// failure.
    Submitted(InvoiceRecord),
}

impl SubmitOutcome {
    pub fn record(&self) -> &InvoiceRecord {
        match self {
            Self::AlreadyAccepted(r) | Self::Submitted(r) => r,
        }
    }

    pub fn into_record(self) -> InvoiceRecord {
        match self {
            Self::AlreadyAccepted(r) | Self::Submitted(r) => r,
        }
    }
}

/// What [`Submitter::resolve`] learned about a pending attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The authority knows the document; the record holds its state.
    Known(InvoiceRecord),
    /// The authority has never seen the control code.
    Unknown(InvoiceRecord),
    /// The lookup itself failed; the record is still pending.
    Failed(InvoiceRecord),
}

/// Sends signed documents and folds the outcome into the record store.
///
/// Each call makes at most one network request. Errors are returned only
/// when the store fails; everything else ends up on the record.
#[derive(Clone)]
pub struct Submitter {
    client: Arc<dyn AuthorityClient>,
    store: Arc<dyn RecordStore>,
}

impl Submitter {
    pub fn new(client: Arc<dyn AuthorityClient>, store: Arc<dyn RecordStore>) -> Self {
        Self { client, store }
    }

    /// Submit `document` for `record`.
    pub async fn submit(
        &self,
        mut record: InvoiceRecord,
        document: &SignedDocument,
    ) -> Result<SubmitOutcome, SifenError> {
        if let Some(accepted) = self.store.accepted(&record.business_ref)? {
            tracing::info!(
                business_ref = %record.business_ref,
                control_code = ?accepted.control_code,
                "already accepted, skipping submission"
            );
            return Ok(SubmitOutcome::AlreadyAccepted(accepted));
        }

        let now = Utc::now();
        record.stage = Stage::Submitted;
        record.submitted_at = Some(now);
        record.updated_at = now;
        self.store.save(&record)?;

        match self.client.submit(document).await {
            Ok(result) => {
                if let Some(returned) = &result.control_code {
                    if returned != document.control_code() {
                        let err = SifenError::AmbiguousResponse {
                            message: format!(
                                "authority answered for {returned}, expected {}",
                                document.control_code()
                            ),
                            raw: result.raw_response.clone(),
                        };
                        tracing::warn!(business_ref = %record.business_ref, error = %err, "mismatched response");
                        record.record_failure(&err, Utc::now());
                        self.store.save(&record)?;
                        return Ok(SubmitOutcome::Submitted(record));
                    }
                }
                record.apply_result(&result, Utc::now());
                tracing::info!(
                    business_ref = %record.business_ref,
                    attempt = record.attempt,
                    status = ?record.status,
                    protocol = ?record.protocol_number,
                    "authority answered"
                );
            }
            Err(e) => {
                let err = SifenError::from(e);
                tracing::warn!(
                    business_ref = %record.business_ref,
                    attempt = record.attempt,
                    error = %err,
                    "submission failed"
                );
                record.record_failure(&err, Utc::now());
            }
        }
        self.store.save(&record)?;
        Ok(SubmitOutcome::Submitted(record))
    }

    /// Ask the authority about a pending attempt that carries a control code.
    pub async fn resolve(&self, mut record: InvoiceRecord) -> Result<Lookup, SifenError> {
        let Some(control_code) = record.control_code.clone() else {
            return Err(SifenError::Store(format!(
                "attempt {} of {:?} has no control code to look up",
                record.attempt, record.business_ref
            )));
        };

        match self.client.lookup(&control_code).await {
            Ok(Some(result)) if result.control_code.as_ref().is_some_and(|c| *c != control_code) => {
                let err = SifenError::AmbiguousResponse {
                    message: format!(
                        "lookup for {control_code} answered for {}",
                        result.control_code.as_ref().map(ControlCode::as_str).unwrap_or_default()
                    ),
                    raw: result.raw_response,
                };
                tracing::warn!(business_ref = %record.business_ref, error = %err, "mismatched lookup");
                record.record_failure(&err, Utc::now());
                self.store.save(&record)?;
                Ok(Lookup::Failed(record))
            }
            Ok(Some(mut result)) => {
                result.control_code.get_or_insert(control_code);
                record.apply_result(&result, Utc::now());
                self.store.save(&record)?;
                tracing::info!(
                    business_ref = %record.business_ref,
                    status = ?record.status,
                    "lookup resolved pending attempt"
                );
                Ok(Lookup::Known(record))
            }
            Ok(None) => {
                record.last_error = Some(format!(
                    "authority has no record of {control_code}; superseded by a new attempt"
                ));
                record.updated_at = Utc::now();
                self.store.save(&record)?;
                Ok(Lookup::Unknown(record))
            }
            Err(e) => {
                let err = SifenError::from(e);
                tracing::warn!(business_ref = %record.business_ref, error = %err, "lookup failed");
                record.record_failure(&err, Utc::now());
                self.store.save(&record)?;
                Ok(Lookup::Failed(record))
            }
        }
    }
}
