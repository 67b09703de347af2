use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use super::{Clock, KeyedLocks, PaymentApproved, SystemClock};
use crate::config::{SifenConfig, SubmissionConfig};
use crate::core::*;
use crate::qr::QrBuilder;
use crate::sign::{SignedDocument, SigningCredentials, sign};
use crate::store::{InvoiceRecord, RecordStatus, RecordStore, SledRecordStore, Stage};
use crate::submit::{AuthorityClient, Lookup, RelayClient, SifenClient, Submitter};
use crate::xml::serialize;

/// Runs the issuance pipeline for one business reference at a time.
///
/// Every failure is written to the invoice record; `issue` and `retry`
/// return `Err` only when the store itself fails.
pub struct Issuer {
    emitter: Emitter,
    series: Series,
    credentials: Arc<SigningCredentials>,
    qr: QrBuilder,
    submitter: Submitter,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    locks: KeyedLocks,
}

impl Issuer {
    pub fn new(
        emitter: Emitter,
        series: Series,
        credentials: SigningCredentials,
        qr: QrBuilder,
        client: Arc<dyn AuthorityClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            emitter,
            series,
            credentials: Arc::new(credentials),
            qr,
            submitter: Submitter::new(client, Arc::clone(&store)),
            store,
            clock: Arc::new(SystemClock),
            utc_offset: FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Offset used to turn "now" into the emitter's local emission time.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Wire everything from configuration: credentials from disk, the
    /// configured submission mode and a sled store.
    pub fn from_config(config: &SifenConfig) -> Result<Self, SifenError> {
        config.validate()?;
        let credentials = SigningCredentials::from_files(&config.certificate_path, &config.key_path)?;
        let client: Arc<dyn AuthorityClient> = match &config.submission {
            SubmissionConfig::Direct { identity_pem } => {
                let identity = identity_pem
                    .as_ref()
                    .map(|path| {
                        std::fs::read(path).map_err(|e| {
                            SifenError::Config(format!("cannot read {}: {e}", path.display()))
                        })
                    })
                    .transpose()?;
                Arc::new(SifenClient::new(
                    config.environment,
                    config.timeout(),
                    identity.as_deref(),
                )?)
            }
            SubmissionConfig::Relay { base_url, api_key } => {
                Arc::new(RelayClient::new(base_url, api_key, config.timeout())?)
            }
        };
        let store: Arc<dyn RecordStore> = Arc::new(SledRecordStore::open(&config.store_path)?);

        Ok(Self::new(
            config.emitter.to_emitter()?,
            config.emitter.series(),
            credentials,
            QrBuilder::new(config.environment, &config.csc_id, &config.csc),
            client,
            store,
        )
        .with_utc_offset(config.utc_offset()?))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Invoice a payment. A reference that already has an accepted document
    /// gets that record back and nothing is sent.
    pub async fn issue(&self, event: &PaymentApproved) -> Result<InvoiceRecord, SifenError> {
        let _guard = self.locks.lock(&event.business_ref).await;
        self.run(event).await
    }

    /// Re-run the pipeline for a reference using the request stored on its
    /// latest attempt.
    pub async fn retry(&self, business_ref: &str) -> Result<InvoiceRecord, SifenError> {
        let _guard = self.locks.lock(business_ref).await;
        let latest = self.store.latest(business_ref)?.ok_or_else(|| {
            SifenError::Store(format!("no invoice record for business reference {business_ref:?}"))
        })?;
        let event: PaymentApproved = latest
            .request
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| SifenError::Store(format!("stored request unreadable: {e}")))?
            .ok_or_else(|| {
                SifenError::Store(format!("record {business_ref:?} carries no request to retry"))
            })?;
        tracing::info!(business_ref, attempt = latest.attempt, "manual retry");
        self.run(&event).await
    }

    async fn run(&self, event: &PaymentApproved) -> Result<InvoiceRecord, SifenError> {
        let business_ref = event.business_ref.as_str();
        if let Some(accepted) = self.store.accepted(business_ref)? {
            tracing::info!(business_ref, control_code = ?accepted.control_code, "already invoiced");
            return Ok(accepted);
        }

        if let Some(latest) = self.store.latest(business_ref)? {
            if latest.status == RecordStatus::Pending
                && latest.stage >= Stage::Submitted
                && latest.control_code.is_some()
            {
                // The authority may already hold this document.
                match self.submitter.resolve(latest).await? {
                    Lookup::Known(record) if record.status != RecordStatus::Rejected => {
                        return Ok(record);
                    }
                    Lookup::Failed(record) => return Ok(record),
                    Lookup::Known(_) | Lookup::Unknown(_) => {}
                }
            }
        }

        self.attempt(event).await
    }

    /// One fresh attempt: new number, new security code, new control code.
    async fn attempt(&self, event: &PaymentApproved) -> Result<InvoiceRecord, SifenError> {
        let now = self.clock.now();
        let mut draft = InvoiceRecord::draft(
            &event.business_ref,
            event.amount,
            event.currency_code(),
            event.exchange_rate,
            now,
        );
        draft.request = Some(
            serde_json::to_string(event)
                .map_err(|e| SifenError::Store(format!("cannot encode request: {e}")))?,
        );
        let mut record = self.store.begin_attempt(draft)?;
        if record.is_accepted() {
            return Ok(record);
        }
        tracing::info!(business_ref = %record.business_ref, attempt = record.attempt, "issuing");

        let resolved = match event.resolve() {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(record, e),
        };
        let number = self.store.allocate_number(&self.series)?;
        record.invoice_number = Some(number);

        let signed = match self.produce(resolved, number, now) {
            Ok(signed) => signed,
            Err(e) => return self.fail(record, e),
        };
        let xml = match signed.xml() {
            Ok(xml) => xml,
            Err(e) => return self.fail(record, e),
        };

        let summary = signed.summary();
        record.control_code = Some(signed.control_code().clone());
        record.security_code = Some(summary.security_code.as_str().to_string());
        record.exchange_rate = summary.exchange_rate;
        record.signed_xml = Some(xml);
        if let Some(url) = signed.verification_url() {
            record.set_verification_url(url);
        }
        record.stage = Stage::Signed;
        record.updated_at = Utc::now();
        self.store.save(&record)?;

        Ok(self.submitter.submit(record, &signed).await?.into_record())
    }

    /// Build, serialize and sign. Pure apart from the security code draw.
    fn produce(
        &self,
        resolved: super::ResolvedPayment,
        number: DocumentNumber,
        now: DateTime<Utc>,
    ) -> Result<SignedDocument, SifenError> {
        let issued_at = now.with_timezone(&self.utc_offset).naive_local();
        let document = DocumentBuilder::new(self.emitter.clone(), resolved.receiver, number)
            .payment(resolved.payment)
            .add_item(resolved.item)
            .build_at(issued_at)?;
        let canonical = serialize(&document)?;
        Ok(sign(canonical, &self.credentials, now)?.with_qr(&self.qr))
    }

    fn fail(&self, mut record: InvoiceRecord, error: SifenError) -> Result<InvoiceRecord, SifenError> {
        tracing::warn!(
            business_ref = %record.business_ref,
            attempt = record.attempt,
            kind = ?error.kind(),
            error = %error,
            "issuance failed before submission"
        );
        record.record_failure(&error, Utc::now());
        self.store.save(&record)?;
        Ok(record)
    }
}
