//! Issuance pipeline: payment event → document → signature → authority →
//! invoice record.
//!
//! [`Issuer`] runs one issuance inline. [`IssuanceQueue`] runs issuances in
//! the background, so the code reacting to a payment only enqueues and
//! returns; outcomes are observed through the [`RecordStore`](crate::store::RecordStore).

mod event;
mod issuer;
mod locks;
mod queue;

pub use event::*;
pub use issuer::*;
pub use locks::KeyedLocks;
pub use queue::*;

use chrono::{DateTime, Utc};

/// Source of "now" for document dates and certificate checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
