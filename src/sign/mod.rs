//! XML-DSig enveloped signatures over canonical DE bytes.
//!
//! The digest covers the canonical `DE` element. The `Signature` element is
//! its sibling under `rDE`, so the enveloped-signature transform removes
//! nothing from the digest input.

mod credentials;
mod xmldsig;

pub use credentials::SigningCredentials;
pub use xmldsig::*;
