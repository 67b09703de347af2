//! DE v150 serialization.
//!
//! The document is written directly in canonical form, so the bytes that
//! are hashed are the bytes that are sent.

mod de;
mod reader;
mod writer;

pub use de::*;
pub use reader::*;
pub use writer::*;

/// Target namespace of the SIFEN schemas.
pub const SIFEN_NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";

/// dVerFor: schema version written on every document.
pub const DE_VERSION: &str = "150";
