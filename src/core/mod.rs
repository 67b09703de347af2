//! Core document types, catalogs, totals, and numbering.
//!
//! This module provides the SIFEN electronic document (DE v150) data model,
//! the authority catalogs it is built from, and the control code (CDC)
//! that identifies every issued document.

mod builder;
mod catalog;
mod cdc;
mod error;
mod numbering;
mod totals;
mod types;
mod words;

pub use builder::*;
pub use catalog::*;
pub use cdc::*;
pub use error::*;
pub use numbering::*;
pub use totals::*;
pub use types::*;
pub use words::*;
