//! sheetguard: safety gate for spreadsheet mutations
//!
//! Resolves where a requested change lands, estimates how much data it touches,
//! classifies the risk and returns a single verdict before anything is written.

pub mod config;
pub mod error;
pub mod operation;
pub mod safety;
pub mod sheet;

pub use config::{ConfigHandle, SafetyConfig};
pub use error::{Result, SheetGuardError};
pub use operation::{OperationKind, OperationRequest};
pub use safety::{SafetyDecision, SafetyManager, Verdict};
pub use sheet::{CellValue, SheetSnapshot};
