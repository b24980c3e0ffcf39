//! Safety evaluation pipeline for sheet mutations
//!
//! Every operation request passes through the same fixed sequence of stages
//! before anything is allowed to touch sheet storage.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ ParameterValidator │ - required fields, types, bounds, formula injection
//! └─────────┬──────────┘
//!           │ sanitized parameters
//!           ▼
//! ┌────────────────────┐
//! │   TargetResolver   │ - rows / range / conditions / unique identifier
//! └─────────┬──────────┘   (ConditionEvaluator per row)
//!           │ ResolvedTarget
//!           ▼
//! ┌────────────────────┐
//! │   ScopeAnalyzer    │ - rows x columns = cells, limit violations
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐
//! │    RiskAssessor    │ - Low / Medium / High / Dangerous
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐
//! │   CommandBlocker   │ - deny-list, dangerous phrases, full-sheet ranges
//! └─────────┬──────────┘
//!           ▼
//! ┌────────────────────┐
//! │   SafetyManager    │ - verdict + confirmation prompt
//! └────────────────────┘
//! ```
//!
//! ## Verdicts
//!
//! - `Allow`: low risk, or a confirmed medium/high risk request
//! - `Confirm`: medium/high risk, resubmit with `confirmed = true`
//! - `Block`: deny-listed or dangerous, confirmation never lifts it
//! - `Reject`: invalid parameters or unclear target, the caller must fix the request
//!
//! All stages are pure functions of the request, the sheet snapshot and the
//! configuration snapshot the manager was built with.

pub mod audit;
pub mod blocker;
pub mod condition;
pub mod decision;
pub mod manager;
pub mod range;
pub mod risk;
pub mod scope;
pub mod target;
pub mod validator;

pub use audit::AuditRecord;
pub use blocker::{BlockResult, CommandBlocker};
pub use condition::{ConditionClause, ConditionEvaluator, ConditionOperator};
pub use decision::{SafetyDecision, Verdict};
pub use manager::SafetyManager;
pub use range::CellRange;
pub use risk::{RiskAssessment, RiskAssessor, RiskLevel};
pub use scope::{LimitKind, LimitViolation, ScopeAnalysis, ScopeAnalyzer, ScopeSource};
pub use target::{ResolvedTarget, TargetMode, TargetResolver, TargetSpec};
pub use validator::{FieldError, ParameterValidator, ValidationResult};
