//! Domain error types for parsing and validating submissions.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("unknown test type: {0}")]
    UnknownTestType(String),

    #[error("unknown gender: {0}")]
    UnknownGender(String),

    #[error("unknown submission status: {0}")]
    UnknownStatus(String),

    #[error("unknown result unit: {0}")]
    UnknownUnit(String),

    #[error("result must be a finite number, got {0}")]
    NonFiniteResult(f64),

    #[error("invalid review decision: {0} (expected approved, rejected or flagged)")]
    InvalidDecision(String),

    #[error("invalid weight for {test}: {weight}")]
    InvalidWeight { test: String, weight: f64 },
}
