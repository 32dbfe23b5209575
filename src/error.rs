// Errors and warnings produced by the bin ledger
//
// Errors reject an operation before anything is mutated or logged.
// Warnings ride along on a successful outcome when the applied quantity
// differs from the requested one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("bin \"{0}\" not found")]
    BinNotFound(String),

    #[error("bin \"{0}\" already exists")]
    DuplicateBin(String),

    #[error("bin name must not be blank")]
    InvalidBinName,

    #[error("invalid capacity for \"{bin}\": {reason}")]
    InvalidCapacity { bin: String, reason: String },

    #[error("invalid quantity {0}: must be a finite number greater than zero")]
    InvalidQuantity(f64),

    /// Bin already holds `assigned`, the request carried `requested`.
    #[error("can't mix {requested} with {assigned} in \"{bin}\"")]
    VarietyMismatch {
        bin: String,
        assigned: String,
        requested: String,
    },

    #[error("bin \"{0}\" has no variety assigned; a variety is required")]
    MissingVariety(String),

    #[error("bin \"{bin}\" still holds {fill} bu")]
    BinNotEmpty { bin: String, fill: f64 },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("backup error: {0}")]
    Backup(String),
}

impl LedgerError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::BinNotFound(_) => "BinNotFound",
            LedgerError::DuplicateBin(_) => "DuplicateBin",
            LedgerError::InvalidBinName => "InvalidBinName",
            LedgerError::InvalidCapacity { .. } => "InvalidCapacity",
            LedgerError::InvalidQuantity(_) => "InvalidQuantity",
            LedgerError::VarietyMismatch { .. } => "VarietyMismatch",
            LedgerError::MissingVariety(_) => "MissingVariety",
            LedgerError::BinNotEmpty { .. } => "BinNotEmpty",
            LedgerError::Persistence(_) => "PersistenceFailure",
            LedgerError::Backup(_) => "BackupFailure",
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, LedgerError::Persistence(_))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ============================================================================
// WARNINGS
// ============================================================================

/// Non-fatal notices; the operation went through with an adjusted quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LedgerWarning {
    /// Delivery larger than the room left in the bin
    ClampedToCapacity {
        requested: f64,
        accepted: f64,
        rejected: f64,
    },

    /// Unload larger than what the bin holds
    InsufficientStock {
        requested: f64,
        taken: f64,
        shortfall: f64,
    },
}

impl std::fmt::Display for LedgerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerWarning::ClampedToCapacity {
                requested,
                accepted,
                rejected,
            } => write!(
                f,
                "bin full: accepted {} of {} bu, {} bu rejected",
                accepted, requested, rejected
            ),
            LedgerWarning::InsufficientStock {
                requested,
                taken,
                shortfall,
            } => write!(
                f,
                "only {} of {} bu available, short by {} bu",
                taken, requested, shortfall
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_user_facing() {
        let err = LedgerError::VarietyMismatch {
            bin: "Bin 3".to_string(),
            assigned: "Wheat".to_string(),
            requested: "Corn".to_string(),
        };
        assert_eq!(err.to_string(), "can't mix Corn with Wheat in \"Bin 3\"");
        assert_eq!(err.kind(), "VarietyMismatch");
    }

    #[test]
    fn test_io_errors_become_persistence_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: LedgerError = io.into();
        assert!(err.is_persistence());
        assert_eq!(err.kind(), "PersistenceFailure");
    }

    #[test]
    fn test_warning_display() {
        let warning = LedgerWarning::ClampedToCapacity {
            requested: 500.0,
            accepted: 400.0,
            rejected: 100.0,
        };
        assert_eq!(
            warning.to_string(),
            "bin full: accepted 400 of 500 bu, 100 bu rejected"
        );
    }
}
