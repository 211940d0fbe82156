mod problem;

pub use problem::{Outcome, Problem};
pub(crate) use problem::push_unique;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Tick mark error: {0}")]
    Tick(#[from] TickError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Feature not found: {urn}")]
    NotFound { urn: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Tick mark calibration errors
#[derive(Debug, Error, PartialEq)]
pub enum TickError {
    #[error("Overlapping tick mark: {ticks:?} are not in cable order")]
    OverlappingTickMark { ticks: Vec<i64> },

    #[error("Cannot distribute tick distance over zero-length segments: {}", segments.join(", "))]
    ZeroLengthChain { segments: Vec<String> },

    #[error("Segment not found: {urn}")]
    SegmentNotFound { urn: String },

    #[error("Unknown length unit: {unit}")]
    UnknownUnit { unit: String },

    #[error("Unknown tick field: {field}")]
    UnknownField { field: String },
}

/// Snapshot loading errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate URN in snapshot: {urn}")]
    DuplicateUrn { urn: String },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for tick mark operations
pub type TickResult<T> = Result<T, TickError>;

/// Result type alias for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad network types".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad network types");

        let err = AppError::NotFound {
            urn: "mywcom_fiber_segment/9".to_string(),
        };
        assert_eq!(err.to_string(), "Feature not found: mywcom_fiber_segment/9");
    }

    #[test]
    fn test_tick_error_display() {
        let err = TickError::OverlappingTickMark {
            ticks: vec![30, 10, 20],
        };
        assert_eq!(
            err.to_string(),
            "Overlapping tick mark: [30, 10, 20] are not in cable order"
        );

        let err = TickError::ZeroLengthChain {
            segments: vec!["seg/1".to_string(), "seg/2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot distribute tick distance over zero-length segments: seg/1, seg/2"
        );

        let err = TickError::UnknownUnit {
            unit: "furlong".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown length unit: furlong");
    }

    #[test]
    fn test_tick_error_conversion_to_app_error() {
        let err: AppError = TickError::SegmentNotFound {
            urn: "seg/4".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Tick(_)));
        assert!(err.to_string().contains("Segment not found: seg/4"));
    }

    #[test]
    fn test_snapshot_error_conversion_to_app_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AppError = SnapshotError::from(json_err).into();
        assert!(matches!(err, AppError::Snapshot(SnapshotError::Json(_))));
    }
}
