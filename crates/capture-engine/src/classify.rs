//! Capture failure classification.

use multiwall_common::error::WallError;
use multiwall_instance_model::InstanceId;
use multiwall_platform_core::FailureCode;
use serde::{Deserialize, Serialize};

/// Failure code reported when the captured application has exited.
pub const TARGET_CLOSED_CODE: i64 = -3815;

/// Why a capture stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamErrorKind {
    /// The captured process ended. Never retried; the instance goes away.
    TargetClosed,
    /// Anything else. Eligible for bounded retry.
    Unknown(i64),
}

impl StreamErrorKind {
    /// The error reported for `instance` failing this way.
    pub fn into_error(self, instance: InstanceId) -> WallError {
        match self {
            StreamErrorKind::TargetClosed => WallError::StreamTargetClosed {
                instance: instance.get(),
            },
            StreamErrorKind::Unknown(code) => WallError::StreamTransient {
                instance: instance.get(),
                code,
            },
        }
    }
}

/// Map a raw failure code to its kind.
pub fn classify(code: FailureCode) -> StreamErrorKind {
    match code.0 {
        TARGET_CLOSED_CODE => StreamErrorKind::TargetClosed,
        other => StreamErrorKind::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_closed_code_is_exact() {
        assert_eq!(classify(FailureCode(-3815)), StreamErrorKind::TargetClosed);
        for code in [-3816, -3814, 3815, 0, -1, i64::MIN, i64::MAX] {
            assert_eq!(classify(FailureCode(code)), StreamErrorKind::Unknown(code));
        }
    }

    #[test]
    fn test_kinds_map_onto_the_error_taxonomy() {
        assert!(matches!(
            StreamErrorKind::TargetClosed.into_error(InstanceId(3)),
            WallError::StreamTargetClosed { instance: 3 }
        ));
        assert!(matches!(
            StreamErrorKind::Unknown(-7).into_error(InstanceId(1)),
            WallError::StreamTransient { instance: 1, code: -7 }
        ));
    }
}
