//! Classify a capture failure code.

use multiwall_capture_engine::{classify, StreamErrorKind};
use multiwall_platform_core::FailureCode;

pub fn run(code: i64) -> anyhow::Result<()> {
    match classify(FailureCode(code)) {
        StreamErrorKind::TargetClosed => {
            println!("{code}: target closed (instance is dropped, never retried)")
        }
        StreamErrorKind::Unknown(_) => println!("{code}: unknown (retried with backoff)"),
    }
    Ok(())
}
