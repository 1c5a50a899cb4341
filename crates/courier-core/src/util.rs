//! Small shared helpers.

/// Current time as unix seconds, the granularity used by every timestamped
/// frame on the wire.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
