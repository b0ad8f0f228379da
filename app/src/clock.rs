//! Monotonic millisecond clock shared by every timer in the process.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Sentinel for "no scheduled event".
pub const NEVER: i64 = i64::MAX;

static ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process. Monotonic; never goes
/// backwards.
pub fn steady_now_ms() -> i64 {
    ANCHOR.get_or_init(Instant::now).elapsed().as_millis() as i64
}

pub const fn sec_to_ms(seconds: i64) -> i64 {
    seconds * 1000
}

pub fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}
