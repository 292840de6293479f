//! Cancellable blocking waits
//!
//! The polling thread is plain blocking code, so it cannot `select!` on a
//! [`CancellationToken`]. Long sleeps are cut into short slices instead and
//! the token is checked between them.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Longest uninterrupted stretch of a cancellable sleep
pub const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Sleep for `duration` unless `token` fires first.
///
/// Returns `true` if the full duration elapsed, `false` if cancelled.
pub fn sleep_cancellable(duration: Duration, token: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
