//! Monotonic timestamps for captured units

use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds since the first call in this process
///
/// Never goes backwards; shared by every session so timestamps of different sources
/// are comparable.
pub fn monotonic_ns() -> u64 {
    let origin = ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_monotonic() {
        let a = monotonic_ns();
        sleep(Duration::from_millis(2));
        let b = monotonic_ns();
        assert!(b > a);
        assert!(b - a >= 2_000_000, "elapsed {}ns", b - a);
    }
}
