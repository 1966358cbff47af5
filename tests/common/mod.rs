//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// Generous upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Numbered AIS-like sentence, newline terminated
pub fn sentence(n: usize) -> String {
    format!("!AIVDM,1,1,,A,{:06},0*00\r\n", n)
}

/// Sequence number back out of a line produced by [`sentence`]
pub fn sentence_number(line: &str) -> usize {
    line.split(',')
        .nth(5)
        .and_then(|field| field.parse().ok())
        .unwrap_or_else(|| panic!("not a numbered sentence: {:?}", line))
}
