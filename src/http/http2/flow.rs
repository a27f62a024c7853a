//! Flow-control windows (RFC 9113 §5.2, §6.9).
//!
//! A window is signed: a SETTINGS change to INITIAL_WINDOW_SIZE may push an
//! open stream's window below zero, after which nothing may be sent on it
//! until WINDOW_UPDATE frames bring it back above zero.

use crate::http::http2::frames::ErrorCode;
use crate::http::http2::settings::MAX_WINDOW_SIZE;
use crate::http::{Error, Success};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    value: i64,
}

impl Window {
    pub fn new(initial: u32) -> Self {
        Self {
            value: initial as i64,
        }
    }

    pub fn available(&self) -> i64 {
        self.value
    }

    /// Bytes that may be sent right now.
    pub fn sendable(&self) -> usize {
        self.value.max(0) as usize
    }

    /// Debits received bytes; receiving more than the window allows is a
    /// flow-control violation.
    pub fn consume(&mut self, n: u32) -> Success {
        if n as i64 > self.value {
            return Err(Error::protocol(
                ErrorCode::FlowControlError,
                &format!("received {n} bytes with a window of {}", self.value),
            ));
        }
        self.value -= n as i64;

        Ok(())
    }

    /// Debits bytes about to be sent. The caller has checked `sendable`.
    pub fn debit(&mut self, n: usize) {
        self.value -= n as i64;
    }

    /// Applies a WINDOW_UPDATE increment.
    pub fn credit(&mut self, increment: u32) -> Success {
        let value = self.value + increment as i64;
        if value > MAX_WINDOW_SIZE as i64 {
            return Err(Error::protocol(
                ErrorCode::FlowControlError,
                "window update overflows the flow-control window",
            ));
        }
        self.value = value;

        Ok(())
    }

    /// Applies an INITIAL_WINDOW_SIZE delta.
    pub fn adjust(&mut self, delta: i64) -> Success {
        let value = self.value + delta;
        if value > MAX_WINDOW_SIZE as i64 {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                "initial window change overflows a stream window",
            ));
        }
        self.value = value;

        Ok(())
    }

    /// Once the window falls below a quarter of `target`, tops it back up and
    /// returns the increment to announce.
    pub fn replenish(&mut self, target: u32) -> Option<u32> {
        let target = target as i64;
        if self.value >= target / 4 {
            return None;
        }
        let increment = target - self.value;
        self.value = target;

        u32::try_from(increment).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_side_violation() {
        let mut window = Window::new(10);
        window.consume(10).unwrap();
        let err = window.consume(1).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FlowControlError));
    }

    #[test]
    fn credit_overflow() {
        let mut window = Window::new(MAX_WINDOW_SIZE);
        assert!(window.credit(1).is_err());
        assert_eq!(window.available(), MAX_WINDOW_SIZE as i64);
    }

    #[test]
    fn adjust_may_go_negative() {
        let mut window = Window::new(100);
        window.debit(80);
        window.adjust(-50).unwrap();
        assert_eq!(window.available(), -30);
        assert_eq!(window.sendable(), 0);
        window.credit(40).unwrap();
        assert_eq!(window.sendable(), 10);
        assert_eq!(
            window.adjust(MAX_WINDOW_SIZE as i64).unwrap_err().code(),
            Some(ErrorCode::ProtocolError)
        );
    }

    #[test]
    fn replenish_below_a_quarter() {
        let mut window = Window::new(1000);
        window.consume(700).unwrap();
        assert_eq!(window.replenish(1000), None);
        window.consume(60).unwrap();
        assert_eq!(window.replenish(1000), Some(760));
        assert_eq!(window.available(), 1000);
    }
}
