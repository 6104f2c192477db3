// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! SWD line driver, transaction layer, and DMI bridge.
//!
//! This is the back end of the bridge: an SWD host capable of bringing up
//! an ADIv5.2 SW-DP from cold and mapping DMI register accesses onto a
//! Mem-AP. It is `no_std` and bit-bangs SWDIO/SWCLK directly using
//! [`esp-hal`](https://docs.espressif.com/projects/rust/) GPIO primitives
//! and [`embassy-time`](https://embassy.dev/) for the microsecond pauses
//! the connection sequence needs between phases.
//!
//! * [`protocol::SwdProtocol`] drives the wire: packet headers, ACK, data
//!   phases, turnarounds.
//! * [`bridge::SwdDmiBridge`] owns the connection sequence, the TAR cache,
//!   and implements [`vjtag_dtm::DmiCallback`] so it can be wired directly
//!   into a [`vjtag_dtm::VirtualDtm`].

#![no_std]

pub mod bridge;
pub mod protocol;

#[doc(inline)]
pub use crate::bridge::SwdDmiBridge;
#[doc(inline)]
pub use crate::protocol::SwdProtocol;

use core::fmt;

/// Core error type for SWD wire and bridge operations.
///
/// Methods are provided to make it easier to handle errors, by checking
/// whether a retry or reset is the appropriate recovery:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdError {
    /// Transient error that can likely be retried. Returned once the
    /// configured number of WAIT retries has been exhausted.
    WaitAck,

    /// The target reported a fault condition; it needs a reset.
    FaultAck,

    /// No acknowledgement was received (all other ACK codes are treated as
    /// this). The value received is included, though it's rarely useful —
    /// 7 means SWDIO was high for the whole ACK window, the common case.
    NoAck(u8),

    /// A parity error was detected while reading from the target; the data
    /// read cannot be trusted.
    ReadParity,

    /// The debug/system power-up poll exhausted its retry budget.
    ConnectTimeout,

    /// The connect sequence reached a step that failed in a way not
    /// captured by an ACK or parity error — e.g. the AP probed at bring-up
    /// wasn't the expected Mem-AP type.
    OperationFailed(&'static str),

    /// The bridge was asked to perform a DMI access before a successful
    /// connect.
    NotReady,
}

impl SwdError {
    pub(crate) fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            1 => Ok(()),
            2 => Err(SwdError::WaitAck),
            4 => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// True if recovery requires a fresh connect sequence.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            SwdError::NoAck(_) | SwdError::FaultAck | SwdError::ReadParity | SwdError::ConnectTimeout
        )
    }

    /// True if the error is transient and the operation can simply be
    /// retried.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::WaitAck)
    }

    /// True if neither a reset nor a retry applies — typically a
    /// configuration or usage error.
    pub fn requires_other(&self) -> bool {
        !self.requires_reset() && !self.requires_retry()
    }

    fn as_str(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "wait ack",
            SwdError::FaultAck => "fault ack",
            SwdError::NoAck(_) => "no ack",
            SwdError::ReadParity => "read parity error",
            SwdError::ConnectTimeout => "connect timeout",
            SwdError::OperationFailed(_) => "operation failed",
            SwdError::NotReady => "not ready",
        }
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdError::NoAck(ack) => write!(f, "{}: {ack}", self.as_str()),
            SwdError::OperationFailed(detail) => write!(f, "{}: {detail}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}
