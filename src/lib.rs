#[macro_use]
extern crate bitflags;
extern crate byteorder;
extern crate core;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate rand;
extern crate smoltcp;

use core::fmt;
use std::error::Error as StdError;

mod field {
    use core::ops;
    pub type Field = ops::Range<usize>;
    pub type Rest = ops::RangeFrom<usize>;
}

/// Kind of a system-level failure reported by the datapath provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// The underlying datapath device disappeared. Fatal for the switch.
    DeviceGone,
    /// The provider lost change notifications; a full rescan is needed.
    NoBufs,
    /// The provider does not implement the requested operation.
    Unsupported,
    /// Any other system error.
    Other,
}

/// The error type for the OpenFlow control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An operation cannot proceed because a buffer is empty or full.
    Exhausted,
    /// An incoming message could not be parsed because some of its fields
    /// were out of bounds of the received data.
    Truncated,
    /// An incoming message could not be recognized and was dropped.
    /// E.g. a message with an unknown type for its version.
    Unrecognized,
    /// An incoming message was recognized but was self-contradictory.
    Malformed,
    /// A failure that maps to an OpenFlow error reply (class + code).
    Of(wire::error_msg::OfError),
    /// A failure reported by the datapath provider.
    Io(IoKind),
    #[doc(hidden)] __Nonexhaustive,
}

/// The result type for the OpenFlow control plane.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Of(err) => write!(f, "openflow error: {:?}", err),
            Error::Io(kind) => write!(f, "provider error: {:?}", kind),
            _ => write!(f, "{}", self.description()),
        }
    }
}

impl StdError for Error {
    fn description(&self) -> &str {
        match *self {
            Error::Exhausted => "buffer space exhausted",
            Error::Truncated => "truncated message",
            Error::Unrecognized => "unrecognized message",
            Error::Malformed => "malformed message",
            Error::Of(_) => "openflow error",
            Error::Io(_) => "provider error",
            Error::__Nonexhaustive => unreachable!(),
        }
    }

    fn cause(&self) -> Option<&StdError> {
        None
    }
}

impl Error {
    /// Shorthand used all over the message handlers.
    pub fn of(err: wire::error_msg::OfError) -> Error {
        Error::Of(err)
    }
}

pub trait Repr
where
    Self: Sized,
{
    /// Parse a packet and return a high-level representation.
    fn parse(buffer: &[u8]) -> Result<Self>;

    /// Return the length of a packet that will be emitted from this high-level representation.
    fn buffer_len(&self) -> usize;

    /// Emit a high-level representation into a buffer
    fn emit(&self, buffer: &mut [u8]) -> Result<()>;
}

#[macro_use]
mod macros;
#[macro_use]
pub mod ratelimit;

pub mod actions;
pub mod classifier;
pub mod flow;
pub mod port;
pub mod provider;
pub mod rule;
pub mod switch;
pub mod wire;

pub use wire::error_msg::OfError;
pub use wire::openflow::{Packet, Version};
