use std::io;

use crate::endpoint::State;

/// Errors reported by the CAN transport.
///
/// Nothing is retried internally; every failure goes back to the caller. Use
/// [`ShouldRetry`] to tell transient conditions from terminal ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operating system knows no interface by that name.
    #[error("CAN interface {name:?} not found: {source}")]
    InterfaceNotFound { name: String, source: io::Error },

    /// The socket could not be attached to the interface.
    #[error("failed to bind to CAN interface {interface:?}: {source}")]
    Bind { interface: String, source: io::Error },

    /// Operation invoked outside its lifecycle state.
    #[error("cannot {op} while endpoint is {state}")]
    State { op: &'static str, state: State },

    /// Payload longer than a classic CAN frame can carry.
    #[error("payload of {0} bytes exceeds the 8 byte CAN frame limit")]
    Oversize(usize),

    /// Identifier wider than 29 bits.
    #[error("CAN ID {0:#x} does not fit in 29 bits")]
    InvalidId(u32),

    /// Socket or wake descriptor allocation failed.
    #[error("failed to allocate CAN socket: {0}")]
    Resource(#[source] io::Error),

    /// Bytes that do not form a `struct can_frame`.
    #[error("malformed CAN frame: {0}")]
    MalformedFrame(&'static str),

    /// The endpoint was closed while the call was in progress.
    #[error("endpoint closed")]
    Closed,

    /// The caller supplied deadline elapsed.
    #[error("timed out waiting for CAN socket")]
    Timeout,

    /// Text that is not in `<id>#<data>` form.
    #[error("invalid CAN frame text {0:?}")]
    Parse(String),

    #[error("CAN socket I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check an error for conditions that may clear up on their own.
///
/// A busy bus surfaces as `ENOBUFS` from the driver, a deadline as
/// [`Error::Timeout`]. Both are worth another attempt; the transport leaves
/// that decision to the caller.
pub trait ShouldRetry {
    /// If `true`, the same call may succeed when repeated.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for io::Error {
    fn should_retry(&self) -> bool {
        match self.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => true,
            _ => self.raw_os_error() == Some(libc::ENOBUFS),
        }
    }
}

impl ShouldRetry for Error {
    fn should_retry(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Io(e) => e.should_retry(),
            _ => false,
        }
    }
}

impl<T> ShouldRetry for Result<T> {
    fn should_retry(&self) -> bool {
        if let Err(ref e) = *self {
            e.should_retry()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(Error::Timeout.should_retry());
        assert!(Error::Io(io::Error::from_raw_os_error(libc::ENOBUFS)).should_retry());
        assert!(Error::Io(io::ErrorKind::WouldBlock.into()).should_retry());
        assert!(!Error::Closed.should_retry());
        assert!(!Error::Oversize(9).should_retry());
        assert!(!Error::Io(io::Error::from_raw_os_error(libc::ENETDOWN)).should_retry());

        let ok: Result<()> = Ok(());
        assert!(!ok.should_retry());
        let err: Result<()> = Err(Error::Timeout);
        assert!(err.should_retry());
    }

    #[test]
    fn state_error_message() {
        let e = Error::State {
            op: "send",
            state: State::Unbound,
        };
        assert_eq!(e.to_string(), "cannot send while endpoint is unbound");
    }
}
