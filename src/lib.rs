//! CAN bus transport over Linux SocketCAN.
//!
//! The Linux kernel supports using CAN-devices through a network-like API
//! (see https://www.kernel.org/doc/Documentation/networking/can.txt). This
//! crate wraps a raw CAN socket into an [`Endpoint`]: bind it to an interface
//! by name, then send and receive classic CAN frames without wrestling libc
//! calls.
//!
//! # An introduction to CAN
//!
//! The CAN bus was originally designed to allow microcontrollers inside a
//! vehicle to communicate over a single shared bus. Messages called
//! *frames* are multicast to all devices on the bus.
//!
//! Every frame consists of an ID and a payload of up to 8 bytes. If two
//! devices attempt to send a frame at the same time, the device with the
//! higher ID will notice the conflict, stop sending and reattempt to send its
//! frame in the next time slot. This means that the lower the ID, the higher
//! the priority.
//!
//! IDs come in two sizes: 11 bit standard and 29 bit extended. [`Endpoint::send`]
//! picks extended addressing on its own whenever the ID does not fit in 11
//! bits.
//!
//! A device can be opened multiple times; every endpoint bound to it sees
//! all frames on the bus, including those sent by other endpoints in the same
//! process. An endpoint does not see its own frames unless
//! [`Options::recv_own_msgs()`] is set.
//!
//! # Receiving
//!
//! [`Endpoint::recv`] returns the identifier and a freshly allocated payload.
//! For sustained traffic, [`Endpoint::recv_raw`] decodes into a caller-owned
//! [`RawFrame`] instead and allocates nothing.
//!
//! # Threads
//!
//! All endpoint operations take `&self`. Sending and receiving are
//! independent and may run concurrently on different threads; closing the
//! endpoint wakes any thread blocked in either with [`Error::Closed`].

mod constants;
mod errors;
mod util;
mod endpoint;
mod socket;
pub mod frame;
pub mod iface;

pub use endpoint::{Endpoint, Options, State};
pub use errors::{Error, Result, ShouldRetry};
pub use frame::{FrameFlags, RawFrame, WireFrame};
pub use iface::Interface;
pub use socket::CanSocket;

#[cfg(test)]
mod tests;
