use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::constants::*;
use crate::errors::{Error, Result};
use crate::frame::{self, FrameFlags, RawFrame, WireFrame};
use crate::iface::{self, Interface};
use crate::socket::CanSocket;

/// Lifecycle of an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unbound,
    Bound,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            State::Unbound => write!(f, "unbound"),
            State::Bound => write!(f, "bound"),
            State::Closed => write!(f, "closed"),
        }
    }
}

// internal encoding of the lifecycle; BINDING reads as unbound from outside
const UNBOUND: u8 = 0;
const BINDING: u8 = 1;
const BOUND: u8 = 2;
const CLOSED: u8 = 3;

fn decode_state(raw: u8) -> State {
    match raw {
        BOUND => State::Bound,
        CLOSED => State::Closed,
        _ => State::Unbound,
    }
}

/// Socket options applied when an endpoint is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Deliver our frames to other sockets on this host (`CAN_RAW_LOOPBACK`).
    pub loopback: bool,
    /// Deliver our frames back to this socket (`CAN_RAW_RECV_OWN_MSGS`).
    pub recv_own_msgs: bool,
    /// Kernel receive buffer size in bytes (`SO_RCVBUF`).
    pub recv_buffer_size: Option<usize>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            loopback: true,
            recv_own_msgs: false,
            recv_buffer_size: None,
        }
    }
}

impl Options {
    pub fn loopback(mut self, on: bool) -> Options {
        self.loopback = on;
        self
    }

    pub fn recv_own_msgs(mut self, on: bool) -> Options {
        self.recv_own_msgs = on;
        self
    }

    pub fn recv_buffer_size(mut self, bytes: usize) -> Options {
        self.recv_buffer_size = Some(bytes);
        self
    }
}

/// A transport endpoint on a CAN bus.
///
/// Created unbound, attached to one interface with [`bind`](Endpoint::bind),
/// then used to exchange frames until [`close`](Endpoint::close). Every
/// method takes `&self`: share the endpoint (e.g. through an `Arc`) to send
/// from one thread while another receives. Closing from a third thread makes
/// blocked calls return [`Error::Closed`].
///
/// ```no_run
/// use canbus::Endpoint;
///
/// let ep = Endpoint::new()?;
/// ep.bind("vcan0")?;
/// ep.send(0x123, &[0xde, 0xad, 0xbe, 0xef])?;
/// let (id, data) = ep.recv()?;
/// println!("{:X} {:02X?}", id, data);
/// ep.close()?;
/// # Ok::<(), canbus::Error>(())
/// ```
#[derive(Debug)]
pub struct Endpoint {
    socket: CanSocket,
    state: AtomicU8,
    interface: OnceLock<Interface>,
}

impl Endpoint {
    /// Open an unbound endpoint with default [`Options`].
    ///
    /// The socket is allocated here so that `bind` only has to attach it.
    pub fn new() -> Result<Endpoint> {
        Endpoint::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Result<Endpoint> {
        let socket = CanSocket::open()?;

        let loopback = options.loopback as libc::c_int;
        socket.set_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, &loopback)?;

        let recv_own = options.recv_own_msgs as libc::c_int;
        socket.set_option(SOL_CAN_RAW, CAN_RAW_RECV_OWN_MSGS, &recv_own)?;

        if let Some(bytes) = options.recv_buffer_size {
            let bytes = bytes.min(libc::c_int::MAX as usize) as libc::c_int;
            socket.set_option(libc::SOL_SOCKET, libc::SO_RCVBUF, &bytes)?;
        }

        Ok(Endpoint {
            socket,
            state: AtomicU8::new(UNBOUND),
            interface: OnceLock::new(),
        })
    }

    pub fn state(&self) -> State {
        decode_state(self.state.load(Ordering::Acquire))
    }

    /// The interface this endpoint is bound to, if any.
    pub fn interface(&self) -> Option<&Interface> {
        self.interface.get()
    }

    /// Attach to the interface called `name`.
    ///
    /// Only valid on an unbound endpoint. Interfaces that are administratively
    /// down are refused with [`Error::Bind`].
    pub fn bind(&self, name: &str) -> Result<()> {
        if let Err(raw) = self.state.compare_exchange(UNBOUND, BINDING,
                                                      Ordering::AcqRel,
                                                      Ordering::Acquire) {
            return Err(Error::State { op: "bind", state: decode_state(raw) });
        }

        match self.attach(name) {
            Ok(interface) => {
                if let Err(raw) = self.state.compare_exchange(BINDING, BOUND,
                                                              Ordering::AcqRel,
                                                              Ordering::Acquire) {
                    // closed underneath us
                    return Err(Error::State { op: "bind", state: decode_state(raw) });
                }
                let _ = self.interface.set(interface);
                Ok(())
            }
            Err(e) => {
                let _ = self.state.compare_exchange(BINDING, UNBOUND,
                                                    Ordering::AcqRel,
                                                    Ordering::Acquire);
                Err(e)
            }
        }
    }

    fn attach(&self, name: &str) -> Result<Interface> {
        let interface = iface::resolve(name)?;
        let bind_err = |source: std::io::Error| Error::Bind {
            interface: name.to_owned(),
            source,
        };

        if interface.is_up()? == Some(false) {
            return Err(bind_err(std::io::Error::from_raw_os_error(libc::ENETDOWN)));
        }

        self.socket.bind(interface.index()).map_err(|e| match e {
            Error::Io(source) => bind_err(source),
            e => e,
        })?;
        debug!("endpoint bound to {} (if_index={})", interface.name(), interface.index());
        Ok(interface)
    }

    fn require_bound(&self, op: &'static str) -> Result<()> {
        match self.state() {
            State::Bound => Ok(()),
            state => Err(Error::State { op, state }),
        }
    }

    /// Send `data` with identifier `id`, returning the number of bytes
    /// handed to the kernel.
    ///
    /// Identifiers above 0x7FF go out as extended frames. Payloads over
    /// 8 bytes fail with [`Error::Oversize`]; nothing is sent.
    pub fn send(&self, id: u32, data: &[u8]) -> Result<usize> {
        self.send_with_flags(id, FrameFlags::empty(), data)
    }

    /// Like [`send`](Endpoint::send) with explicit flags, e.g. to request
    /// remote data or force extended addressing of a small identifier.
    pub fn send_with_flags(&self, id: u32, flags: FrameFlags, data: &[u8]) -> Result<usize> {
        self.require_bound("send")?;
        if data.len() > CAN_MAX_DLEN {
            return Err(Error::Oversize(data.len()));
        }
        let wire = frame::encode(id, flags, data)?;
        self.write(&wire, None)
    }

    pub fn send_frame(&self, frame: &RawFrame) -> Result<usize> {
        self.require_bound("send")?;
        self.write(&frame.to_wire(), None)
    }

    /// [`send`](Endpoint::send) that gives up with [`Error::Timeout`] once
    /// `timeout` has elapsed without room in the send queue.
    pub fn send_timeout(&self, id: u32, data: &[u8], timeout: Duration) -> Result<usize> {
        self.require_bound("send")?;
        if data.len() > CAN_MAX_DLEN {
            return Err(Error::Oversize(data.len()));
        }
        let wire = frame::encode(id, FrameFlags::empty(), data)?;
        self.write(&wire, Some(Instant::now() + timeout))
    }

    fn write(&self, wire: &WireFrame, deadline: Option<Instant>) -> Result<usize> {
        self.socket.write(wire, deadline)?;
        trace!("sent {} byte frame", wire.len());
        Ok(wire.len())
    }

    /// Receive one frame as `(identifier, payload)`.
    ///
    /// The payload is a fresh `Vec` of exactly DLC bytes. Use
    /// [`recv_raw`](Endpoint::recv_raw) to avoid the allocation.
    pub fn recv(&self) -> Result<(u32, Vec<u8>)> {
        let mut frame = RawFrame::default();
        self.read_into(&mut frame, None, "recv")?;
        Ok((frame.id(), frame.payload().to_vec()))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<(u32, Vec<u8>)> {
        let mut frame = RawFrame::default();
        self.read_into(&mut frame, Some(Instant::now() + timeout), "recv")?;
        Ok((frame.id(), frame.payload().to_vec()))
    }

    /// Receive one frame into `frame`, overwriting it in place.
    ///
    /// Performs no allocation; reuse one `RawFrame` across calls for
    /// sustained high-rate reception.
    pub fn recv_raw(&self, frame: &mut RawFrame) -> Result<()> {
        self.read_into(frame, None, "recv_raw")
    }

    pub fn recv_raw_timeout(&self, frame: &mut RawFrame, timeout: Duration) -> Result<()> {
        self.read_into(frame, Some(Instant::now() + timeout), "recv_raw")
    }

    fn read_into(&self,
                 frame: &mut RawFrame,
                 deadline: Option<Instant>,
                 op: &'static str) -> Result<()> {
        self.require_bound(op)?;
        let mut wire: WireFrame = [0; CAN_MTU];
        self.socket.read(&mut wire, deadline)?;
        frame::decode_into(&wire, frame)
    }

    /// Close the endpoint, releasing its socket.
    ///
    /// Valid once, from either the unbound or the bound state. Threads
    /// blocked in send or receive return [`Error::Closed`]. A second call
    /// fails with [`Error::State`].
    pub fn close(&self) -> Result<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == CLOSED {
                return Err(Error::State { op: "close", state: State::Closed });
            }
            match self.state.compare_exchange_weak(current, CLOSED,
                                                   Ordering::AcqRel,
                                                   Ordering::Acquire) {
                Ok(_) => break,
                Err(raw) => current = raw,
            }
        }

        debug!("closing endpoint (was {})", decode_state(current));
        self.socket.close()
    }
}
