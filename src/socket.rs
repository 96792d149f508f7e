//! The `CAN_RAW` socket owned by an endpoint.
//!
//! The descriptor is opened non-blocking; blocking behaviour comes from
//! `poll(2)`, which also watches a per-socket `eventfd`. Closing the socket
//! signals that eventfd first, so threads parked in [`CanSocket::read`] or
//! [`CanSocket::write`] wake up with [`Error::Closed`] before the descriptor
//! is released. The descriptor slot sits behind a reader/writer lock: reads
//! and writes share it, `close` waits for them to leave before taking it.

use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Instant;
use std::{io, mem};

use log::{debug, trace};
use parking_lot::RwLock;

use crate::constants::*;
use crate::errors::{Error, Result};
use crate::frame::WireFrame;
use crate::util::{poll_timeout, set_socket_option};

/// `struct sockaddr_can` up to and including the CAN_RAW part of the
/// address union.
#[repr(C)]
struct CanAddr {
    _af_can: libc::sa_family_t,
    _if_index: libc::c_int,
    _rx_id: u32,
    _tx_id: u32,
}

/// A raw CAN socket.
///
/// Owns exactly one descriptor for its lifetime. All methods take `&self`, so
/// one thread may write while another reads.
#[derive(Debug)]
pub struct CanSocket {
    fd: RwLock<Option<OwnedFd>>,
    wake: OwnedFd,
}

impl CanSocket {
    /// Allocate a `PF_CAN`/`CAN_RAW` socket.
    pub fn open() -> Result<CanSocket> {
        let sock_fd = unsafe {
            libc::socket(libc::PF_CAN,
                         libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                         CAN_RAW)
        };
        if sock_fd == -1 {
            return Err(Error::Resource(io::Error::last_os_error()));
        }
        // SAFETY: `sock_fd` was just returned by socket(2) and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(sock_fd) };

        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if wake_fd == -1 {
            return Err(Error::Resource(io::Error::last_os_error()));
        }
        // SAFETY: as above, fresh from eventfd(2).
        let wake = unsafe { OwnedFd::from_raw_fd(wake_fd) };

        debug!("opened CAN_RAW socket fd={}", sock_fd);

        Ok(CanSocket {
            fd: RwLock::new(Some(fd)),
            wake,
        })
    }

    /// Set a socket option on the underlying descriptor.
    pub fn set_option<T>(&self, level: libc::c_int, name: libc::c_int, val: &T) -> Result<()> {
        let guard = self.fd.read();
        let fd = guard.as_ref().ok_or(Error::Closed)?;
        set_socket_option(fd.as_raw_fd(), level, name, val)?;
        Ok(())
    }

    /// Attach the socket to the interface with index `if_index`.
    ///
    /// The kernel answers `ENODEV` for indices that are gone or belong to a
    /// non-CAN device.
    pub fn bind(&self, if_index: u32) -> Result<()> {
        let guard = self.fd.read();
        let fd = guard.as_ref().ok_or(Error::Closed)?.as_raw_fd();

        let addr = CanAddr {
            _af_can: libc::AF_CAN as libc::sa_family_t,
            _if_index: if_index as libc::c_int,
            _rx_id: 0,
            _tx_id: 0,
        };

        let r = unsafe {
            let sockaddr_ptr = &addr as *const CanAddr;
            libc::bind(fd,
                       sockaddr_ptr as *const libc::sockaddr,
                       mem::size_of::<CanAddr>() as libc::socklen_t)
        };

        if r == -1 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        debug!("bound CAN socket fd={} to if_index={}", fd, if_index);
        Ok(())
    }

    /// Write one frame, waiting for room in the socket send buffer.
    ///
    /// A datagram socket transfers the whole frame or nothing.
    pub fn write(&self, frame: &WireFrame, deadline: Option<Instant>) -> Result<()> {
        let guard = self.fd.read();
        let fd = guard.as_ref().ok_or(Error::Closed)?.as_raw_fd();

        loop {
            self.wait(fd, libc::POLLOUT, deadline)?;

            let n = unsafe {
                libc::write(fd, frame.as_ptr() as *const libc::c_void, frame.len())
            };

            if n == -1 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                    _ => return Err(Error::Io(err)),
                }
            }

            if n as usize != frame.len() {
                return Err(Error::Io(io::Error::new(io::ErrorKind::WriteZero,
                                                    "short write of CAN frame")));
            }

            trace!("fd={} wrote {:02x?}", fd, frame);
            return Ok(());
        }
    }

    /// Read one frame, waiting until the kernel has one queued.
    pub fn read(&self, frame: &mut WireFrame, deadline: Option<Instant>) -> Result<()> {
        let guard = self.fd.read();
        let fd = guard.as_ref().ok_or(Error::Closed)?.as_raw_fd();

        loop {
            self.wait(fd, libc::POLLIN, deadline)?;

            let n = unsafe {
                libc::read(fd, frame.as_mut_ptr() as *mut libc::c_void, frame.len())
            };

            if n == -1 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                    _ => return Err(Error::Io(err)),
                }
            }

            if n as usize != frame.len() {
                return Err(Error::MalformedFrame("short read from CAN socket"));
            }

            trace!("fd={} read {:02x?}", fd, frame);
            return Ok(());
        }
    }

    /// Release the descriptor.
    ///
    /// Any thread blocked in `read` or `write` returns [`Error::Closed`]. A
    /// second call fails with [`Error::Closed`]; a failing `close(2)` is
    /// reported even though the descriptor is gone afterwards.
    pub fn close(&self) -> Result<()> {
        let one: u64 = 1;
        let r = unsafe {
            libc::write(self.wake.as_raw_fd(),
                        &one as *const u64 as *const libc::c_void,
                        mem::size_of::<u64>())
        };
        if r == -1 {
            let err = io::Error::last_os_error();
            // EAGAIN means the counter is already saturated, i.e. signalled
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(Error::Io(err));
            }
        }

        let fd = self.fd.write().take().ok_or(Error::Closed)?;
        let raw = fd.into_raw_fd();

        if unsafe { libc::close(raw) } == -1 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        debug!("closed CAN socket fd={}", raw);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.fd.read().is_none()
    }

    /// Park until `fd` reports `events`, the socket is closed, or the
    /// deadline passes.
    fn wait(&self, fd: RawFd, events: libc::c_short, deadline: Option<Instant>) -> Result<()> {
        let mut fds = [
            libc::pollfd { fd, events, revents: 0 },
            libc::pollfd { fd: self.wake.as_raw_fd(), events: libc::POLLIN, revents: 0 },
        ];

        loop {
            fds[0].revents = 0;
            fds[1].revents = 0;

            let r = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, poll_timeout(deadline))
            };

            if r == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Io(err));
            }

            if fds[1].revents != 0 {
                return Err(Error::Closed);
            }

            if fds[0].revents & libc::POLLNVAL != 0 {
                return Err(Error::Io(io::Error::from_raw_os_error(libc::EBADF)));
            }

            // POLLERR/POLLHUP: let the following read/write surface the error
            if fds[0].revents != 0 {
                return Ok(());
            }

            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return Err(Error::Timeout);
                }
            }
        }
    }
}
