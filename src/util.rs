use std::os::fd::RawFd;
use std::time::Instant;
use std::{io, mem};

/// `setsockopt` wrapper
///
/// The libc `setsockopt` function is used to set various options on a socket.
/// `set_socket_option` offers a somewhat type-safe wrapper that does not
/// require messing around with `*const c_void`s.
///
/// A proper `std::io::Error` will be returned on failure.
///
/// Note that the `val` parameter must be specified correctly; if an option
/// expects an integer, it is advisable to pass in a `c_int`, not the default
/// of `i32`.
pub fn set_socket_option<T>(fd: RawFd,
                            level: libc::c_int,
                            name: libc::c_int,
                            val: &T) -> io::Result<()> {
    let r = unsafe {
        let val_ptr: *const T = val as *const T;
        libc::setsockopt(fd,
                         level,
                         name,
                         val_ptr as *const libc::c_void,
                         mem::size_of::<T>() as libc::socklen_t)
    };

    if r != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Milliseconds to hand to `poll(2)` for an optional deadline.
///
/// `None` blocks indefinitely (-1). Remaining time is rounded up so that a
/// zero return from `poll` really means the deadline has passed.
pub fn poll_timeout(deadline: Option<Instant>) -> libc::c_int {
    let deadline = match deadline {
        Some(d) => d,
        None => return -1,
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    let mut ms = remaining.as_millis();
    if remaining.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }

    ms.min(libc::c_int::MAX as u128) as libc::c_int
}
