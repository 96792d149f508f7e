//! Interface name resolution.
//!
//! The kernel addresses CAN devices by interface index when binding a socket,
//! while people know them by name (`can0`, `vcan0`). The index is assigned
//! when the device is created and may differ between boots, so it is looked
//! up every time an endpoint binds.

use std::io;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};

use crate::errors::{Error, Result};

/// Longest interface name the kernel accepts, excluding the NUL.
const MAX_NAME_LEN: usize = 15;

/// A named network interface and the index the kernel knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    name: String,
    index: u32,
}

impl Interface {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether the interface is administratively up.
    ///
    /// Returns `None` when the interface does not show up in the link list,
    /// in which case the kernel gets the final say at bind time.
    pub fn is_up(&self) -> Result<Option<bool>> {
        let links = getifaddrs().map_err(io::Error::from)?;

        let mut seen = false;
        for link in links.filter(|l| l.interface_name == self.name) {
            if link.flags.contains(InterfaceFlags::IFF_UP) {
                return Ok(Some(true));
            }
            seen = true;
        }

        Ok(if seen { Some(false) } else { None })
    }
}

/// Look up the interface index for `name`.
///
/// Fails with [`Error::InterfaceNotFound`] if the name is empty, too long, or
/// unknown to the kernel.
pub fn resolve(name: &str) -> Result<Interface> {
    let not_found = |source: io::Error| Error::InterfaceNotFound {
        name: name.to_owned(),
        source,
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(not_found(io::Error::new(io::ErrorKind::InvalidInput,
                                            "interface name must be 1 to 15 bytes")));
    }

    let index = if_nametoindex(name).map_err(|e| not_found(e.into()))?;
    log::debug!("resolved CAN interface {} to index {}", name, index);

    Ok(Interface {
        name: name.to_owned(),
        index,
    })
}
