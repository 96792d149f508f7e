//! Frame codec.
//!
//! Converts between logical frames and the 16 byte `struct can_frame` the
//! kernel exchanges on a `CAN_RAW` socket:
//!
//! ```text
//! bytes 0-3 : can_id, identifier in the low bits, EFF/RTR/ERR flags on top
//! byte  4   : data length code (0..8)
//! bytes 5-7 : padding / reserved
//! bytes 8-15: payload, only the first DLC bytes are valid
//! ```
//!
//! The identifier word is in host byte order, matching the kernel struct.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use itertools::Itertools;

use crate::constants::*;
use crate::errors::{Error, Result};

/// One `struct can_frame` worth of bytes.
pub type WireFrame = [u8; CAN_MTU];

bitflags! {
    /// Flag bits carried in the top of the identifier word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// 29 bit extended frame format
        const EXTENDED = EFF_FLAG;
        /// remote transmission request
        const REMOTE = RTR_FLAG;
        /// error message frame
        const ERROR = ERR_FLAG;
    }
}

/// Whether `id` can only be expressed with 29 bit addressing.
///
/// Identifiers up to 0x7FF fit the standard frame format; anything larger is
/// sent as an extended frame even when the caller did not ask for one.
#[inline]
pub fn needs_extended(id: u32) -> bool {
    id > SFF_MASK
}

/// Encode a frame into its wire representation.
///
/// Fails with [`Error::Oversize`] for payloads over 8 bytes and
/// [`Error::InvalidId`] for identifiers over 29 bits.
pub fn encode(id: u32, flags: FrameFlags, data: &[u8]) -> Result<WireFrame> {
    RawFrame::new(id, flags, data).map(|f| f.to_wire())
}

/// Decode a wire frame into a fresh [`RawFrame`].
pub fn decode(wire: &[u8]) -> Result<RawFrame> {
    let mut frame = RawFrame::default();
    decode_into(wire, &mut frame)?;
    Ok(frame)
}

/// Decode a wire frame into `out`, overwriting every field.
///
/// On error `out` is left untouched.
pub fn decode_into(wire: &[u8], out: &mut RawFrame) -> Result<()> {
    if wire.len() != CAN_MTU {
        return Err(Error::MalformedFrame("frame is not 16 bytes"));
    }

    let dlc = wire[DLC_OFFSET];
    if dlc as usize > CAN_MAX_DLEN {
        return Err(Error::MalformedFrame("data length code above 8"));
    }

    out._id = u32::from_ne_bytes([wire[0], wire[1], wire[2], wire[3]]);
    out._data_len = dlc;
    out._data.copy_from_slice(&wire[DATA_OFFSET..]);
    Ok(())
}

/// RawFrame
///
/// A decoded classic CAN frame. The payload buffer is always 8 bytes; only
/// the first [`len`](RawFrame::len) of them are meaningful. The receive path
/// overwrites a caller-owned `RawFrame` in place, so one value can be reused
/// across any number of reads.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// 32 bit CAN_ID + EFF/RTR/ERR flags
    _id: u32,
    /// data length. Bytes beyond are not valid
    _data_len: u8,
    /// buffer for data
    _data: [u8; 8],
}

impl RawFrame {
    /// Build a frame, setting [`FrameFlags::EXTENDED`] automatically when
    /// `id` does not fit in 11 bits.
    pub fn new(id: u32, flags: FrameFlags, data: &[u8]) -> Result<RawFrame> {
        if data.len() > CAN_MAX_DLEN {
            return Err(Error::Oversize(data.len()));
        }

        if id > EFF_MASK {
            return Err(Error::InvalidId(id));
        }

        let mut flags = flags;
        if needs_extended(id) {
            flags |= FrameFlags::EXTENDED;
        }

        let mut full_data = [0; 8];
        full_data[..data.len()].copy_from_slice(data);

        Ok(RawFrame {
            _id: id | flags.bits(),
            _data_len: data.len() as u8,
            _data: full_data,
        })
    }

    /// Wire representation; padding and unused payload bytes are zero.
    pub fn to_wire(&self) -> WireFrame {
        let mut wire = [0; CAN_MTU];
        wire[..DLC_OFFSET].copy_from_slice(&self._id.to_ne_bytes());
        wire[DLC_OFFSET] = self._data_len;
        wire[DATA_OFFSET..].copy_from_slice(&self._data);
        wire
    }

    /// Return the actual CAN ID (without EFF/RTR/ERR flags)
    ///
    /// Only the flag bits are stripped; a standard frame whose word carries
    /// bits above 0x7FF reports them rather than silently truncating.
    #[inline]
    pub fn id(&self) -> u32 {
        self._id & EFF_MASK
    }

    /// Data length code.
    #[inline]
    pub fn len(&self) -> usize {
        self._data_len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self._data_len == 0
    }

    /// The full 8 byte payload buffer.
    ///
    /// Bytes past [`len`](RawFrame::len) are left over from whatever was
    /// last decoded into this value; slice to `[..len()]` or use
    /// [`payload`](RawFrame::payload).
    #[inline]
    pub fn data(&self) -> &[u8; 8] {
        &self._data
    }

    /// A slice into the valid data. Slice will always be <= 8 bytes in length
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self._data[..self.len()]
    }

    #[inline]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_truncate(self._id)
    }

    /// Check if frame uses 29 bit extended frame format
    #[inline]
    pub fn is_extended(&self) -> bool {
        self._id & EFF_FLAG != 0
    }

    /// Check if frame is an error message
    #[inline]
    pub fn is_error(&self) -> bool {
        self._id & ERR_FLAG != 0
    }

    /// Check if frame is a remote transmission request
    #[inline]
    pub fn is_rtr(&self) -> bool {
        self._id & RTR_FLAG != 0
    }
}

impl fmt::UpperHex for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{:08X}#", self.id())?;
        } else {
            write!(f, "{:03X}#", self.id())?;
        }

        if self.is_rtr() {
            // a remote request only carries the length it asks for
            return match self.len() {
                0 => write!(f, "R"),
                n => write!(f, "R{}", n),
            };
        }

        let mut parts = self.payload().iter().map(|v| format!("{:02X}", v));

        let sep = if f.alternate() { " " } else { "" };
        write!(f, "{}", parts.join(sep))
    }
}

/// Parses the `cansend` notation: `123#DEADBEEF`, `1F334455#11.22`, `123#R`,
/// `123#R4` (remote request for 4 bytes).
///
/// Identifiers written with 8 hex digits are extended frames regardless of
/// their value; dots between data bytes are ignored.
impl FromStr for RawFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<RawFrame> {
        let bad = || Error::Parse(s.to_owned());

        let (id_text, data_text) = s.split_once('#').ok_or_else(bad)?;
        if id_text.is_empty() || id_text.len() > 8
            || !id_text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let id = u32::from_str_radix(id_text, 16).map_err(|_| bad())?;

        let mut flags = FrameFlags::empty();
        if id_text.len() == 8 {
            flags |= FrameFlags::EXTENDED;
        }

        if let Some(len_text) = data_text.strip_prefix(['R', 'r']) {
            let len = match len_text {
                "" => 0,
                t if t.len() == 1 => t.parse::<usize>().map_err(|_| bad())?,
                _ => return Err(bad()),
            };
            if len > CAN_MAX_DLEN {
                return Err(Error::Oversize(len));
            }
            return RawFrame::new(id, flags | FrameFlags::REMOTE, &[0; CAN_MAX_DLEN][..len]);
        }

        let digits: String = data_text.chars().filter(|c| *c != '.').collect();
        let data = hex::decode(digits).map_err(|_| bad())?;

        RawFrame::new(id, flags, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_selected_by_magnitude() {
        assert!(!needs_extended(0));
        assert!(!needs_extended(2047));
        assert!(needs_extended(2048));
        assert!(needs_extended(EFF_MASK));

        let sff = RawFrame::new(2047, FrameFlags::empty(), &[1]).unwrap();
        assert!(!sff.is_extended());
        let ext = RawFrame::new(4096, FrameFlags::empty(), &[1]).unwrap();
        assert!(ext.is_extended());
        assert_eq!(ext.id(), 4096);
    }

    #[test]
    fn explicit_extended_kept_for_small_id() {
        let f = RawFrame::new(0x10, FrameFlags::EXTENDED, &[]).unwrap();
        assert!(f.is_extended());
        assert_eq!(f.id(), 0x10);
    }

    #[test]
    fn rejects_oversize_and_wide_ids() {
        assert!(matches!(encode(1, FrameFlags::empty(), &[0; 9]), Err(Error::Oversize(9))));
        assert!(matches!(encode(EFF_MASK + 1, FrameFlags::empty(), &[]),
                         Err(Error::InvalidId(_))));
        assert!(encode(EFF_MASK, FrameFlags::empty(), &[0; 8]).is_ok());
    }

    #[test]
    fn wire_layout() {
        let wire = encode(0x123, FrameFlags::empty(), &[0xde, 0xad]).unwrap();
        assert_eq!(&wire[0..4], &0x123u32.to_ne_bytes());
        assert_eq!(wire[4], 2);
        assert_eq!(&wire[5..8], &[0, 0, 0]);
        assert_eq!(&wire[8..10], &[0xde, 0xad]);

        let wire = encode(4096, FrameFlags::REMOTE, &[]).unwrap();
        let word = u32::from_ne_bytes([wire[0], wire[1], wire[2], wire[3]]);
        assert_eq!(word, 4096 | EFF_FLAG | RTR_FLAG);
    }

    #[test]
    fn decode_strips_flags_and_truncates() {
        let data = [0x13, 0x37, 0x00, 0xff, 0x42];
        for len in 0..=data.len() {
            let wire = encode(0x1abcdef, FrameFlags::empty(), &data[..len]).unwrap();
            let f = decode(&wire).unwrap();
            assert_eq!(f.id(), 0x1abcdef);
            assert_eq!(f.flags(), FrameFlags::EXTENDED);
            assert_eq!(f.len(), len);
            assert_eq!(f.payload(), &data[..len]);
        }
    }

    #[test]
    fn decode_into_overwrites_in_place() {
        let mut frame = decode(&encode(7, FrameFlags::empty(), &[9; 8]).unwrap()).unwrap();
        decode_into(&encode(128, FrameFlags::empty(), &[1, 2]).unwrap(), &mut frame).unwrap();

        assert_eq!(frame.id(), 128);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.payload(), &[1, 2]);
        assert!(!frame.is_extended());
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(matches!(decode(&[0u8; 15]), Err(Error::MalformedFrame(_))));

        let mut wire = encode(1, FrameFlags::empty(), &[]).unwrap();
        wire[DLC_OFFSET] = 9;
        let mut frame = RawFrame::default();
        assert!(matches!(decode_into(&wire, &mut frame), Err(Error::MalformedFrame(_))));
        assert_eq!(frame, RawFrame::default());
    }

    #[test]
    fn id_strips_only_flag_bits() {
        let mut wire = [0u8; CAN_MTU];
        wire[..4].copy_from_slice(&0x1000u32.to_ne_bytes());
        let f = decode(&wire).unwrap();
        assert!(!f.is_extended());
        assert_eq!(f.id(), 0x1000);

        wire[..4].copy_from_slice(&(0x123 | RTR_FLAG | ERR_FLAG).to_ne_bytes());
        assert_eq!(decode(&wire).unwrap().id(), 0x123);
    }

    #[test]
    fn remote_request_keeps_length_in_text() {
        let r = RawFrame::new(0x10, FrameFlags::REMOTE, &[1, 2, 3]).unwrap();
        assert_eq!(format!("{:X}", r), "010#R3");

        let back: RawFrame = "010#R3".parse().unwrap();
        assert!(back.is_rtr());
        assert_eq!(back.id(), 0x10);
        assert_eq!(back.len(), 3);

        assert!(matches!("010#R9".parse::<RawFrame>(), Err(Error::Oversize(9))));
        assert!(matches!("010#R12".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("010#Rx".parse::<RawFrame>(), Err(Error::Parse(_))));
    }

    #[test]
    fn upper_hex() {
        let f = RawFrame::new(0x7b, FrameFlags::empty(), &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(format!("{:X}", f), "07B#DEADBEEF");
        assert_eq!(format!("{:#X}", f), "07B#DE AD BE EF");

        let r = RawFrame::new(0x1000, FrameFlags::REMOTE, &[]).unwrap();
        assert_eq!(format!("{:X}", r), "00001000#R");
    }

    #[test]
    fn parse_cansend_syntax() {
        let f: RawFrame = "123#DEADBEEF".parse().unwrap();
        assert_eq!(f.id(), 0x123);
        assert_eq!(f.payload(), &[0xde, 0xad, 0xbe, 0xef]);
        assert!(!f.is_extended());

        let f: RawFrame = "00000123#11.22".parse().unwrap();
        assert!(f.is_extended());
        assert_eq!(f.payload(), &[0x11, 0x22]);

        let f: RawFrame = "7FF#R".parse().unwrap();
        assert!(f.is_rtr());
        assert!(f.is_empty());

        let f: RawFrame = "1#".parse().unwrap();
        assert!(f.is_empty());

        assert!(matches!("123".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("#00".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("123#ABC".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("xyz#00".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("+12#00".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("-1#00".parse::<RawFrame>(), Err(Error::Parse(_))));
        assert!(matches!("123#0011223344556677889".parse::<RawFrame>(),
                         Err(Error::Parse(_))));
        assert!(matches!("123#001122334455667788".parse::<RawFrame>(),
                         Err(Error::Oversize(9))));
    }
}
