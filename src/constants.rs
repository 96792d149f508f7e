// Protocol of the PF_CAN family: raw frames
pub const CAN_RAW: libc::c_int = 1;

pub const SOL_CAN_BASE: libc::c_int = 100;
pub const SOL_CAN_RAW: libc::c_int = SOL_CAN_BASE + CAN_RAW;
pub const CAN_RAW_LOOPBACK: libc::c_int = 3;
pub const CAN_RAW_RECV_OWN_MSGS: libc::c_int = 4;

/// Special address description flags for the CAN_ID
///
/// EFF/SFF is set in the MSB
pub const EFF_FLAG: u32 = 0x80000000;
/// remote transmission request
pub const RTR_FLAG: u32 = 0x40000000;
/// error message frame
pub const ERR_FLAG: u32 = 0x20000000;

/// valid bits in CAN ID for frame formats
/// standard frame format (SFF)
pub const SFF_MASK: u32 = 0x000007ff;
/// extended frame format (EFF)
pub const EFF_MASK: u32 = 0x1fffffff;

/// Maximum payload of a classic CAN frame.
pub const CAN_MAX_DLEN: usize = 8;
/// Size of `struct can_frame` as exchanged with the kernel.
pub const CAN_MTU: usize = 16;

// byte offsets inside `struct can_frame`
pub const DLC_OFFSET: usize = 4;
pub const DATA_OFFSET: usize = 8;
