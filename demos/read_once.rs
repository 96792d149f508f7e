//! Print frames from a CAN interface until an error occurs.
//!
//! ```text
//! RUST_LOG=debug cargo run --example read_once -- vcan0
//! ```

use canbus::{Endpoint, RawFrame};

fn main() -> Result<(), canbus::Error> {
    env_logger::init();
    let iface = std::env::args().nth(1).unwrap_or_else(|| "vcan0".to_string());

    let bus = Endpoint::new()?;
    bus.bind(&iface)?;

    let mut frame = RawFrame::default();
    loop {
        match bus.recv_raw(&mut frame) {
            Ok(()) => println!("{:#X}", frame),
            Err(e) => {
                log::error!("receive on {} failed: {}", iface, e);
                break;
            }
        }
    }

    bus.close()
}
