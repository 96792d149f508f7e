//! Send a single frame given in `cansend` notation.
//!
//! ```text
//! RUST_LOG=debug cargo run --example write_once -- vcan0 123#DEADBEEF
//! ```

use canbus::{Endpoint, RawFrame};

fn main() -> Result<(), canbus::Error> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let iface = args.next().unwrap_or_else(|| "vcan0".to_string());
    let frame: RawFrame = args.next().as_deref().unwrap_or("07B#DEADBEEF").parse()?;

    let bus = Endpoint::new()?;
    bus.bind(&iface)?;

    match bus.send_frame(&frame) {
        Ok(n) => log::debug!("sent {:X} ({} bytes)", frame, n),
        Err(e) => log::error!("send {:X} failed: {}", frame, e),
    }

    bus.close()
}
