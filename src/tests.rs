// Lifecycle tests that need kernel CAN support but no CAN device. They skip
// when the host cannot open a PF_CAN socket.

use super::*;

fn open_or_skip() -> Option<Endpoint> {
    let _ = env_logger::builder().is_test(true).try_init();

    match Endpoint::new() {
        Ok(ep) => Some(ep),
        Err(Error::Resource(e)) => {
            log::warn!("skipping, no CAN support: {}", e);
            None
        }
        Err(e) => panic!("unexpected error opening endpoint: {}", e),
    }
}

#[test]
fn new_endpoint_is_unbound() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };
    assert_eq!(ep.state(), State::Unbound);
    assert!(ep.interface().is_none());
}

#[test]
fn io_before_bind_is_state_error() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };

    match ep.send(1, &[1, 2]) {
        Err(Error::State { op: "send", state: State::Unbound }) => {}
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(ep.recv(), Err(Error::State { state: State::Unbound, .. })));

    let mut frame = RawFrame::default();
    assert!(matches!(ep.recv_raw(&mut frame), Err(Error::State { .. })));
}

#[test]
fn bind_unknown_interface_stays_unbound() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };

    assert!(matches!(ep.bind("nosuchcan9"), Err(Error::InterfaceNotFound { .. })));
    assert_eq!(ep.state(), State::Unbound);
}

#[test]
fn bind_non_can_interface_fails() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };

    match ep.bind("lo") {
        Err(Error::Bind { interface, .. }) => assert_eq!(interface, "lo"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(ep.state(), State::Unbound);
}

#[test]
fn double_close_is_an_error() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };

    ep.close().unwrap();
    assert_eq!(ep.state(), State::Closed);
    assert!(matches!(ep.close(), Err(Error::State { op: "close", state: State::Closed })));
}

#[test]
fn operations_after_close_fail() {
    let ep = match open_or_skip() { Some(ep) => ep, None => return };
    ep.close().unwrap();

    assert!(matches!(ep.bind("vcan0"), Err(Error::State { state: State::Closed, .. })));
    assert!(matches!(ep.send(1, &[]), Err(Error::State { state: State::Closed, .. })));
    assert!(matches!(ep.recv(), Err(Error::State { state: State::Closed, .. })));
}

#[test]
fn socket_double_close_reports_closed() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sock = match CanSocket::open() {
        Ok(s) => s,
        Err(_) => return,
    };

    sock.close().unwrap();
    assert!(sock.is_closed());
    assert!(matches!(sock.close(), Err(Error::Closed)));

    let mut wire = [0; 16];
    assert!(matches!(sock.read(&mut wire, None), Err(Error::Closed)));
    assert!(matches!(sock.bind(1), Err(Error::Closed)));
}

#[test]
fn options_builder() {
    let opts = Options::default().recv_own_msgs(true).loopback(false).recv_buffer_size(4096);
    assert!(opts.recv_own_msgs);
    assert!(!opts.loopback);
    assert_eq!(opts.recv_buffer_size, Some(4096));

    let ep = match Endpoint::with_options(opts) {
        Ok(ep) => ep,
        Err(_) => return,
    };
    assert_eq!(ep.state(), State::Unbound);
}
