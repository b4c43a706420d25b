//! Connection lifecycle and fault recovery against virtual keyboard halves.
//!
//! Run with: cargo test -p splitkb-keyboard --test connection

mod common;

use std::sync::Arc;

use common::{factory_half, Rig};
use splitkb_keyboard::{
    Half, KeyPosition, KeyboardError, LayerKeymap, RegistryNotice, TransportError,
};
use splitkb_transport::mock::MockHandle;
use splitkb_transport::{HidHandle, PID_RESERVED};

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn connect_marks_half_connected() {
    let rig = Rig::new();
    let mut state = rig.session.watch_state();
    assert!(!rig.session.state().connected);

    let half = rig.connect(&factory_half(Half::Right)).await;
    assert_eq!(half, Half::Right);

    state.changed().await.unwrap();
    let s = *state.borrow();
    assert!(s.connected && s.right_connected && !s.left_connected && !s.demo_mode);
}

#[tokio::test]
async fn nothing_selected_is_not_an_error() {
    let rig = Rig::new();
    assert_eq!(rig.session.connect_hardware().await.unwrap(), None);
    assert!(!rig.session.state().connected);
}

#[tokio::test]
async fn reserved_product_id_is_rejected() {
    let rig = Rig::new();
    let numpad = MockHandle::with_pid(PID_RESERVED).shared();
    rig.chooser.push(numpad.clone() as Arc<dyn HidHandle>);

    let err = rig.session.connect_hardware().await.unwrap_err();
    assert_eq!(err, TransportError::UnsupportedDevice { pid: PID_RESERVED });
    assert_eq!(numpad.open_count(), 0);
    assert!(!rig.session.state().connected);
}

#[tokio::test(start_paused = true)]
async fn stale_open_handle_is_closed_and_reopened() {
    let rig = Rig::new();
    let left = MockHandle::new(Half::Left).already_opened().shared();

    let started = tokio::time::Instant::now();
    rig.connect(&left).await;

    assert_eq!(left.close_count(), 1);
    assert_eq!(left.open_count(), 1);
    assert!(left.is_opened());
    assert!(started.elapsed() >= std::time::Duration::from_millis(100));
    assert!(rig.session.state().left_connected);
}

#[tokio::test(start_paused = true)]
async fn already_open_error_on_reopen_is_tolerated() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    left.fail_next_open();

    rig.connect(&left).await;
    assert!(rig.session.state().left_connected);

    // Still usable
    let version = rig
        .session
        .keymap()
        .get_protocol_version(Half::Left)
        .await
        .unwrap();
    assert_eq!(version, 0x0009);
}

#[tokio::test(start_paused = true)]
async fn new_handle_replaces_and_closes_old_one() {
    let rig = Rig::new();
    let first = factory_half(Half::Left);
    let second = factory_half(Half::Left);

    rig.connect(&first).await;
    rig.connect(&second).await;

    assert_eq!(first.close_count(), 1);
    assert!(!first.is_opened());
    assert!(second.is_opened());

    rig.session
        .keymap()
        .read_keycode(0, 0, 0, Half::Left)
        .await
        .unwrap();
    assert!(first.sent_packets().is_empty());
    assert_eq!(second.sent_packets().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_both_halves() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    let right = factory_half(Half::Right);
    rig.connect(&left).await;
    rig.connect(&right).await;
    assert!(rig.session.state().left_connected && rig.session.state().right_connected);

    rig.session.disconnect().await;

    assert_eq!(left.close_count(), 1);
    assert_eq!(right.close_count(), 1);
    assert!(!rig.session.state().connected);
    assert!(rig.session.registry().connected_halves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stuck_usb_stack_disconnects_everything() {
    let rig = Rig::new();
    let mut notices = rig.session.subscribe_notices();
    let left = factory_half(Half::Left);
    let right = factory_half(Half::Right);
    rig.connect(&left).await;
    rig.connect(&right).await;

    left.fail_writes_with(Some(TransportError::HidPermissionDenied(
        "NotAllowedError: Failed to write the report".into(),
    )));

    let mut keymap = LayerKeymap::new();
    keymap.insert(KeyPosition::new(Half::Left, 0, 0), "KC_A".into());
    keymap.insert(KeyPosition::new(Half::Left, 0, 1), "KC_B".into());

    let err = rig
        .session
        .keymap()
        .write_layer_keymap(0, &keymap, Half::Left)
        .await
        .unwrap_err();

    // Teardown completed before the error reached us
    assert!(matches!(err, KeyboardError::UsbStackStuck { half: Half::Left }));
    assert_eq!(left.close_count(), 1);
    assert_eq!(right.close_count(), 1);
    let state = rig.session.state();
    assert!(!state.connected && !state.left_connected && !state.right_connected);
    assert_eq!(
        notices.try_recv().unwrap(),
        RegistryNotice::UsbStackStuck { half: Half::Left }
    );
}

#[tokio::test(start_paused = true)]
async fn other_write_failures_are_plain_transport_errors() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;
    left.fail_writes_with(Some(TransportError::HidError("I/O error".into())));

    let err = rig
        .session
        .keymap()
        .write_keycode(0, 0, 0, 0x04, Half::Left)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        KeyboardError::Transport(TransportError::HidError(_))
    ));
    assert!(rig.session.state().left_connected);
}

#[tokio::test(start_paused = true)]
async fn hardware_disconnect_drains_pending_and_notifies() {
    let rig = Rig::new();
    let mut notices = rig.session.subscribe_notices();
    let left = factory_half(Half::Left);
    let right = factory_half(Half::Right);
    rig.connect(&left).await;
    rig.connect(&right).await;
    left.set_silent(true);

    let session = Arc::clone(&rig.session);
    let read = tokio::spawn(async move {
        session.keymap().read_keycode(0, 0, 0, Half::Left).await
    });

    let manager = Arc::clone(rig.session.manager());
    wait_until(|| manager.pending_count() == 1).await;

    left.fire_disconnect();

    let err = read.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        KeyboardError::Transport(TransportError::ConnectionClosed)
    ));
    assert_eq!(manager.pending_count(), 0);

    assert_eq!(
        notices.recv().await.unwrap(),
        RegistryNotice::ReconnectRequired { half: Half::Left }
    );
    let state = rig.session.state();
    assert!(state.connected && !state.left_connected && state.right_connected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_from_superseded_handle_is_ignored() {
    let rig = Rig::new();
    let first = factory_half(Half::Left);
    let second = factory_half(Half::Left);
    rig.connect(&first).await;
    rig.connect(&second).await;

    first.fire_disconnect();
    // Let the pump run
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(rig.session.state().left_connected);
    rig.session
        .keymap()
        .get_layer_count(Half::Left)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn demo_mode_never_touches_hardware() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    rig.session.enter_demo().await;
    let state = rig.session.state();
    assert!(state.connected && state.demo_mode && !state.left_connected);
    assert_eq!(left.close_count(), 1);

    let sync = rig.session.keymap();
    sync.read_layer_keymap(0, Half::Left).await.unwrap();
    sync.write_keycode(0, 0, 0, 0x04, Half::Left).await.unwrap();
    sync.reset_keymap(Half::Left).await.unwrap();

    assert!(left.sent_packets().is_empty());
    assert_eq!(rig.chooser.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn connecting_hardware_leaves_demo_mode() {
    let rig = Rig::new();
    rig.session.enter_demo().await;
    assert!(rig.session.state().demo_mode);

    rig.connect(&factory_half(Half::Right)).await;
    let state = rig.session.state();
    assert!(!state.demo_mode && state.right_connected);
}

#[tokio::test(start_paused = true)]
async fn connect_half_only_picks_that_half() {
    let rig = Rig::new();
    let right = factory_half(Half::Right);
    rig.chooser.push(right.clone() as Arc<dyn HidHandle>);

    assert_eq!(rig.session.connect_half(Half::Left).await.unwrap(), None);
    assert_eq!(
        rig.session.connect_half(Half::Right).await.unwrap(),
        Some(Half::Right)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_handles() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    rig.session.shutdown().await;
    assert!(!left.is_opened());
    assert!(!rig.session.state().connected);
}

#[tokio::test(start_paused = true)]
async fn rejected_read_also_tears_down_both_halves() {
    let rig = Rig::new();
    let mut notices = rig.session.subscribe_notices();
    let left = factory_half(Half::Left);
    let right = factory_half(Half::Right);
    rig.connect(&left).await;
    rig.connect(&right).await;

    left.fail_writes_with(Some(TransportError::HidPermissionDenied(
        "NotAllowedError".into(),
    )));

    let err = rig
        .session
        .keymap()
        .read_layer_keymap(0, Half::Left)
        .await
        .unwrap_err();

    assert!(err.is_usb_stack_stuck());
    assert_eq!(left.close_count(), 1);
    assert_eq!(right.close_count(), 1);
    let state = rig.session.state();
    assert!(!state.connected && !state.half_connected(Half::Left));
    assert!(!state.half_connected(Half::Right));
    assert_eq!(
        notices.try_recv().unwrap(),
        RegistryNotice::UsbStackStuck { half: Half::Left }
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_info_query_is_usb_stack_stuck() {
    let rig = Rig::new();
    let right = factory_half(Half::Right);
    rig.connect(&right).await;
    right.fail_writes_with(Some(TransportError::HidPermissionDenied(
        "NotAllowedError".into(),
    )));

    let err = rig
        .session
        .keymap()
        .get_protocol_version(Half::Right)
        .await
        .unwrap_err();

    assert!(matches!(err, KeyboardError::UsbStackStuck { half: Half::Right }));
    assert!(!right.is_opened());
    assert!(!rig.session.state().connected);
}

#[tokio::test]
async fn cancelled_pick_keeps_demo_mode() {
    let rig = Rig::new();
    rig.session.enter_demo().await;

    assert_eq!(rig.session.connect_hardware().await.unwrap(), None);

    let state = rig.session.state();
    assert!(state.demo_mode && state.connected);
}

#[tokio::test]
async fn reserved_pick_keeps_demo_mode() {
    let rig = Rig::new();
    rig.session.enter_demo().await;
    let numpad = MockHandle::with_pid(PID_RESERVED).shared();
    rig.chooser.push(numpad.clone() as Arc<dyn HidHandle>);

    rig.session.connect_hardware().await.unwrap_err();

    let state = rig.session.state();
    assert!(state.demo_mode && state.connected);
    assert_eq!(numpad.open_count(), 0);
}
