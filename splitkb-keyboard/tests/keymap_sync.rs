//! Keymap read/write against virtual keyboard halves.
//!
//! Run with: cargo test -p splitkb-keyboard --test keymap_sync

mod common;

use std::time::Duration;

use common::{factory_half, Rig};
use splitkb_keyboard::defaults::default_keymap;
use splitkb_keyboard::keymap::DEMO_LAYER_COUNT;
use splitkb_keyboard::{
    keycode, Half, KeyPosition, KeyboardError, KeyboardVariant, LayerKeymap, TransportError,
};
use splitkb_transport::mock::{MockHandle, MOCK_LAYER_COUNT};
use splitkb_transport::protocol::cmd;
use splitkb_transport::VIA_PROTOCOL_VERSION;

#[tokio::test(start_paused = true)]
async fn factory_left_half_reads_back_as_default() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    let keymap = rig
        .session
        .keymap()
        .read_layer_keymap(0, Half::Left)
        .await
        .unwrap();

    assert_eq!(keymap, default_keymap(KeyboardVariant::Main, Half::Left));
    // One GET_KEYCODE per matrix position, nothing else
    assert_eq!(left.sent_opcodes().len(), 6 * 7);
    assert!(left
        .sent_opcodes()
        .iter()
        .all(|&op| op == cmd::DYNAMIC_KEYMAP_GET_KEYCODE));
}

#[tokio::test(start_paused = true)]
async fn layer_read_is_row_major() {
    let rig = Rig::new();
    let right = factory_half(Half::Right);
    rig.connect(&right).await;

    rig.session
        .keymap()
        .read_layer_keymap(1, Half::Right)
        .await
        .unwrap();

    let order: Vec<(u8, u8, u8)> = right
        .sent_packets()
        .iter()
        .map(|p| (p[1], p[2], p[3]))
        .collect();
    let expected: Vec<(u8, u8, u8)> = (0..6)
        .flat_map(|row| (0..9).map(move |col| (1, row, col)))
        .collect();
    assert_eq!(order, expected);
}

#[tokio::test(start_paused = true)]
async fn layer_read_aborts_on_timeout() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;
    left.set_silent(true);

    let err = rig
        .session
        .keymap()
        .read_layer_keymap(0, Half::Left)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        KeyboardError::Transport(TransportError::Timeout { cmd: 0x04, .. })
    ));
    // Gave up after the first position
    assert_eq!(left.sent_packets().len(), 1);
    assert_eq!(rig.session.manager().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn write_layer_only_touches_its_half() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    let mut keymap = LayerKeymap::new();
    keymap.insert(KeyPosition::new(Half::Left, 0, 0), "MO(1)".into());
    keymap.insert(KeyPosition::new(Half::Left, 2, 3), "KC_ENTER".into());
    keymap.insert(KeyPosition::new(Half::Right, 0, 0), "KC_A".into());

    let written = rig
        .session
        .keymap()
        .write_layer_keymap(1, &keymap, Half::Left)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(left.keycode_at(1, 0, 0), 0x5C01);
    assert_eq!(left.keycode_at(1, 2, 3), keycode::encode("KC_ENT"));
    assert_eq!(left.sent_packets().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn write_layer_validates_positions_before_sending() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    let mut keymap = LayerKeymap::new();
    keymap.insert(KeyPosition::new(Half::Left, 0, 0), "KC_A".into());
    keymap.insert(KeyPosition::new(Half::Left, 0, 8), "KC_B".into());

    let err = rig
        .session
        .keymap()
        .write_layer_keymap(0, &keymap, Half::Left)
        .await
        .unwrap_err();

    assert!(matches!(err, KeyboardError::InvalidParameter(_)));
    assert!(left.sent_packets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn written_layer_reads_back() {
    let rig = Rig::with_variant(KeyboardVariant::Protoboard);
    let right = MockHandle::new(Half::Right).shared();
    rig.connect(&right).await;
    let sync = rig.session.keymap();

    let mut keymap = LayerKeymap::new();
    keymap.insert(KeyPosition::new(Half::Right, 0, 0), "TG(2)".into());
    keymap.insert(KeyPosition::new(Half::Right, 3, 4), "KC_TRNS".into());
    keymap.insert(KeyPosition::new(Half::Right, 1, 1), "0x7E00".into());

    sync.write_layer_keymap(2, &keymap, Half::Right).await.unwrap();
    let back = sync.read_layer_keymap(2, Half::Right).await.unwrap();
    assert_eq!(back, keymap);
}

#[tokio::test(start_paused = true)]
async fn reset_restores_firmware_defaults() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;
    let sync = rig.session.keymap();

    sync.write_keycode(0, 0, 0, keycode::encode("KC_Q"), Half::Left)
        .await
        .unwrap();
    assert_eq!(left.keycode_at(0, 0, 0), 0x14);

    sync.reset_keymap(Half::Left).await.unwrap();
    assert_eq!(left.keycode_at(0, 0, 0), keycode::encode("KC_ESC"));
}

#[tokio::test(start_paused = true)]
async fn device_info_queries() {
    let rig = Rig::new();
    let right = factory_half(Half::Right);
    right.set_uptime_ms(123_456);
    rig.connect(&right).await;
    let sync = rig.session.keymap();

    assert_eq!(
        sync.get_protocol_version(Half::Right).await.unwrap(),
        VIA_PROTOCOL_VERSION
    );
    assert_eq!(
        sync.get_layer_count(Half::Right).await.unwrap(),
        MOCK_LAYER_COUNT
    );
    assert_eq!(sync.get_uptime(Half::Right).await.unwrap(), 123_456);

    sync.set_keyboard_value(Half::Right, 0x05, &[1, 2])
        .await
        .unwrap();
    let value = sync.get_keyboard_value(Half::Right, 0x05).await.unwrap();
    assert_eq!(&value[..2], &[1, 2]);
}

#[tokio::test(start_paused = true)]
async fn bootloader_timeout_counts_as_success() {
    let rig = Rig::new();
    let left = factory_half(Half::Left);
    rig.connect(&left).await;

    let started = tokio::time::Instant::now();
    rig.session
        .keymap()
        .reboot_to_bootloader(Half::Left)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(1000));
    assert_eq!(left.sent_opcodes(), vec![cmd::BOOTLOADER_JUMP]);
}

#[tokio::test]
async fn operations_on_missing_half_report_not_connected() {
    let rig = Rig::new();
    let err = rig
        .session
        .keymap()
        .read_keycode(0, 0, 0, Half::Right)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyboardError::NotConnected(Half::Right)));
}

#[tokio::test]
async fn demo_mode_synthesizes_results() {
    let rig = Rig::new();
    rig.session.enter_demo().await;
    let sync = rig.session.keymap();

    assert_eq!(
        sync.get_protocol_version(Half::Left).await.unwrap(),
        VIA_PROTOCOL_VERSION
    );
    assert_eq!(sync.get_layer_count(Half::Left).await.unwrap(), DEMO_LAYER_COUNT);
    assert_eq!(sync.read_keycode(0, 0, 0, Half::Left).await.unwrap(), 0);
    assert!(sync.read_layer_keymap(0, Half::Right).await.unwrap().is_empty());

    let keymap = default_keymap(KeyboardVariant::Main, Half::Left);
    assert_eq!(
        sync.write_layer_keymap(0, &keymap, Half::Left).await.unwrap(),
        keymap.len()
    );
    sync.reset_keymap(Half::Right).await.unwrap();
    sync.reboot_to_bootloader(Half::Right).await.unwrap();
    assert_eq!(sync.get_uptime(Half::Left).await.unwrap(), 0);

    // Nothing was ever picked or opened
    assert_eq!(rig.chooser.request_count(), 0);
    assert_eq!(rig.session.manager().pending_count(), 0);
}
