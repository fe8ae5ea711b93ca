use scope_lens::hook::{is_injected, MockWheelHook, WheelHookBackend};
use scope_lens::input::ZoomDirection;
use scope_lens::keys::Modifiers;
use scope_lens::settings::WheelBinding;
use std::sync::mpsc;

#[test]
fn injected_wheel_messages_are_ignored() {
    assert!(is_injected(0x1));
    assert!(is_injected(0x2));
    assert!(!is_injected(0));
}

#[test]
fn only_matching_wheel_messages_are_consumed() {
    let (mut backend, handle) = MockWheelHook::new();
    let (tx, rx) = mpsc::channel();
    let binding = WheelBinding {
        zoom_in: Modifiers::CTRL,
        zoom_out: Modifiers {
            alt: true,
            ..Modifiers::NONE
        },
    };
    backend.install(binding, tx).expect("install");

    assert!(handle.scroll(120, Modifiers::CTRL));
    assert!(!handle.scroll(-120, Modifiers::CTRL));
    assert!(handle.scroll(-240, Modifiers { alt: true, ..Modifiers::NONE }));
    assert_eq!(
        rx.try_iter().collect::<Vec<_>>(),
        vec![ZoomDirection::In, ZoomDirection::Out]
    );
}

#[test]
fn install_is_idempotent() {
    let (mut backend, handle) = MockWheelHook::new();
    let (tx, _rx) = mpsc::channel();
    backend.install(WheelBinding::default(), tx.clone()).unwrap();
    backend.install(WheelBinding::default(), tx).unwrap();
    assert_eq!(handle.install_count(), 1);

    backend.uninstall().unwrap();
    backend.uninstall().unwrap();
    assert_eq!(handle.uninstall_count(), 1);
    assert!(!backend.is_installed());
}
