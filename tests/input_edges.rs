use scope_lens::input::{EdgeDetector, InputEvent, KeySample, ZoomDirection};
use scope_lens::keys::{Hotkey, Modifiers, VirtualKey};
use scope_lens::settings::InputBindings;

fn toggles(sequence: &[bool]) -> usize {
    let bindings = InputBindings::default();
    let mut edges = EdgeDetector::new();
    sequence
        .iter()
        .flat_map(|down| {
            edges.feed(
                KeySample {
                    toggle: *down,
                    ..KeySample::default()
                },
                &bindings,
                false,
            )
        })
        .filter(|event| *event == InputEvent::Toggle)
        .count()
}

#[test]
fn toggle_fires_once_per_press() {
    assert_eq!(toggles(&[false, true, true, true, false, true]), 2);
    assert_eq!(toggles(&[true, true, true]), 1);
    assert_eq!(toggles(&[false, false]), 0);
}

#[test]
fn zoom_requires_ctrl_but_ignores_extra_shift() {
    let bindings = InputBindings {
        zoom_in: Some(Hotkey::new(VirtualKey::UP, Modifiers::CTRL)),
        ..InputBindings::default()
    };
    let press = |held: Modifiers| {
        let mut edges = EdgeDetector::new();
        edges.feed(
            KeySample {
                zoom_in: true,
                modifiers: held,
                ..KeySample::default()
            },
            &bindings,
            false,
        )
    };

    let shift_only = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };
    let ctrl_shift = Modifiers {
        ctrl: true,
        shift: true,
        alt: false,
    };
    assert!(press(shift_only).is_empty());
    assert_eq!(press(Modifiers::CTRL), vec![InputEvent::Zoom(ZoomDirection::In)]);
    assert_eq!(press(ctrl_shift), vec![InputEvent::Zoom(ZoomDirection::In)]);
}

#[test]
fn held_zoom_key_fires_once() {
    let bindings = InputBindings::default();
    let mut edges = EdgeDetector::new();
    let held = KeySample {
        zoom_out: true,
        modifiers: Modifiers::CTRL,
        ..KeySample::default()
    };
    let fired: Vec<_> = (0..5).flat_map(|_| edges.feed(held, &bindings, false)).collect();
    assert_eq!(fired, vec![InputEvent::Zoom(ZoomDirection::Out)]);
}

#[test]
fn exit_is_suppressed_while_overlay_is_foreground() {
    let bindings = InputBindings::default();
    let exit = KeySample {
        exit: true,
        ..KeySample::default()
    };
    let released = KeySample::default();

    let mut edges = EdgeDetector::new();
    assert!(edges.feed(exit, &bindings, true).is_empty());
    edges.feed(released, &bindings, true);
    assert_eq!(edges.feed(exit, &bindings, false), vec![InputEvent::Exit]);
}
