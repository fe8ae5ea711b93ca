//! C exports for hosts that load the library dynamically.
//!
//! Integer flags follow C conventions: zero is false, anything else true.
//! Key codes of zero (or out of range) leave the binding unset.
#![allow(non_snake_case)]

use crate::controller::runtime;
use crate::keys::{Hotkey, Modifiers, VirtualKey};
use crate::settings::{DotOverlay, InputBindings, LensSettings, LensShape, Rgb, WheelBinding};
use std::os::raw::{c_float, c_int};
use std::sync::Once;

static LOGGING: Once = Once::new();

fn ensure_logging() {
    LOGGING.call_once(|| {
        crate::logging::init(false, Some(crate::logging::DEFAULT_LOG_FILE.into()));
    });
}

fn flag(value: c_int) -> bool {
    value != 0
}

fn channel(value: c_int) -> u8 {
    value.clamp(0, 255) as u8
}

fn modifiers(ctrl: c_int, shift: c_int, alt: c_int) -> Modifiers {
    Modifiers {
        ctrl: flag(ctrl),
        shift: flag(shift),
        alt: flag(alt),
    }
}

fn toggle_key(code: c_int) -> VirtualKey {
    VirtualKey::from_code(code).unwrap_or_else(|| {
        let fallback = InputBindings::default().toggle_key;
        tracing::warn!(code, %fallback, "invalid toggle key; using default");
        fallback
    })
}

#[allow(clippy::too_many_arguments)]
fn lens_settings(
    lens_size: c_int,
    zoom_factor: c_float,
    lens_shape: c_int,
    dot_enabled: c_int,
    dot_size: c_int,
    dot_r: c_int,
    dot_g: c_int,
    dot_b: c_int,
    fps: c_int,
    bindings: InputBindings,
) -> LensSettings {
    LensSettings {
        lens_size: lens_size.max(0) as u32,
        zoom_factor,
        lens_shape: LensShape::from_code(lens_shape),
        dot: DotOverlay {
            enabled: flag(dot_enabled),
            size: dot_size.max(0) as u32,
            color: Rgb::new(channel(dot_r), channel(dot_g), channel(dot_b)),
        },
        bindings,
        fps: fps.max(0) as u32,
    }
    .clamped()
}

fn start(settings: LensSettings) {
    ensure_logging();
    if let Err(err) = runtime().start(settings) {
        tracing::error!(?err, "failed to start magnifier");
    }
}

/// Start with zoom hotkeys. Wheel zoom uses the same modifiers as the hotkeys.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn StartMagnifier(
    lens_size: c_int,
    zoom_factor: c_float,
    toggle_key_code: c_int,
    zoom_in_key: c_int,
    zoom_in_ctrl: c_int,
    zoom_in_shift: c_int,
    zoom_in_alt: c_int,
    zoom_out_key: c_int,
    zoom_out_ctrl: c_int,
    zoom_out_shift: c_int,
    zoom_out_alt: c_int,
    lens_shape: c_int,
    dot_enabled: c_int,
    dot_size: c_int,
    dot_r: c_int,
    dot_g: c_int,
    dot_b: c_int,
    fps: c_int,
) {
    let zoom_in_mods = modifiers(zoom_in_ctrl, zoom_in_shift, zoom_in_alt);
    let zoom_out_mods = modifiers(zoom_out_ctrl, zoom_out_shift, zoom_out_alt);
    let bindings = InputBindings {
        toggle_key: toggle_key(toggle_key_code),
        exit_key: None,
        zoom_in: VirtualKey::from_code(zoom_in_key).map(|key| Hotkey::new(key, zoom_in_mods)),
        zoom_out: VirtualKey::from_code(zoom_out_key).map(|key| Hotkey::new(key, zoom_out_mods)),
        wheel: Some(WheelBinding {
            zoom_in: zoom_in_mods,
            zoom_out: zoom_out_mods,
        }),
    };
    start(lens_settings(
        lens_size,
        zoom_factor,
        lens_shape,
        dot_enabled,
        dot_size,
        dot_r,
        dot_g,
        dot_b,
        fps,
        bindings,
    ));
}

/// Start with an exit key instead of zoom hotkeys.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn StartMagnifierWithExitKey(
    lens_size: c_int,
    zoom_factor: c_float,
    toggle_key_code: c_int,
    exit_key: c_int,
    lens_shape: c_int,
    dot_enabled: c_int,
    dot_size: c_int,
    dot_r: c_int,
    dot_g: c_int,
    dot_b: c_int,
    fps: c_int,
) {
    let bindings = InputBindings {
        toggle_key: toggle_key(toggle_key_code),
        exit_key: VirtualKey::from_code(exit_key),
        zoom_in: None,
        zoom_out: None,
        wheel: None,
    };
    start(lens_settings(
        lens_size,
        zoom_factor,
        lens_shape,
        dot_enabled,
        dot_size,
        dot_r,
        dot_g,
        dot_b,
        fps,
        bindings,
    ));
}

#[no_mangle]
pub extern "C" fn StopMagnifier() {
    runtime().stop();
}

/// Replace the visual settings. Key bindings from the last start are kept.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn UpdateSettings(
    lens_size: c_int,
    zoom_factor: c_float,
    lens_shape: c_int,
    dot_enabled: c_int,
    dot_size: c_int,
    dot_r: c_int,
    dot_g: c_int,
    dot_b: c_int,
    fps: c_int,
) {
    let bindings = runtime().settings().bindings;
    let settings = lens_settings(
        lens_size,
        zoom_factor,
        lens_shape,
        dot_enabled,
        dot_size,
        dot_r,
        dot_g,
        dot_b,
        fps,
        bindings,
    );
    if let Err(err) = runtime().update_settings(settings) {
        tracing::error!(?err, "failed to update magnifier settings");
    }
}

#[no_mangle]
pub extern "C" fn GetCurrentZoom() -> c_float {
    runtime().current_zoom()
}
