use scope_lens::keys::{parse_hotkey, Hotkey, Modifiers, VirtualKey};
use scope_lens::settings::{AppConfig, LensSettings, LensShape, MAX_ZOOM};
use tempfile::tempdir;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = AppConfig::load(path.to_str().unwrap()).unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.lens.lens_size, 300);
    assert_eq!(config.lens.zoom_factor, 3.0);
    assert_eq!(config.lens.bindings.toggle_key, VirtualKey::XBUTTON1);
    assert_eq!(config.lens.bindings.exit_key, Some(VirtualKey::END));
    assert_eq!(config.lens.fps, 60);
}

#[test]
fn partial_file_keeps_defaults_and_accepts_key_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "zoom_factor": 25.0,
            "lens_shape": "rectangle",
            "bindings": {
                "toggle_key": "F8",
                "exit_key": 27,
                "zoom_in": "Ctrl+Shift+PageUp",
                "wheel": null
            },
            "debug_logging": true
        }"#,
    )
    .unwrap();

    let config = AppConfig::load(path.to_str().unwrap()).unwrap();
    assert_eq!(config.lens.zoom_factor, MAX_ZOOM);
    assert_eq!(config.lens.lens_shape, LensShape::Rectangle);
    assert_eq!(config.lens.lens_size, 300);
    assert_eq!(config.lens.bindings.toggle_key, VirtualKey(0x77));
    assert_eq!(config.lens.bindings.exit_key, Some(VirtualKey::ESCAPE));
    assert_eq!(
        config.lens.bindings.zoom_in,
        Some(Hotkey::new(
            VirtualKey(0x21),
            Modifiers {
                ctrl: true,
                shift: true,
                alt: false
            }
        ))
    );
    assert_eq!(
        config.lens.bindings.zoom_out,
        LensSettings::default().bindings.zoom_out
    );
    assert_eq!(config.lens.bindings.wheel, None);
    assert!(config.debug_logging);
}

#[test]
fn unknown_key_name_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "bindings": { "toggle_key": "Hyper" } }"#).unwrap();
    assert!(AppConfig::load(path.to_str().unwrap()).is_err());
}

#[test]
fn saved_config_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = AppConfig::default();
    config.lens.lens_size = 420;
    config.lens.dot.enabled = true;
    config.lens.bindings.exit_key = None;
    config.log_file = Some("lens.log".into());
    config.save(path.to_str().unwrap()).unwrap();

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("\"toggle_key\": \"Mouse 4\""));
    assert!(saved.contains("\"zoom_in\": \"Ctrl+Up\""));

    let loaded = AppConfig::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.log_file_path(), std::path::PathBuf::from("lens.log"));
}

#[test]
fn hotkey_strings_parse_case_insensitively() {
    let hotkey = parse_hotkey("alt + f4").expect("hotkey");
    assert_eq!(hotkey.key, VirtualKey(0x73));
    assert!(hotkey.modifiers.alt && !hotkey.modifiers.ctrl);
    assert_eq!(hotkey.to_string(), "Alt+F4");
    assert!(parse_hotkey("Ctrl+").is_none());
}

#[test]
fn modifier_hotkeys_and_numeric_hotkeys_load_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = AppConfig::default();
    config.lens.bindings.zoom_in = Some(Hotkey::new(VirtualKey::SHIFT, Modifiers::CTRL));
    config.lens.bindings.zoom_out = Some(Hotkey::new(VirtualKey::CONTROL, Modifiers::NONE));
    config.save(path.to_str().unwrap()).unwrap();

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("\"zoom_in\": \"Ctrl+Shift\""));
    assert_eq!(AppConfig::load(path.to_str().unwrap()).unwrap(), config);

    std::fs::write(
        &path,
        r#"{ "bindings": {
            "zoom_in": 38,
            "zoom_out": { "key": "Down", "modifiers": { "alt": true } }
        } }"#,
    )
    .unwrap();
    let config = AppConfig::load(path.to_str().unwrap()).unwrap();
    assert_eq!(
        config.lens.bindings.zoom_in,
        Some(Hotkey::new(VirtualKey::UP, Modifiers::NONE))
    );
    assert_eq!(
        config.lens.bindings.zoom_out,
        Some(Hotkey::new(
            VirtualKey::DOWN,
            Modifiers {
                alt: true,
                ..Modifiers::NONE
            }
        ))
    );
}
