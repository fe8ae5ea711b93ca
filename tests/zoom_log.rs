use std::sync::{mpsc, Arc};
use std::{fs, thread::sleep, time::Duration};

use scope_lens::input::{KeySample, PolledKeys, ScriptedKeys};
use scope_lens::keys::Modifiers;
use scope_lens::magnifier::MockMagnifier;
use scope_lens::session::{OverlaySession, SessionParts, SessionShared};
use scope_lens::settings::LensSettings;
use scope_lens::transform::ScreenSize;
use scope_lens::window::MockWindowSystem;
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn zoom_latency_reaches_the_file_log_at_default_level() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lens.log");
    scope_lens::logging::init(false, Some(path.clone()));

    let keys = ScriptedKeys::new();
    let parts = SessionParts {
        magnifier: Box::new(MockMagnifier::new()),
        windows: Box::new(MockWindowSystem::new(ScreenSize {
            width: 1920,
            height: 1080,
        })),
        inputs: vec![Box::new(PolledKeys::new(Box::new(keys.clone())))],
    };
    let settings = LensSettings::default();
    let shared = Arc::new(SessionShared::new(settings.zoom_factor));
    shared.set_running(true);
    let (_tx, rx) = mpsc::channel();
    let mut session = OverlaySession::new(settings, parts, shared, rx);
    session.start_up().expect("start");

    keys.push(KeySample {
        zoom_in: true,
        modifiers: Modifiers::CTRL,
        ..KeySample::default()
    });
    session.tick();
    session.tear_down();

    sleep(Duration::from_millis(100));

    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("zoom applied"));
    assert!(contents.contains("latency_us"));
}
