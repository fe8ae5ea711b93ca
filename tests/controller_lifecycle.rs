use scope_lens::controller::{runtime, LifecycleController, StartOutcome};
use scope_lens::input::{KeySample, PolledKeys, ScriptedKeys};
use scope_lens::magnifier::{MagCall, MockMagnifier};
use scope_lens::session::{SessionExit, SessionParts, SessionPhase};
use scope_lens::settings::LensSettings;
use scope_lens::transform::ScreenSize;
use scope_lens::window::{MockWindowSystem, WindowCall};
use serial_test::serial;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct MockPlatform {
    mag: MockMagnifier,
    windows: MockWindowSystem,
    keys: ScriptedKeys,
}

impl MockPlatform {
    fn new() -> Self {
        Self {
            mag: MockMagnifier::new(),
            windows: MockWindowSystem::new(ScreenSize {
                width: 1920,
                height: 1080,
            }),
            keys: ScriptedKeys::new(),
        }
    }

    fn controller(&self) -> LifecycleController {
        let platform = self.clone();
        LifecycleController::with_platform(move || -> anyhow::Result<SessionParts> {
            Ok(SessionParts {
                magnifier: Box::new(platform.mag.clone()),
                windows: Box::new(platform.windows.clone()),
                inputs: vec![Box::new(PolledKeys::new(Box::new(platform.keys.clone())))],
            })
        })
    }

    fn initialize_count(&self) -> usize {
        self.mag
            .calls()
            .iter()
            .filter(|call| **call == MagCall::Initialize)
            .count()
    }

    fn transforms(&self) -> usize {
        self.mag
            .calls()
            .iter()
            .filter(|call| matches!(call, MagCall::SetTransform(..)))
            .count()
    }

    fn window_changes(&self) -> usize {
        self.windows
            .calls()
            .iter()
            .filter(|call| !matches!(call, WindowCall::Invalidate(_)))
            .count()
    }
}

fn fast() -> LensSettings {
    LensSettings {
        fps: 240,
        ..LensSettings::default()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn duplicate_start_runs_exactly_one_session() {
    let platform = MockPlatform::new();
    let controller = platform.controller();

    assert_eq!(controller.start(fast()).unwrap(), StartOutcome::Started);
    assert_eq!(controller.start(fast()).unwrap(), StartOutcome::AlreadyActive);
    assert!(wait_until(|| controller.phase() == SessionPhase::Running));
    assert_eq!(controller.start(fast()).unwrap(), StartOutcome::AlreadyActive);
    assert_eq!(platform.initialize_count(), 1);

    controller.stop();
    assert!(controller.wait_for_idle(WAIT));
    assert_eq!(controller.last_exit(), Some(SessionExit::Stopped));
    assert!(platform.windows.live_windows().is_empty());
}

#[test]
fn identical_updates_change_nothing_the_second_time() {
    let platform = MockPlatform::new();
    let controller = platform.controller();
    controller.start(fast()).unwrap();
    assert!(wait_until(|| controller.phase() == SessionPhase::Running));

    let update = LensSettings {
        zoom_factor: 6.0,
        lens_size: 360,
        ..fast()
    };
    controller.update_settings(update.clone()).unwrap();
    assert!(wait_until(|| platform.mag.last_scale() == Some(6.0)));
    assert_eq!(controller.current_zoom(), 6.0);

    let transforms = platform.transforms();
    let window_changes = platform.window_changes();
    controller.update_settings(update).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(platform.transforms(), transforms);
    assert_eq!(platform.window_changes(), window_changes);

    controller.stop();
    assert!(controller.wait_for_idle(WAIT));
}

#[test]
fn exit_key_returns_controller_to_idle() {
    let platform = MockPlatform::new();
    let controller = platform.controller();
    platform.keys.push(KeySample {
        exit: true,
        ..KeySample::default()
    });

    controller.start(fast()).unwrap();
    assert!(controller.wait_for_idle(WAIT));
    assert_eq!(controller.last_exit(), Some(SessionExit::ExitKey));
    assert!(platform.windows.live_windows().is_empty());
    assert!(!platform.mag.is_initialized());

    assert_eq!(controller.start(fast()).unwrap(), StartOutcome::Started);
    controller.stop();
    assert!(controller.wait_for_idle(WAIT));
}

#[test]
fn platform_failure_leaves_controller_idle() {
    let controller = LifecycleController::with_platform(|| -> anyhow::Result<SessionParts> {
        Err(anyhow::anyhow!("no display"))
    });
    assert_eq!(controller.start(fast()).unwrap(), StartOutcome::Started);
    assert!(controller.wait_for_idle(WAIT));
    assert_eq!(controller.last_exit(), Some(SessionExit::StartupFailed));
    assert!(!controller.is_active());
}

#[test]
#[serial]
fn process_wide_controller_is_shared() {
    assert!(std::ptr::eq(runtime(), runtime()));
    runtime().stop();
    assert!(!runtime().is_active());
}
