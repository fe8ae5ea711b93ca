use crate::input::{InputContext, InputEvent, InputSource, ZoomDirection};
use crate::magnifier::MagnificationService;
use crate::settings::{step_zoom, LensSettings};
use crate::transform::{self, ScreenSize};
use crate::window::{HostWindowSpec, WindowHandle, WindowSystem};
use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl SessionPhase {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

pub fn can_transition(from: SessionPhase, to: SessionPhase) -> bool {
    matches!(
        (from, to),
        (SessionPhase::Idle, SessionPhase::Starting)
            | (SessionPhase::Starting, SessionPhase::Running)
            | (SessionPhase::Starting, SessionPhase::Idle)
            | (SessionPhase::Running, SessionPhase::Stopping)
            | (SessionPhase::Stopping, SessionPhase::Idle)
    ) || from == to
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Update(LensSettings),
    Stop,
}

/// Why a session returned to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Stopped,
    ExitKey,
    WindowClosed,
    StartupFailed,
}

/// State readable from any thread while a session runs.
#[derive(Debug)]
pub struct SessionShared {
    running: AtomicBool,
    phase: AtomicU8,
    zoom_bits: AtomicU32,
    last_exit: Mutex<Option<SessionExit>>,
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new(LensSettings::default().zoom_factor)
    }
}

impl SessionShared {
    pub fn new(zoom: f32) -> Self {
        Self {
            running: AtomicBool::new(false),
            phase: AtomicU8::new(SessionPhase::Idle as u8),
            zoom_bits: AtomicU32::new(zoom.to_bits()),
            last_exit: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn transition(&self, next: SessionPhase) -> Result<()> {
        let current = self.phase();
        if !can_transition(current, next) {
            return Err(anyhow!(
                "invalid session phase transition: {:?} -> {:?}",
                current,
                next
            ));
        }
        self.phase.store(next as u8, Ordering::Release);
        Ok(())
    }

    pub fn zoom(&self) -> f32 {
        f32::from_bits(self.zoom_bits.load(Ordering::Acquire))
    }

    pub fn set_zoom(&self, zoom: f32) {
        self.zoom_bits.store(zoom.to_bits(), Ordering::Release);
    }

    pub fn last_exit(&self) -> Option<SessionExit> {
        self.last_exit.lock().ok().and_then(|guard| *guard)
    }

    pub fn set_last_exit(&self, exit: Option<SessionExit>) {
        if let Ok(mut guard) = self.last_exit.lock() {
            *guard = exit;
        }
    }
}

/// Platform collaborators of one session.
pub struct SessionParts {
    pub magnifier: Box<dyn MagnificationService>,
    pub windows: Box<dyn WindowSystem>,
    pub inputs: Vec<Box<dyn InputSource>>,
}

/// Builds [`SessionParts`] on the session thread, so window handles never
/// leave it.
pub trait PlatformFactory: Send + Sync {
    fn create(&self) -> Result<SessionParts>;
}

impl<F> PlatformFactory for F
where
    F: Fn() -> Result<SessionParts> + Send + Sync,
{
    fn create(&self) -> Result<SessionParts> {
        self()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlatform;

impl PlatformFactory for DefaultPlatform {
    #[cfg(windows)]
    fn create(&self) -> Result<SessionParts> {
        use crate::hook::WheelHookSource;
        use crate::input::PolledKeys;
        use crate::magnifier::MagnificationLibrary;
        use crate::window::Win32Windows;

        Ok(SessionParts {
            magnifier: Box::new(MagnificationLibrary::new()),
            windows: Box::new(Win32Windows::new()),
            inputs: vec![
                Box::new(PolledKeys::default()),
                Box::new(WheelHookSource::default()),
            ],
        })
    }

    #[cfg(not(windows))]
    fn create(&self) -> Result<SessionParts> {
        Err(anyhow!("the magnifier overlay is only available on Windows"))
    }
}

/// One run of the overlay, from window creation to teardown.
pub struct OverlaySession {
    settings: LensSettings,
    parts: SessionParts,
    shared: Arc<SessionShared>,
    commands: Receiver<SessionCommand>,
    pending: VecDeque<SessionCommand>,
    screen: ScreenSize,
    host: Option<WindowHandle>,
    magnifier_window: Option<WindowHandle>,
    visible: bool,
    shown: Option<bool>,
}

impl OverlaySession {
    pub fn new(
        settings: LensSettings,
        parts: SessionParts,
        shared: Arc<SessionShared>,
        commands: Receiver<SessionCommand>,
    ) -> Self {
        Self {
            settings: settings.clamped(),
            parts,
            shared,
            commands,
            pending: VecDeque::new(),
            screen: ScreenSize::default(),
            host: None,
            magnifier_window: None,
            visible: true,
            shown: None,
        }
    }

    pub fn settings(&self) -> &LensSettings {
        &self.settings
    }

    /// Toggle state requested by the user, independent of the run state.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn run(mut self) -> SessionExit {
        self.enter(SessionPhase::Starting);
        let exit = match self.start_up() {
            Ok(()) => {
                self.enter(SessionPhase::Running);
                tracing::info!(
                    lens_size = self.settings.lens_size,
                    zoom = self.settings.zoom_factor,
                    fps = self.settings.fps,
                    "magnifier started"
                );
                let exit = self.run_loop();
                self.enter(SessionPhase::Stopping);
                self.tear_down();
                exit
            }
            Err(err) => {
                tracing::error!(?err, "magnifier failed to start");
                SessionExit::StartupFailed
            }
        };
        self.shared.set_running(false);
        self.shared.set_last_exit(Some(exit));
        self.enter(SessionPhase::Idle);
        tracing::info!(?exit, "magnifier session ended");
        exit
    }

    fn enter(&self, phase: SessionPhase) {
        if let Err(err) = self.shared.transition(phase) {
            tracing::warn!(?err, "session phase not updated");
        }
    }

    /// Initialize the service and bring up both windows. On error everything
    /// created so far has been released again.
    pub fn start_up(&mut self) -> Result<()> {
        self.parts
            .magnifier
            .initialize()
            .context("magnification service unavailable")?;

        if let Err(err) = self.create_windows() {
            self.destroy_windows();
            self.parts.magnifier.uninitialize();
            return Err(err);
        }

        let bindings = self.settings.bindings;
        for source in self.parts.inputs.iter_mut() {
            if let Err(err) = source.start(&bindings) {
                tracing::warn!(?err, "input source failed to start");
            }
        }
        self.shared.set_zoom(self.settings.zoom_factor);
        Ok(())
    }

    fn create_windows(&mut self) -> Result<()> {
        self.screen = self.parts.windows.screen_size();
        let rect = transform::lens_window_rect(self.screen, self.settings.lens_size);
        let host = self
            .parts
            .windows
            .create_host(&HostWindowSpec {
                rect,
                shape: self.settings.lens_shape,
                dot: self.settings.dot,
            })
            .context("failed to create lens host window")?;
        self.host = Some(host);

        let magnifier = self
            .parts
            .windows
            .create_magnifier(host, self.settings.lens_size)
            .context("failed to create magnifier window")?;
        self.magnifier_window = Some(magnifier);

        self.push_transform()?;
        self.push_source()?;
        self.parts.windows.set_visible(host, true);
        self.shown = Some(true);
        Ok(())
    }

    fn destroy_windows(&mut self) {
        if let Some(magnifier) = self.magnifier_window.take() {
            self.parts.windows.destroy(magnifier);
        }
        if let Some(host) = self.host.take() {
            self.parts.windows.destroy(host);
        }
        self.shown = None;
    }

    fn run_loop(&mut self) -> SessionExit {
        loop {
            let frame_started = Instant::now();
            if let Some(exit) = self.tick() {
                return exit;
            }
            let budget = self.settings.frame_interval();
            let Some(remaining) = budget.checked_sub(frame_started.elapsed()) else {
                continue;
            };
            // Wake early for commands so a stop is not held up by a slow frame rate.
            match self.commands.recv_timeout(remaining) {
                Ok(command) => self.pending.push_back(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(remaining),
            }
        }
    }

    /// One iteration of the run loop, without the frame pacing.
    pub fn tick(&mut self) -> Option<SessionExit> {
        if !self.parts.windows.pump_messages() {
            return Some(SessionExit::WindowClosed);
        }
        if !self.shared.is_running() {
            return Some(SessionExit::Stopped);
        }
        if let Some(exit) = self.drain_commands() {
            return Some(exit);
        }

        let context = InputContext {
            overlay_foreground: self
                .host
                .map(|host| self.parts.windows.is_foreground(host))
                .unwrap_or(false),
        };
        let bindings = self.settings.bindings;
        let mut events = Vec::new();
        for source in self.parts.inputs.iter_mut() {
            events.extend(source.collect(&bindings, context));
        }
        for event in events {
            match event {
                InputEvent::Toggle => {
                    self.visible = !self.visible;
                    tracing::debug!(visible = self.visible, "lens toggled");
                }
                InputEvent::Zoom(direction) => self.step_zoom(direction),
                InputEvent::Exit => {
                    tracing::info!("exit key pressed");
                    return Some(SessionExit::ExitKey);
                }
            }
        }

        self.sync_visibility();
        if self.visible {
            if let Err(err) = self.push_source() {
                tracing::warn!(?err, "failed to refresh magnifier source");
            }
            if self.settings.dot.enabled {
                if let Some(host) = self.host {
                    self.parts.windows.invalidate(host);
                }
            }
        }
        None
    }

    fn drain_commands(&mut self) -> Option<SessionExit> {
        loop {
            let command = match self.pending.pop_front() {
                Some(command) => command,
                None => match self.commands.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => return None,
                    Err(TryRecvError::Disconnected) => {
                        tracing::debug!("controller went away; stopping");
                        return Some(SessionExit::Stopped);
                    }
                },
            };
            match command {
                SessionCommand::Update(settings) => self.apply_settings(settings),
                SessionCommand::Stop => return Some(SessionExit::Stopped),
            }
        }
    }

    fn step_zoom(&mut self, direction: ZoomDirection) {
        let started = Instant::now();
        let zoom = step_zoom(self.settings.zoom_factor, direction.step());
        if zoom == self.settings.zoom_factor {
            return;
        }
        self.settings.zoom_factor = zoom;
        self.shared.set_zoom(zoom);
        if let Err(err) = self.push_transform().and_then(|_| self.push_source()) {
            tracing::warn!(?err, "failed to apply zoom");
        }
        tracing::info!(
            zoom,
            latency_us = started.elapsed().as_micros() as u64,
            "zoom applied"
        );
    }

    /// Replace the effective settings, touching only what changed.
    pub fn apply_settings(&mut self, settings: LensSettings) {
        let settings = settings.clamped();
        if settings == self.settings {
            return;
        }
        let previous = std::mem::replace(&mut self.settings, settings);
        let current = self.settings.clone();

        if previous.bindings != current.bindings {
            for source in self.parts.inputs.iter_mut() {
                source.update_bindings(&current.bindings);
            }
        }
        if previous.zoom_factor != current.zoom_factor {
            self.shared.set_zoom(current.zoom_factor);
        }

        let (Some(host), Some(magnifier)) = (self.host, self.magnifier_window) else {
            return;
        };
        let resized = previous.lens_size != current.lens_size;
        if resized {
            self.screen = self.parts.windows.screen_size();
            let rect = transform::lens_window_rect(self.screen, current.lens_size);
            if let Err(err) = self.parts.windows.reposition(host, magnifier, rect) {
                tracing::warn!(?err, "failed to resize lens");
            }
        }
        if resized || previous.lens_shape != current.lens_shape {
            if let Err(err) =
                self.parts
                    .windows
                    .set_shape(host, current.lens_shape, current.lens_size)
            {
                tracing::warn!(?err, "failed to reshape lens");
            }
        }
        if resized || previous.zoom_factor != current.zoom_factor {
            if let Err(err) = self.push_transform().and_then(|_| self.push_source()) {
                tracing::warn!(?err, "failed to apply zoom");
            }
        }
        if previous.dot != current.dot {
            self.parts.windows.set_dot(host, current.dot);
        }
        tracing::debug!(
            lens_size = current.lens_size,
            zoom = current.zoom_factor,
            shape = ?current.lens_shape,
            fps = current.fps,
            "settings applied"
        );
    }

    fn sync_visibility(&mut self) {
        let Some(host) = self.host else {
            return;
        };
        if self.shown != Some(self.visible) {
            self.parts.windows.set_visible(host, self.visible);
            self.shown = Some(self.visible);
        }
    }

    fn geometry(&self) -> transform::LensGeometry {
        transform::compute(
            self.settings.lens_size,
            self.settings.zoom_factor,
            self.screen.center(),
        )
    }

    fn push_transform(&mut self) -> Result<()> {
        let Some(magnifier) = self.magnifier_window else {
            return Ok(());
        };
        let geometry = self.geometry();
        self.parts
            .magnifier
            .set_transform(magnifier, &geometry.transform)
    }

    fn push_source(&mut self) -> Result<()> {
        let Some(magnifier) = self.magnifier_window else {
            return Ok(());
        };
        let geometry = self.geometry();
        self.parts.magnifier.set_source(magnifier, geometry.source)
    }

    /// Stop input, destroy both windows and release the service.
    pub fn tear_down(&mut self) {
        for source in self.parts.inputs.iter_mut() {
            source.stop();
        }
        self.destroy_windows();
        self.parts.magnifier.uninitialize();
        tracing::info!("magnifier stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeySample, PolledKeys, ScriptedKeys};
    use crate::magnifier::{MagCall, MockMagnifier};
    use crate::window::{MockWindowSystem, WindowCall};
    use std::sync::mpsc;

    const SCREEN: ScreenSize = ScreenSize {
        width: 1920,
        height: 1080,
    };

    struct Rig {
        session: OverlaySession,
        mag: MockMagnifier,
        windows: MockWindowSystem,
        keys: ScriptedKeys,
        tx: mpsc::Sender<SessionCommand>,
    }

    fn rig(settings: LensSettings) -> Rig {
        let mag = MockMagnifier::new();
        let windows = MockWindowSystem::new(SCREEN);
        let keys = ScriptedKeys::new();
        let parts = SessionParts {
            magnifier: Box::new(mag.clone()),
            windows: Box::new(windows.clone()),
            inputs: vec![Box::new(PolledKeys::new(Box::new(keys.clone())))],
        };
        let shared = Arc::new(SessionShared::new(settings.zoom_factor));
        shared.set_running(true);
        let (tx, rx) = mpsc::channel();
        Rig {
            session: OverlaySession::new(settings, parts, shared, rx),
            mag,
            windows,
            keys,
            tx,
        }
    }

    #[test]
    fn phases_cannot_be_skipped() {
        assert!(can_transition(SessionPhase::Idle, SessionPhase::Starting));
        assert!(can_transition(SessionPhase::Starting, SessionPhase::Idle));
        assert!(!can_transition(SessionPhase::Idle, SessionPhase::Running));
        assert!(!can_transition(SessionPhase::Running, SessionPhase::Idle));
        assert!(!can_transition(SessionPhase::Stopping, SessionPhase::Running));
    }

    #[test]
    fn start_up_applies_initial_geometry() {
        let mut rig = rig(LensSettings::default());
        rig.session.start_up().expect("start");
        assert_eq!(rig.mag.last_scale(), Some(3.0));
        let source = rig.mag.last_source().expect("source");
        assert_eq!((source.width, source.height), (100, 100));
        assert_eq!(source.center(), SCREEN.center());
        assert_eq!(rig.windows.last_visibility(), Some(true));
    }

    #[test]
    fn zoom_in_at_max_is_a_no_op() {
        let mut rig = rig(LensSettings {
            zoom_factor: 10.0,
            ..LensSettings::default()
        });
        rig.session.start_up().expect("start");
        rig.mag.clear_calls();
        rig.keys.push(KeySample {
            zoom_in: true,
            modifiers: crate::keys::Modifiers::CTRL,
            ..KeySample::default()
        });
        assert_eq!(rig.session.tick(), None);
        assert_eq!(rig.session.settings().zoom_factor, 10.0);
        assert!(!rig
            .mag
            .calls()
            .iter()
            .any(|c| matches!(c, MagCall::SetTransform(..))));
    }

    #[test]
    fn hidden_lens_stops_refreshing_source() {
        let mut rig = rig(LensSettings::default());
        rig.session.start_up().expect("start");
        rig.keys.push(KeySample {
            toggle: true,
            ..KeySample::default()
        });
        rig.session.tick();
        assert!(!rig.session.is_visible());
        assert_eq!(rig.windows.last_visibility(), Some(false));

        rig.mag.clear_calls();
        rig.session.tick();
        assert!(rig.mag.calls().is_empty());
    }

    #[test]
    fn stop_command_ends_the_run() {
        let mut rig = rig(LensSettings::default());
        rig.session.start_up().expect("start");
        rig.tx.send(SessionCommand::Stop).expect("send");
        assert_eq!(rig.session.tick(), Some(SessionExit::Stopped));
    }

    #[test]
    fn closed_window_ends_the_run() {
        let mut rig = rig(LensSettings::default());
        rig.session.start_up().expect("start");
        rig.windows.post_quit();
        assert_eq!(rig.session.tick(), Some(SessionExit::WindowClosed));
    }

    #[test]
    fn shape_change_only_reshapes() {
        let mut rig = rig(LensSettings::default());
        rig.session.start_up().expect("start");
        rig.windows.clear_calls();
        rig.mag.clear_calls();

        let rectangle = LensSettings {
            lens_shape: crate::settings::LensShape::Rectangle,
            ..LensSettings::default()
        };
        rig.session.apply_settings(rectangle);
        assert_eq!(rig.windows.calls().len(), 1);
        assert!(matches!(rig.windows.calls()[0], WindowCall::SetShape(..)));
        assert!(rig.mag.calls().is_empty());
    }
}
