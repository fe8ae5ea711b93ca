use crate::session::{
    DefaultPlatform, OverlaySession, PlatformFactory, SessionCommand, SessionExit, SessionPhase,
    SessionShared,
};
use crate::settings::LensSettings;
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest `stop` waits for the session to reach idle.
pub const STOP_WAIT: Duration = Duration::from_millis(100);
const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
}

#[derive(Default)]
struct ControllerState {
    settings: LensSettings,
    commands: Option<Sender<SessionCommand>>,
    worker: Option<JoinHandle<()>>,
}

/// Owns at most one overlay session at a time.
pub struct LifecycleController {
    shared: Arc<SessionShared>,
    platform: Arc<dyn PlatformFactory>,
    state: Mutex<ControllerState>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::with_platform(DefaultPlatform)
    }
}

static CONTROLLER: Lazy<LifecycleController> = Lazy::new(LifecycleController::default);

/// Process-wide controller behind the C exports.
pub fn runtime() -> &'static LifecycleController {
    &CONTROLLER
}

impl LifecycleController {
    pub fn with_platform(platform: impl PlatformFactory + 'static) -> Self {
        Self {
            shared: Arc::new(SessionShared::default()),
            platform: Arc::new(platform),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Spawn a session thread. Returns before the overlay is visible.
    pub fn start(&self, settings: LensSettings) -> Result<StartOutcome> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("controller lock poisoned"))?;
        self.reap_locked(&mut state);
        if self.shared.phase() != SessionPhase::Idle || state.worker.is_some() {
            tracing::info!(phase = ?self.shared.phase(), "magnifier already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        let settings = settings.clamped();
        state.settings = settings.clone();
        self.shared.set_zoom(settings.zoom_factor);
        self.shared.set_last_exit(None);
        self.shared.set_running(true);
        self.shared.transition(SessionPhase::Starting)?;

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let platform = Arc::clone(&self.platform);
        let spawned = std::thread::Builder::new()
            .name("scope-lens-session".into())
            .spawn(move || {
                let parts = match platform.create() {
                    Ok(parts) => parts,
                    Err(err) => {
                        tracing::error!(?err, "failed to create platform services");
                        shared.set_running(false);
                        shared.set_last_exit(Some(SessionExit::StartupFailed));
                        let _ = shared.transition(SessionPhase::Idle);
                        return;
                    }
                };
                OverlaySession::new(settings, parts, shared, rx).run();
            });

        match spawned {
            Ok(handle) => {
                state.worker = Some(handle);
                state.commands = Some(tx);
                Ok(StartOutcome::Started)
            }
            Err(err) => {
                self.shared.set_running(false);
                let _ = self.shared.transition(SessionPhase::Idle);
                Err(anyhow!(err).context("failed to spawn magnifier thread"))
            }
        }
    }

    /// Request the session to stop and wait up to [`STOP_WAIT`] for it.
    /// Teardown may still be in progress when this returns.
    pub fn stop(&self) {
        let commands = match self.state.lock() {
            Ok(state) => state.commands.clone(),
            Err(_) => {
                tracing::error!("controller lock poisoned");
                return;
            }
        };
        if self.shared.phase() == SessionPhase::Idle && commands.is_none() {
            return;
        }

        self.shared.set_running(false);
        if let Some(tx) = commands {
            let _ = tx.send(SessionCommand::Stop);
        }
        if !self.wait_for_idle(STOP_WAIT) {
            tracing::debug!(phase = ?self.shared.phase(), "magnifier still shutting down");
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            self.reap_locked(&mut state);
        }
    }

    /// Store new settings and forward them to a live session.
    pub fn update_settings(&self, settings: LensSettings) -> Result<()> {
        let settings = settings.clamped();
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("controller lock poisoned"))?;
        state.settings = settings.clone();
        if !self.shared.phase().is_active() {
            self.shared.set_zoom(settings.zoom_factor);
        }
        if let Some(tx) = &state.commands {
            if tx.send(SessionCommand::Update(settings)).is_err() {
                tracing::debug!("session gone; settings kept for the next start");
            }
        }
        Ok(())
    }

    pub fn current_zoom(&self) -> f32 {
        self.shared.zoom()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    /// Most recently stored settings (not including live zoom steps).
    pub fn settings(&self) -> LensSettings {
        self.state
            .lock()
            .map(|state| state.settings.clone())
            .unwrap_or_default()
    }

    pub fn last_exit(&self) -> Option<SessionExit> {
        self.shared.last_exit()
    }

    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.phase() == SessionPhase::Idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    fn reap_locked(&self, state: &mut ControllerState) {
        if self.shared.phase() != SessionPhase::Idle {
            return;
        }
        state.commands = None;
        if let Some(worker) = state.worker.take() {
            if worker.join().is_err() {
                tracing::error!("magnifier thread panicked");
            }
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
        if let Ok(state) = self.state.get_mut() {
            state.commands = None;
            if let Some(worker) = state.worker.take() {
                let _ = worker.join();
            }
        }
    }
}
