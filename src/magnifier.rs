//! Access to the native magnification service.

use crate::transform::{MagTransform, PixelRect};
use crate::window::WindowHandle;
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

pub trait MagnificationService: Send {
    fn initialize(&mut self) -> Result<()>;
    fn uninitialize(&mut self);
    fn set_source(&mut self, magnifier: WindowHandle, source: PixelRect) -> Result<()>;
    fn set_transform(&mut self, magnifier: WindowHandle, transform: &MagTransform) -> Result<()>;
}

#[cfg(windows)]
pub use native::MagnificationLibrary;

#[cfg(windows)]
mod native {
    use super::*;
    use libloading::{Library, Symbol};
    use windows::Win32::Foundation::{BOOL, HWND, RECT};

    type MagInitializeFn = unsafe extern "system" fn() -> BOOL;
    type MagUninitializeFn = unsafe extern "system" fn() -> BOOL;
    type MagSetWindowSourceFn = unsafe extern "system" fn(HWND, RECT) -> BOOL;
    type MagSetWindowTransformFn = unsafe extern "system" fn(HWND, *mut MagTransform) -> BOOL;

    struct MagApi {
        initialize: MagInitializeFn,
        uninitialize: MagUninitializeFn,
        set_window_source: MagSetWindowSourceFn,
        set_window_transform: MagSetWindowTransformFn,
        // Keeps the function pointers above valid.
        _library: Library,
    }

    impl MagApi {
        fn load() -> Result<Self> {
            unsafe {
                let library = Library::new("Magnification.dll")
                    .map_err(|err| anyhow!("failed to load Magnification.dll: {err}"))?;
                let initialize = *resolve::<MagInitializeFn>(&library, b"MagInitialize\0")?;
                let uninitialize = *resolve::<MagUninitializeFn>(&library, b"MagUninitialize\0")?;
                let set_window_source =
                    *resolve::<MagSetWindowSourceFn>(&library, b"MagSetWindowSource\0")?;
                let set_window_transform =
                    *resolve::<MagSetWindowTransformFn>(&library, b"MagSetWindowTransform\0")?;
                Ok(Self {
                    initialize,
                    uninitialize,
                    set_window_source,
                    set_window_transform,
                    _library: library,
                })
            }
        }
    }

    unsafe fn resolve<'lib, T>(library: &'lib Library, name: &[u8]) -> Result<Symbol<'lib, T>> {
        library.get::<T>(name).map_err(|err| {
            anyhow!(
                "Magnification.dll is missing {}: {err}",
                String::from_utf8_lossy(&name[..name.len().saturating_sub(1)])
            )
        })
    }

    /// `Magnification.dll`, loaded on `initialize` and released on `uninitialize`.
    #[derive(Default)]
    pub struct MagnificationLibrary {
        api: Option<MagApi>,
    }

    impl MagnificationLibrary {
        pub fn new() -> Self {
            Self::default()
        }

        fn api(&self) -> Result<&MagApi> {
            self.api
                .as_ref()
                .ok_or_else(|| anyhow!("magnification service is not initialized"))
        }
    }

    impl MagnificationService for MagnificationLibrary {
        fn initialize(&mut self) -> Result<()> {
            if self.api.is_some() {
                return Ok(());
            }
            let api = MagApi::load()?;
            if !unsafe { (api.initialize)() }.as_bool() {
                return Err(anyhow!("MagInitialize failed"));
            }
            tracing::debug!("magnification service initialized");
            self.api = Some(api);
            Ok(())
        }

        fn uninitialize(&mut self) {
            if let Some(api) = self.api.take() {
                unsafe {
                    let _ = (api.uninitialize)();
                }
                tracing::debug!("magnification service released");
            }
        }

        fn set_source(&mut self, magnifier: WindowHandle, source: PixelRect) -> Result<()> {
            let api = self.api()?;
            let rect = RECT {
                left: source.left,
                top: source.top,
                right: source.right(),
                bottom: source.bottom(),
            };
            let ok = unsafe { (api.set_window_source)(HWND(magnifier.0 as *mut _), rect) };
            if !ok.as_bool() {
                return Err(anyhow!("MagSetWindowSource failed"));
            }
            Ok(())
        }

        fn set_transform(&mut self, magnifier: WindowHandle, transform: &MagTransform) -> Result<()> {
            let api = self.api()?;
            let mut matrix = *transform;
            let ok = unsafe { (api.set_window_transform)(HWND(magnifier.0 as *mut _), &mut matrix) };
            if !ok.as_bool() {
                return Err(anyhow!("MagSetWindowTransform failed"));
            }
            Ok(())
        }
    }

    impl Drop for MagnificationLibrary {
        fn drop(&mut self) {
            self.uninitialize();
        }
    }
}

/// One call made against [`MockMagnifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum MagCall {
    Initialize,
    Uninitialize,
    SetSource(WindowHandle, PixelRect),
    SetTransform(WindowHandle, MagTransform),
}

#[derive(Debug, Default)]
struct MockMagState {
    calls: Vec<MagCall>,
    fail_initialize: bool,
    initialized: bool,
}

/// Recording magnification service used by tests.
#[derive(Clone, Default)]
pub struct MockMagnifier {
    state: Arc<Mutex<MockMagState>>,
}

impl MockMagnifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a missing or broken `Magnification.dll`.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_fail_initialize(true);
        mock
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_initialize = fail;
        }
    }

    pub fn calls(&self) -> Vec<MagCall> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().map(|s| s.initialized).unwrap_or(false)
    }

    /// Scale factor of the most recent transform, if any was applied.
    pub fn last_scale(&self) -> Option<f32> {
        self.calls().iter().rev().find_map(|call| match call {
            MagCall::SetTransform(_, transform) => Some(transform.scale_factor()),
            _ => None,
        })
    }

    pub fn last_source(&self) -> Option<PixelRect> {
        self.calls().iter().rev().find_map(|call| match call {
            MagCall::SetSource(_, rect) => Some(*rect),
            _ => None,
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockMagState) -> R) -> Result<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("mock magnifier lock poisoned"))?;
        Ok(f(&mut state))
    }
}

impl MagnificationService for MockMagnifier {
    fn initialize(&mut self) -> Result<()> {
        self.with_state(|state| {
            state.calls.push(MagCall::Initialize);
            if state.fail_initialize {
                return Err(anyhow!("failed to load Magnification.dll"));
            }
            state.initialized = true;
            Ok(())
        })?
    }

    fn uninitialize(&mut self) {
        let _ = self.with_state(|state| {
            state.calls.push(MagCall::Uninitialize);
            state.initialized = false;
        });
    }

    fn set_source(&mut self, magnifier: WindowHandle, source: PixelRect) -> Result<()> {
        self.with_state(|state| state.calls.push(MagCall::SetSource(magnifier, source)))
    }

    fn set_transform(&mut self, magnifier: WindowHandle, transform: &MagTransform) -> Result<()> {
        self.with_state(|state| {
            state
                .calls
                .push(MagCall::SetTransform(magnifier, *transform))
        })
    }
}
