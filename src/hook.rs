use crate::input::{wheel_zoom, InputContext, InputEvent, InputSource, ZoomDirection};
use crate::keys::Modifiers;
use crate::settings::{InputBindings, WheelBinding};
use anyhow::anyhow;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Low-level mouse hook that turns matching wheel messages into zoom steps.
///
/// Matching messages are consumed by the hook; everything else passes
/// through to the rest of the system.
pub trait WheelHookBackend: Send {
    fn install(&mut self, binding: WheelBinding, sender: Sender<ZoomDirection>)
        -> anyhow::Result<()>;
    fn set_binding(&mut self, binding: WheelBinding);
    fn uninstall(&mut self) -> anyhow::Result<()>;
    fn is_installed(&self) -> bool;
}

/// Injected wheel messages (from `SendInput` and friends) are never treated
/// as zoom requests.
pub fn is_injected(flags: u32) -> bool {
    // 0x1 = LLMHF_INJECTED, 0x2 = LLMHF_LOWER_IL_INJECTED
    (flags & 0x3) != 0
}

/// Hook-driven input source. Only installs the hook while a wheel binding exists.
pub struct WheelHookSource {
    backend: Box<dyn WheelHookBackend>,
    receiver: Option<Receiver<ZoomDirection>>,
}

impl WheelHookSource {
    pub fn new(backend: Box<dyn WheelHookBackend>) -> Self {
        Self {
            backend,
            receiver: None,
        }
    }

    fn install(&mut self, binding: WheelBinding) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel();
        self.backend.install(binding, tx)?;
        self.receiver = Some(rx);
        tracing::debug!(?binding, "wheel zoom hook installed");
        Ok(())
    }

    fn uninstall(&mut self) {
        if !self.backend.is_installed() {
            self.receiver = None;
            return;
        }
        if let Err(err) = self.backend.uninstall() {
            tracing::error!(?err, "failed to uninstall wheel zoom hook");
        }
        self.receiver = None;
    }
}

impl Default for WheelHookSource {
    fn default() -> Self {
        Self::new(Box::new(DefaultWheelHook::default()))
    }
}

impl InputSource for WheelHookSource {
    fn start(&mut self, bindings: &InputBindings) -> anyhow::Result<()> {
        match bindings.wheel {
            Some(binding) => self.install(binding),
            None => Ok(()),
        }
    }

    fn update_bindings(&mut self, bindings: &InputBindings) {
        match (bindings.wheel, self.backend.is_installed()) {
            (Some(binding), true) => self.backend.set_binding(binding),
            (Some(binding), false) => {
                if let Err(err) = self.install(binding) {
                    tracing::warn!(?err, "failed to install wheel zoom hook");
                }
            }
            (None, true) => self.uninstall(),
            (None, false) => {}
        }
    }

    fn collect(&mut self, _bindings: &InputBindings, _context: InputContext) -> Vec<InputEvent> {
        match &self.receiver {
            Some(rx) => rx.try_iter().map(InputEvent::Zoom).collect(),
            None => Vec::new(),
        }
    }

    fn stop(&mut self) {
        self.uninstall();
    }
}

#[cfg(windows)]
struct HookThread {
    thread_id: u32,
    join: std::thread::JoinHandle<()>,
}

#[cfg(windows)]
impl HookThread {
    /// Quit the hook thread's message loop and wait for it to unhook.
    fn shutdown(self) -> anyhow::Result<()> {
        use windows::Win32::Foundation::{LPARAM, WPARAM};
        use windows::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_QUIT};
        if let Err(err) =
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
        {
            tracing::warn!(?err, "failed to post quit to wheel hook thread");
        }
        self.join
            .join()
            .map_err(|_| anyhow!("wheel hook thread panicked"))
    }
}

#[cfg(windows)]
#[derive(Default)]
pub struct DefaultWheelHook {
    hook_thread: Option<HookThread>,
}

#[cfg(windows)]
impl WheelHookBackend for DefaultWheelHook {
    fn install(
        &mut self,
        binding: WheelBinding,
        sender: Sender<ZoomDirection>,
    ) -> anyhow::Result<()> {
        if self.hook_thread.is_some() {
            hook_dispatch().set_sender(Some(sender));
            self.set_binding(binding);
            return Ok(());
        }

        hook_dispatch().set_binding(binding);
        hook_dispatch().set_sender(Some(sender));
        hook_dispatch().set_enabled(true);

        use std::time::Duration;
        use windows::Win32::System::LibraryLoader::GetModuleHandleW;
        use windows::Win32::System::Threading::GetCurrentThreadId;
        use windows::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, GetMessageW, PeekMessageW, SetWindowsHookExW, TranslateMessage,
            UnhookWindowsHookEx, MSG, PM_NOREMOVE, WH_MOUSE_LL,
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel::<anyhow::Result<u32>>(1);

        let join = std::thread::spawn(move || {
            // Ensure the thread has a message queue.
            let mut msg = MSG::default();
            unsafe {
                let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
            }

            let thread_id = unsafe { GetCurrentThreadId() };
            let hmodule = match unsafe { GetModuleHandleW(None) } {
                Ok(h) => h,
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!(err)));
                    return;
                }
            };

            let mouse_hook = match unsafe {
                SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), hmodule, 0)
            } {
                Ok(h) if !h.0.is_null() => h,
                Ok(_) => {
                    let _ = ready_tx.send(Err(anyhow!(windows::core::Error::from_win32())));
                    return;
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(anyhow!(err)));
                    return;
                }
            };

            let _ = ready_tx.send(Ok(thread_id));

            // WH_MOUSE_LL callbacks are delivered through this loop.
            loop {
                let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                if r.0 <= 0 {
                    break;
                }
                unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }

            unsafe {
                let _ = UnhookWindowsHookEx(mouse_hook);
            }
        });

        let thread_id = match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(err)) => {
                hook_dispatch().clear();
                let _ = join.join();
                return Err(err);
            }
            Err(_) => {
                hook_dispatch().clear();
                // SetWindowsHookExW always returns; wait for its result so a
                // late hook is still removed.
                match ready_rx.recv() {
                    Ok(Ok(thread_id)) => {
                        if let Err(err) = (HookThread { thread_id, join }).shutdown() {
                            tracing::warn!(?err, "failed to stop late wheel hook thread");
                        }
                    }
                    _ => {
                        let _ = join.join();
                    }
                }
                return Err(anyhow!("wheel hook thread did not signal readiness in time"));
            }
        };

        self.hook_thread = Some(HookThread { thread_id, join });
        Ok(())
    }

    fn set_binding(&mut self, binding: WheelBinding) {
        hook_dispatch().set_binding(binding);
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        hook_dispatch().clear();

        match self.hook_thread.take() {
            Some(th) => th.shutdown(),
            None => Ok(()),
        }
    }

    fn is_installed(&self) -> bool {
        self.hook_thread.is_some()
    }
}

#[cfg(not(windows))]
#[derive(Default)]
pub struct DefaultWheelHook;

#[cfg(not(windows))]
impl WheelHookBackend for DefaultWheelHook {
    fn install(
        &mut self,
        _binding: WheelBinding,
        _sender: Sender<ZoomDirection>,
    ) -> anyhow::Result<()> {
        Err(anyhow!("mouse hooks are not supported on this platform"))
    }

    fn set_binding(&mut self, _binding: WheelBinding) {}

    fn uninstall(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_installed(&self) -> bool {
        false
    }
}

/// Packs a wheel binding into one byte so the hook procedure can read it
/// without locking: zoom-in flags in bits 0..3, zoom-out flags in bits 3..6.
fn pack_binding(binding: WheelBinding) -> u8 {
    fn bits(m: Modifiers) -> u8 {
        (m.ctrl as u8) | ((m.shift as u8) << 1) | ((m.alt as u8) << 2)
    }
    bits(binding.zoom_in) | (bits(binding.zoom_out) << 3)
}

fn unpack_binding(packed: u8) -> WheelBinding {
    fn modifiers(bits: u8) -> Modifiers {
        Modifiers {
            ctrl: bits & 0b001 != 0,
            shift: bits & 0b010 != 0,
            alt: bits & 0b100 != 0,
        }
    }
    WheelBinding {
        zoom_in: modifiers(packed & 0b111),
        zoom_out: modifiers((packed >> 3) & 0b111),
    }
}

#[cfg(windows)]
struct HookDispatch {
    enabled: std::sync::atomic::AtomicBool,
    binding: AtomicU8,
    sender: Mutex<Option<Sender<ZoomDirection>>>,
}

#[cfg(windows)]
impl HookDispatch {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_binding(&self, binding: WheelBinding) {
        self.binding.store(pack_binding(binding), Ordering::Release);
    }

    fn binding(&self) -> WheelBinding {
        unpack_binding(self.binding.load(Ordering::Acquire))
    }

    fn set_sender(&self, sender: Option<Sender<ZoomDirection>>) {
        if let Ok(mut guard) = self.sender.lock() {
            *guard = sender;
        }
    }

    fn clear(&self) {
        self.set_enabled(false);
        self.set_sender(None);
    }
}

#[cfg(windows)]
static HOOK_DISPATCH: once_cell::sync::OnceCell<HookDispatch> = once_cell::sync::OnceCell::new();

#[cfg(windows)]
fn hook_dispatch() -> &'static HookDispatch {
    HOOK_DISPATCH.get_or_init(|| HookDispatch {
        enabled: std::sync::atomic::AtomicBool::new(false),
        binding: AtomicU8::new(pack_binding(WheelBinding::default())),
        sender: Mutex::new(None),
    })
}

#[cfg(windows)]
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: windows::Win32::Foundation::WPARAM,
    l_param: windows::Win32::Foundation::LPARAM,
) -> windows::Win32::Foundation::LRESULT {
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, HC_ACTION, HHOOK, MSLLHOOKSTRUCT, WM_MOUSEWHEEL,
    };

    if n_code == HC_ACTION as i32 && w_param.0 as u32 == WM_MOUSEWHEEL {
        let dispatch = hook_dispatch();
        if dispatch.is_enabled() {
            let info = &*(l_param.0 as *const MSLLHOOKSTRUCT);
            if !is_injected(info.flags) {
                // mouseData high word carries the signed wheel delta.
                let delta = ((info.mouseData >> 16) & 0xFFFF) as i16;
                let held = crate::input::modifiers_snapshot();
                if let Some(direction) = wheel_zoom(delta, held, &dispatch.binding()) {
                    // Only install/uninstall take this lock, and only briefly.
                    if let Ok(guard) = dispatch.sender.lock() {
                        if let Some(sender) = guard.as_ref() {
                            let _ = sender.send(direction);
                        }
                    }
                    return windows::Win32::Foundation::LRESULT(1);
                }
            }
        }
    }

    CallNextHookEx(HHOOK(std::ptr::null_mut()), n_code, w_param, l_param)
}

/// In-process stand-in for the low-level hook, driven by [`MockWheelHandle`].
#[derive(Clone)]
pub struct MockWheelHook {
    state: Arc<MockWheelState>,
}

#[derive(Default)]
struct MockWheelState {
    install_count: AtomicUsize,
    uninstall_count: AtomicUsize,
    binding: AtomicU8,
    sender: Mutex<Option<Sender<ZoomDirection>>>,
}

impl MockWheelHook {
    pub fn new() -> (Self, MockWheelHandle) {
        let state = Arc::new(MockWheelState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            MockWheelHandle { state },
        )
    }
}

impl WheelHookBackend for MockWheelHook {
    fn install(
        &mut self,
        binding: WheelBinding,
        sender: Sender<ZoomDirection>,
    ) -> anyhow::Result<()> {
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_none() {
            self.state.install_count.fetch_add(1, Ordering::SeqCst);
            *guard = Some(sender);
        }
        drop(guard);
        self.set_binding(binding);
        Ok(())
    }

    fn set_binding(&mut self, binding: WheelBinding) {
        self.state
            .binding
            .store(pack_binding(binding), Ordering::SeqCst);
    }

    fn uninstall(&mut self) -> anyhow::Result<()> {
        let mut guard = self.state.sender.lock().map_err(|_| anyhow!("lock"))?;
        if guard.is_some() {
            self.state.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        *guard = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        match self.state.sender.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        }
    }
}

pub struct MockWheelHandle {
    state: Arc<MockWheelState>,
}

impl MockWheelHandle {
    pub fn install_count(&self) -> usize {
        self.state.install_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.state.uninstall_count.load(Ordering::SeqCst)
    }

    /// Deliver a wheel message with `held` modifiers. Returns whether the
    /// hook consumed it.
    pub fn scroll(&self, delta: i16, held: Modifiers) -> bool {
        let binding = unpack_binding(self.state.binding.load(Ordering::SeqCst));
        let Some(direction) = wheel_zoom(delta, held, &binding) else {
            return false;
        };
        match self.state.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|sender| sender.send(direction).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}
