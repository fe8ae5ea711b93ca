//! Host and magnifier windows, plus a recording double for tests.

use crate::settings::{DotOverlay, LensShape};
use crate::transform::{PixelRect, ScreenSize};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

/// Raw window handle. Only meaningful on the thread that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostWindowSpec {
    pub rect: PixelRect,
    pub shape: LensShape,
    pub dot: DotOverlay,
}

pub trait WindowSystem: Send {
    fn screen_size(&self) -> ScreenSize;
    fn create_host(&mut self, spec: &HostWindowSpec) -> Result<WindowHandle>;
    fn create_magnifier(&mut self, host: WindowHandle, lens_size: u32) -> Result<WindowHandle>;
    /// Clip the host to the lens shape. Rectangles clear any clip region.
    fn set_shape(&mut self, host: WindowHandle, shape: LensShape, lens_size: u32) -> Result<()>;
    /// Move/resize the host to `rect` and stretch the magnifier over it.
    fn reposition(&mut self, host: WindowHandle, magnifier: WindowHandle, rect: PixelRect)
        -> Result<()>;
    fn set_dot(&mut self, host: WindowHandle, dot: DotOverlay);
    fn set_visible(&mut self, host: WindowHandle, visible: bool);
    fn invalidate(&mut self, host: WindowHandle);
    fn is_foreground(&self, host: WindowHandle) -> bool;
    /// Drain pending messages without blocking. Returns `false` once a quit
    /// message has been seen.
    fn pump_messages(&mut self) -> bool;
    fn destroy(&mut self, window: WindowHandle);
}

#[cfg(windows)]
pub use win32::Win32Windows;

#[cfg(windows)]
mod win32 {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Once;
    use windows::core::{w, PCWSTR};
    use windows::Win32::Foundation::{COLORREF, HWND, LPARAM, LRESULT, RECT, WPARAM};
    use windows::Win32::Graphics::Gdi::{
        BeginPaint, CreateEllipticRgn, CreateSolidBrush, DeleteObject, Ellipse, EndPaint,
        FillRect, GetStockObject, InvalidateRect, SelectObject, SetWindowRgn, HBRUSH, HRGN,
        NULL_PEN, PAINTSTRUCT,
    };
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect,
        GetForegroundWindow, GetSystemMetrics, GetWindowLongPtrW, PeekMessageW, PostQuitMessage,
        RegisterClassW, SetLayeredWindowAttributes, SetWindowLongPtrW, SetWindowPos, ShowWindow,
        TranslateMessage, GWLP_USERDATA, HMENU, HWND_TOPMOST, LWA_COLORKEY, MSG, PM_REMOVE,
        SM_CXSCREEN, SM_CYSCREEN, SWP_NOACTIVATE, SWP_NOZORDER, SW_HIDE, SW_SHOWNOACTIVATE,
        WINDOW_EX_STYLE, WINDOW_STYLE, WM_DESTROY, WM_ERASEBKGND, WM_PAINT, WM_QUIT, WNDCLASSW,
        WS_CHILD, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST,
        WS_EX_TRANSPARENT, WS_POPUP, WS_VISIBLE,
    };

    /// Magenta is keyed out, so anything the magnifier does not cover is see-through.
    const TRANSPARENCY_KEY: COLORREF = COLORREF(0x00FF_00FF);

    /// Data the window procedure reads through `GWLP_USERDATA`.
    struct PaintState {
        dot: DotOverlay,
    }

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as *mut _)
    }

    pub fn host_ex_style() -> WINDOW_EX_STYLE {
        WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_NOACTIVATE | WS_EX_TOOLWINDOW
    }

    unsafe extern "system" fn host_wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if msg == WM_ERASEBKGND {
            return LRESULT(1);
        }
        if msg == WM_PAINT {
            let mut paint = PAINTSTRUCT::default();
            let hdc = BeginPaint(hwnd, &mut paint);
            let key_brush = CreateSolidBrush(TRANSPARENCY_KEY);
            FillRect(hdc, &paint.rcPaint, key_brush);
            let _ = DeleteObject(key_brush);

            let state_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA);
            if state_ptr != 0 {
                let state = &*(state_ptr as *const PaintState);
                if state.dot.enabled && state.dot.size > 0 {
                    let mut client = RECT::default();
                    if GetClientRect(hwnd, &mut client).is_ok() {
                        let cx = client.right / 2;
                        let cy = client.bottom / 2;
                        let r = state.dot.size as i32;
                        let brush = CreateSolidBrush(COLORREF(state.dot.color.to_colorref()));
                        let old_brush = SelectObject(hdc, brush);
                        let old_pen = SelectObject(hdc, GetStockObject(NULL_PEN));
                        let _ = Ellipse(hdc, cx - r, cy - r, cx + r + 1, cy + r + 1);
                        SelectObject(hdc, old_pen);
                        SelectObject(hdc, old_brush);
                        let _ = DeleteObject(brush);
                    }
                }
            }
            let _ = EndPaint(hwnd, &paint);
            return LRESULT(0);
        }
        if msg == WM_DESTROY {
            PostQuitMessage(0);
        }
        DefWindowProcW(hwnd, msg, wparam, lparam)
    }

    /// Win32 windows for one session. Must be used from a single thread.
    #[derive(Default)]
    pub struct Win32Windows {
        paint_states: HashMap<isize, Box<PaintState>>,
    }

    unsafe impl Send for Win32Windows {}

    impl Win32Windows {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl WindowSystem for Win32Windows {
        fn screen_size(&self) -> ScreenSize {
            unsafe {
                ScreenSize {
                    width: GetSystemMetrics(SM_CXSCREEN),
                    height: GetSystemMetrics(SM_CYSCREEN),
                }
            }
        }

        fn create_host(&mut self, spec: &HostWindowSpec) -> Result<WindowHandle> {
            static REGISTER_CLASS: Once = Once::new();
            let class_name = w!("ScopeLensHost");
            let hinstance = unsafe { GetModuleHandleW(PCWSTR::null()) }?;

            REGISTER_CLASS.call_once(|| unsafe {
                let wc = WNDCLASSW {
                    hInstance: hinstance.into(),
                    lpszClassName: class_name,
                    lpfnWndProc: Some(host_wndproc),
                    hbrBackground: HBRUSH::default(),
                    ..Default::default()
                };
                let _ = RegisterClassW(&wc);
            });

            let host = unsafe {
                CreateWindowExW(
                    host_ex_style(),
                    class_name,
                    w!("Scope Lens"),
                    WS_POPUP,
                    spec.rect.left,
                    spec.rect.top,
                    spec.rect.width,
                    spec.rect.height,
                    None,
                    HMENU::default(),
                    hinstance,
                    None,
                )
            }
            .map_err(|err| anyhow!("failed to create host window: {err}"))?;

            if let Err(err) =
                unsafe { SetLayeredWindowAttributes(host, TRANSPARENCY_KEY, 255, LWA_COLORKEY) }
            {
                unsafe {
                    let _ = DestroyWindow(host);
                }
                return Err(anyhow!("failed to configure layered host window: {err}"));
            }

            let handle = WindowHandle(host.0 as isize);
            let state = Box::new(PaintState { dot: spec.dot });
            unsafe {
                SetWindowLongPtrW(host, GWLP_USERDATA, &*state as *const PaintState as isize);
            }
            self.paint_states.insert(handle.0, state);

            if let Err(err) = self.set_shape(handle, spec.shape, spec.rect.width as u32) {
                self.destroy(handle);
                return Err(err);
            }
            Ok(handle)
        }

        fn create_magnifier(&mut self, host: WindowHandle, lens_size: u32) -> Result<WindowHandle> {
            let hinstance = unsafe { GetModuleHandleW(PCWSTR::null()) }?;
            let side = lens_size as i32;
            // "Magnifier" is registered by MagInitialize.
            let magnifier = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE::default(),
                    w!("Magnifier"),
                    w!("ScopeLensMagnifier"),
                    WINDOW_STYLE(WS_CHILD.0 | WS_VISIBLE.0),
                    0,
                    0,
                    side,
                    side,
                    hwnd(host),
                    HMENU::default(),
                    hinstance,
                    None,
                )
            }
            .map_err(|err| anyhow!("failed to create magnifier window: {err}"))?;
            Ok(WindowHandle(magnifier.0 as isize))
        }

        fn set_shape(&mut self, host: WindowHandle, shape: LensShape, lens_size: u32) -> Result<()> {
            let region = match shape {
                LensShape::Circle => {
                    let side = lens_size as i32;
                    let rgn = unsafe { CreateEllipticRgn(0, 0, side, side) };
                    if rgn.is_invalid() {
                        return Err(anyhow!("failed to create elliptic region"));
                    }
                    rgn
                }
                LensShape::Rectangle => HRGN::default(),
            };
            // The window owns the region after SetWindowRgn succeeds.
            let ok = unsafe { SetWindowRgn(hwnd(host), region, true) };
            if ok == 0 {
                if !region.is_invalid() {
                    unsafe {
                        let _ = DeleteObject(region);
                    }
                }
                return Err(anyhow!("failed to apply window region"));
            }
            Ok(())
        }

        fn reposition(
            &mut self,
            host: WindowHandle,
            magnifier: WindowHandle,
            rect: PixelRect,
        ) -> Result<()> {
            unsafe {
                SetWindowPos(
                    hwnd(host),
                    HWND_TOPMOST,
                    rect.left,
                    rect.top,
                    rect.width,
                    rect.height,
                    SWP_NOACTIVATE,
                )?;
                SetWindowPos(
                    hwnd(magnifier),
                    HWND::default(),
                    0,
                    0,
                    rect.width,
                    rect.height,
                    SWP_NOACTIVATE | SWP_NOZORDER,
                )?;
            }
            Ok(())
        }

        fn set_dot(&mut self, host: WindowHandle, dot: DotOverlay) {
            if let Some(state) = self.paint_states.get_mut(&host.0) {
                state.dot = dot;
            }
            self.invalidate(host);
        }

        fn set_visible(&mut self, host: WindowHandle, visible: bool) {
            let cmd = if visible { SW_SHOWNOACTIVATE } else { SW_HIDE };
            unsafe {
                let _ = ShowWindow(hwnd(host), cmd);
            }
        }

        fn invalidate(&mut self, host: WindowHandle) {
            unsafe {
                let _ = InvalidateRect(hwnd(host), None, false);
            }
        }

        fn is_foreground(&self, host: WindowHandle) -> bool {
            unsafe { GetForegroundWindow() == hwnd(host) }
        }

        fn pump_messages(&mut self) -> bool {
            let mut msg = MSG::default();
            unsafe {
                while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                    if msg.message == WM_QUIT {
                        return false;
                    }
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
            true
        }

        fn destroy(&mut self, window: WindowHandle) {
            unsafe {
                if self.paint_states.contains_key(&window.0) {
                    SetWindowLongPtrW(hwnd(window), GWLP_USERDATA, 0);
                }
                let _ = DestroyWindow(hwnd(window));
            }
            self.paint_states.remove(&window.0);
        }
    }
}

/// One call made against [`MockWindowSystem`].
#[derive(Debug, Clone, PartialEq)]
pub enum WindowCall {
    CreateHost(HostWindowSpec),
    CreateMagnifier(WindowHandle, u32),
    SetShape(WindowHandle, LensShape, u32),
    Reposition(WindowHandle, PixelRect),
    SetDot(WindowHandle, DotOverlay),
    SetVisible(WindowHandle, bool),
    Invalidate(WindowHandle),
    Destroy(WindowHandle),
}

#[derive(Debug, Default)]
struct MockWindowState {
    calls: Vec<WindowCall>,
    next_handle: isize,
    live: Vec<WindowHandle>,
    foreground: bool,
    fail_magnifier: bool,
    quit: bool,
}

/// Recording window system used by tests.
#[derive(Clone)]
pub struct MockWindowSystem {
    screen: ScreenSize,
    state: Arc<Mutex<MockWindowState>>,
}

impl MockWindowSystem {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            state: Arc::new(Mutex::new(MockWindowState {
                next_handle: 100,
                ..MockWindowState::default()
            })),
        }
    }

    /// Make `create_magnifier` fail, after the host window already exists.
    pub fn fail_magnifier(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_magnifier = true;
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.foreground = foreground;
        }
    }

    /// Next `pump_messages` reports a quit message.
    pub fn post_quit(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.quit = true;
        }
    }

    pub fn calls(&self) -> Vec<WindowCall> {
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

    pub fn live_windows(&self) -> Vec<WindowHandle> {
        self.state
            .lock()
            .map(|state| state.live.clone())
            .unwrap_or_default()
    }

    /// Visibility from the most recent `SetVisible` call, if any.
    pub fn last_visibility(&self) -> Option<bool> {
        self.calls().iter().rev().find_map(|call| match call {
            WindowCall::SetVisible(_, visible) => Some(*visible),
            _ => None,
        })
    }

    fn record(&self, call: WindowCall) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }

    fn allocate(&self) -> Result<WindowHandle> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("mock window lock poisoned"))?;
        state.next_handle += 1;
        let handle = WindowHandle(state.next_handle);
        state.live.push(handle);
        Ok(handle)
    }
}

impl WindowSystem for MockWindowSystem {
    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    fn create_host(&mut self, spec: &HostWindowSpec) -> Result<WindowHandle> {
        self.record(WindowCall::CreateHost(*spec));
        self.allocate()
    }

    fn create_magnifier(&mut self, host: WindowHandle, lens_size: u32) -> Result<WindowHandle> {
        self.record(WindowCall::CreateMagnifier(host, lens_size));
        let fail = self.state.lock().map(|s| s.fail_magnifier).unwrap_or(false);
        if fail {
            return Err(anyhow!("magnifier window class unavailable"));
        }
        self.allocate()
    }

    fn set_shape(&mut self, host: WindowHandle, shape: LensShape, lens_size: u32) -> Result<()> {
        self.record(WindowCall::SetShape(host, shape, lens_size));
        Ok(())
    }

    fn reposition(
        &mut self,
        host: WindowHandle,
        _magnifier: WindowHandle,
        rect: PixelRect,
    ) -> Result<()> {
        self.record(WindowCall::Reposition(host, rect));
        Ok(())
    }

    fn set_dot(&mut self, host: WindowHandle, dot: DotOverlay) {
        self.record(WindowCall::SetDot(host, dot));
    }

    fn set_visible(&mut self, host: WindowHandle, visible: bool) {
        self.record(WindowCall::SetVisible(host, visible));
    }

    fn invalidate(&mut self, host: WindowHandle) {
        self.record(WindowCall::Invalidate(host));
    }

    fn is_foreground(&self, _host: WindowHandle) -> bool {
        self.state.lock().map(|s| s.foreground).unwrap_or(false)
    }

    fn pump_messages(&mut self) -> bool {
        self.state.lock().map(|s| !s.quit).unwrap_or(true)
    }

    fn destroy(&mut self, window: WindowHandle) {
        self.record(WindowCall::Destroy(window));
        if let Ok(mut state) = self.state.lock() {
            state.live.retain(|live| *live != window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_tracks_live_windows() {
        let mut windows = MockWindowSystem::new(ScreenSize {
            width: 1920,
            height: 1080,
        });
        let spec = HostWindowSpec {
            rect: PixelRect {
                left: 810,
                top: 390,
                width: 300,
                height: 300,
            },
            shape: LensShape::Circle,
            dot: DotOverlay::default(),
        };
        let host = windows.create_host(&spec).expect("host");
        let magnifier = windows.create_magnifier(host, 300).expect("magnifier");
        assert_eq!(windows.live_windows(), vec![host, magnifier]);

        windows.destroy(magnifier);
        windows.destroy(host);
        assert!(windows.live_windows().is_empty());
    }

    #[test]
    fn failed_magnifier_is_not_live() {
        let mut windows = MockWindowSystem::new(ScreenSize::default());
        windows.fail_magnifier();
        let spec = HostWindowSpec {
            rect: PixelRect::default(),
            shape: LensShape::Rectangle,
            dot: DotOverlay::default(),
        };
        let host = windows.create_host(&spec).expect("host");
        assert!(windows.create_magnifier(host, 300).is_err());
        assert_eq!(windows.live_windows(), vec![host]);
    }
}
