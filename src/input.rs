use crate::keys::{Modifiers, VirtualKey};
use crate::settings::{InputBindings, WheelBinding, ZOOM_STEP};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    pub fn step(self) -> f32 {
        match self {
            ZoomDirection::In => ZOOM_STEP,
            ZoomDirection::Out => -ZOOM_STEP,
        }
    }
}

/// Discrete command produced from raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Toggle,
    Zoom(ZoomDirection),
    Exit,
}

/// Raw state of every monitored control at one polling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySample {
    pub toggle: bool,
    pub zoom_in: bool,
    pub zoom_out: bool,
    pub exit: bool,
    pub modifiers: Modifiers,
}

/// Turns continuous key samples into one event per press.
///
/// Edges are keyed on the primary key only. A zoom key pressed without its
/// modifiers will not fire later in the same hold when the modifiers arrive.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: KeySample,
}

fn rising(previous: bool, current: bool) -> bool {
    current && !previous
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.previous = KeySample::default();
    }

    /// Treat `sample` as already seen, so keys held in it need a fresh press.
    pub fn prime(&mut self, sample: KeySample) {
        self.previous = sample;
    }

    pub fn feed(
        &mut self,
        sample: KeySample,
        bindings: &InputBindings,
        overlay_foreground: bool,
    ) -> Vec<InputEvent> {
        let previous = std::mem::replace(&mut self.previous, sample);
        let mut events = Vec::new();

        if rising(previous.toggle, sample.toggle) {
            events.push(InputEvent::Toggle);
        }
        if let Some(hotkey) = bindings.zoom_in {
            if rising(previous.zoom_in, sample.zoom_in)
                && hotkey.modifiers.satisfied_by(sample.modifiers)
            {
                events.push(InputEvent::Zoom(ZoomDirection::In));
            }
        }
        if let Some(hotkey) = bindings.zoom_out {
            if rising(previous.zoom_out, sample.zoom_out)
                && hotkey.modifiers.satisfied_by(sample.modifiers)
            {
                events.push(InputEvent::Zoom(ZoomDirection::Out));
            }
        }
        // The lens must not swallow its own exit key while it has focus.
        if bindings.exit_key.is_some() && rising(previous.exit, sample.exit) && !overlay_foreground
        {
            events.push(InputEvent::Exit);
        }
        events
    }
}

/// Evaluate one wheel message against the wheel binding.
///
/// `held` must be sampled when the message arrives, not taken from a tick.
pub fn wheel_zoom(delta: i16, held: Modifiers, binding: &WheelBinding) -> Option<ZoomDirection> {
    if delta > 0 && binding.zoom_in.satisfied_by(held) {
        Some(ZoomDirection::In)
    } else if delta < 0 && binding.zoom_out.satisfied_by(held) {
        Some(ZoomDirection::Out)
    } else {
        None
    }
}

/// What the session knows about its own window when input is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputContext {
    pub overlay_foreground: bool,
}

/// Source of discrete input events for the run loop.
///
/// Poll-driven sources sample state on `collect`; hook-driven sources queue
/// events as they arrive and hand them over on `collect`.
pub trait InputSource: Send {
    fn start(&mut self, _bindings: &InputBindings) -> Result<()> {
        Ok(())
    }

    fn update_bindings(&mut self, _bindings: &InputBindings) {}

    fn collect(&mut self, bindings: &InputBindings, context: InputContext) -> Vec<InputEvent>;

    fn stop(&mut self) {}
}

pub trait KeySampler: Send {
    fn sample(&mut self, bindings: &InputBindings) -> KeySample;
}

/// Global key state via `GetAsyncKeyState`.
#[derive(Debug, Default)]
pub struct AsyncKeySampler;

#[cfg(windows)]
fn key_down(key: VirtualKey) -> bool {
    use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
    unsafe { GetAsyncKeyState(key.0 as i32) < 0 }
}

#[cfg(not(windows))]
fn key_down(_key: VirtualKey) -> bool {
    false
}

/// Current Ctrl/Shift/Alt state from the global input state.
pub fn modifiers_snapshot() -> Modifiers {
    Modifiers {
        ctrl: key_down(VirtualKey::CONTROL),
        shift: key_down(VirtualKey::SHIFT),
        alt: key_down(VirtualKey::MENU),
    }
}

impl KeySampler for AsyncKeySampler {
    fn sample(&mut self, bindings: &InputBindings) -> KeySample {
        KeySample {
            toggle: key_down(bindings.toggle_key),
            zoom_in: bindings.zoom_in.map(|h| key_down(h.key)).unwrap_or(false),
            zoom_out: bindings.zoom_out.map(|h| key_down(h.key)).unwrap_or(false),
            exit: bindings.exit_key.map(key_down).unwrap_or(false),
            modifiers: modifiers_snapshot(),
        }
    }
}

/// Replays queued samples, one per tick. Released keys once the queue is empty.
#[derive(Clone, Default)]
pub struct ScriptedKeys {
    frames: Arc<Mutex<VecDeque<KeySample>>>,
}

impl ScriptedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: KeySample) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push_back(sample);
        }
    }

    pub fn extend<I: IntoIterator<Item = KeySample>>(&self, samples: I) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.extend(samples);
        }
    }

    pub fn pending(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl KeySampler for ScriptedKeys {
    fn sample(&mut self, _bindings: &InputBindings) -> KeySample {
        self.frames
            .lock()
            .ok()
            .and_then(|mut frames| frames.pop_front())
            .unwrap_or_default()
    }
}

/// Poll-driven input: samples keys every tick and runs edge detection.
pub struct PolledKeys {
    sampler: Box<dyn KeySampler>,
    edges: EdgeDetector,
}

impl PolledKeys {
    pub fn new(sampler: Box<dyn KeySampler>) -> Self {
        Self {
            sampler,
            edges: EdgeDetector::new(),
        }
    }
}

impl Default for PolledKeys {
    fn default() -> Self {
        Self::new(Box::new(AsyncKeySampler))
    }
}

impl InputSource for PolledKeys {
    fn start(&mut self, _bindings: &InputBindings) -> Result<()> {
        self.edges.reset();
        Ok(())
    }

    fn update_bindings(&mut self, bindings: &InputBindings) {
        // Held state of the old keys says nothing about the new ones.
        let sample = self.sampler.sample(bindings);
        self.edges.prime(sample);
    }

    fn collect(&mut self, bindings: &InputBindings, context: InputContext) -> Vec<InputEvent> {
        let sample = self.sampler.sample(bindings);
        self.edges.feed(sample, bindings, context.overlay_foreground)
    }
}
