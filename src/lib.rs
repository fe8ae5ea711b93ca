pub mod controller;
pub mod ffi;
pub mod hook;
pub mod input;
pub mod keys;
pub mod logging;
pub mod magnifier;
pub mod session;
pub mod settings;
pub mod transform;
pub mod window;

pub use controller::{runtime, LifecycleController, StartOutcome};
pub use settings::LensSettings;
