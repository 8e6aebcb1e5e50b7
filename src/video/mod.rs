//! Video subsystem: frames, capture, compositing and presentation

pub mod background;
pub mod capture;
pub mod compositor;
pub mod display;
pub mod frame;

pub use background::load_background;
pub use capture::{SystemVideoDevice, VideoDevice, VideoSource};
pub use compositor::{compose, Compositor, Layout, Overlays};
pub use display::{Display, Key, TerminalDisplay};
pub use frame::Frame;
