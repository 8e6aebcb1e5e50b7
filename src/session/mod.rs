//! Session: shared state, inbound dispatch, outbound publishing and the
//! main-thread controller that ties them together

pub mod controller;
pub mod dispatcher;
pub mod liveness;
pub mod publisher;
pub mod state;

pub use controller::{Controller, Tick};
pub use dispatcher::Dispatcher;
pub use liveness::{Liveness, LivenessTracker};
pub use publisher::Publisher;
pub use state::{RenderSnapshot, Session};
