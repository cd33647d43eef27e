pub mod coordinator;
pub mod session;

pub use coordinator::{LifecycleCoordinator, LifecycleSender, lifecycle_channel};
pub use session::{LifecycleMessage, SessionState};
