pub mod callback;
pub mod manager;
pub mod registry;
pub mod types;

pub use callback::{EventCallback, FunctionCallback, HttpCallback, TaskCallback};
pub use manager::TaskManager;
pub use registry::{KillReason, ProcessControl, TaskHandle, TaskRegistry};
pub use types::{ProgressEvent, TaskEvent, TaskInfo};
