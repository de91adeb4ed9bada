pub mod pool;
pub mod scanner;
pub mod task;

pub use pool::{SubmitRejected, WorkerPool};
pub use scanner::{DirectoryScanner, StabilityTracker};
pub use task::{DocumentTask, TaskOutcome};
