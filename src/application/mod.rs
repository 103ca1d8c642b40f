pub mod task_runner;

pub use task_runner::{LoopCollaborators, LoopStage, TaskRunner};
