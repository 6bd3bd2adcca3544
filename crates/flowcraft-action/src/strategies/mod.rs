//! The six built-in node strategies (`spec.md` §4.4 step 3).

mod batch;
mod function;
mod loop_strategy;
mod parallel_container;
mod subflow;
mod wait;

pub use batch::BatchStrategy;
pub use function::FunctionStrategy;
pub use loop_strategy::LoopStrategy;
pub use parallel_container::ParallelContainerStrategy;
pub use subflow::SubflowStrategy;
pub use wait::WaitStrategy;
