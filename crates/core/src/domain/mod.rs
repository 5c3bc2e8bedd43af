mod submission;
mod task;

pub use submission::*;
pub use task::*;
