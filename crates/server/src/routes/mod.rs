mod health;
mod requests;
pub mod sse;
mod tasks;

pub use health::*;
pub use requests::*;
pub use tasks::*;
