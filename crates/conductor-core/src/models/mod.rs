pub mod agent;
pub mod context;
pub mod execution;

pub use agent::*;
pub use context::*;
pub use execution::*;
