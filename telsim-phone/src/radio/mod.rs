//! Radio message routing

pub mod task;

pub use task::RadioTask;
