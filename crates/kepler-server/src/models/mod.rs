//! Submission entities

pub mod item;
pub mod job;

pub use item::Item;
pub use job::{Job, JobStatus};
