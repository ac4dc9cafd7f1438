//! Domain model: identifiers, queue lanes, and the job record.

mod ids;
mod job;
mod lane;

pub use ids::JobId;
pub use job::{JobRecord, JobStatus};
pub use lane::Lane;
