pub mod mastery;
pub mod plan;
