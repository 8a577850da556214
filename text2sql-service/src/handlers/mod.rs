pub mod inference;
pub mod prometheus;
