pub mod capacity;
pub mod plan;
pub mod profiles;
pub mod sizing;
