pub mod assistant;
pub mod backup;
pub mod conversations;
pub mod core;
pub mod feedback;
