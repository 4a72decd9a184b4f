//! Repository layer for data access

pub mod jobs;

// Re-export concrete repository implementations with simple names
pub use jobs::DbJobRepository;
pub use jobs::MemoryJobRepository;

// Re-export repository traits
pub use jobs::JobRepository;
