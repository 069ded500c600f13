pub mod error;
pub mod pool;
pub mod repos;

// Re-export commonly used items
pub use error::DuplicateKey;
pub use pool::{create_pool, create_pool_with, run_migrations};
pub use repos::session::{CreatedSession, NewSession, SessionRepo, SessionRow};
pub use repos::user::{UserRepo, UserRow};
