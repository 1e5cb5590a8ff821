pub mod connection;
pub mod pool_ext;
pub mod repositories;

pub use connection::{create_pool, run_migrations, verify_connection};
pub use repositories::*;
