// Data-layer ports and adapters
pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::{FailPoint, InMemoryRepository};
pub use postgres::PgRepository;
pub use repository::{
    MatchRepository, MatchTransaction, ProfileRepository, RepositoryError, RepositoryResult,
};
