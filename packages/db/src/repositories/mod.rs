//! Repository implementations for database operations.

mod job_repo;
mod network_repo;
mod provider_repo;

pub use job_repo::JobRepository;
pub use network_repo::NetworkRepository;
pub use provider_repo::{MembershipRepository, ProviderRepository};
