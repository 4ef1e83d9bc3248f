//! Repository identity and URL handling.

pub mod identity;
pub mod remote_url;

pub use identity::RepositoryIdentity;
