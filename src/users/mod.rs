#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod store;

pub use repo::{PgUserRepo, UserRepo};
pub use repo_types::{NewUser, Role, User};
pub use store::CredentialStore;
