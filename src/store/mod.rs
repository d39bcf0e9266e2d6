//! External collaborators: accounts and quest progress

pub mod quests;
pub mod users;

pub use quests::{InMemoryQuestTracker, QuestEvent, QuestTracker};
pub use users::{Equipment, InMemoryUserRepository, User, UserRepository};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("User '{0}' not found")]
    UserNotFound(String),
    #[error("User '{0}' already exists")]
    UserExists(String),
    #[error("Invalid username '{0}'")]
    InvalidUsername(String),
    #[error("Invalid credentials for '{0}'")]
    InvalidCredentials(String),
}
