//! Account store consumed by the battle server

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

use super::StoreError;

/// Equipped garage items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub hull: String,
    pub weapon: String,
    pub paint: String,
}

impl Default for Equipment {
    fn default() -> Self {
        Self {
            hull: "hunter_m0".to_string(),
            weapon: "railgun_m0".to_string(),
            paint: "green_m0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub rank: u8,
    pub score: u32,
    pub crystals: i64,
    pub equipment: Equipment,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            rank: 1,
            score: 0,
            crystals: 0,
            equipment: Equipment::default(),
        }
    }
}

/// Lookup/create/adjust interface for user accounts
pub trait UserRepository: Send + Sync + Debug {
    fn find(&self, username: &str) -> Option<User>;

    fn create(&self, username: &str, password: &str) -> Result<User, StoreError>;

    /// Add `delta` crystals, returning the new balance
    fn adjust_crystals(&self, username: &str, delta: i64) -> Result<i64, StoreError>;

    /// Add `delta` score, returning the new score
    fn adjust_score(&self, username: &str, delta: i64) -> Result<u32, StoreError>;

    fn set_equipment(&self, username: &str, equipment: Equipment) -> Result<(), StoreError>;

    /// Existing account with a matching password, or a freshly created one
    fn authenticate(&self, username: &str, password: &str) -> Result<User, StoreError> {
        match self.find(username) {
            Some(user) if user.password == password => Ok(user),
            Some(_) => Err(StoreError::InvalidCredentials(username.to_string())),
            None => self.create(username, password),
        }
    }
}

/// Process-local account store
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find(&self, username: &str) -> Option<User> {
        self.users.read().get(username).cloned()
    }

    fn create(&self, username: &str, password: &str) -> Result<User, StoreError> {
        if username.is_empty() || username.contains(';') {
            return Err(StoreError::InvalidUsername(username.to_string()));
        }
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(StoreError::UserExists(username.to_string()));
        }
        let user = User::new(username, password);
        users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    fn adjust_crystals(&self, username: &str, delta: i64) -> Result<i64, StoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;
        user.crystals = user.crystals.saturating_add(delta).max(0);
        Ok(user.crystals)
    }

    fn adjust_score(&self, username: &str, delta: i64) -> Result<u32, StoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;
        user.score = (user.score as i64 + delta).clamp(0, u32::MAX as i64) as u32;
        Ok(user.score)
    }

    fn set_equipment(&self, username: &str, equipment: Equipment) -> Result<(), StoreError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;
        user.equipment = equipment;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_creates_then_checks_password() {
        let repo = InMemoryUserRepository::new();
        let user = repo.authenticate("alice", "secret").unwrap();
        assert_eq!(user.rank, 1);
        assert_eq!(repo.len(), 1);

        assert!(repo.authenticate("alice", "secret").is_ok());
        assert!(matches!(
            repo.authenticate("alice", "wrong"),
            Err(StoreError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_names() {
        let repo = InMemoryUserRepository::new();
        repo.create("bob", "x").unwrap();
        assert!(matches!(repo.create("bob", "y"), Err(StoreError::UserExists(_))));
        assert!(matches!(repo.create("a;b", "y"), Err(StoreError::InvalidUsername(_))));
        assert!(matches!(repo.create("", "y"), Err(StoreError::InvalidUsername(_))));
    }

    #[test]
    fn test_adjust_balances() {
        let repo = InMemoryUserRepository::new();
        repo.create("carol", "x").unwrap();
        assert_eq!(repo.adjust_crystals("carol", 1000).unwrap(), 1000);
        assert_eq!(repo.adjust_crystals("carol", -5000).unwrap(), 0);
        assert_eq!(repo.adjust_score("carol", 10).unwrap(), 10);
        assert!(matches!(
            repo.adjust_score("nobody", 1),
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_set_equipment() {
        let repo = InMemoryUserRepository::new();
        repo.create("dave", "x").unwrap();
        let equipment = Equipment {
            weapon: "isida_m0".to_string(),
            ..Equipment::default()
        };
        repo.set_equipment("dave", equipment.clone()).unwrap();
        assert_eq!(repo.find("dave").unwrap().equipment, equipment);
    }
}
