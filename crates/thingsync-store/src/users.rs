use std::collections::HashMap;

use parking_lot::RwLock;
use thingsync_core::{User, UserId};

/// Anonymous users behind sessions. Ids start at 1; 0 means "no user".
#[derive(Default)]
pub struct UserRegistry {
    inner: RwLock<Users>,
}

#[derive(Default)]
struct Users {
    by_id: HashMap<UserId, User>,
    last_id: UserId,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new nameless user.
    pub fn create_anonymous(&self) -> User {
        self.create(String::new())
    }

    pub fn create(&self, name: impl Into<String>) -> User {
        let mut users = self.inner.write();
        users.last_id += 1;
        let user = User::new(users.last_id, name);
        let _ = users.by_id.insert(user.id, user.clone());
        user
    }

    /// Unknown ids yield the zero user.
    pub fn get(&self, id: UserId) -> User {
        self.inner
            .read()
            .by_id
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one() {
        let users = UserRegistry::new();
        assert_eq!(users.create_anonymous().id, 1);
        assert_eq!(users.create("ada").id, 2);
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn get_returns_stored_user() {
        let users = UserRegistry::new();
        let ada = users.create("ada");
        assert_eq!(users.get(ada.id), ada);
    }

    #[test]
    fn unknown_id_is_zero_user() {
        let users = UserRegistry::new();
        assert!(!users.get(5).exists());
        assert!(users.is_empty());
    }
}
