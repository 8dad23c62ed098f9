use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{User, UserRole};
use crate::users::schema::Constraint;

/// In-process store with the same constraints as the `webapp` schema.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Default, Clone)]
struct Inner {
    users: BTreeMap<i32, User>,
    last_user_id: i32,
    last_user_role_id: i32,
}

impl Inner {
    fn check_unique(&self, user: &User, skip_id: Option<i32>) -> Result<(), StoreError> {
        for other in self.users.values() {
            if Some(other.user_id) == skip_id {
                continue;
            }
            if other.user_name == user.user_name {
                return Err(StoreError::Conflict {
                    constraint: Constraint::UserNameUnique,
                });
            }
            if other.email == user.email {
                return Err(StoreError::Conflict {
                    constraint: Constraint::EmailUnique,
                });
            }
        }
        Ok(())
    }

    fn store_roles(&mut self, user_id: i32, roles: &[UserRole]) -> Result<Vec<UserRole>, StoreError> {
        let mut stored: Vec<UserRole> = Vec::with_capacity(roles.len());
        for r in roles {
            if stored.iter().any(|s| s.role == r.role) {
                return Err(StoreError::Conflict {
                    constraint: Constraint::UserRoleUnique,
                });
            }
            self.last_user_role_id += 1;
            stored.push(UserRole {
                user_role_id: self.last_user_role_id,
                user_id,
                role: r.role,
            });
        }
        Ok(stored)
    }

    fn insert_one(&mut self, user: &User) -> Result<User, StoreError> {
        self.check_unique(user, None)?;

        let user_id = self.last_user_id + 1;
        let user_roles = self.store_roles(user_id, &user.user_roles)?;
        self.last_user_id = user_id;

        let stored = User {
            user_id,
            user_name: user.user_name.clone(),
            password: None,
            email: user.email.clone(),
            enabled: user.enabled,
            user_roles,
        };
        self.users.insert(user_id, stored.clone());
        Ok(stored)
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the reset workflow, which writes the password column directly.
    #[cfg(test)]
    pub async fn set_password(&self, user_id: i32, password: Option<String>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&user_id) {
            Some(u) => {
                u.password = password;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().cloned().collect())
    }

    async fn find_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.user_name == user_name)
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.insert_one(user)?;
        debug!(user_id = stored.user_id, user_name = %stored.user_name, "user inserted");
        Ok(stored)
    }

    async fn insert_many(&self, users: &[User]) -> Result<Vec<User>, StoreError> {
        let mut inner = self.inner.write().await;
        // work on a copy so a failure leaves the store untouched
        let mut scratch = inner.clone();
        let stored = users
            .iter()
            .map(|u| scratch.insert_one(u))
            .collect::<Result<Vec<_>, _>>()?;
        *inner = scratch;
        debug!(count = stored.len(), "users inserted");
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(password) = inner.users.get(&user.user_id).map(|u| u.password.clone()) else {
            return Ok(None);
        };
        inner.check_unique(user, Some(user.user_id))?;
        let user_roles = inner.store_roles(user.user_id, &user.user_roles)?;

        let stored = User {
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            password,
            email: user.email.clone(),
            enabled: user.enabled,
            user_roles,
        };
        inner.users.insert(user.user_id, stored.clone());
        debug!(user_id = user.user_id, roles = stored.user_roles.len(), "user updated");
        Ok(Some(stored))
    }

    async fn delete(&self, user_id: i32) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let deleted = inner.users.remove(&user_id).is_some();
        debug!(user_id, deleted, "user delete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::RoleType;

    fn user(name: &str, roles: &[RoleType]) -> User {
        let mut u = User::new(name, format!("{}@example.com", name), true);
        for r in roles {
            u.add_role(*r);
        }
        u
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_links_roles() {
        let store = MemoryUserStore::new();
        let stored = store
            .insert(&user("alice", &[RoleType::User, RoleType::Admin]))
            .await
            .unwrap();
        assert_eq!(stored.user_id, 1);
        assert_eq!(stored.user_roles.len(), 2);
        assert!(stored.user_roles.iter().all(|r| r.user_id == 1 && r.user_role_id > 0));

        let found = store.find_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found, stored);
    }

    #[tokio::test]
    async fn insert_never_writes_password() {
        let store = MemoryUserStore::new();
        let mut u = user("bob", &[]);
        u.password = Some("hash".into());
        let stored = store.insert(&u).await.unwrap();
        assert_eq!(stored.password, None);
    }

    #[tokio::test]
    async fn unique_user_name_and_email() {
        let store = MemoryUserStore::new();
        store.insert(&user("carol", &[])).await.unwrap();

        let err = store.insert(&user("carol", &[])).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { constraint: Constraint::UserNameUnique }
        ));

        let mut other = user("carla", &[]);
        other.email = "carol@example.com".into();
        let err = store.insert(&other).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { constraint: Constraint::EmailUnique }
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_roles_and_keeps_password() {
        let store = MemoryUserStore::new();
        let stored = store.insert(&user("dave", &[RoleType::User])).await.unwrap();
        assert!(store.set_password(stored.user_id, Some("hash".into())).await);

        let mut changed = stored.clone();
        changed.enabled = false;
        changed.password = Some("overwritten".into());
        changed.set_user_roles(vec![UserRole::new(0, RoleType::Admin)]);
        let updated = store.update(&changed).await.unwrap().unwrap();

        assert!(!updated.enabled);
        assert_eq!(updated.password.as_deref(), Some("hash"));
        assert_eq!(updated.user_roles.len(), 1);
        assert_eq!(updated.user_roles[0].role, RoleType::Admin);
        assert_eq!(updated.user_roles[0].user_id, stored.user_id);
    }

    #[tokio::test]
    async fn update_missing_user_is_none() {
        let store = MemoryUserStore::new();
        let mut ghost = user("ghost", &[]);
        ghost.user_id = 99;
        assert_eq!(store.update(&ghost).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_role_rejected() {
        let store = MemoryUserStore::new();
        let err = store
            .insert(&user("erin", &[RoleType::User, RoleType::User]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { constraint: Constraint::UserRoleUnique }
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_user_and_roles() {
        let store = MemoryUserStore::new();
        let stored = store.insert(&user("frank", &[RoleType::Admin])).await.unwrap();
        assert!(store.delete(stored.user_id).await.unwrap());
        assert!(!store.delete(stored.user_id).await.unwrap());
        assert_eq!(store.find_by_id(stored.user_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryUserStore::new();
        store.insert(&user("kept", &[])).await.unwrap();

        let mut dup = user("one", &[]);
        dup.email = "two@example.com".into();
        let err = store
            .insert_many(&[user("one", &[RoleType::User]), dup])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { constraint: Constraint::UserNameUnique }
        ));
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user_name)
            .collect();
        assert_eq!(names, ["kept"]);

        let stored = store
            .insert_many(&[user("one", &[RoleType::User]), user("two", &[])])
            .await
            .unwrap();
        let ids: Vec<_> = stored.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, [2, 3]);
        assert_eq!(stored[0].user_roles[0].user_id, 2);
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let store = MemoryUserStore::new();
        for name in ["u1", "u2", "u3"] {
            store.insert(&user(name, &[])).await.unwrap();
        }
        let ids: Vec<_> = store.list().await.unwrap().iter().map(|u| u.user_id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }
}
