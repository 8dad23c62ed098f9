use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use crate::users::repo_types::{UnknownRole, User, UserRole, UserRoleRow};
use crate::users::schema::Constraint;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{} already taken ({constraint})", .constraint.field())]
    Conflict { constraint: Constraint },

    #[error("stored role does not resolve: {0}")]
    UnknownRole(#[from] UnknownRole),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if let Some(constraint) = db.constraint().and_then(Constraint::from_name) {
                warn!(%constraint, "constraint violation");
                return Self::Conflict { constraint };
            }
        }
        Self::Database(e)
    }
}

/// Data-access boundary for users and their role assignments.
///
/// The password column is never written through this trait; it belongs to
/// the password reset workflow.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn find_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError>;
    async fn find_by_name(&self, user_name: &str) -> Result<Option<User>, StoreError>;
    /// Inserts the user and its roles; returns the stored user with ids set.
    async fn insert(&self, user: &User) -> Result<User, StoreError>;
    /// Inserts all users, in order, or none of them.
    async fn insert_many(&self, users: &[User]) -> Result<Vec<User>, StoreError>;
    /// Updates the user row and replaces its roles. `None` if it does not exist.
    async fn update(&self, user: &User) -> Result<Option<User>, StoreError>;
    /// Deletes the user; role rows go with it.
    async fn delete(&self, user_id: i32) -> Result<bool, StoreError>;
}

/// Distribute role rows onto their owning users, keeping row order.
pub(crate) fn attach_roles(users: &mut [User], rows: Vec<UserRoleRow>) -> Result<(), UnknownRole> {
    let mut by_user: HashMap<i32, Vec<UserRole>> = HashMap::new();
    for row in rows {
        let role = UserRole::try_from(row)?;
        by_user.entry(role.user_id).or_default().push(role);
    }
    for u in users.iter_mut() {
        u.user_roles = by_user.remove(&u.user_id).unwrap_or_default();
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn load_one(&self, user: Option<User>) -> Result<Option<User>, StoreError> {
        let Some(user) = user else {
            return Ok(None);
        };
        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT user_role_id, user_id, role
            FROM webapp.user_roles
            WHERE user_id = $1
            ORDER BY user_role_id
            "#,
        )
        .bind(user.user_id)
        .fetch_all(&self.db)
        .await?;

        let mut users = [user];
        attach_roles(&mut users, rows)?;
        let [user] = users;
        Ok(Some(user))
    }
}

async fn insert_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    user: &User,
) -> Result<User, StoreError> {
    let mut stored = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO webapp.users (user_name, email, enabled)
        VALUES ($1, $2, $3)
        RETURNING user_id, user_name, password, email, enabled
        "#,
    )
    .bind(&user.user_name)
    .bind(&user.email)
    .bind(user.enabled)
    .fetch_one(&mut **tx)
    .await?;

    stored.user_roles = insert_roles_tx(tx, stored.user_id, &user.user_roles).await?;
    Ok(stored)
}

async fn insert_roles_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i32,
    roles: &[UserRole],
) -> Result<Vec<UserRole>, StoreError> {
    let mut stored = Vec::with_capacity(roles.len());
    for r in roles {
        let row = sqlx::query_as::<_, UserRoleRow>(
            r#"
            INSERT INTO webapp.user_roles (user_id, role)
            VALUES ($1, $2)
            RETURNING user_role_id, user_id, role
            "#,
        )
        .bind(user_id)
        .bind(r.role.as_str())
        .fetch_one(&mut **tx)
        .await?;
        stored.push(UserRole::try_from(row)?);
    }
    Ok(stored)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, user_name, password, email, enabled
            FROM webapp.users
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT user_role_id, user_id, role
            FROM webapp.user_roles
            ORDER BY user_role_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        attach_roles(&mut users, rows)?;
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    async fn find_by_id(&self, user_id: i32) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, user_name, password, email, enabled
            FROM webapp.users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        self.load_one(user).await
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, user_name, password, email, enabled
            FROM webapp.users
            WHERE user_name = $1
            "#,
        )
        .bind(user_name)
        .fetch_optional(&self.db)
        .await?;
        self.load_one(user).await
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;
        let stored = insert_user_tx(&mut tx, user).await?;
        tx.commit().await?;

        debug!(user_id = stored.user_id, user_name = %stored.user_name, "user inserted");
        Ok(stored)
    }

    async fn insert_many(&self, users: &[User]) -> Result<Vec<User>, StoreError> {
        // dropping `tx` on an early return rolls the whole batch back
        let mut tx = self.db.begin().await?;
        let mut stored = Vec::with_capacity(users.len());
        for u in users {
            stored.push(insert_user_tx(&mut tx, u).await?);
        }
        tx.commit().await?;

        debug!(count = stored.len(), "users inserted");
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<Option<User>, StoreError> {
        let mut tx = self.db.begin().await?;

        let stored = sqlx::query_as::<_, User>(
            r#"
            UPDATE webapp.users
            SET user_name = $2, email = $3, enabled = $4
            WHERE user_id = $1
            RETURNING user_id, user_name, password, email, enabled
            "#,
        )
        .bind(user.user_id)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(user.enabled)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut stored) = stored else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM webapp.user_roles WHERE user_id = $1")
            .bind(stored.user_id)
            .execute(&mut *tx)
            .await?;
        stored.user_roles = insert_roles_tx(&mut tx, stored.user_id, &user.user_roles).await?;
        tx.commit().await?;

        debug!(user_id = stored.user_id, roles = stored.user_roles.len(), "user updated");
        Ok(Some(stored))
    }

    async fn delete(&self, user_id: i32) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM webapp.users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        let deleted = res.rows_affected() > 0;
        debug!(user_id, deleted, "user delete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::RoleType;

    fn row(user_role_id: i32, user_id: i32, role: &str) -> UserRoleRow {
        UserRoleRow {
            user_role_id,
            user_id,
            role: role.into(),
        }
    }

    #[test]
    fn attach_roles_groups_by_owner() {
        let mut a = User::new("a", "a@x.com", true);
        a.user_id = 1;
        let mut b = User::new("b", "b@x.com", true);
        b.user_id = 2;
        let mut c = User::new("c", "c@x.com", true);
        c.user_id = 3;
        let mut users = vec![a, b, c];

        attach_roles(
            &mut users,
            vec![row(1, 1, "USER"), row(2, 2, "ADMIN"), row(3, 1, "ADMIN")],
        )
        .unwrap();

        let roles: Vec<_> = users[0].user_roles.iter().map(|r| r.role).collect();
        assert_eq!(roles, [RoleType::User, RoleType::Admin]);
        assert_eq!(users[1].user_roles[0].user_id, 2);
        assert!(users[2].user_roles.is_empty());
    }

    #[test]
    fn attach_roles_rejects_unknown_name() {
        let mut users = vec![User::default()];
        let err = attach_roles(&mut users, vec![row(1, 0, "SUPERUSER")]).unwrap_err();
        assert_eq!(err, UnknownRole("SUPERUSER".into()));
    }

    #[test]
    fn conflict_message_names_field() {
        let err = StoreError::Conflict {
            constraint: Constraint::EmailUnique,
        };
        assert_eq!(err.to_string(), "email already taken (email_uc)");
    }

    #[test]
    fn non_database_errors_pass_through() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    fn user(name: &str, roles: &[RoleType]) -> User {
        let mut u = User::new(name, &format!("{name}@x.com"), true);
        for r in roles {
            u.add_role(*r);
        }
        u
    }

    async fn role_rows(pool: &PgPool, user_id: i32) -> i64 {
        sqlx::query_scalar("SELECT count(*) FROM webapp.user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn pg_update_replaces_roles(pool: PgPool) {
        let store = PgUserStore::new(pool.clone());
        let created = store
            .insert(&user("alice", &[RoleType::User]))
            .await
            .unwrap();
        assert_eq!(created.user_roles[0].user_id, created.user_id);

        let mut changed = created.clone();
        changed.enabled = false;
        changed.set_user_roles(vec![UserRole::new(0, RoleType::Admin)]);
        let updated = store.update(&changed).await.unwrap().unwrap();

        assert!(!updated.enabled);
        assert!(updated.has_role(RoleType::Admin));
        assert!(!updated.has_role(RoleType::User));
        assert_eq!(role_rows(&pool, created.user_id).await, 1);

        let found = store.find_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found, updated);

        let mut missing = changed;
        missing.user_id = created.user_id + 100;
        assert!(store.update(&missing).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn pg_delete_cascades_to_roles(pool: PgPool) {
        let store = PgUserStore::new(pool.clone());
        let created = store
            .insert(&user("bob", &[RoleType::User, RoleType::Admin]))
            .await
            .unwrap();
        assert_eq!(role_rows(&pool, created.user_id).await, 2);

        assert!(store.delete(created.user_id).await.unwrap());
        assert_eq!(role_rows(&pool, created.user_id).await, 0);
        assert!(store.find_by_id(created.user_id).await.unwrap().is_none());
        assert!(!store.delete(created.user_id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn pg_insert_many_rolls_back_on_conflict(pool: PgPool) {
        let store = PgUserStore::new(pool);
        let mut dup = user("one", &[]);
        dup.email = "two@x.com".into();

        let err = store
            .insert_many(&[user("one", &[RoleType::User]), dup])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                constraint: Constraint::UserNameUnique | Constraint::UserNameIndex
            }
        ));
        assert!(store.list().await.unwrap().is_empty());

        let stored = store
            .insert_many(&[user("one", &[RoleType::User]), user("two", &[])])
            .await
            .unwrap();
        let names: Vec<_> = stored.iter().map(|u| u.user_name.as_str()).collect();
        assert_eq!(names, ["one", "two"]);
        assert_eq!(stored[0].user_roles[0].user_id, stored[0].user_id);
    }
}
