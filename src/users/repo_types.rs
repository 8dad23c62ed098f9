use serde::Serialize;
use sqlx::FromRow;

/// Role identifier assigned to a user, stored and exchanged by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleType {
    Admin,
    User,
}

/// A role name that does not match any [`RoleType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role type `{0}`")]
pub struct UnknownRole(pub String);

impl RoleType {
    pub const ALL: [RoleType; 2] = [RoleType::Admin, RoleType::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }

    /// Exact, case-sensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Result<Self, UnknownRole> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == name)
            .ok_or_else(|| UnknownRole(name.to_string()))
    }
}

impl std::str::FromStr for RoleType {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment of a role to its owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRole {
    #[serde(rename = "mUserRoleId")]
    pub user_role_id: i32,
    #[serde(skip_serializing)]
    pub user_id: i32, // owning user, lookup only
    #[serde(rename = "mRole")]
    pub role: RoleType,
}

impl UserRole {
    pub fn new(user_id: i32, role: RoleType) -> Self {
        Self {
            user_role_id: 0,
            user_id,
            role,
        }
    }
}

/// Account row of `webapp.users` together with its role assignments.
#[derive(Clone, PartialEq, Eq, Default, Serialize, FromRow)]
pub struct User {
    #[serde(rename = "mUserId")]
    pub user_id: i32, // 0 until persisted
    #[serde(rename = "mUserName")]
    pub user_name: String,
    #[serde(skip_serializing)]
    pub password: Option<String>, // hash, managed by the reset workflow only
    #[serde(rename = "mEmail")]
    pub email: String,
    #[serde(rename = "mEnabled")]
    pub enabled: bool,
    #[serde(rename = "mUserRoles")]
    #[sqlx(skip)]
    pub user_roles: Vec<UserRole>,
}

impl User {
    pub fn new(user_name: impl Into<String>, email: impl Into<String>, enabled: bool) -> Self {
        Self {
            user_name: user_name.into(),
            email: email.into(),
            enabled,
            ..Self::default()
        }
    }

    /// Replace the role collection, linking every entry back to this user.
    pub fn set_user_roles(&mut self, roles: Vec<UserRole>) {
        self.user_roles = roles;
        self.relink_roles();
    }

    pub fn add_role(&mut self, role: RoleType) {
        self.user_roles.push(UserRole::new(self.user_id, role));
    }

    pub fn has_role(&self, role: RoleType) -> bool {
        self.user_roles.iter().any(|r| r.role == role)
    }

    pub(crate) fn relink_roles(&mut self) {
        let user_id = self.user_id;
        for r in &mut self.user_roles {
            r.user_id = user_id;
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("email", &self.email)
            .field("enabled", &self.enabled)
            .field("user_roles", &self.user_roles)
            .finish_non_exhaustive()
    }
}

/// Row of `webapp.user_roles` before the role name is resolved.
#[derive(Debug, Clone, FromRow)]
pub struct UserRoleRow {
    pub user_role_id: i32,
    pub user_id: i32,
    pub role: String,
}

impl TryFrom<UserRoleRow> for UserRole {
    type Error = UnknownRole;

    fn try_from(r: UserRoleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_role_id: r.user_role_id,
            user_id: r.user_id,
            role: RoleType::from_name(&r.role)?,
        })
    }
}
