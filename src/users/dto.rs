use serde::Deserialize;

use crate::users::repo_types::{RoleType, UnknownRole, User, UserRole};

/// Incoming user object. Missing or null fields fall back to empty values;
/// validation is left to the caller.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserPayload {
    #[serde(rename = "mUserId")]
    pub user_id: Option<i32>,
    #[serde(rename = "mUserName")]
    pub user_name: Option<String>,
    #[serde(rename = "mPassword")]
    pub password: Option<String>,
    #[serde(rename = "password")]
    pub plain_password: Option<String>,
    #[serde(rename = "mEmail")]
    pub email: Option<String>,
    #[serde(rename = "mEnabled")]
    pub enabled: Option<bool>,
    #[serde(rename = "mUserRoles")]
    pub user_roles: Option<Vec<UserRolePayload>>,
}

/// Incoming role entry. Clients name the role with `Role`; encoder output
/// carries `mRole`. Either or both may be present, `Role` wins.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserRolePayload {
    #[serde(rename = "Role")]
    pub role: Option<String>,
    #[serde(rename = "mRole")]
    pub m_role: Option<String>,
    #[serde(rename = "mUserRoleId")]
    pub user_role_id: Option<i32>,
}

/// Why a decoded role entry could not become a [`UserRole`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleEntryError {
    #[error(transparent)]
    Unknown(#[from] UnknownRole),

    #[error("role entry {position} has neither `Role` nor `mRole`")]
    Missing { position: usize },
}

impl UserRolePayload {
    fn role_name(&self) -> Option<&str> {
        self.role.as_deref().or(self.m_role.as_deref())
    }
}

impl TryFrom<UserPayload> for User {
    type Error = RoleEntryError;

    fn try_from(p: UserPayload) -> Result<Self, Self::Error> {
        let user_id = p.user_id.unwrap_or_default();
        let user_roles = p
            .user_roles
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(position, r)| {
                let name = r.role_name().ok_or(RoleEntryError::Missing { position })?;
                Ok(UserRole {
                    user_role_id: r.user_role_id.unwrap_or_default(),
                    user_id,
                    role: RoleType::from_name(name)?,
                })
            })
            .collect::<Result<Vec<_>, RoleEntryError>>()?;

        let mut user = User {
            user_id,
            user_name: p.user_name.unwrap_or_default(),
            password: p.password.or(p.plain_password),
            email: p.email.unwrap_or_default(),
            enabled: p.enabled.unwrap_or_default(),
            user_roles: Vec::new(),
        };
        user.set_user_roles(user_roles);
        Ok(user)
    }
}
