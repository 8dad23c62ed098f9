//! Relational mapping of the user entity.
//!
//! Table, column and constraint names live here so the store, the validator
//! and constraint-error reporting agree with `migrations/`.

/// Columns of `webapp.users`.
pub mod users {
    pub const USER_NAME: &str = "user_name";
    pub const PASSWORD: &str = "password";
    pub const EMAIL: &str = "email";
}

/// Columns of `webapp.user_roles`.
pub mod user_roles {
    pub const USER_ID: &str = "user_id";
    pub const ROLE: &str = "role";
}

pub const USER_NAME_MAX: usize = 32;
pub const PASSWORD_MAX: usize = 32;
pub const EMAIL_MAX: usize = 64;

/// Named constraints and unique indexes of the user tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `user_name_uc`: unique user_name.
    UserNameUnique,
    /// `email_uc`: unique email.
    EmailUnique,
    /// `user_pwd_en_idx`: unique (user_name, password, enabled).
    UserPasswordEnabledIndex,
    /// `user_idx`: unique user_name.
    UserNameIndex,
    /// `user_roles_user_fk`: role row must reference an existing user.
    UserRoleOwner,
    /// `user_roles_user_role_uc`: a role is assigned at most once per user.
    UserRoleUnique,
}

impl Constraint {
    pub const ALL: [Constraint; 6] = [
        Constraint::UserNameUnique,
        Constraint::EmailUnique,
        Constraint::UserPasswordEnabledIndex,
        Constraint::UserNameIndex,
        Constraint::UserRoleOwner,
        Constraint::UserRoleUnique,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserNameUnique => "user_name_uc",
            Self::EmailUnique => "email_uc",
            Self::UserPasswordEnabledIndex => "user_pwd_en_idx",
            Self::UserNameIndex => "user_idx",
            Self::UserRoleOwner => "user_roles_user_fk",
            Self::UserRoleUnique => "user_roles_user_role_uc",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Column the constraint reports on, used in conflict messages.
    pub fn field(&self) -> &'static str {
        match self {
            Self::UserNameUnique | Self::UserPasswordEnabledIndex | Self::UserNameIndex => {
                users::USER_NAME
            }
            Self::EmailUnique => users::EMAIL,
            Self::UserRoleOwner => user_roles::USER_ID,
            Self::UserRoleUnique => user_roles::ROLE,
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
