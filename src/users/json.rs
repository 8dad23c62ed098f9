//! JSON contract of the user entity.
//!
//! Encoding goes through the entity's `Serialize` impl, which never emits the
//! password. Decoding parses the whole nested document into [`UserPayload`]
//! in one pass and then resolves role names, so an unknown role fails the
//! decode instead of being dropped.

use tracing::{debug, warn};

use crate::users::dto::{RoleEntryError, UserPayload};
use crate::users::repo_types::{UnknownRole, User};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Not JSON, or JSON of the wrong shape.
    #[error("invalid user json: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("unknown role type `{name}`")]
    UnknownRole { name: String },

    #[error("user at index {index}: unknown role type `{name}`")]
    UnknownRoleAt { index: usize, name: String },

    #[error("role entry {position} has no role name")]
    MissingRole { position: usize },

    #[error("user at index {index}: role entry {position} has no role name")]
    MissingRoleAt { index: usize, position: usize },

    #[error("failed to encode user: {0}")]
    Encode(#[source] serde_json::Error),
}

impl From<RoleEntryError> for CodecError {
    fn from(e: RoleEntryError) -> Self {
        match e {
            RoleEntryError::Unknown(UnknownRole(name)) => Self::UnknownRole { name },
            RoleEntryError::Missing { position } => Self::MissingRole { position },
        }
    }
}

impl CodecError {
    fn at(self, index: usize) -> Self {
        match self {
            Self::UnknownRole { name } => Self::UnknownRoleAt { index, name },
            Self::MissingRole { position } => Self::MissingRoleAt { index, position },
            other => other,
        }
    }
}

/// Serialize a user for the client; the password is never included.
pub fn to_json(user: &User) -> Result<String, CodecError> {
    serde_json::to_string(user).map_err(CodecError::Encode)
}

/// Decode a single user object, resolving its role entries.
pub fn json_to_user(json: &str) -> Result<User, CodecError> {
    let payload: UserPayload = serde_json::from_str(json).map_err(CodecError::Parse)?;
    let user = User::try_from(payload).map_err(|e| {
        warn!(error = %e, "user json has a bad role entry");
        CodecError::from(e)
    })?;
    debug!(user_name = %user.user_name, roles = user.user_roles.len(), "decoded user");
    Ok(user)
}

/// Decode `[{...},{...}]` into users in input order. The first user with a
/// bad role entry fails the whole batch.
pub fn json_array_to_users(json: &str) -> Result<Vec<User>, CodecError> {
    let payloads: Vec<UserPayload> = serde_json::from_str(json).map_err(CodecError::Parse)?;
    let users = payloads
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            User::try_from(p).map_err(|e| {
                warn!(index, error = %e, "user json array has a bad role entry");
                CodecError::from(e).at(index)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = users.len(), "decoded user array");
    Ok(users)
}

impl User {
    pub fn to_json(&self) -> Result<String, CodecError> {
        to_json(self)
    }
}
