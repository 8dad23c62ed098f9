use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::users::repo_types::{RoleType, User};
use crate::users::schema::{users, EMAIL_MAX, PASSWORD_MAX, USER_NAME_MAX};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid email")]
    InvalidEmail,

    #[error("role {0} assigned more than once")]
    DuplicateRole(RoleType),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks the storage constraints that can be verified without the database.
/// Uniqueness is still enforced by the store.
pub fn validate_user(user: &User) -> Result<(), ValidationError> {
    if user.user_name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: users::USER_NAME,
        });
    }
    if user.user_name.chars().count() > USER_NAME_MAX {
        return Err(ValidationError::TooLong {
            field: users::USER_NAME,
            max: USER_NAME_MAX,
        });
    }
    if user.email.is_empty() {
        return Err(ValidationError::Required {
            field: users::EMAIL,
        });
    }
    if user.email.chars().count() > EMAIL_MAX {
        return Err(ValidationError::TooLong {
            field: users::EMAIL,
            max: EMAIL_MAX,
        });
    }
    if !is_valid_email(&user.email) {
        return Err(ValidationError::InvalidEmail);
    }
    if let Some(password) = &user.password {
        if password.chars().count() > PASSWORD_MAX {
            return Err(ValidationError::TooLong {
                field: users::PASSWORD,
                max: PASSWORD_MAX,
            });
        }
    }

    let mut seen = HashSet::new();
    for r in &user.user_roles {
        if !seen.insert(r.role) {
            return Err(ValidationError::DuplicateRole(r.role));
        }
    }
    Ok(())
}
