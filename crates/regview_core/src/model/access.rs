//! Requesting identities and contributor permission levels.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of an authenticated user.
pub type UserId = Uuid;

/// Contributor permission level.
///
/// Levels are cumulative: `Admin` implies `Write`, which implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns every level granted by holding `self`, lowest first.
    pub fn expand(self) -> &'static [Permission] {
        match self {
            Self::Read => &[Self::Read],
            Self::Write => &[Self::Read, Self::Write],
            Self::Admin => &[Self::Read, Self::Write, Self::Admin],
        }
    }

    /// Whether holding `self` satisfies a requirement of `required`.
    pub fn grants(self, required: Permission) -> bool {
        self >= required
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity attached to one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    Anonymous,
    User(UserId),
}

impl Identity {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(*id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl From<Option<UserId>> for Identity {
    fn from(value: Option<UserId>) -> Self {
        value.map_or(Self::Anonymous, Self::User)
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Identity, Permission};

    #[test]
    fn admin_expands_to_all_levels() {
        assert_eq!(
            Permission::Admin.expand(),
            &[Permission::Read, Permission::Write, Permission::Admin]
        );
        assert_eq!(Permission::Read.expand(), &[Permission::Read]);
    }

    #[test]
    fn grants_is_cumulative() {
        assert!(Permission::Admin.grants(Permission::Read));
        assert!(Permission::Write.grants(Permission::Write));
        assert!(!Permission::Write.grants(Permission::Admin));
    }

    #[test]
    fn parse_rejects_unknown_levels() {
        assert_eq!(Permission::parse("admin"), Some(Permission::Admin));
        assert_eq!(Permission::parse("owner"), None);
    }

    #[test]
    fn identity_from_optional_user() {
        assert!(Identity::from(None).is_anonymous());
        let id = uuid::Uuid::new_v4();
        assert_eq!(Identity::from(Some(id)).user_id(), Some(id));
    }
}
