use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The privilege tier of an authenticated session.
///
/// Tiers are ordered: every tier above [`UserType::UserObject`] must name the
/// key it operates on with an explicit, non-empty key label.
/// Tiers this client does not know rank above [`UserType::Administrator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum UserType {
    /// A user bound to a single key object; the key label may be omitted
    UserObject,
    /// A user owning a slot with several keys
    UserSlot,
    Administrator,
    /// A tier number above 2
    Other(u32),
}

impl UserType {
    /// Whether keyed operations of this tier must carry a key label
    #[must_use]
    pub fn requires_key_label(self) -> bool {
        self > Self::UserObject
    }
}

impl From<u32> for UserType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::UserObject,
            1 => Self::UserSlot,
            2 => Self::Administrator,
            v => Self::Other(v),
        }
    }
}

impl From<UserType> for u32 {
    fn from(user_type: UserType) -> Self {
        match user_type {
            UserType::UserObject => 0,
            UserType::UserSlot => 1,
            UserType::Administrator => 2,
            UserType::Other(v) => v,
        }
    }
}

impl Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserObject => write!(f, "user object"),
            Self::UserSlot => write!(f, "user slot"),
            Self::Administrator => write!(f, "administrator"),
            Self::Other(v) => write!(f, "user type {v}"),
        }
    }
}
