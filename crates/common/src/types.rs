use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw integer identifier.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw integer identifier.
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identifier of a chat user, as assigned by the messaging platform.
    UserId
);

integer_id!(
    /// Identifier of a chat (a private conversation or a channel).
    ChatId
);

integer_id!(
    /// Catalog product identifier, assigned by the store on insert.
    ProductId
);

integer_id!(
    /// Order identifier, assigned by the store when the order is committed.
    OrderId
);

integer_id!(
    /// Handle of a message sent through the chat transport.
    ///
    /// Stored on orders so the admin-channel announcement can be edited in place.
    MessageHandle
);

impl UserId {
    /// The private chat with this user.
    pub const fn private_chat(&self) -> ChatId {
        ChatId(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_trimmed_strings() {
        let id: ProductId = " 42 ".parse().unwrap();
        assert_eq!(id, ProductId::new(42));
        assert!("abc".parse::<OrderId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&OrderId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 7);
    }

    #[test]
    fn private_chat_shares_the_user_number() {
        assert_eq!(UserId::new(1001).private_chat(), ChatId::new(1001));
    }
}
