//! Newtype wrappers for entity identifiers.
//!
//! These prevent accidentally mixing up IDs of different entity types
//! at compile time. An empty identifier marks a record that has not been
//! assigned one yet.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `String` inner type.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Generates a fresh random (UUID v4) identifier.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Returns `true` when no identifier has been assigned yet.
            #[inline]
            #[must_use]
            pub fn is_unassigned(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Unique identifier for a grid cell.
    CellId
}

define_string_id! {
    /// Unique identifier for a category.
    CategoryId
}

define_string_id! {
    /// Unique identifier for an account.
    AccountId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_is_unassigned() {
        assert!(AccountId::default().is_unassigned());
        assert!(!AccountId::from("acc-1").is_unassigned());
    }

    #[test]
    fn generated_ids_are_distinct_uuids() {
        let first = CellId::generate();
        let second = CellId::generate();
        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(first.as_inner()).is_ok());
    }

    #[test]
    fn string_id_serde_is_transparent() {
        let id = CategoryId::new("cat-42".to_owned());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cat-42\"");
        let back: CategoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_into_inner() {
        let id = AccountId::from("acc-7".to_owned());
        assert_eq!(id.to_string(), "acc-7");
        assert_eq!(id.into_inner(), "acc-7");
    }
}
