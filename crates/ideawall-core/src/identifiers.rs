//! Core identifier types used across the board engine
//!
//! Each identifier is a thin newtype over [`Uuid`] so the compiler keeps
//! record ids, actor ids, scope ids, and ledger-local ids from mixing.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of one idea record.
    ///
    /// Authoritative ids are assigned by the persistence gateway; the engine
    /// mints temporary ids for optimistically created records until the
    /// gateway echo replaces them.
    IdeaId,
    "idea"
);

uuid_id!(
    /// Identifier of a participant (authenticated user or anonymous session).
    ///
    /// Opaque to the engine; produced by the external identity collaborator.
    ActorId,
    "actor"
);

uuid_id!(
    /// Identifier of a collaborative scope (a project or a live session).
    ///
    /// All filtering in the reconciler is keyed by this id.
    ScopeId,
    "scope"
);

uuid_id!(
    /// Ledger-local identifier of one optimistic entry.
    LocalId,
    "local"
);
