//! # Opaque identifiers.
//!
//! Every entity tracked by the service is keyed by a UUID-backed newtype. Ids are
//! `Copy`, hash cheaply, and render as the hyphenated UUID string (which is also
//! the form used when filtering in queries).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifies one task attempt. Retries get a new `TaskId`.
    TaskId
);
define_id!(
    /// Identifies an actor across all of its incarnations.
    ActorId
);
define_id!(
    /// Identifies a job (one driver and everything it submitted).
    JobId
);
define_id!(
    /// Identifies a worker process.
    WorkerId
);
define_id!(
    /// Identifies a cluster node.
    NodeId
);
define_id!(
    /// Identifies a producer (one worker or driver process emitting events).
    ProducerId
);
