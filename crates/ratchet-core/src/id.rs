//! Identifier newtypes used across the workspace.

use std::str::FromStr;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[derive(Debug, Display, From, Into)]
        #[debug("{_0}")]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            ///
            /// Uses UUID v7 so identifiers sort by creation time, which keyset
            /// pagination relies on.
            #[inline]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[inline]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[inline]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::from_str(s)?))
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a stored workflow instance.
    WorkflowId
}

uuid_id! {
    /// Unique identifier for a node within a workflow definition.
    NodeId
}

uuid_id! {
    /// Unique identifier for an edge within a workflow definition.
    EdgeId
}

uuid_id! {
    /// Unique identifier for a batch of workflow instances.
    BatchId
}

uuid_id! {
    /// Unique identifier for an enqueued queue message.
    MessageId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_strings() {
        let id = WorkflowId::new();
        let parsed: WorkflowId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = NodeId::from_uuid(Uuid::from_u128(7));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn v7_ids_sort_by_creation() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert!(a <= b);
    }
}
