use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// New random identifier (UUIDv7 — time-sortable, useful for log
            /// correlation and for sorting freshly-created rows without an
            /// extra index).
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
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
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(JobId, "Opaque unique identifier for a Job, assigned at creation.");
opaque_id!(
    InstanceId,
    "Caller-supplied or auto-generated short handle for an Instance."
);
opaque_id!(
    ChannelId,
    "Opaque chat-channel handle, used for output routing. Never interpreted, only compared."
);
opaque_id!(
    SessionId,
    "Opaque session identifier passed into the agent to preserve conversation context."
);
