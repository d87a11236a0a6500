//! Identifiers for tasks, frameworks and status updates.
//!
//! K_i: (task, framework) is unique for the lifetime of a framework, so the
//! pair is the key of exactly one update stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

/// Opaque framework identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameworkId(String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(TaskId);
string_id!(FrameworkId);

/// 128-bit identifier of one status update instance.
///
/// Rendered (and serialized) as the hyphenated uuid string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateUuid(Uuid);

impl UpdateUuid {
    /// Mint a fresh random uuid.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for UpdateUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Key of an update stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub task_id: TaskId,
    pub framework_id: FrameworkId,
}

impl StreamKey {
    pub fn new(task_id: TaskId, framework_id: FrameworkId) -> Self {
        Self {
            task_id,
            framework_id,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} of framework {}", self.task_id, self.framework_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_renders_hyphenated_and_parses_back() {
        let uuid = UpdateUuid::new_v4();
        let rendered = uuid.to_string();
        assert_eq!(rendered.len(), 36);
        assert_eq!(UpdateUuid::parse(&rendered).unwrap(), uuid);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let key = StreamKey::new(TaskId::new("t1"), FrameworkId::new("f1"));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"task_id":"t1","framework_id":"f1"}"#);
    }
}
