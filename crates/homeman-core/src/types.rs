//! Identity and resource addressing types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The authenticated identity behind one request.
///
/// Only ever produced by verifying a credential; it is never stored on its
/// own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Id of the user the credential was issued for.
    pub subject_id: Uuid,

    /// Whether the user holds the privileged capability.
    pub is_privileged: bool,
}

impl Principal {
    /// Creates an unprivileged principal.
    pub fn new(subject_id: Uuid) -> Self {
        Self {
            subject_id,
            is_privileged: false,
        }
    }

    /// Creates a privileged principal.
    pub fn privileged(subject_id: Uuid) -> Self {
        Self {
            subject_id,
            is_privileged: true,
        }
    }

    /// Capability check for privileged-only operations.
    ///
    /// This is independent of ownership and must run before any ownership
    /// resolution for the operations it guards.
    pub fn require_privileged(&self) -> Result<()> {
        if self.is_privileged {
            Ok(())
        } else {
            Err(Error::forbidden("You don't have enough privileges"))
        }
    }
}

/// Kinds of entity that take part in the ownership hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Root of every ownership chain.
    User,
    /// Owned by a user.
    Device,
    /// Owned by a device.
    Sensor,
    /// Owned by a sensor.
    Reading,
}

impl ResourceKind {
    /// The kind that directly owns this one, if any.
    pub const fn owner_kind(self) -> Option<ResourceKind> {
        match self {
            Self::User => None,
            Self::Device => Some(Self::User),
            Self::Sensor => Some(Self::Device),
            Self::Reading => Some(Self::Sensor),
        }
    }

    /// Number of owner edges between this kind and its user.
    pub const fn depth(self) -> usize {
        match self {
            Self::User => 0,
            Self::Device => 1,
            Self::Sensor => 2,
            Self::Reading => 3,
        }
    }

    /// Human-readable label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Device => "Device",
            Self::Sensor => "Sensor",
            Self::Reading => "Sensor data",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Device => "device",
            Self::Sensor => "sensor",
            Self::Reading => "reading",
        };
        f.write_str(s)
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "device" => Ok(Self::Device),
            "sensor" => Ok(Self::Sensor),
            "reading" => Ok(Self::Reading),
            other => Err(Error::invalid_data(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

/// A resource addressed by kind and opaque id, as parsed from a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Kind of the addressed resource.
    pub kind: ResourceKind,

    /// Id as received; the store decides how to interpret it.
    pub id: String,
}

impl ResourceRef {
    /// Creates a reference to a resource.
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a device reference.
    pub fn device(id: impl ToString) -> Self {
        Self::new(ResourceKind::Device, id.to_string())
    }

    /// Shorthand for a sensor reference.
    pub fn sensor(id: impl ToString) -> Self {
        Self::new(ResourceKind::Sensor, id.to_string())
    }

    /// Shorthand for a reading reference.
    pub fn reading(id: impl ToString) -> Self {
        Self::new(ResourceKind::Reading, id.to_string())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
