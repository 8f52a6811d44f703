//! Storage Containers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Logical object-store container.
///
/// The physical container (bucket) name for each is configured by the
/// server; this enum is the fixed namespace the rest of the code refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Container {
    /// Attachments of projects.
    ProjectAttachments,
    /// Attachments of permit applications.
    ApplicationAttachments,
    /// Decision documents received for applications.
    Decisions,
}

impl Container {
    /// Every container, in a stable order.
    pub const ALL: [Self; 3] = [
        Self::ProjectAttachments,
        Self::ApplicationAttachments,
        Self::Decisions,
    ];

    /// Logical name, also the default physical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectAttachments => "project-attachments",
            Self::ApplicationAttachments => "application-attachments",
            Self::Decisions => "decisions",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Container {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownContainer(s.to_string()))
    }
}
