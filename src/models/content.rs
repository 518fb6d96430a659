use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four publishable content families. They share one table and one
/// handler set; routes select the family by its URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Announcement,
    Decision,
    Disposition,
    ProjectDocument,
}

impl ContentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Announcement => "announcement",
            Self::Decision => "decision",
            Self::Disposition => "disposition",
            Self::ProjectDocument => "project_document",
        }
    }

    /// URL segment used by both the public and the admin API.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Announcement => "announcements",
            Self::Decision => "decisions",
            Self::Disposition => "dispositions",
            Self::ProjectDocument => "documents",
        }
    }

    /// Subdirectory of the upload root where this family's files land.
    #[must_use]
    pub const fn upload_dir(self) -> &'static str {
        match self {
            Self::Announcement => "announcements",
            Self::Decision => "decisions",
            Self::Disposition => "dispositions",
            Self::ProjectDocument => "documents",
        }
    }
}

impl FromStr for ContentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announcements" | "announcement" => Ok(Self::Announcement),
            "decisions" | "decision" => Ok(Self::Decision),
            "dispositions" | "disposition" => Ok(Self::Disposition),
            "documents" | "project_document" => Ok(Self::ProjectDocument),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
