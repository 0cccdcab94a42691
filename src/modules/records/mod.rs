//! Records that own an uploaded file.
//!
//! Content items and reels share one identifier space but live in separate tables, so
//! every mutation first resolves which table owns the id.

use crate::modules::content::model::ContentItem;
use crate::modules::reels::model::ReelItem;
use std::fmt;

pub mod failure;
pub mod fields;
pub mod resolver;
pub mod updater;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVariant {
    Content,
    Reels,
}

impl RecordVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordVariant::Content => "content",
            RecordVariant::Reels => "reels",
        }
    }
}

impl fmt::Display for RecordVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwningRecord {
    Content(ContentItem),
    Reel(ReelItem),
}

impl OwningRecord {
    pub fn variant(&self) -> RecordVariant {
        match self {
            OwningRecord::Content(_) => RecordVariant::Content,
            OwningRecord::Reel(_) => RecordVariant::Reels,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            OwningRecord::Content(content) => &content.id,
            OwningRecord::Reel(reel) => &reel.id,
        }
    }
}
