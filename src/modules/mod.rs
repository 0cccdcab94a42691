pub mod content;
pub mod records;
pub mod reels;
