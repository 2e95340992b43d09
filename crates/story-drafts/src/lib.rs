//! Keyed persistence of translation drafts.
//!
//! A draft is stored once per (story, language) pair. [`DraftStore::save`] upserts
//! immediately; [`DraftStore::schedule_save`] coalesces bursts of edits into a
//! single delayed write of the latest content.

pub mod backend;
pub mod clock;
pub mod error;
pub mod record;
pub mod sqlite;
pub mod store;

pub use backend::{DraftBackend, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use record::{draft_key, HistoryRecord};
pub use sqlite::SqliteBackend;
pub use store::{DraftStore, DEFAULT_SAVE_DELAY};
pub use story_markdown::{Content, Section};
