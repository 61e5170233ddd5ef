//! Page model extraction: raw driver trees to indexed snapshots

mod classify;
mod extractor;
mod fingerprint;
mod node;
mod serialize;

pub use classify::{PRUNED_TAGS, classify, is_actionable_layout};
pub use extractor::{ExtractionError, PageExtractor};
pub use fingerprint::{Fingerprint, IdentityTable, fingerprint};
pub use node::{ElementIndex, ElementNode, Interactivity, Snapshot};
pub use serialize::{render_compact, render_element};
