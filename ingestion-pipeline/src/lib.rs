#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod append;
pub mod merger;
pub mod utils;

pub use append::{AppendAction, AppendOrchestrator, AppendOutcome, AppendRequest};
pub use merger::{ContentMerger, MergeRequest};
