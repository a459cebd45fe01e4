//! Control-byte scrubbing
//!
//! Removes the C0 control codes that have no meaning in text files, streaming
//! the file in fixed-size chunks and replacing it only when something changed.

pub mod classifier;
pub mod error;
pub mod scrubber;

pub use error::{Result, ScrubError};
pub use scrubber::{ScrubOptions, ScrubOutcome, ScrubReport, Scrubber};
