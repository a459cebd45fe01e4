use std::path::PathBuf;

use quick_xml::events::attributes::AttrError;

pub type Result<T, E = ReindexError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] AttrError),
    #[error("{}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("cannot move into {}: slot is still occupied", path.display())]
    SlotOccupied { path: PathBuf },
    #[error(
        "the operation was interrupted before all changes could be written, archive {archive} may be inconsistent"
    )]
    CommitInterrupted {
        archive: String,
        #[source]
        source: Box<ReindexError>,
    },
}

impl ReindexError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the archive may have been left partially rewritten
    pub fn is_commit_interrupted(&self) -> bool {
        matches!(self, Self::CommitInterrupted { .. })
    }
}
