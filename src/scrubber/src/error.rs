use std::path::PathBuf;

pub type Result<T, E = ScrubError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write change log: {0}")]
    ChangeLog(#[source] std::io::Error),
}

impl ScrubError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
