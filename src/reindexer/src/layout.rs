use std::path::{Path, PathBuf};

use common::config::ArchiveConfig;

use crate::model::table_folder;

/// File locations within one archive
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    index_path: PathBuf,
    tables_dir: PathBuf,
}

impl ArchiveLayout {
    /// Layout with the default `Indices/tableIndex.xml` and `tables/` locations
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, &ArchiveConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: &ArchiveConfig) -> Self {
        let root = root.into();
        Self {
            index_path: root.join(&config.index_path),
            tables_dir: root.join(&config.tables_dir),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive name used as the prefix of change log entries
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn tables_dir(&self) -> &Path {
        &self.tables_dir
    }

    pub fn table_dir(&self, index: u32) -> PathBuf {
        self.tables_dir.join(table_folder(index))
    }

    /// Row-data file of the table at `index`, in its own folder
    pub fn rows_path(&self, index: u32) -> PathBuf {
        self.table_dir(index)
            .join(format!("{}.xml", table_folder(index)))
    }

    /// Schema file of the table at `index`, in its own folder
    pub fn schema_path(&self, index: u32) -> PathBuf {
        self.table_dir(index)
            .join(format!("{}.xsd", table_folder(index)))
    }
}

/// Hidden sibling used while a file is being rewritten, e.g. `.table3.xml`
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}"))
}
