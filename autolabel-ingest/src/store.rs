use autolabel_core::models::{Episode, MetaDocument};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::DatasetError;
use crate::layout::DatasetLayout;

/// Whether this store instance has already taken its backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupState {
    pub done: bool,
}

/// Read/write access to both stores of one dataset.
///
/// Each update re-reads and rewrites a whole file. There is no locking: one
/// mutating process per dataset directory, and `backup_once` needs
/// `&mut self`, so a store cannot be shared between concurrent writers.
#[derive(Debug)]
pub struct DatasetStore {
    layout: DatasetLayout,
    backup: BackupState,
}

impl DatasetStore {
    pub fn open(layout: DatasetLayout) -> Self {
        let episodes = layout.episodes_file();
        if !episodes.exists() {
            tracing::warn!(path = %episodes.display(), "Episodes store does not exist");
        }
        let meta = layout.meta_file();
        if !meta.exists() {
            tracing::warn!(path = %meta.display(), "Meta store does not exist");
        }

        Self {
            layout,
            backup: BackupState::default(),
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn backup_state(&self) -> BackupState {
        self.backup
    }

    // ========================================================================
    // Episodes (JSON lines)
    // ========================================================================

    /// All episode records in file order. A missing file reads as empty.
    pub fn load_episodes(&self) -> Result<Vec<Episode>, DatasetError> {
        let path = self.layout.episodes_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| DatasetError::io(&path, e))?;

        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| DatasetError::json(&path, e)))
            .collect()
    }

    pub fn save_episodes(&self, episodes: &[Episode]) -> Result<(), DatasetError> {
        let path = self.layout.episodes_file();
        let mut buf = Vec::new();
        for episode in episodes {
            serde_json::to_writer(&mut buf, episode).map_err(|e| DatasetError::json(&path, e))?;
            buf.push(b'\n');
        }
        write_atomic(&path, &buf)?;
        tracing::debug!(count = episodes.len(), path = %path.display(), "Saved episodes");
        Ok(())
    }

    // ========================================================================
    // Meta document
    // ========================================================================

    pub fn load_meta(&self) -> Result<MetaDocument, DatasetError> {
        let path = self.layout.meta_file();
        if !path.exists() {
            return Err(DatasetError::MissingStore(path));
        }
        let content = fs::read_to_string(&path).map_err(|e| DatasetError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| DatasetError::json(&path, e))
    }

    /// Pretty-printed with a 4-space indent; non-ASCII is written as-is.
    pub fn save_meta(&self, meta: &MetaDocument) -> Result<(), DatasetError> {
        let path = self.layout.meta_file();
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        meta.serialize(&mut serializer)
            .map_err(|e| DatasetError::json(&path, e))?;
        write_atomic(&path, &buf)?;
        tracing::debug!(items = meta.raw_data_list.len(), path = %path.display(), "Saved meta");
        Ok(())
    }

    // ========================================================================
    // Backup
    // ========================================================================

    /// Copy both stores to `<file>.bak_<YYYYmmdd_HHMMSS>` the first time it is
    /// called on this instance. Later calls do nothing.
    ///
    /// Returns the backup files written by this call.
    pub fn backup_once(&mut self) -> Result<Vec<PathBuf>, DatasetError> {
        if self.backup.done {
            return Ok(Vec::new());
        }

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut written = Vec::new();

        for source in [self.layout.episodes_file(), self.layout.meta_file()] {
            if !source.exists() {
                continue;
            }
            let target = backup_path(&source, &stamp);
            fs::copy(&source, &target).map_err(|e| DatasetError::io(&target, e))?;
            tracing::info!(backup = %target.display(), "Backed up store");
            written.push(target);
        }

        self.backup.done = true;
        Ok(written)
    }
}

fn backup_path(source: &Path, stamp: &str) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(format!(".bak_{}", stamp));
    PathBuf::from(name)
}

/// Write through a temporary file in the target's directory, then rename.
/// An existing target keeps its permissions.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| DatasetError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DatasetError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| DatasetError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| DatasetError::io(tmp.path(), e))?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(|e| DatasetError::io(tmp.path(), e))?;
    }
    tmp.persist(path)
        .map_err(|e| DatasetError::io(path, e.error))?;
    Ok(())
}
