//! Per-attachment state files.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fleet_hooks::{HookInfo, HookKind};
use fleet_names::StorageTag;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::StorageError;

/// On-disk body of a state file.
#[derive(Debug, Serialize, Deserialize)]
struct DiskState {
    attached: Option<bool>,
}

/// Local record of whether the attach hook for one storage instance has
/// been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    tag: StorageTag,
    path: PathBuf,
    attached: bool,
}

impl StateFile {
    /// Read the state of `tag` from `dir`. A missing file means not attached.
    pub fn read(dir: &Path, tag: &StorageTag) -> Result<Self, StorageError> {
        let path = dir.join(tag.file_name());
        let attached = match fs::read_to_string(&path) {
            Ok(body) => parse(&path, &body)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            tag: tag.clone(),
            path,
            attached,
        })
    }

    /// Read every state file in `dir`. Hidden files (interrupted writes)
    /// and names that are not storage tags are ignored.
    pub fn read_all(dir: &Path) -> Result<BTreeMap<StorageTag, StateFile>, StorageError> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(path = %entry.path().display(), "Skipping state file with non UTF-8 name");
                continue;
            };
            if name.starts_with('.') || !entry.file_type()?.is_file() {
                continue;
            }
            let tag = match StorageTag::from_file_name(name) {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unrecognised file in state directory");
                    continue;
                }
            };
            let state = StateFile::read(dir, &tag)?;
            files.insert(tag, state);
        }
        Ok(files)
    }

    pub fn tag(&self) -> &StorageTag {
        &self.tag
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attached(&self) -> bool {
        self.attached
    }

    /// Check that `hook` is the next transition for this storage.
    pub fn validate_hook(&self, hook: &HookInfo) -> Result<(), StorageError> {
        if hook.storage_id.as_ref() != Some(&self.tag) {
            return Err(StorageError::inappropriate(
                hook.kind,
                &self.tag,
                "hook is for different storage",
            ));
        }
        match hook.kind {
            HookKind::StorageAttached if self.attached => Err(StorageError::inappropriate(
                hook.kind,
                &self.tag,
                "storage already attached",
            )),
            HookKind::StorageDetached if !self.attached => Err(StorageError::inappropriate(
                hook.kind,
                &self.tag,
                "storage not attached",
            )),
            HookKind::StorageAttached | HookKind::StorageDetached => Ok(()),
            other => Err(StorageError::NotStorageHook(other)),
        }
    }

    /// Persist the effect of a completed hook. An attach writes the file;
    /// a detach removes it.
    pub fn commit_hook(&mut self, hook: &HookInfo) -> Result<(), StorageError> {
        self.validate_hook(hook)?;
        if hook.kind == HookKind::StorageDetached {
            return self.remove();
        }

        let body = serde_yaml::to_string(&DiskState {
            attached: Some(true),
        })?;
        write_atomic(&self.path, body.as_bytes())?;
        self.attached = true;
        debug!(storage = %self.tag, path = %self.path.display(), "Storage state committed");
        Ok(())
    }

    /// Delete the file. Missing files are fine.
    pub fn remove(&mut self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.attached = false;
        Ok(())
    }
}

fn parse(path: &Path, body: &str) -> Result<bool, StorageError> {
    let state: DiskState = serde_yaml::from_str(body)?;
    state.attached.ok_or_else(|| StorageError::InvalidStateFile {
        path: path.to_path_buf(),
        reason: "missing 'attached'".to_string(),
    })
}

/// Write via a hidden temporary file and rename over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::InvalidStateFile {
            path: path.to_path_buf(),
            reason: "no file name".to_string(),
        })?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        fs::remove_file(&temp_path).ok();
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tag(id: &str) -> StorageTag {
        StorageTag::parse(id).unwrap()
    }

    fn attached(id: &str) -> HookInfo {
        HookInfo::storage(HookKind::StorageAttached, tag(id))
    }

    fn detached(id: &str) -> HookInfo {
        HookInfo::storage(HookKind::StorageDetached, tag(id))
    }

    #[test]
    fn test_missing_file_is_not_attached() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::read(dir.path(), &tag("data/0")).unwrap();
        assert!(!state.attached());
        assert_eq!(state.path(), dir.path().join("data-0"));
    }

    #[test]
    fn test_commit_attach_then_detach() {
        let dir = TempDir::new().unwrap();
        let mut state = StateFile::read(dir.path(), &tag("data/0")).unwrap();

        state.commit_hook(&attached("data/0")).unwrap();
        assert!(state.attached());
        let body = fs::read_to_string(dir.path().join("data-0")).unwrap();
        assert_eq!(body, "attached: true\n");

        let reread = StateFile::read(dir.path(), &tag("data/0")).unwrap();
        assert!(reread.attached());

        state.commit_hook(&detached("data/0")).unwrap();
        assert!(!state.attached());
        assert!(!dir.path().join("data-0").exists());
    }

    #[test]
    fn test_validate_rejects_wrong_transition() {
        let dir = TempDir::new().unwrap();
        let mut state = StateFile::read(dir.path(), &tag("data/0")).unwrap();

        let err = state.validate_hook(&detached("data/0")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "inappropriate \"storage-detached\" hook for storage \"data/0\": storage not attached"
        );
        assert!(state.validate_hook(&attached("data/1")).is_err());

        state.commit_hook(&attached("data/0")).unwrap();
        assert!(state.validate_hook(&attached("data/0")).is_err());
        assert!(state.validate_hook(&detached("data/0")).is_ok());
    }

    #[test]
    fn test_read_all_skips_temporary_files() {
        let dir = TempDir::new().unwrap();
        for id in ["data/0", "logs/2"] {
            StateFile::read(dir.path(), &tag(id))
                .unwrap()
                .commit_hook(&attached(id))
                .unwrap();
        }
        fs::write(dir.path().join(".data-1.tmp"), "attached: true\n").unwrap();

        let files = StateFile::read_all(dir.path()).unwrap();
        let tags: Vec<String> = files.keys().map(|t| t.id()).collect();
        assert_eq!(tags, vec!["data/0", "logs/2"]);
        assert!(files.values().all(StateFile::attached));
    }

    #[test]
    fn test_invalid_state_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data-0"), "{}\n").unwrap();
        let err = StateFile::read(dir.path(), &tag("data/0")).unwrap_err();
        assert!(err.to_string().contains("missing 'attached'"));
        assert!(StateFile::read_all(dir.path()).is_err());
    }

    #[test]
    fn test_read_all_skips_stray_files() {
        let dir = TempDir::new().unwrap();
        StateFile::read(dir.path(), &tag("data/0"))
            .unwrap()
            .commit_hook(&attached("data/0"))
            .unwrap();
        for stray in ["README", "not_a_tag", "data-0~"] {
            fs::write(dir.path().join(stray), "whatever\n").unwrap();
        }
        fs::create_dir(dir.path().join("data-9")).unwrap();

        let files = StateFile::read_all(dir.path()).unwrap();
        let tags: Vec<String> = files.keys().map(|t| t.id()).collect();
        assert_eq!(tags, vec!["data/0"]);
        assert!(dir.path().join("README").exists());
    }
}
