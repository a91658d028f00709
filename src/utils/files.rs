use crate::error::ProvisionError;
use fs_extra::dir::CopyOptions;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

const UNIQUE_ID_LEN: usize = 6;

/// Short random alphanumeric string, good enough to keep parallel runs apart
pub fn unique_id() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(UNIQUE_ID_LEN).collect()
}

/// Hidden entries (.terraform, .git, ...) and local state files are left behind,
/// so the copy starts from a clean slate.
fn should_copy(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => return false,
    };
    !name.starts_with('.') && !name.contains(".tfstate")
}

/// A folder copied under the system temp dir. It is removed when dropped, unless it
/// has been marked as holding state, in which case it is left behind and its path logged.
#[derive(Debug)]
pub struct TempCopy {
    path: PathBuf,
    holds_state: Cell<bool>,
}

impl TempCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_holds_state(&self, holds_state: bool) {
        self.holds_state.set(holds_state);
    }

    pub fn holds_state(&self) -> bool {
        self.holds_state.get()
    }
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        if self.holds_state.get() {
            tracing::warn!(path = %self.path.display(), "keeping temporary terraform folder, it may still hold state");
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed temporary terraform folder"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove temporary terraform folder"),
        }
    }
}

/// Copies the content of `src` into a fresh directory under the system temp dir.
pub fn copy_folder_to_temp<P: AsRef<Path>>(src: P, prefix: &str) -> Result<TempCopy, ProvisionError> {
    let src = src.as_ref();
    let copy_err = |source: fs_extra::error::Error| ProvisionError::CopyToTemp {
        from: src.to_path_buf(),
        source,
    };

    let dest = std::env::temp_dir().join(format!("{}-{}", prefix, unique_id()));
    fs::create_dir_all(&dest).map_err(|e| copy_err(e.into()))?;
    let copy = TempCopy {
        path: dest,
        holds_state: Cell::new(false),
    };

    let mut items = Vec::new();
    for entry in fs::read_dir(src).map_err(|e| copy_err(e.into()))? {
        let path = entry.map_err(|e| copy_err(e.into()))?.path();
        if should_copy(&path) {
            items.push(path);
        }
    }

    fs_extra::copy_items(&items, copy.path(), &CopyOptions::new()).map_err(copy_err)?;
    tracing::info!(from = %src.display(), to = %copy.path().display(), "copied terraform folder");
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_are_alphanumeric() {
        let a = unique_id();
        let b = unique_id();
        assert_eq!(a.len(), UNIQUE_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn copy_skips_hidden_and_state() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.tf"), "resource {}").unwrap();
        fs::write(src.path().join("terraform.tfstate"), "{}").unwrap();
        fs::write(src.path().join("terraform.tfstate.backup"), "{}").unwrap();
        fs::create_dir(src.path().join(".terraform")).unwrap();
        fs::create_dir(src.path().join("modules")).unwrap();
        fs::write(src.path().join("modules").join("vm.tf"), "module {}").unwrap();

        let copy = copy_folder_to_temp(src.path(), "deploycheck-test").unwrap();
        let dest = copy.path().to_path_buf();
        assert!(dest.join("main.tf").is_file());
        assert!(dest.join("modules").join("vm.tf").is_file());
        assert!(!dest.join("terraform.tfstate").exists());
        assert!(!dest.join("terraform.tfstate.backup").exists());
        assert!(!dest.join(".terraform").exists());

        drop(copy);
        assert!(!dest.exists());
    }

    #[test]
    fn copy_holding_state_is_kept() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.tf"), "resource {}").unwrap();

        let copy = copy_folder_to_temp(src.path(), "deploycheck-test").unwrap();
        let dest = copy.path().to_path_buf();
        assert!(!copy.holds_state());
        copy.set_holds_state(true);
        assert!(copy.holds_state());
        drop(copy);
        assert!(dest.join("main.tf").is_file());

        fs::remove_dir_all(dest).unwrap();
    }
}
