//! Filesystem helpers for the on-disk stores.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Writes `content` to `path` atomically: the bytes land in a temporary
/// sibling file which is then renamed over the target, so concurrent
/// readers always see either the old or the new document.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file name {}", path.display()))?;
    let temp_path = parent.join(format!(".{file_name}.tmp"));

    fs::write(&temp_path, content).with_context(|| format!("write {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("rename {} to {}", temp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("store").join("doc.json");

        atomic_write(&target, "first").expect("first write");
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");

        atomic_write(&target, "second").expect("second write");
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
