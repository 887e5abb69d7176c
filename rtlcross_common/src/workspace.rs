//! Scoped working directories for unit jobs.
//!
//! A [`Workspace`] holds intermediate files while one validation or mutation
//! job runs. The backing temporary directory disappears when the workspace is
//! dropped; anything worth keeping is copied under the persistent result
//! directory first with [`Workspace::save_as`].

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::TempDir;
use tracing::debug;

/// Scratch artifacts the KLEE runs leave behind that never belong in
/// persisted evidence.
const SAVE_IGNORE_PREFIXES: &[&str] = &["test", "run"];
const SAVE_IGNORE_NAMES: &[&str] = &["assembly.ll"];

/// A temporary directory scoped to one unit job plus the process-wide result
/// directory used as the evidence sink.
#[derive(Debug)]
pub struct Workspace {
    tmp: TempDir,
    result_dir: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace whose temporary directory lives under
    /// `result_dir`.
    pub fn create(result_dir: &Path) -> io::Result<Self> {
        let tmp = TempDir::new_in(result_dir)?;
        debug!(tmpdir = %tmp.path().display(), "workspace created");
        Ok(Self {
            tmp,
            result_dir: result_dir.to_owned(),
        })
    }

    /// The temporary directory of this workspace.
    #[must_use]
    pub fn tmpdir(&self) -> &Path {
        self.tmp.path()
    }

    /// The persistent evidence sink shared by all jobs.
    #[must_use]
    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Unique name for a persisted test case: wall-clock timestamp plus the
    /// nonce embedded in the tmpdir name.
    fn fresh_name(&self) -> String {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let nonce = self
            .tmpdir()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tmp");
        format!("{stamp}_{nonce}")
    }

    /// Absolute path for a subdirectory `dirname` under the tmpdir. The
    /// directory itself is not created. With `unique`, an integer suffix is
    /// appended until the path is unused.
    #[must_use]
    pub fn temp_dir_path(&self, dirname: &str, unique: bool) -> PathBuf {
        let mut path = self.tmpdir().join(dirname);
        if unique {
            let mut suffix = 0usize;
            while path.exists() {
                path = self.tmpdir().join(format!("{dirname}{suffix}"));
                suffix += 1;
            }
        }
        path
    }

    /// Absolute path for a file `filename` under the tmpdir, appending an
    /// integer suffix to the stem until the path is unused.
    #[must_use]
    pub fn temp_file_path(&self, filename: &str) -> PathBuf {
        let mut path = self.tmpdir().join(filename);
        let mut suffix = 0usize;
        while path.exists() {
            let original = Path::new(filename);
            let stem = original
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(filename);
            let unique_name = match original.extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{stem}{suffix}.{ext}"),
                None => format!("{stem}{suffix}"),
            };
            path = self.tmpdir().join(unique_name);
            suffix += 1;
        }
        path
    }

    /// Writes `content` to a uniquely named `filename` under the tmpdir and
    /// returns its absolute path.
    pub fn save_to_file(&self, content: impl AsRef<[u8]>, filename: &str) -> io::Result<PathBuf> {
        let path = self.temp_file_path(filename);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Copies the whole tmpdir under `result_dir/<label>/<fresh name>/`,
    /// skipping KLEE scratch artifacts, and returns the destination.
    pub fn save_as(&self, label: &str) -> io::Result<PathBuf> {
        let destination = self.result_dir.join(label).join(self.fresh_name());
        copy_tree(self.tmpdir(), &destination)?;
        debug!(evidence = %destination.display(), "workspace persisted");
        Ok(destination)
    }
}

fn ignored(name: &str) -> bool {
    SAVE_IGNORE_NAMES.contains(&name)
        || SAVE_IGNORE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if ignored(&name.to_string_lossy()) {
            continue;
        }
        let target = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_to_file_appends_counter_on_collision() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::create(root.path()).unwrap();

        let first = ws.save_to_file("a", "input.v").unwrap();
        let second = ws.save_to_file("b", "input.v").unwrap();

        assert_eq!(first.file_name().unwrap(), "input.v");
        assert_eq!(second.file_name().unwrap(), "input0.v");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "b");
    }

    #[test]
    fn save_as_copies_but_skips_scratch() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        ws.save_to_file("keep", "strategy.json").unwrap();
        ws.save_to_file("drop", "test000001.smt2").unwrap();
        ws.save_to_file("drop", "assembly.ll").unwrap();

        let saved = ws.save_as("compilation").unwrap();

        assert!(saved.starts_with(root.path().join("compilation")));
        assert!(saved.join("strategy.json").exists());
        assert!(!saved.join("test000001.smt2").exists());
        assert!(!saved.join("assembly.ll").exists());
    }

    #[test]
    fn tmpdir_vanishes_on_drop() {
        let root = TempDir::new().unwrap();
        let tmpdir = {
            let ws = Workspace::create(root.path()).unwrap();
            ws.tmpdir().to_owned()
        };
        assert!(!tmpdir.exists());
    }
}
