//! Scratch directory trees for tests.
//!
//! # Usage
//!
//! ```ignore
//! use xtag_config::testing::TestTree;
//!
//! let tree = TestTree::new()?;
//! tree.create_file("a/b.txt", b"content")?;
//! tree.symlink("a", "link-to-a")?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated directory tree, removed on drop.
pub struct TestTree {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the tree
    pub root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestTree {
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join(format!("tree-{}", test_id));
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
            test_id,
        })
    }

    /// Absolute path of `relative_path` inside the tree
    pub fn path(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Create a file with content, creating parent directories as needed
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// `target` is stored as given, so relative targets resolve against the
    /// link's directory.
    #[cfg(unix)]
    pub fn symlink(&self, target: impl AsRef<Path>, link: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(link);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(target, &path)?;
        Ok(path)
    }
}
