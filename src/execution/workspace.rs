//! Per-job working directories
//!
//! With [`Workspace::Isolated`] each job gets a scratch copy of the project
//! tree, so concurrent jobs never write into each other's build outputs.
//! The copy is deleted when the job is done.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// Where the jobs of a build run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Workspace {
    /// Every job runs in the runner's configured working directory
    #[default]
    Shared,

    /// Every job runs in its own scratch copy of `source`
    Isolated { source: PathBuf },
}

impl Workspace {
    /// Set up the directory for one job; `None` means the runner's default
    pub async fn prepare(&self, job_number: usize) -> Result<Option<JobWorkspace>> {
        match self {
            Workspace::Shared => Ok(None),
            Workspace::Isolated { source } => {
                let source = source.clone();
                let workspace = tokio::task::spawn_blocking(move || {
                    JobWorkspace::create(&source, job_number)
                })
                .await
                .context("Workspace setup task panicked")??;
                Ok(Some(workspace))
            }
        }
    }
}

/// A scratch copy of the project tree, removed on drop
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create(source: &Path, job_number: usize) -> Result<Self> {
        if !source.is_dir() {
            anyhow::bail!("Project directory {} does not exist", source.display());
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("cimatrix-job{}-", job_number))
            .tempdir()
            .context("Failed to create a scratch directory")?;

        let files = copy_tree(source, dir.path()).with_context(|| {
            format!(
                "Failed to copy {} into the scratch directory of job {}",
                source.display(),
                job_number
            )
        })?;
        debug!(
            "Job {} workspace {} ({} files)",
            job_number,
            dir.path().display(),
            files
        );

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Copy the tree under `source` into the existing directory `dest`.
///
/// Symlinks are recreated, not followed. Returns the number of files copied.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<usize> {
    let mut files = 0;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry?;
        let target = dest.join(entry.path().strip_prefix(source)?);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    let points_to = std::fs::read_link(link)?;
    std::os::unix::fs::symlink(&points_to, target)
        .with_context(|| format!("Failed to recreate symlink {}", link.display()))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    if link.is_dir() {
        debug!("Skipping directory symlink {}", link.display());
        return Ok(());
    }
    std::fs::copy(link, target)
        .map(|_| ())
        .with_context(|| format!("Failed to copy {}", link.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("setup.py"), "print('setup')\n").unwrap();
        fs::create_dir_all(dir.path().join("conda/tests")).unwrap();
        fs::write(dir.path().join("conda/tests/test_resolve.py"), "def test(): pass\n").unwrap();
        dir
    }

    #[test]
    fn test_copy_tree_keeps_layout() {
        let source = project();
        let dest = tempfile::tempdir().unwrap();

        let files = copy_tree(source.path(), dest.path()).unwrap();
        assert_eq!(files, 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("conda/tests/test_resolve.py")).unwrap(),
            "def test(): pass\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_recreates_symlinks() {
        let source = project();
        std::os::unix::fs::symlink("setup.py", source.path().join("link.py")).unwrap();
        let dest = tempfile::tempdir().unwrap();

        copy_tree(source.path(), dest.path()).unwrap();
        assert_eq!(
            fs::read_link(dest.path().join("link.py")).unwrap(),
            PathBuf::from("setup.py")
        );
    }

    #[tokio::test]
    async fn test_isolated_jobs_do_not_share_files() {
        let source = project();
        let workspace = Workspace::Isolated {
            source: source.path().to_path_buf(),
        };

        let first = workspace.prepare(1).await.unwrap().unwrap();
        let second = workspace.prepare(2).await.unwrap().unwrap();
        assert_ne!(first.path(), second.path());

        fs::write(first.path().join(".coverage"), "job 1").unwrap();
        assert!(!second.path().join(".coverage").exists());
        assert!(!source.path().join(".coverage").exists());
        assert!(second.path().join("setup.py").exists());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shared_workspace_has_no_scratch_dir() {
        assert!(Workspace::Shared.prepare(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let workspace = Workspace::Isolated {
            source: PathBuf::from("/nonexistent/cimatrix/project"),
        };
        assert!(workspace.prepare(1).await.is_err());
    }
}
