//! Per-job temporary workspaces and the project scaffold copied into them.

use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::errors::{JobError, JobResult};

/// Default Vite + React + Tailwind scaffold compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/templates/vite-react-tailwind/"]
struct ScaffoldAssets;

/// Placeholder in the scaffold's `index.html` replaced by the site title.
pub const TITLE_PLACEHOLDER: &str = "__SITE_TITLE__";

/// Where the project scaffold comes from.
#[derive(Debug, Clone)]
pub enum Scaffold {
    Embedded,
    Directory(PathBuf),
}

impl Scaffold {
    pub fn from_template_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::Directory(dir.to_path_buf()),
            None => Self::Embedded,
        }
    }

    /// Write the scaffold into `dest`, creating it.
    pub fn install(&self, dest: &Path) -> std::io::Result<usize> {
        std::fs::create_dir_all(dest)?;
        match self {
            Self::Embedded => {
                let mut count = 0;
                for rel in ScaffoldAssets::iter() {
                    let Some(file) = ScaffoldAssets::get(&rel) else {
                        continue;
                    };
                    let target = dest.join(&*rel);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, file.data.as_ref())?;
                    count += 1;
                }
                Ok(count)
            }
            Self::Directory(src) => copy_tree(src, dest),
        }
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Temporary directory exclusively owned by one job.
///
/// Layout: `<tmp>/sitegen-XXXX/project/`. Dropped (and deleted) by
/// `teardown` unless retention was requested.
pub struct Workspace {
    dir: TempDir,
    project_dir: PathBuf,
    keep: bool,
}

impl Workspace {
    pub fn allocate(keep: bool) -> JobResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sitegen-")
            .tempdir()
            .map_err(|e| JobError::Workspace(format!("failed to create temp directory: {}", e)))?;
        let project_dir = dir.path().join("project");
        Ok(Self {
            dir,
            project_dir,
            keep,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Copy the scaffold into `project/`.
    pub async fn install_scaffold(&self, scaffold: &Scaffold) -> JobResult<usize> {
        let scaffold = scaffold.clone();
        let dest = self.project_dir.clone();
        tokio::task::spawn_blocking(move || scaffold.install(&dest))
            .await
            .map_err(|e| JobError::Workspace(format!("scaffold task panicked: {}", e)))?
            .map_err(|e| JobError::Workspace(format!("failed to copy project template: {}", e)))
    }

    /// Delete the workspace, or keep it and return its path.
    pub fn teardown(self) -> Option<PathBuf> {
        if self.keep {
            Some(self.dir.keep())
        } else {
            let path = self.dir.path().to_path_buf();
            if let Err(e) = self.dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove workspace");
            }
            None
        }
    }
}
