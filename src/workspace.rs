use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::{Builder, TempDir};

use crate::settings::Settings;

/// Scratch directory owned by exactly one request. Removed on `close` or drop.
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
    scene_file_name: String,
}

impl RequestWorkspace {
    pub fn create(settings: &Settings) -> Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(&settings.temp_dir_prefix);
        let dir = match &settings.temp_root {
            Some(root) => {
                fs::create_dir_all(root)
                    .with_context(|| format!("failed to create temp root {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("failed to create request workspace")?;

        tracing::debug!(path = %dir.path().display(), "created request workspace");
        Ok(Self {
            dir,
            scene_file_name: settings.scene_file_name.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn scene_path(&self) -> PathBuf {
        self.dir.path().join(&self.scene_file_name)
    }

    pub fn write_scene(&self, code: &str) -> Result<PathBuf> {
        let path = self.scene_path();
        fs::write(&path, code)
            .with_context(|| format!("failed to write scene file {}", path.display()))?;
        Ok(path)
    }

    /// Deletes the directory. Failures are logged, never returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(error) = self.dir.close() {
            tracing::warn!(path = %path.display(), %error, "failed to remove request workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(root: &Path) -> Settings {
        Settings {
            temp_root: Some(root.join("work")),
            ..Settings::default()
        }
    }

    #[test]
    fn workspace_uses_prefix_and_is_removed_on_close() {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace = RequestWorkspace::create(&settings_in(root.path())).expect("create");
        let path = workspace.path().to_path_buf();
        let name = path.file_name().and_then(|name| name.to_str()).expect("name");
        assert!(name.starts_with("manim_"));

        let scene = workspace.write_scene("from manim import *\n").expect("write");
        assert_eq!(scene, path.join("scene.py"));
        assert_eq!(fs::read_to_string(&scene).expect("read"), "from manim import *\n");

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_are_never_shared() {
        let root = tempfile::tempdir().expect("tempdir");
        let settings = settings_in(root.path());
        let first = RequestWorkspace::create(&settings).expect("create");
        let second = RequestWorkspace::create(&settings).expect("create");
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn close_swallows_already_removed_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let workspace = RequestWorkspace::create(&settings_in(root.path())).expect("create");
        fs::remove_dir_all(workspace.path()).expect("remove early");
        workspace.close();
    }
}
