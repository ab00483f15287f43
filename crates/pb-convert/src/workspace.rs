//! Per-request scratch directories.
//!
//! A [`Workspace`] owns a temporary directory holding one conversion's input
//! and output files. The directory and everything in it is removed when the
//! workspace is dropped, whichever way the conversion ends.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

const PREFIX: &str = "pandoc-bridge-";

pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `root`, or under the system temp directory
    /// when `root` is `None`. A missing `root` is created.
    pub fn new(root: Option<&Path>) -> pb_core::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let temp_dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| pb_core::Error::tool("workspace", format!("failed to create temp dir: {e}")))?;

        Ok(Self { temp_dir })
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn input_path(&self, extension: &str) -> PathBuf {
        self.temp_dir.path().join(format!("input.{extension}"))
    }

    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.temp_dir.path().join(format!("output.{extension}"))
    }

    /// Write the request content to `input.<extension>` and return its path.
    pub async fn write_input(&self, extension: &str, content: &[u8]) -> pb_core::Result<PathBuf> {
        let path = self.input_path(extension);
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Read a produced file, returning `None` if the tool did not create it.
    pub async fn read_output(&self, path: &Path) -> pb_core::Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
