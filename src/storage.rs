//! Named blob storage
//!
//! Tiles, settings and the remembered endpoint are each one named text blob.
//! `DirStore` keeps them as files in the config directory, `MemoryStore`
//! keeps them in memory (tests, `--ephemeral`).

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read/write access to named blobs of text
pub trait BlobStore {
    /// Read a blob. `Ok(None)` means it was never written.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Replace a blob in one step
    fn write(&self, name: &str, contents: &str) -> Result<()>;
}

/// Blobs stored as files inside one directory
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Use (and create) the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create data directory {:?}", dir))?;
            info!("Created data directory: {:?}", dir);
        }
        Ok(Self { dir })
    }

    /// `~/.config/touchpad-remote` (or the platform equivalent)
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("touchpad-remote");
        Self::new(config_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl BlobStore for DirStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        debug!("Read {} bytes from {:?}", content.len(), path);
        Ok(Some(content))
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.path_for(name);
        // Write beside the target, then rename over it, so readers never see
        // a half-written file.
        let staging = self.dir.join(format!(".{}.tmp", name));
        fs::write(&staging, contents)
            .with_context(|| format!("Failed to write {:?}", staging))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to replace {:?}", path))?;
        debug!("Wrote {} bytes to {:?}", contents.len(), path);
        Ok(())
    }
}

/// Blobs kept in memory for the life of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.blobs.borrow().get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.blobs
            .borrow_mut()
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }
}
