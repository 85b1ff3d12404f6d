//! The FileSink interface: where generated artifacts land on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait FileSink: Send + Sync {
    async fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()>;
    async fn copy(&self, src: &Path, dst: &Path) -> anyhow::Result<()>;
    async fn remove(&self, path: &Path) -> anyhow::Result<()>;
    async fn mkdir(&self, path: &Path) -> anyhow::Result<()>;
}

/// Writes relative to a project root using `tokio::fs`, creating parent
/// directories as needed.
pub struct LocalFileSink {
    pub root: PathBuf,
}

impl LocalFileSink {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FileSink for LocalFileSink {
    async fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full, bytes).await?;
        Ok(())
    }

    async fn copy(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        let full_dst = self.resolve(dst);
        if let Some(parent) = full_dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(self.resolve(src), full_dst).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        let full = self.resolve(path);
        if full.is_dir() {
            tokio::fs::remove_dir_all(full).await?;
        } else {
            tokio::fs::remove_file(full).await?;
        }
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let sink = LocalFileSink::new(dir.path().to_path_buf());
        sink.write(Path::new("a/b/c.txt"), b"hello").await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("a/b/c.txt")).await.unwrap();
        assert_eq!(contents, "hello");
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let sink = LocalFileSink::new(dir.path().to_path_buf());
        sink.write(Path::new("x.txt"), b"data").await.unwrap();
        sink.remove(Path::new("x.txt")).await.unwrap();
        assert!(!dir.path().join("x.txt").exists());
    }
}
