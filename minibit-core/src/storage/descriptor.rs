//! Shared piece-count descriptor published by the origin agent

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use super::StorageError;
use crate::retry::RetryPolicy;

/// Text file holding the number of pieces in the swarm.
///
/// Written once by the origin, read by every other agent before it can rank
/// pieces. Publishing goes through a temporary file so readers never see a
/// partial value.
#[derive(Debug, Clone)]
pub struct PieceCountDescriptor {
    path: PathBuf,
}

impl PieceCountDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the piece count.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the descriptor cannot be written
    pub async fn publish(&self, total: u32) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, total.to_string()).await?;
        fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Published piece count {} to {}", total, self.path.display());
        Ok(())
    }

    /// Reads the piece count once.
    ///
    /// # Errors
    ///
    /// - `StorageError::DescriptorMissing` - If nothing has been published yet
    /// - `StorageError::InvalidDescriptor` - If the content is not a positive integer
    /// - `StorageError::Io` - If reading failed
    pub async fn read(&self) -> Result<u32, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::DescriptorMissing {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        match content.trim().parse::<u32>() {
            Ok(total) if total > 0 => Ok(total),
            _ => Err(StorageError::InvalidDescriptor {
                path: self.path.clone(),
                content,
            }),
        }
    }

    /// Polls for the piece count under a bounded retry policy.
    ///
    /// # Errors
    ///
    /// Returns the last read error once every attempt has failed.
    pub async fn wait_for(&self, policy: RetryPolicy) -> Result<u32, StorageError> {
        policy.run("Reading piece count", || self.read()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_publish_then_read() {
        let dir = TempDir::new().unwrap();
        let descriptor = PieceCountDescriptor::new(dir.path().join("piece_count"));

        descriptor.publish(20).await.unwrap();
        assert_eq!(descriptor.read().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_descriptor() {
        let dir = TempDir::new().unwrap();
        let descriptor = PieceCountDescriptor::new(dir.path().join("piece_count"));

        assert!(matches!(
            descriptor.read().await,
            Err(StorageError::DescriptorMissing { .. })
        ));

        std::fs::write(descriptor.path(), "twenty").unwrap();
        assert!(matches!(
            descriptor.read().await,
            Err(StorageError::InvalidDescriptor { .. })
        ));

        std::fs::write(descriptor.path(), "0").unwrap();
        assert!(descriptor.read().await.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_sees_late_publication() {
        let dir = TempDir::new().unwrap();
        let descriptor = PieceCountDescriptor::new(dir.path().join("piece_count"));
        let publisher = descriptor.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            publisher.publish(8).await.unwrap();
        });

        let policy = RetryPolicy::new(50, Duration::from_millis(10));
        assert_eq!(descriptor.wait_for(policy).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_wait_for_gives_up() {
        let dir = TempDir::new().unwrap();
        let descriptor = PieceCountDescriptor::new(dir.path().join("never_written"));

        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert!(matches!(
            descriptor.wait_for(policy).await,
            Err(StorageError::DescriptorMissing { .. })
        ));
    }
}
