//! File storage capability
//!
//! A stored file is referred to by a relative locator such as
//! `employee_files/3f0c..._contract.pdf`; that locator is what a `file`
//! field value holds.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

pub const FILE_PREFIX: &str = "employee_files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub locator: String,
    pub file_name: String,
    pub size: u64,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> std::io::Result<StoredFile>;
}

/// Writes files beneath a root directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store(&self, bytes: &[u8], suggested_name: &str) -> std::io::Result<StoredFile> {
        let file_name = sanitize_filename(suggested_name);
        let locator = format!("{}/{}_{}", FILE_PREFIX, Uuid::new_v4(), file_name);

        let dir = self.root.join(FILE_PREFIX);
        fs::create_dir_all(&dir).await?;

        let path = self.root.join(&locator);
        if !path.starts_with(&dir) {
            tracing::error!("Path traversal attempt detected: {:?} escapes {:?}", path, dir);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid filename",
            ));
        }

        fs::write(&path, bytes).await?;
        tracing::debug!("Stored {} bytes at {:?}", bytes.len(), path);

        Ok(StoredFile {
            locator,
            file_name,
            size: bytes.len() as u64,
        })
    }
}

/// Reduce a client-supplied name to a safe basename.
pub fn sanitize_filename(filename: &str) -> String {
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // No hidden files, no "..pdf"
    let sanitized = sanitized.trim_start_matches('.').trim_matches('_');

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}
