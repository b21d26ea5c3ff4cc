//! Dynamic form engine
//!
//! Templates define typed fields; employees are instances of a template that
//! hold at most one value per field. Every employee mutation is written with
//! its audit entry in one store call.
//!
//! The engine depends on three capabilities it does not implement itself:
//! a [`Store`], a [`CredentialHasher`] and a [`Clock`]. Uploaded files go
//! through a [`FileStorage`].

pub mod audit;
pub mod credentials;
pub mod employees;
pub mod error;
pub mod field_types;
pub mod files;
pub mod search;
pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::Store;

pub use audit::{AuditFilter, RequestMeta};
pub use credentials::{Argon2Hasher, CredentialHasher, Principal};
pub use employees::{Actor, EmployeeRecord};
pub use error::{EngineError, EngineResult};
pub use files::{FileStorage, LocalFileStorage, StoredFile};
pub use search::SearchParams;

/// Source of timestamps for every row the engine writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    hasher: Arc<dyn CredentialHasher>,
    files: Arc<dyn FileStorage>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: Arc<dyn CredentialHasher>,
        files: Arc<dyn FileStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            files,
            clock,
        }
    }

    pub fn hasher(&self) -> &dyn CredentialHasher {
        self.hasher.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist an uploaded file; the returned locator is a valid `file` value.
    pub async fn store_file(&self, bytes: &[u8], suggested_name: &str) -> EngineResult<StoredFile> {
        Ok(self.files.store(bytes, suggested_name).await?)
    }
}
