//! In-memory store with optional JSON persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Endpoint, Microservice, MicroserviceStatus, Version};
use crate::store::{Claim, EndpointStore, MicroserviceStore, StoreError, StoreResult};

/// Everything the store holds; also the on-disk snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    version: Version,
    endpoints: Vec<Endpoint>,
    microservices: Vec<Microservice>,
}

/// A thread-safe store keeping all tables behind one lock.
///
/// One lock makes every trait operation a single atomic step, which is what
/// the registration claim and the generation carry-forward rely on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    persistence_path: Option<String>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            persistence_path,
        }
    }

    /// Load from file if exists.
    pub fn load_from_file(path: &str) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let tables: Tables = serde_json::from_reader(reader)?;
            tracing::info!(
                endpoints = tables.endpoints.len(),
                microservices = tables.microservices.len(),
                version = tables.version.version,
                "Loaded store snapshot"
            );
            *store.write() = tables;
        }
        Ok(store)
    }

    /// Save to file.
    pub fn save_to_file(&self) -> StoreResult<()> {
        if let Some(path) = &self.persistence_path {
            let writer = BufWriter::new(File::create(path)?);
            let tables = self.read();
            serde_json::to_writer(writer, &*tables)?;
            tracing::info!(
                endpoints = tables.endpoints.len(),
                microservices = tables.microservices.len(),
                "Saved store snapshot"
            );
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EndpointStore for MemoryStore {
    async fn current_version(&self) -> StoreResult<Version> {
        Ok(self.read().version.clone())
    }

    async fn bump_version(&self) -> StoreResult<Version> {
        let mut tables = self.write();
        let previous = tables.version.version;
        let next = tables.version.bumped();

        // Rows written under an older reading of the clock are live too.
        for endpoint in tables
            .endpoints
            .iter_mut()
            .filter(|e| e.version <= previous && !e.to_delete)
        {
            endpoint.version = next.version;
        }
        for microservice in tables
            .microservices
            .iter_mut()
            .filter(|m| m.version <= previous)
        {
            microservice.version = next.version;
        }

        tables.version = next.clone();
        Ok(next)
    }

    async fn live_endpoints(&self, version: u64) -> StoreResult<Vec<Endpoint>> {
        Ok(self
            .read()
            .endpoints
            .iter()
            .filter(|e| e.version == version && !e.to_delete)
            .cloned()
            .collect())
    }

    async fn save_endpoint(&self, mut endpoint: Endpoint) -> StoreResult<()> {
        endpoint.updated_at = Utc::now();
        let mut tables = self.write();
        match tables.endpoints.iter_mut().find(|e| e.id == endpoint.id) {
            Some(existing) => *existing = endpoint,
            None => tables.endpoints.push(endpoint),
        }
        Ok(())
    }

    async fn merge_endpoint(&self, mut candidate: Endpoint) -> StoreResult<Endpoint> {
        let now = Utc::now();
        let mut tables = self.write();
        let version = tables.version.version;

        let live = tables
            .endpoints
            .iter()
            .position(|e| {
                e.version == version
                    && !e.to_delete
                    && e.is_route(&candidate.path, &candidate.method)
            });
        if let Some(index) = live {
            let existing = &mut tables.endpoints[index];
            for redirect in candidate.redirects {
                existing.merge_redirect(redirect);
            }
            existing.cache = candidate.cache;
            existing.uncache = candidate.uncache;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        candidate.version = version;
        candidate.to_delete = false;
        candidate.updated_at = now;
        let deleted = tables
            .endpoints
            .iter()
            .position(|e| e.to_delete && e.is_route(&candidate.path, &candidate.method));
        match deleted {
            Some(index) => {
                let revived = &mut tables.endpoints[index];
                candidate.id = revived.id;
                candidate.created_at = revived.created_at;
                *revived = candidate.clone();
            }
            None => tables.endpoints.push(candidate.clone()),
        }
        Ok(candidate)
    }

    async fn detach_redirects(
        &self,
        path: &str,
        method: &str,
        url: &str,
    ) -> StoreResult<Option<Endpoint>> {
        let mut tables = self.write();
        let version = tables.version.version;
        let Some(endpoint) = tables
            .endpoints
            .iter_mut()
            .find(|e| e.version == version && !e.to_delete && e.is_route(path, method))
        else {
            return Ok(None);
        };
        if !endpoint.detach_redirects(url) {
            return Ok(None);
        }
        endpoint.updated_at = Utc::now();
        Ok(Some(endpoint.clone()))
    }

    async fn purge_deleted_endpoints(&self, version: u64) -> StoreResult<usize> {
        let mut tables = self.write();
        let before = tables.endpoints.len();
        tables
            .endpoints
            .retain(|e| !(e.to_delete && e.version <= version));
        Ok(before - tables.endpoints.len())
    }
}

#[async_trait]
impl MicroserviceStore for MemoryStore {
    async fn claim_registration(
        &self,
        candidate: Microservice,
        stale_after: Duration,
    ) -> StoreResult<Claim> {
        let now = Utc::now();
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut tables = self.write();
        let existing = tables
            .microservices
            .iter_mut()
            .find(|m| m.url == candidate.url && m.version == candidate.version);

        match existing {
            Some(existing) => {
                if existing.status == MicroserviceStatus::Pending
                    && now - existing.updated_at < stale_after
                {
                    return Err(StoreError::RegistrationInProgress {
                        url: candidate.url,
                        version: candidate.version,
                    });
                }
                let previous = existing.status;
                existing.status = MicroserviceStatus::Pending;
                existing.name = candidate.name;
                existing.path_info = candidate.path_info;
                existing.path_live = candidate.path_live;
                if !candidate.tags.is_empty() {
                    existing.tags = candidate.tags;
                }
                existing.updated_at = now;
                Ok(Claim::Reclaimed {
                    microservice: existing.clone(),
                    previous,
                })
            }
            None => {
                tables.microservices.push(candidate.clone());
                Ok(Claim::Created(candidate))
            }
        }
    }

    async fn save_microservice(&self, mut microservice: Microservice) -> StoreResult<()> {
        microservice.updated_at = Utc::now();
        let mut tables = self.write();
        match tables
            .microservices
            .iter_mut()
            .find(|m| m.id == microservice.id)
        {
            Some(existing) => *existing = microservice,
            None => tables.microservices.push(microservice),
        }
        Ok(())
    }

    async fn get_microservice(&self, id: Uuid) -> StoreResult<Option<Microservice>> {
        Ok(self.read().microservices.iter().find(|m| m.id == id).cloned())
    }

    async fn microservices(
        &self,
        status: Option<MicroserviceStatus>,
    ) -> StoreResult<Vec<Microservice>> {
        Ok(self
            .read()
            .microservices
            .iter()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect())
    }

    async fn delete_microservice(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.write();
        let before = tables.microservices.len();
        tables.microservices.retain(|m| m.id != id);
        Ok(tables.microservices.len() != before)
    }
}
