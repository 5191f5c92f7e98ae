use crate::{
    NamespacedName,
    store::{ObjectStore, StoredKind, is_already_exists, is_conflict, is_not_found},
};
use common::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::*;

/// Owner references of `desired` followed by the ones of `existing` with another uid
pub fn merge_owner_references(desired: &[OwnerReference], existing: &[OwnerReference]) -> Vec<OwnerReference> {
    let mut merged = desired.to_vec();
    for owner in existing {
        if !merged.iter().any(|o| o.uid == owner.uid) {
            merged.push(owner.clone());
        }
    }
    merged
}

/// True when every field set in `desired` holds the same value in `existing`
pub fn is_subset(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(desired), Value::Object(existing)) => desired
            .iter()
            .all(|(key, value)| value.is_null() || existing.get(key).is_some_and(|e| is_subset(value, e))),
        (Value::Array(desired), Value::Array(existing)) => {
            desired.len() == existing.len() && desired.iter().zip(existing).all(|(d, e)| is_subset(d, e))
        }
        (desired, existing) => desired == existing,
    }
}

/// Get-then-create-or-update access to one object kind of the request namespace
pub struct ResourceClient<K: StoredKind> {
    store: Arc<dyn ObjectStore<K>>,
    kind: &'static str,
    already_exists_is_ok: bool,
}

impl<K: StoredKind> Clone for ResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            kind: self.kind,
            already_exists_is_ok: self.already_exists_is_ok,
        }
    }
}

impl<K: StoredKind> ResourceClient<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>, kind: &'static str) -> Self {
        Self {
            store,
            kind,
            already_exists_is_ok: false,
        }
    }

    /// Treat a concurrent creation of the same object as success
    pub fn tolerating_already_exists(mut self) -> Self {
        self.already_exists_is_ok = true;
        self
    }

    pub async fn get(&self, req: &NamespacedName, name: &str) -> Result<Option<K>> {
        match self.store.get(&req.namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&e) => {
                debug!("[{req}] {} {name} not found", self.kind);
                Ok(None)
            }
            Err(e) => Err(Error::UnexpectedKubernetes(
                format!("Failed to get {} {name}", self.kind),
                e,
            )),
        }
    }

    pub async fn list(&self, req: &NamespacedName, label_selector: Option<&str>) -> Result<Vec<K>> {
        self.store
            .list(&req.namespace, label_selector)
            .await
            .map_err(|e| Error::UnexpectedKubernetes(format!("Failed to list {}", self.kind), e))
    }

    pub async fn create(&self, req: &NamespacedName, obj: &K) -> Result<()> {
        let name = obj.name_any();
        info!("[{req}] Create {} {name}", self.kind);
        match self.store.create(&req.namespace, obj).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) && self.already_exists_is_ok => {
                debug!("[{req}] {} {name} already created", self.kind);
                Ok(())
            }
            Err(e) if is_already_exists(&e) || is_conflict(&e) => {
                debug!("[{req}] {} {name} already created. Error: {e}", self.kind);
                Err(Error::Expected(e.to_string()))
            }
            Err(e) => Err(Error::UnexpectedKubernetes(
                format!("Failed to create {} {name}", self.kind),
                e,
            )),
        }
    }

    /// Write `obj` as is; its resource version must be the current one
    pub async fn replace(&self, req: &NamespacedName, obj: &K) -> Result<()> {
        let name = obj.name_any();
        match self.store.replace(&req.namespace, &name, obj).await {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => {
                debug!("[{req}] {} {name} already updated. Error: {e}", self.kind);
                Err(Error::Expected(e.to_string()))
            }
            Err(e) => Err(Error::UnexpectedKubernetes(
                format!("Failed to update {} {name}", self.kind),
                e,
            )),
        }
    }

    /// Move `existing` to `desired`, keeping the server-side version and foreign owners
    pub async fn update(&self, req: &NamespacedName, existing: &K, mut desired: K) -> Result<()> {
        let owners = merge_owner_references(
            desired.meta().owner_references.as_deref().unwrap_or_default(),
            existing.meta().owner_references.as_deref().unwrap_or_default(),
        );
        let meta = desired.meta_mut();
        meta.resource_version = existing.meta().resource_version.clone();
        meta.owner_references = (!owners.is_empty()).then_some(owners);
        if is_subset(&serde_json::to_value(&desired)?, &serde_json::to_value(existing)?) {
            debug!("[{req}] {} {} is up to date", self.kind, desired.name_any());
            return Ok(());
        }
        info!("[{req}] Update {} {}", self.kind, desired.name_any());
        self.replace(req, &desired).await
    }

    pub async fn apply(&self, req: &NamespacedName, desired: K) -> Result<()> {
        match self.get(req, &desired.name_any()).await? {
            Some(existing) => self.update(req, &existing, desired).await,
            None => self.create(req, &desired).await,
        }
    }

    /// Returns whether something was deleted; a missing object is not an error
    pub async fn delete(&self, req: &NamespacedName, name: &str) -> Result<bool> {
        if self.get(req, name).await?.is_none() {
            return Ok(false);
        }
        match self.store.delete(&req.namespace, name).await {
            Ok(()) => {
                info!("[{req}] {} {name} deleted", self.kind);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => {
                debug!("[{req}] {} {name} already deleted", self.kind);
                Ok(false)
            }
            Err(e) => Err(Error::UnexpectedKubernetes(
                format!("Failed to delete {} {name}", self.kind),
                e,
            )),
        }
    }
}
