//! Test backend wrapping [`MemoryBackend`] with scripted behavior.
//!
//! It can report "already exists" from `ensure_storage_account`, and it can
//! park `create_container` after the container exists until released.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use super::backend::{
    AccountOptions, BackendError, BackendResult, CloudStorageBackend, EnsuredAccount,
    SharedKeyCredential,
};
use super::memory::MemoryBackend;
use super::signature::SasSignatureValues;

pub struct ScriptedBackend {
    pub inner: Arc<MemoryBackend>,
    ensure_already_exists: AtomicBool,
    pause_create_container: AtomicBool,
    /// Signalled once a paused `create_container` has created the container.
    pub container_created: Notify,
    /// Lets a paused `create_container` return.
    pub release_create: Notify,
}

impl ScriptedBackend {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            ensure_already_exists: AtomicBool::new(false),
            pause_create_container: AtomicBool::new(false),
            container_created: Notify::new(),
            release_create: Notify::new(),
        }
    }

    pub fn ensure_reports_already_exists(&self) {
        self.ensure_already_exists.store(true, Ordering::SeqCst);
    }

    pub fn pause_create_container(&self) {
        self.pause_create_container.store(true, Ordering::SeqCst);
    }
}

impl CloudStorageBackend for ScriptedBackend {
    fn ensure_storage_account(
        &self,
        options: &AccountOptions,
    ) -> Pin<Box<dyn Future<Output = BackendResult<EnsuredAccount>> + Send + '_>> {
        if self.ensure_already_exists.load(Ordering::SeqCst) {
            let resource = format!("storage account {}", options.name);
            return Box::pin(async move { Err(BackendError::AlreadyExists { resource }) });
        }
        self.inner.ensure_storage_account(options)
    }

    fn create_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
        metadata: &HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        let created = self.inner.create_container(account, key, name, metadata);
        Box::pin(async move {
            let url = created.await?;
            if self.pause_create_container.load(Ordering::SeqCst) {
                self.container_created.notify_one();
                self.release_create.notified().await;
            }
            Ok(url)
        })
    }

    fn delete_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        self.inner.delete_container(account, key, name)
    }

    fn delete_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        self.inner
            .delete_storage_account(subscription_id, resource_group, name)
    }

    fn get_access_key(
        &self,
        subscription_id: &str,
        account: &str,
        resource_group: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        self.inner
            .get_access_key(subscription_id, account, resource_group)
    }

    fn tag_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        account: &str,
        tags: &BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        self.inner
            .tag_storage_account(subscription_id, resource_group, account, tags)
    }

    fn sign_sas(
        &self,
        credential: &SharedKeyCredential,
        values: &SasSignatureValues,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        self.inner.sign_sas(credential, values)
    }

    fn account_url(&self, account: &str) -> String {
        self.inner.account_url(account)
    }
}
