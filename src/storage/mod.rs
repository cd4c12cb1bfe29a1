//! Cloud storage backends.
//!
//! The [`backend::CloudStorageBackend`] trait abstracts over the storage
//! management plane and the SAS signing primitive.  [`memory::MemoryBackend`]
//! is the in-process implementation; [`shared_key`] holds the Shared Key
//! signing scheme it uses.

pub mod backend;
pub mod memory;
#[cfg(test)]
pub mod scripted;
pub mod shared_key;
pub mod signature;

pub use backend::{
    AccountOptions, BackendError, BackendResult, CloudStorageBackend, EnsuredAccount,
    SharedKeyCredential,
};
