//! File-backed storage with optional encryption at rest.
//! Records are kept as `key=value` text; the encrypted kind seals the whole
//! payload with an RSA keypair stored beside the backing file.

pub mod builder;
pub mod crypto_codec;
pub mod directory;
pub mod file_store;
pub mod key_pair;
pub mod registry;

pub use builder::StoreBuilder;
pub use file_store::{FileStore, StorageKind};
pub use registry::StoreRegistry;
