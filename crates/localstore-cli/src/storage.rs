use color_eyre::Result;
use localstore_storage::{FileStore, StorageKind, StoreBuilder};
use tracing::debug;

use crate::{cli::TargetArgs, config::Config};

pub const DEFAULT_FILENAME: &str = "localstore.ls";

/// Build the store selected by config, with command-line overrides applied.
pub fn store_from_config(config: &Config, target: &TargetArgs) -> Result<FileStore> {
    let builder = builder_from_config(config, target);
    debug!(?builder, "opening store");
    Ok(builder.build()?)
}

fn builder_from_config(config: &Config, target: &TargetArgs) -> StoreBuilder {
    let filename = target
        .file
        .clone()
        .or_else(|| config.filename.clone())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let kind = if target.encrypted || config.encrypted.unwrap_or(false) {
        StorageKind::Encrypted
    } else {
        StorageKind::Plain
    };

    let mut builder =
        StoreBuilder::new(filename, kind).with_save_on_write(config.save_on_write.unwrap_or(true));
    if let Some(storage_id) = target.storage_id.clone().or_else(|| config.storage_id.clone()) {
        builder = builder.with_storage_id(storage_id);
    }
    if let Some(dir) = target.dir.clone().or_else(|| config.directory.clone()) {
        builder = builder.with_directory_path(dir);
    }
    builder
}

/// Helper for tests to construct a plain store rooted at a temp dir.
#[cfg(test)]
pub fn test_store(root: &std::path::Path) -> FileStore {
    StoreBuilder::new("test.ls", StorageKind::Plain)
        .with_directory_path(root)
        .with_save_on_write(true)
        .build()
        .expect("build test store")
}
