use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use localstore_core::{codec, store::Store, table, Result, StoreError};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::{crypto_codec::CryptoCodec, directory::DirectoryResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Records are written as plain text.
    Plain,
    /// The serialized records are sealed with the storage's RSA keypair.
    Encrypted,
}

/// File-backed record store.
///
/// Records live in a concurrent map; persistence serializes them sorted by
/// key and, for the encrypted kind, seals the payload before replacing the
/// backing file. With save-on-write every mutation persists before it
/// returns.
pub struct FileStore {
    filename: String,
    resolver: DirectoryResolver,
    dir: PathBuf,
    save_on_write: bool,
    data: DashMap<String, String>,
    crypto: Option<CryptoCodec>,
    saves: AtomicU64,
}

impl FileStore {
    /// Builds the store and eagerly loads an existing backing file.
    /// Load failures are logged and leave the store empty.
    pub(crate) fn open(
        filename: String,
        resolver: DirectoryResolver,
        dir: PathBuf,
        save_on_write: bool,
        crypto: Option<CryptoCodec>,
    ) -> Self {
        let store = Self {
            filename,
            resolver,
            dir,
            save_on_write,
            data: DashMap::new(),
            crypto,
            saves: AtomicU64::new(0),
        };

        let path = store.file_path();
        if path.exists() {
            if let Err(err) = store.load() {
                warn!(
                    file = %path.display(),
                    error = %err,
                    "failed to load storage file, starting empty"
                );
            }
        }
        store
    }

    pub fn kind(&self) -> StorageKind {
        match self.crypto {
            Some(_) => StorageKind::Encrypted,
            None => StorageKind::Plain,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn storage_id(&self) -> &str {
        self.resolver.storage_id()
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    pub fn save_on_write(&self) -> bool {
        self.save_on_write
    }

    pub fn crypto(&self) -> Option<&CryptoCodec> {
        self.crypto.as_ref()
    }

    /// Merges the backing file into memory. A missing file is not an error.
    #[instrument(skip_all, fields(file = %self.filename))]
    pub fn load(&self) -> Result<()> {
        let path = self.file_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "no storage file yet");
                return Ok(());
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };

        let source = self.decode(&path, &bytes)?;
        codec::apply(codec::parse(&source)?, &self.data);
        debug!(records = self.data.len(), "loaded storage file");
        Ok(())
    }

    /// Replaces the backing file with the current records.
    #[instrument(skip_all, fields(file = %self.filename))]
    pub fn save(&self) -> Result<()> {
        let payload = codec::stringify(&self.to_sorted_map());
        self.write_payload(&self.file_path(), &payload)?;
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Applies a record-format buffer. The whole buffer is validated before
    /// any line takes effect.
    #[instrument(skip_all, fields(file = %self.filename))]
    pub fn parse(&self, source: &str) -> Result<()> {
        let entries = codec::parse(source)?;
        codec::apply(entries, &self.data);
        self.persist_if_needed()
    }

    /// Merges a map, persisting once. Nothing is inserted if any record is
    /// rejected.
    pub fn put_all<I, K, V>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let records: Vec<(String, String)> = records
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        for (key, value) in &records {
            codec::check_record(key, value)?;
        }
        for (key, value) in records {
            self.data.insert(key, value);
        }
        self.persist_if_needed()
    }

    /// Removes every record whose key starts with `prefix`, persisting once.
    /// Returns how many records were removed.
    #[instrument(skip(self), fields(file = %self.filename))]
    pub fn remove_group(&self, prefix: &str) -> Result<usize> {
        let keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        let removed = keys
            .iter()
            .filter(|key| self.data.remove(key.as_str()).is_some())
            .count();

        if removed > 0 {
            self.persist_if_needed()?;
        }
        Ok(removed)
    }

    pub fn export_into(&self, target: &mut HashMap<String, String>) {
        target.extend(
            self.data
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone())),
        );
    }

    /// Merges a record file written by a store of the same kind.
    /// Returns the number of lines applied.
    #[instrument(skip_all, fields(file = %self.filename, from = %path.as_ref().display()))]
    pub fn import_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let source = self.decode(path, &bytes)?;
        let entries = codec::parse(&source)?;
        let count = entries.len();
        codec::apply(entries, &self.data);
        self.persist_if_needed()?;
        Ok(count)
    }

    /// Writes all records to `path` in this store's on-disk form.
    #[instrument(skip_all, fields(file = %self.filename, to = %path.as_ref().display()))]
    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let payload = codec::stringify(&self.to_sorted_map());
        self.write_payload(path.as_ref(), &payload)
    }

    pub fn to_sorted_map(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn to_sorted_map_group(&self, prefix: &str) -> BTreeMap<String, String> {
        self.data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn stringify(&self) -> String {
        codec::stringify(&self.to_sorted_map())
    }

    pub fn stringify_group(&self, prefix: &str) -> String {
        codec::stringify_group(&self.to_sorted_map(), prefix)
    }

    pub fn to_formatted_string(&self, decorated: bool) -> String {
        table::render(&self.to_sorted_map(), decorated)
    }

    pub fn to_formatted_string_group(&self, prefix: &str, decorated: bool) -> String {
        table::render(&self.to_sorted_map_group(prefix), decorated)
    }

    /// Clears memory and removes the backing file, key files (encrypted
    /// kind), and the storage directory when nothing else is left in it.
    #[instrument(skip_all, fields(file = %self.filename))]
    pub fn delete_resources(&self) -> Result<()> {
        self.data.clear();

        let path = self.file_path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(&path, err)),
        }
        if let Some(crypto) = &self.crypto {
            crypto.keys().delete()?;
        }
        self.resolver.remove_if_empty()?;
        Ok(())
    }

    fn persist_if_needed(&self) -> Result<()> {
        if self.save_on_write {
            self.save()
        } else {
            Ok(())
        }
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<String> {
        match &self.crypto {
            Some(crypto) => {
                if !crypto.keys().key_pair_exists() {
                    return Err(StoreError::KeyPairMissing {
                        dir: self.dir.clone(),
                    });
                }
                crypto.decrypt(bytes)
            }
            None => String::from_utf8(bytes.to_vec())
                .map_err(|e| StoreError::io(path, io::Error::new(ErrorKind::InvalidData, e))),
        }
    }

    fn write_payload(&self, path: &Path, payload: &str) -> Result<()> {
        let bytes = match &self.crypto {
            Some(crypto) => crypto.encrypt(payload)?,
            None => payload.as_bytes().to_vec(),
        };
        write_atomic(path, &bytes)
    }

    #[cfg(test)]
    fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("file", &self.file_path())
            .field("kind", &self.kind())
            .field("save_on_write", &self.save_on_write)
            .field("records", &self.data.len())
            .finish()
    }
}

impl Store for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| v.value().clone())
    }

    #[instrument(skip(self, value), fields(file = %self.filename))]
    fn put_string(&self, key: &str, value: String) -> Result<()> {
        codec::check_record(key, &value)?;
        self.data.insert(key.to_string(), value);
        self.persist_if_needed()
    }

    #[instrument(skip(self), fields(file = %self.filename))]
    fn remove(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        self.persist_if_needed()
    }

    fn clear(&self) -> Result<()> {
        self.data.clear();
        self.persist_if_needed()
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.to_sorted_map()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Whole-file replace through a temp file in the target directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}
