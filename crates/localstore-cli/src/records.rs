use std::io::Write;

use color_eyre::{eyre::bail, Result};
use localstore_core::{
    codec::{self, Entry},
    store::Store,
};
use localstore_storage::FileStore;

use crate::cli::Command;

const HEALTH_PROBE_KEY: &str = "localstore.health.probe";

/// Execute a record subcommand against an open store.
pub fn handle(cmd: &Command, store: &FileStore, out: &mut impl Write) -> Result<()> {
    match cmd {
        Command::Set { entry } => {
            match codec::parse_line(entry).map_err(|e| color_eyre::eyre::eyre!("{e}: {entry}"))? {
                Some(Entry::Set { key, value }) => store.put_string(&key, value)?,
                Some(Entry::Remove { key }) => store.remove(&key)?,
                None => bail!("nothing to set"),
            }
            flush_if_deferred(store)?;
        }
        Command::Get { key } => match store.get_string(key) {
            Some(value) => writeln!(out, "{value}")?,
            None => bail!("no value stored for {key}"),
        },
        Command::Ls {
            prefix,
            plain,
            json,
        } => {
            let records = match prefix {
                Some(prefix) => store.to_sorted_map_group(prefix),
                None => store.to_sorted_map(),
            };
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
            } else {
                let table = match prefix {
                    Some(prefix) => store.to_formatted_string_group(prefix, !plain),
                    None => store.to_formatted_string(!plain),
                };
                write!(out, "{table}")?;
            }
        }
        Command::Rm { key } => {
            store.remove(key)?;
            flush_if_deferred(store)?;
        }
        Command::RmGroup { prefix } => {
            let removed = store.remove_group(prefix)?;
            flush_if_deferred(store)?;
            writeln!(out, "Removed {removed} record(s)")?;
        }
        Command::Import { path } => {
            let applied = store.import_file(path)?;
            flush_if_deferred(store)?;
            writeln!(out, "Imported {applied} record(s) from {}", path.display())?;
        }
        Command::Export { path } => {
            store.export_file(path)?;
            writeln!(out, "Exported {} record(s) to {}", store.len(), path.display())?;
        }
        Command::Delete => {
            store.delete_resources()?;
            writeln!(out, "Deleted {}", store.file_path().display())?;
        }
        Command::Health => {
            run_store_health(store)?;
            writeln!(out, "Storage: ok")?;
        }
        Command::Version | Command::Config(_) => {
            bail!("command does not operate on a store")
        }
    }
    Ok(())
}

/// One-shot invocations must not lose writes when save-on-write is off.
fn flush_if_deferred(store: &FileStore) -> Result<()> {
    if !store.save_on_write() {
        store.save()?;
    }
    Ok(())
}

fn run_store_health<S: Store>(store: &S) -> Result<()> {
    let payload = "ok";
    store.put_string(HEALTH_PROBE_KEY, payload.to_string())?;
    let round_trip = store.get_string(HEALTH_PROBE_KEY);
    store.remove(HEALTH_PROBE_KEY)?;

    if round_trip.as_deref() != Some(payload) {
        bail!("storage round-trip failed");
    }
    Ok(())
}
