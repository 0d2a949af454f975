/*
 * The contents of this file are subject to the terms of the
 * Common Development and Distribution License, Version 1.0 only
 * (the "License").  You may not use this file except in compliance
 * with the License.
 *
 * See the file LICENSE in this distribution for details.
 * A copy of the CDDL is also available via the Internet at
 * http://www.opensource.org/licenses/cddl1.txt
 *
 * When distributing Covered Code, include this CDDL HEADER in each
 * file and include the contents of the LICENSE file from this
 * distribution.
 */

// Replay Downloader
// - ledger.rs file -

use crate::rendition::Quality;
use crate::unit::{AvailableUnit, SavedUnit, UnitKey};

use log::{debug, info};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed sidecar {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode the sidecar for {key}: {source}")]
    Encode {
        key: UnitKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("{first} and {second} both describe {key}")]
    DuplicateKey {
        key: UnitKey,
        first: PathBuf,
        second: PathBuf,
    },
}

#[derive(Debug)]
struct Entry {
    unit: SavedUnit,
    path: PathBuf,
}

/// Every unit already handled, one JSON sidecar per unit on disk.
///
/// A sidecar's presence is the only source of truth: the ledger is rebuilt
/// from the directory whenever the crawl needs a fresh view, and every
/// record is written through immediately.
#[derive(Debug)]
pub struct Ledger {
    dir: PathBuf,
    units: BTreeMap<UnitKey, Entry>,
}

impl Ledger {
    /// Reads every `*.json` file of `dir`. Any unreadable or unparsable
    /// sidecar fails the whole load.
    pub fn load(dir: &Path) -> Result<Self, LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut units: BTreeMap<UnitKey, Entry> = BTreeMap::new();
        for path in paths {
            let text = fs::read_to_string(&path).map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;
            let unit: SavedUnit =
                serde_json::from_str(&text).map_err(|source| LedgerError::Malformed {
                    path: path.clone(),
                    source,
                })?;

            let key = unit.key();
            if let Some(existing) = units.get(&key) {
                return Err(LedgerError::DuplicateKey {
                    key,
                    first: existing.path.clone(),
                    second: path,
                });
            }
            units.insert(key, Entry { unit, path });
        }

        debug!("loaded {} sidecars from {}", units.len(), dir.display());
        Ok(Ledger {
            dir: dir.to_path_buf(),
            units,
        })
    }

    /// Drops the in-memory view and reads the directory again.
    pub fn reload(&mut self) -> Result<(), LedgerError> {
        *self = Ledger::load(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn get(&self, key: &UnitKey) -> Option<&SavedUnit> {
        self.units.get(key).map(|e| &e.unit)
    }

    pub fn all(&self) -> impl Iterator<Item = &SavedUnit> {
        self.units.values().map(|e| &e.unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn video_path(&self, unit: &AvailableUnit) -> PathBuf {
        self.dir.join(unit.video_filename())
    }

    pub fn sidecar_path(&self, unit: &AvailableUnit) -> PathBuf {
        self.dir.join(unit.sidecar_filename())
    }

    pub fn record_downloaded(
        &mut self,
        unit: &AvailableUnit,
        filename: String,
        quality: Quality,
    ) -> Result<&SavedUnit, LedgerError> {
        info!("saved {} as {}", unit.key(), filename);
        self.write(unit, SavedUnit::downloaded(unit, filename, quality))
    }

    pub fn record_unavailable(&mut self, unit: &AvailableUnit) -> Result<&SavedUnit, LedgerError> {
        info!("marking {} as unavailable", unit.key());
        self.write(unit, SavedUnit::unavailable(unit))
    }

    fn write(&mut self, unit: &AvailableUnit, saved: SavedUnit) -> Result<&SavedUnit, LedgerError> {
        let key = saved.key();

        // Overwrite whichever file already holds this key so the directory
        // never ends up with two sidecars for one unit.
        let path = match self.units.get(&key) {
            Some(entry) => entry.path.clone(),
            None => self.sidecar_path(unit),
        };

        let text = serde_json::to_string_pretty(&saved).map_err(|source| LedgerError::Encode {
            key: key.clone(),
            source,
        })?;

        let partial = path.with_extension("json.part");
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };
        fs::write(&partial, text).map_err(io_err)?;
        fs::rename(&partial, &path).map_err(io_err)?;

        let entry = self.units.entry(key).or_insert(Entry {
            unit: saved.clone(),
            path: path.clone(),
        });
        entry.unit = saved;
        Ok(&entry.unit)
    }
}
