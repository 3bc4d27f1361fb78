use crate::places::{Place, PlaceId, PlaceSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown schema_version in {path}: {version}")]
    UnknownSchema { path: PathBuf, version: u32 },
}

/// Persistence collaborator for the place collection.
pub trait PlaceRepository: Send {
    /// `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> Result<Option<PlaceSnapshot>, StoreError>;
    fn save(&self, snapshot: &PlaceSnapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PlaceDocument {
    schema_version: u32,
    places: Vec<Place>,
    #[serde(default)]
    comments: BTreeMap<PlaceId, Vec<String>>,
}

/// One JSON document per region, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFilePlaceRepository {
    path: PathBuf,
}

impl JsonFilePlaceRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn read_document(path: &Path) -> Result<PlaceSnapshot, StoreError> {
    let data = fs::read(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document: PlaceDocument =
        serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if document.schema_version != SCHEMA_VERSION {
        return Err(StoreError::UnknownSchema {
            path: path.to_path_buf(),
            version: document.schema_version,
        });
    }
    Ok(PlaceSnapshot {
        places: document.places,
        comments: document.comments,
    })
}

fn encode_document<T: Serialize>(path: &Path, document: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(document).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes)?;
    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if path.exists() {
                fs::remove_file(path)?;
                fs::rename(&tmp_path, path)
            } else {
                Err(rename_err)
            }
        }
    }
}

impl PlaceRepository for JsonFilePlaceRepository {
    fn load(&self) -> Result<Option<PlaceSnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_document(&self.path).map(Some)
    }

    fn save(&self, snapshot: &PlaceSnapshot) -> Result<(), StoreError> {
        let document = PlaceDocument {
            schema_version: SCHEMA_VERSION,
            places: snapshot.places.clone(),
            comments: snapshot.comments.clone(),
        };
        let bytes = encode_document(&self.path, &document)?;
        write_atomically(&self.path, &bytes).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryPlaceRepository {
    initial: Option<PlaceSnapshot>,
    saved: Arc<Mutex<Option<PlaceSnapshot>>>,
}

#[cfg(test)]
impl MemoryPlaceRepository {
    pub fn with_places(places: Vec<Place>) -> Self {
        Self {
            initial: Some(PlaceSnapshot {
                places,
                comments: BTreeMap::new(),
            }),
            saved: Arc::default(),
        }
    }

    pub fn saved(&self) -> Option<PlaceSnapshot> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
impl PlaceRepository for MemoryPlaceRepository {
    fn load(&self) -> Result<Option<PlaceSnapshot>, StoreError> {
        Ok(self.saved().or_else(|| self.initial.clone()))
    }

    fn save(&self, snapshot: &PlaceSnapshot) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.saved.lock() {
            *guard = Some(snapshot.clone());
        }
        Ok(())
    }
}
