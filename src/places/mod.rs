use crate::identity::{normalize_owner_id, Session};
use crate::map::LatLng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

pub mod store;

use store::{PlaceRepository, StoreError};

pub const UNNAMED_PLACE: &str = "Unnamed place";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploaderInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub picture: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub uploader: UploaderInfo,
}

impl Place {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = UNNAMED_PLACE.to_string();
        }
        if !self.lat.is_finite() {
            self.lat = 0.0;
        }
        if !self.lng.is_finite() {
            self.lng = 0.0;
        }
        self.creator_id = normalize_owner_id(&self.creator_id);
        self
    }
}

/// Form contents of the add-place dialog.
#[derive(Debug, Clone, Default)]
pub struct PlaceDraft {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub location: Option<LatLng>,
    pub initial_comment: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlaceError {
    #[error("please enter a place name and attach an image")]
    MissingNameOrImage,
    #[error("no map coordinate selected, click the map first")]
    MissingLocation,
    #[error("comment is empty")]
    EmptyComment,
    #[error("place {0:?} does not exist")]
    NotFound(PlaceId),
    #[error("only the creator can delete this place")]
    NotOwner,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceSnapshot {
    pub places: Vec<Place>,
    #[serde(default)]
    pub comments: BTreeMap<PlaceId, Vec<String>>,
}

pub fn seed_places() -> Vec<Place> {
    vec![
        Place {
            id: PlaceId(1),
            name: "Old town graffiti wall".to_string(),
            description: "An artsy graffiti wall hidden in a Xiguan alley, great for photos."
                .to_string(),
            lat: 23.1291,
            lng: 113.2644,
            image_url: "https://via.placeholder.com/300x200?text=Guangzhou+Wall".to_string(),
            creator_id: String::new(),
            uploader: UploaderInfo::default(),
        },
        Place {
            id: PlaceId(2),
            name: "Dongshankou coffee lane".to_string(),
            description: "A leafy lane with a few one-of-a-kind coffee shops.".to_string(),
            lat: 23.1257,
            lng: 113.2806,
            image_url: "https://via.placeholder.com/300x200?text=Coffee+Lane".to_string(),
            creator_id: String::new(),
            uploader: UploaderInfo::default(),
        },
    ]
}

/// Ordered place collection plus per-place comments, written through to a repository.
pub struct PlaceStore {
    places: Vec<Place>,
    comments: BTreeMap<PlaceId, Vec<String>>,
    repository: Box<dyn PlaceRepository>,
    last_persist_error: Option<StoreError>,
}

impl PlaceStore {
    /// Loads the collection; a repository failure falls back to the seeds and is returned as a warning.
    pub fn open(repository: Box<dyn PlaceRepository>) -> (Self, Option<StoreError>) {
        let (snapshot, warning) = match repository.load() {
            Ok(Some(snapshot)) => (snapshot, None),
            Ok(None) => (
                PlaceSnapshot {
                    places: seed_places(),
                    comments: BTreeMap::new(),
                },
                None,
            ),
            Err(err) => {
                warn!("failed to load places, using seeds: {err}");
                (
                    PlaceSnapshot {
                        places: seed_places(),
                        comments: BTreeMap::new(),
                    },
                    Some(err),
                )
            }
        };

        let store = Self {
            places: snapshot.places.into_iter().map(Place::normalized).collect(),
            comments: snapshot.comments,
            repository,
            last_persist_error: None,
        };
        (store, warning)
    }

    pub fn list_places(&self) -> &[Place] {
        &self.places
    }

    pub fn get(&self, id: PlaceId) -> Option<&Place> {
        self.places.iter().find(|place| place.id == id)
    }

    pub fn comments(&self, id: PlaceId) -> &[String] {
        self.comments.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_owner(&self, id: PlaceId, session: &Session) -> bool {
        self.get(id)
            .map(|place| place.creator_id == session.owner_id())
            .unwrap_or(false)
    }

    /// Takes the error from the most recent failed write, if any.
    pub fn take_persist_error(&mut self) -> Option<StoreError> {
        self.last_persist_error.take()
    }

    pub fn add_place(&mut self, draft: PlaceDraft, session: &Session) -> Result<Place, PlaceError> {
        if draft.name.trim().is_empty() || draft.image_url.trim().is_empty() {
            return Err(PlaceError::MissingNameOrImage);
        }
        let location = draft
            .location
            .filter(LatLng::is_finite)
            .ok_or(PlaceError::MissingLocation)?;

        let place = Place {
            id: self.next_id(),
            name: draft.name.trim().to_string(),
            description: draft.description.trim().to_string(),
            lat: location.lat,
            lng: location.lng,
            image_url: draft.image_url,
            creator_id: session.owner_id(),
            uploader: session.uploader(),
        };

        let initial_comment = draft.initial_comment.trim();
        let comments = if initial_comment.is_empty() {
            Vec::new()
        } else {
            vec![initial_comment.to_string()]
        };

        self.comments.insert(place.id, comments);
        self.places.push(place.clone());
        info!(place_id = place.id.0, name = %place.name, "place added");
        self.persist();
        Ok(place)
    }

    pub fn delete_place(&mut self, id: PlaceId, session: &Session) -> Result<Place, PlaceError> {
        let index = self
            .places
            .iter()
            .position(|place| place.id == id)
            .ok_or(PlaceError::NotFound(id))?;
        if self.places[index].creator_id != session.owner_id() {
            return Err(PlaceError::NotOwner);
        }

        let removed = self.places.remove(index);
        self.comments.remove(&id);
        info!(place_id = id.0, "place deleted");
        self.persist();
        Ok(removed)
    }

    pub fn add_comment(&mut self, id: PlaceId, text: &str) -> Result<(), PlaceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlaceError::EmptyComment);
        }
        if self.get(id).is_none() {
            return Err(PlaceError::NotFound(id));
        }

        self.comments.entry(id).or_default().push(text.to_string());
        self.persist();
        Ok(())
    }

    fn next_id(&self) -> PlaceId {
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_millis() as u64,
            Err(_) => 0,
        };
        let max = self.places.iter().map(|place| place.id.0).max().unwrap_or(0);
        PlaceId(now.max(max + 1))
    }

    fn persist(&mut self) {
        let snapshot = PlaceSnapshot {
            places: self.places.clone(),
            comments: self.comments.clone(),
        };
        if let Err(err) = self.repository.save(&snapshot) {
            warn!("failed to persist places: {err}");
            self.last_persist_error = Some(err);
        }
    }
}
