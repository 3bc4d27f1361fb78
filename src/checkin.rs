use crate::chat::client::ChatClient;
use crate::chat::transcript::{classify_document, ChatError, ChatTranscript, DocumentKind, Outgoing};
use crate::chat::ChatMode;
use crate::config::{AppConfig, Region};
use crate::event::AppEvent;
use crate::identity::accounts::AccountTable;
use crate::identity::google::decode_id_token;
use crate::identity::{Identity, IdentityError, Session};
use crate::map::canvas::{MapCanvas, MapInteraction};
use crate::map::jump::JumpDispatcher;
use crate::map::reconcile::MarkerReconciler;
use crate::map::{LatLng, MapSurface, MarkerKind};
use crate::places::store::{JsonFilePlaceRepository, StoreError};
use crate::places::{Place, PlaceDraft, PlaceId, PlaceStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Must be acknowledged before the user continues.
    Alert,
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

fn image_mime(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Encodes an image file as a `data:` URL for the place record.
pub fn image_data_url(file_name: &str, bytes: &[u8]) -> Option<String> {
    let mime = image_mime(file_name)?;
    Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Everything one signed-in map session owns: places, markers, jumps, chat and identity.
///
/// Lives on the UI thread. Async work is handed to the runtime and comes back
/// through [`Checkin::handle_event`].
pub struct Checkin {
    config: AppConfig,
    region: Region,
    region_epoch: u64,
    session: Session,
    accounts: AccountTable,
    places: PlaceStore,
    reconciler: MarkerReconciler,
    jumper: JumpDispatcher,
    transcript: ChatTranscript,
    map: MapCanvas,
    chat: ChatClient,
    runtime_handle: Handle,
    tx: mpsc::Sender<AppEvent>,
    selected: Option<PlaceId>,
    pending_location: Option<LatLng>,
    markers_dirty: bool,
    notices: VecDeque<Notice>,
}

impl Checkin {
    pub fn open(
        config: AppConfig,
        region: Region,
        session: Session,
        chat: ChatClient,
        runtime_handle: Handle,
        tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        let region_epoch = 0;
        let jumper = JumpDispatcher::new(
            region.geocoder(&config),
            runtime_handle.clone(),
            tx.clone(),
            region_epoch,
        );
        let (places, warning) = PlaceStore::open(Box::new(JsonFilePlaceRepository::new(
            config.places_path(region),
        )));
        let mut checkin = Self {
            accounts: AccountTable::new(config.accounts_path()),
            places,
            region,
            region_epoch,
            session,
            reconciler: MarkerReconciler::new(),
            jumper,
            transcript: ChatTranscript::new(region.greeting()),
            map: MapCanvas::default(),
            chat,
            runtime_handle,
            tx,
            selected: None,
            pending_location: None,
            markers_dirty: true,
            notices: VecDeque::new(),
            config,
        };
        if let Some(err) = warning {
            checkin.report_load_failure(err);
        }
        if let Some(location) = checkin.config.location {
            checkin.map.pan_to(location);
        }
        checkin.chat.start_peer_feed();
        info!(region = %region, owner = %checkin.session.owner_id(), "check-in session opened");
        checkin
    }

    fn load_places(&mut self) {
        let repository = JsonFilePlaceRepository::new(self.config.places_path(self.region));
        let (places, warning) = PlaceStore::open(Box::new(repository));
        self.places = places;
        if let Some(err) = warning {
            self.report_load_failure(err);
        }
        self.markers_dirty = true;
    }

    fn report_load_failure(&mut self, err: StoreError) {
        self.toast(format!("Saved places could not be read, showing defaults: {err}"));
    }

    fn alert(&mut self, text: impl Into<String>) {
        self.notices.push_back(Notice {
            kind: NoticeKind::Alert,
            text: text.into(),
        });
    }

    fn toast(&mut self, text: impl Into<String>) {
        self.notices.push_back(Notice {
            kind: NoticeKind::Toast,
            text: text.into(),
        });
    }

    fn report_persist_failure(&mut self) {
        if let Some(err) = self.places.take_persist_error() {
            self.toast(format!("Changes are kept for this session but were not saved: {err}"));
        }
    }

    pub fn pop_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn places(&self) -> &[Place] {
        self.places.list_places()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn map_mut(&mut self) -> &mut MapCanvas {
        &mut self.map
    }

    pub fn pending_location(&self) -> Option<LatLng> {
        self.pending_location
    }

    pub fn cancel_pending_place(&mut self) {
        self.pending_location = None;
    }

    /// Rebuilds the place markers when something changed since the last frame.
    pub fn sync_markers(&mut self) {
        if !self.markers_dirty {
            return;
        }
        self.reconciler.reconcile(
            self.places.list_places(),
            &mut self.map,
            self.config.location,
        );
        self.markers_dirty = false;
    }

    pub fn handle_map_interaction(&mut self, interaction: MapInteraction) {
        match interaction {
            MapInteraction::Clicked(location) => {
                debug!(lat = location.lat, lng = location.lng, "map clicked");
                self.pending_location = Some(location);
            }
            MapInteraction::MarkerClicked(MarkerKind::Place(id)) => self.select_place(id),
            MapInteraction::MarkerClicked(MarkerKind::UserLocation | MarkerKind::Jump) => {}
        }
    }

    pub fn jump_to(&mut self, address: &str) {
        if let Err(err) = self.jumper.jump_to(&mut self.map, address) {
            self.alert(err.to_string());
        }
    }

    /// Recentres the map on the configured location fix.
    pub fn center_on_user(&mut self) -> bool {
        match self.config.location {
            Some(location) => {
                self.map.pan_to(location);
                true
            }
            None => {
                self.toast("Your location is unknown, set DAKA_LOCATION to \"lat,lng\"");
                false
            }
        }
    }

    pub fn select_place(&mut self, id: PlaceId) {
        if self.places.get(id).is_some() {
            self.selected = Some(id);
        }
    }

    /// Selects a place from the list and centres the map on it.
    pub fn focus_place(&mut self, id: PlaceId) {
        if let Some(position) = self.places.get(id).map(Place::position) {
            self.selected = Some(id);
            self.map.pan_to(position);
        }
    }

    pub fn close_place(&mut self) {
        self.selected = None;
    }

    pub fn selected_place(&self) -> Option<&Place> {
        self.selected.and_then(|id| self.places.get(id))
    }

    pub fn comments(&self, id: PlaceId) -> &[String] {
        self.places.comments(id)
    }

    pub fn can_delete(&self, id: PlaceId) -> bool {
        self.places.is_owner(id, &self.session)
    }

    /// Saves the add-place form. The coordinate defaults to the last map click.
    /// Returns `false` when the form should stay open.
    pub fn submit_place(&mut self, mut draft: PlaceDraft) -> bool {
        draft.location = draft.location.or(self.pending_location);
        match self.places.add_place(draft, &self.session) {
            Ok(place) => {
                self.pending_location = None;
                self.markers_dirty = true;
                self.toast(format!("Checked in at {}", place.name));
                self.report_persist_failure();
                true
            }
            Err(err) => {
                self.alert(err.to_string());
                false
            }
        }
    }

    pub fn delete_place(&mut self, id: PlaceId) {
        match self.places.delete_place(id, &self.session) {
            Ok(_) => {
                if self.selected == Some(id) {
                    self.selected = None;
                }
                self.markers_dirty = true;
                self.report_persist_failure();
            }
            Err(err) => self.alert(err.to_string()),
        }
    }

    pub fn add_comment(&mut self, id: PlaceId, text: &str) -> bool {
        match self.places.add_comment(id, text) {
            Ok(()) => {
                self.report_persist_failure();
                true
            }
            Err(err) => {
                self.alert(err.to_string());
                false
            }
        }
    }

    /// Reads an image from disk into a data URL for the add-place form.
    pub fn load_image(&mut self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_string_lossy().to_string();
        if image_mime(&file_name).is_none() {
            self.alert("Please pick a PNG, JPEG, GIF or WebP image");
            return None;
        }
        match fs::read(path) {
            Ok(bytes) => image_data_url(&file_name, &bytes),
            Err(err) => {
                warn!("failed to read image {}: {err}", path.display());
                self.alert(format!("Could not read {file_name}: {err}"));
                None
            }
        }
    }

    pub fn set_chat_mode(&mut self, mode: ChatMode) {
        self.transcript.set_mode(mode);
    }

    pub fn set_peer_target(&mut self, target: &str) {
        self.transcript.set_peer_target(target);
    }

    /// Sends the composer text. Returns `true` when the input was consumed.
    pub fn send_chat(&mut self, text: &str) -> bool {
        let sender = match self.transcript.mode() {
            ChatMode::Assistant => self.session.display_name().to_string(),
            ChatMode::Peer => self.session.owner_id(),
        };
        match self.transcript.submit(text, &sender, self.config.location) {
            Ok(Outgoing::Completion(request)) => {
                self.chat.request_reply(self.transcript.epoch(), request);
                true
            }
            Ok(Outgoing::Peer(message)) => {
                self.chat.deliver(message);
                true
            }
            Err(ChatError::EmptyMessage) => false,
            Err(err) => {
                self.alert(err.to_string());
                false
            }
        }
    }

    pub fn upload_document(&mut self, path: &Path) {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let kind = classify_document(path);
        let content = if kind == DocumentKind::PlainText {
            match fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    self.alert(format!("Could not read {file_name}: {err}"));
                    return;
                }
            }
        } else {
            String::new()
        };

        let sender = self.session.display_name().to_string();
        match self
            .transcript
            .submit_document(&file_name, kind, &content, &sender)
        {
            Ok(request) => self.chat.request_reply(self.transcript.epoch(), request),
            Err(err) => self.alert(err.to_string()),
        }
    }

    pub fn clear_chat(&mut self) {
        self.transcript.clear();
    }

    pub fn peer_identity(&self) -> String {
        self.session.owner_id()
    }

    fn require_sign_in_support(&mut self) -> bool {
        if self.region.supports_sign_in() {
            return true;
        }
        self.alert(format!("Sign-in is not available in the {} region", self.region));
        false
    }

    fn finish_sign_in(&mut self, result: Result<Identity, IdentityError>) -> bool {
        match result {
            Ok(identity) => {
                self.session.sign_in(identity);
                info!(owner = %self.session.owner_id(), "signed in");
                true
            }
            Err(err) => {
                self.alert(err.to_string());
                false
            }
        }
    }

    pub fn login(&mut self, username: &str, password: &str) -> bool {
        if !self.require_sign_in_support() {
            return false;
        }
        let result = self.accounts.login(username, password);
        self.finish_sign_in(result)
    }

    pub fn register(&mut self, username: &str, password: &str) -> bool {
        if !self.require_sign_in_support() {
            return false;
        }
        match self.accounts.register(username, password) {
            Ok(()) => {
                self.toast("Registered, you can sign in now");
                true
            }
            Err(err) => {
                self.alert(err.to_string());
                false
            }
        }
    }

    pub fn sign_in_with_google(&mut self, id_token: &str) -> bool {
        if !self.require_sign_in_support() {
            return false;
        }
        let result = decode_id_token(id_token).map(Identity::Google);
        self.finish_sign_in(result)
    }

    pub fn sign_out(&mut self) {
        self.session.sign_out();
        self.selected = None;
        info!("signed out");
    }

    /// Swaps the region's place collection, geocoder and greeting. In-flight
    /// replies and lookups from the previous region are discarded on arrival.
    pub fn switch_region(&mut self, region: Region) {
        if region == self.region {
            return;
        }
        self.jumper.clear(&mut self.map);
        self.reconciler.teardown(&mut self.map);
        self.region = region;
        self.region_epoch += 1;
        self.jumper = JumpDispatcher::new(
            region.geocoder(&self.config),
            self.runtime_handle.clone(),
            self.tx.clone(),
            self.region_epoch,
        );
        if !region.supports_sign_in() {
            self.session.sign_out();
        }
        self.transcript.restart(region.greeting());
        self.selected = None;
        self.pending_location = None;
        self.load_places();
        info!(region = %region, "region switched");
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::AssistantReply { epoch, text } => {
                if let Some(directive) = self.transcript.push_reply(epoch, text) {
                    debug!(address = %directive.address, "assistant requested a map jump");
                    self.jump_to(&directive.address);
                }
            }
            AppEvent::GeocodeFinished {
                epoch,
                address,
                outcome,
            } => {
                if let Err(err) = self.jumper.finish(&mut self.map, epoch, &address, outcome) {
                    self.alert(err.to_string());
                }
            }
            AppEvent::PeerSnapshot(messages) => self.transcript.apply_peer_snapshot(messages),
            AppEvent::PeerSendFailed(reason) => {
                self.toast(format!("Message was not delivered: {reason}"));
            }
        }
    }
}
