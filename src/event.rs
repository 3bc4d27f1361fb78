use crate::chat::PeerMessage;
use crate::map::geocode::GeocodeError;
use crate::map::LatLng;

#[derive(Debug, Clone)]
pub enum AppEvent {
    AssistantReply {
        epoch: u64,
        text: String,
    },
    GeocodeFinished {
        epoch: u64,
        address: String,
        outcome: Result<Option<LatLng>, GeocodeError>,
    },
    PeerSnapshot(Vec<PeerMessage>),
    PeerSendFailed(String),
}
