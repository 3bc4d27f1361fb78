use crate::identity::accounts::DEVICE_ID_PREFIX;
use crate::places::UploaderInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod accounts;
pub mod google;

pub const ANONYMOUS_DISPLAY_NAME: &str = "Me";
pub const ANONYMOUS_UPLOADER_NAME: &str = "Anonymous";

const DEVICE_OWNER: &str = "device:";
const LOCAL_OWNER: &str = "local:";
const GOOGLE_OWNER: &str = "google:";

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("please enter a username and password")]
    MissingCredentials,
    #[error("username already exists")]
    UsernameTaken,
    #[error("wrong username or password")]
    InvalidCredentials,
    #[error("account storage failed: {0}")]
    Storage(String),
    #[error("Google credential is malformed: {0}")]
    MalformedToken(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    Local { username: String },
    Google(GoogleProfile),
}

/// The single active identity plus the device id it falls back to.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    device_id: String,
    identity: Identity,
}

impl Session {
    pub fn new(device_id: String, identity: Identity) -> Self {
        Self {
            device_id,
            identity,
        }
    }

    pub fn anonymous(device_id: String) -> Self {
        Self::new(device_id, Identity::Anonymous)
    }

    pub fn is_signed_in(&self) -> bool {
        !matches!(self.identity, Identity::Anonymous)
    }

    pub fn sign_in(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub fn sign_out(&mut self) {
        self.identity = Identity::Anonymous;
    }

    /// Key used for place ownership and peer addressing, tagged by identity kind
    /// so a username can never equal a device id or an email.
    pub fn owner_id(&self) -> String {
        match &self.identity {
            Identity::Anonymous => format!("{DEVICE_OWNER}{}", self.device_id),
            Identity::Local { username } => format!("{LOCAL_OWNER}{username}"),
            Identity::Google(profile) => format!("{GOOGLE_OWNER}{}", profile.email),
        }
    }

    /// Name shown as chat sender and used for peer conversations.
    pub fn display_name(&self) -> &str {
        match &self.identity {
            Identity::Anonymous => ANONYMOUS_DISPLAY_NAME,
            Identity::Local { username } => username,
            Identity::Google(profile) => &profile.name,
        }
    }

    pub fn uploader(&self) -> UploaderInfo {
        match &self.identity {
            Identity::Anonymous => UploaderInfo {
                name: ANONYMOUS_UPLOADER_NAME.to_string(),
                ..UploaderInfo::default()
            },
            Identity::Local { username } => UploaderInfo {
                name: username.clone(),
                ..UploaderInfo::default()
            },
            Identity::Google(profile) => UploaderInfo {
                name: profile.name.clone(),
                email: profile.email.clone(),
                picture: profile.picture.clone(),
            },
        }
    }
}

/// Tags an owner id stored before ids carried their identity kind.
/// Empty ids stay empty; they belong to nobody.
pub fn normalize_owner_id(raw: &str) -> String {
    let tagged = [DEVICE_OWNER, LOCAL_OWNER, GOOGLE_OWNER]
        .iter()
        .any(|tag| raw.starts_with(*tag));
    if raw.is_empty() || tagged {
        return raw.to_string();
    }
    let tag = if raw.starts_with(DEVICE_ID_PREFIX) {
        DEVICE_OWNER
    } else if raw.contains('@') {
        GOOGLE_OWNER
    } else {
        LOCAL_OWNER
    };
    format!("{tag}{raw}")
}
