use crate::identity::{Identity, IdentityError};
use crate::places::store::write_atomically;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub(crate) const DEVICE_ID_PREFIX: &str = "u_";
const DEVICE_ID_LEN: usize = 8;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRecord {
    username: String,
    password_digest: String,
}

fn password_digest(username: &str, password: &str) -> String {
    blake3::hash(format!("{username}:{password}").as_bytes())
        .to_hex()
        .to_string()
}

/// Username/password table kept in a local JSON file.
#[derive(Debug, Clone)]
pub struct AccountTable {
    path: PathBuf,
}

impl AccountTable {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<Vec<AccountRecord>, IdentityError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path).map_err(|err| {
            IdentityError::Storage(format!("failed to read {}: {err}", self.path.display()))
        })?;
        serde_json::from_slice(&data).map_err(|err| {
            IdentityError::Storage(format!("failed to parse {}: {err}", self.path.display()))
        })
    }

    fn write(&self, records: &[AccountRecord]) -> Result<(), IdentityError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|err| IdentityError::Storage(err.to_string()))?;
        write_atomically(&self.path, &bytes).map_err(|err| {
            IdentityError::Storage(format!("failed to write {}: {err}", self.path.display()))
        })
    }

    pub fn register(&self, username: &str, password: &str) -> Result<(), IdentityError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(IdentityError::MissingCredentials);
        }

        let mut records = self.read()?;
        if records.iter().any(|record| record.username == username) {
            return Err(IdentityError::UsernameTaken);
        }
        records.push(AccountRecord {
            username: username.to_string(),
            password_digest: password_digest(username, password),
        });
        self.write(&records)?;
        info!(username, "account registered");
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Identity, IdentityError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(IdentityError::MissingCredentials);
        }

        let digest = password_digest(username, password);
        let records = self.read()?;
        if records
            .iter()
            .any(|record| record.username == username && record.password_digest == digest)
        {
            Ok(Identity::Local {
                username: username.to_string(),
            })
        } else {
            Err(IdentityError::InvalidCredentials)
        }
    }
}

pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..DEVICE_ID_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{DEVICE_ID_PREFIX}{suffix}")
}

/// Reads the persisted device id, creating one on first run.
pub fn load_or_create_device_id(path: &Path) -> String {
    if let Ok(existing) = fs::read_to_string(path) {
        let existing = existing.trim();
        if existing.starts_with(DEVICE_ID_PREFIX) && existing.len() > DEVICE_ID_PREFIX.len() {
            return existing.to_string();
        }
    }

    let device_id = generate_device_id();
    if let Err(err) = write_atomically(path, device_id.as_bytes()) {
        warn!("failed to persist device id to {}: {err}", path.display());
    }
    device_id
}

#[cfg(test)]
mod tests {
    use super::{generate_device_id, load_or_create_device_id, AccountTable};
    use crate::identity::{Identity, IdentityError};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "daka_accounts_{prefix}_{}_{}.json",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn register_then_login() {
        let path = temp_file("register");
        let table = AccountTable::new(path.clone());

        table.register("sheng", "hunter2").expect("register should succeed");
        let identity = table.login("sheng", "hunter2").expect("login should succeed");

        assert_eq!(
            identity,
            Identity::Local {
                username: "sheng".to_string()
            }
        );
        let raw = fs::read_to_string(&path).expect("table should be written");
        assert!(!raw.contains("hunter2"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let path = temp_file("duplicate");
        let table = AccountTable::new(path.clone());

        table.register("sheng", "a").expect("first register should succeed");
        assert_eq!(table.register("sheng", "b"), Err(IdentityError::UsernameTaken));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn wrong_password_and_blank_fields_fail() {
        let path = temp_file("wrong");
        let table = AccountTable::new(path.clone());
        table.register("sheng", "right").expect("register should succeed");

        assert_eq!(table.login("sheng", "wrong"), Err(IdentityError::InvalidCredentials));
        assert_eq!(table.login("", "right"), Err(IdentityError::MissingCredentials));
        assert_eq!(table.register("x", ""), Err(IdentityError::MissingCredentials));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn device_id_has_expected_shape_and_persists() {
        let generated = generate_device_id();
        assert_eq!(generated.len(), 10);
        assert!(generated.starts_with("u_"));
        assert!(generated[2..]
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_ascii_lowercase()));

        let path = temp_file("device");
        let first = load_or_create_device_id(&path);
        let second = load_or_create_device_id(&path);
        assert_eq!(first, second);
        let _ = fs::remove_file(path);
    }
}
