use crate::chat::ASSISTANT_GREETING;
use crate::map::geocode::{AmapGeocoder, Geocoder, GooglePlacesGeocoder};
use crate::map::LatLng;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_AI_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_AI_MODEL: &str = "deepseek-chat";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("DAKA_REGION must be \"global\" or \"china\", got \"{0}\"")]
    UnknownRegion(String),
    #[error("DAKA_LOCATION must look like \"lat,lng\", got \"{0}\"")]
    InvalidLocation(String),
    #[error("{name} must not be blank")]
    Blank { name: &'static str },
}

/// Deployment flavour. Each one fixes the geocoding service, the sign-in
/// methods and whether the assistant opens with a greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Global,
    China,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Global, Region::China];

    pub fn label(self) -> &'static str {
        match self {
            Self::Global => "Global",
            Self::China => "China",
        }
    }

    pub fn places_file_name(self) -> &'static str {
        match self {
            Self::Global => "places-global.json",
            Self::China => "places-china.json",
        }
    }

    pub fn greeting(self) -> Option<String> {
        match self {
            Self::Global => None,
            Self::China => Some(ASSISTANT_GREETING.to_string()),
        }
    }

    /// Local accounts and Google sign-in; otherwise only the device identity.
    pub fn supports_sign_in(self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn geocoder(self, config: &AppConfig) -> Arc<dyn Geocoder> {
        match self {
            Self::Global => Arc::new(GooglePlacesGeocoder::new(config.google_maps_key.clone())),
            Self::China => Arc::new(AmapGeocoder::new(config.amap_key.clone())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" | "intl" => Ok(Self::Global),
            "china" | "cn" => Ok(Self::China),
            _ => Err(ConfigError::UnknownRegion(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub region: Option<Region>,
    pub ai: AiConfig,
    pub google_maps_key: Option<String>,
    pub amap_key: Option<String>,
    pub location: Option<LatLng>,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_location(value: &str) -> Result<LatLng, ConfigError> {
    let invalid = || ConfigError::InvalidLocation(value.to_string());
    let (lat, lng) = value.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
    let location = LatLng::new(lat, lng);
    if !location.is_finite() || lat.abs() > 90.0 || lng.abs() > 180.0 {
        return Err(invalid());
    }
    Ok(location)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; blank optional values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_dir = match lookup("DAKA_DATA_DIR") {
            Some(dir) if dir.trim().is_empty() => {
                return Err(ConfigError::Blank {
                    name: "DAKA_DATA_DIR",
                })
            }
            Some(dir) => PathBuf::from(dir.trim()),
            None => home_dir().join(".daka"),
        };
        let region = value("DAKA_REGION")
            .map(|region| region.parse::<Region>())
            .transpose()?;
        let location = value("DAKA_LOCATION")
            .map(|location| parse_location(&location))
            .transpose()?;

        let defaults = AiConfig::default();
        Ok(Self {
            data_dir,
            region,
            ai: AiConfig {
                api_key: value("DEEPSEEK_API_KEY"),
                base_url: value("DAKA_AI_BASE_URL").unwrap_or(defaults.base_url),
                model: value("DAKA_AI_MODEL").unwrap_or(defaults.model),
            },
            google_maps_key: value("GOOGLE_MAPS_API_KEY"),
            amap_key: value("AMAP_API_KEY"),
            location,
        })
    }

    pub fn places_path(&self, region: Region) -> PathBuf {
        self.data_dir.join(region.places_file_name())
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn device_id_path(&self) -> PathBuf {
        self.data_dir.join("device-id")
    }

    pub fn mailbox_path(&self) -> PathBuf {
        self.data_dir.join("messages.json")
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, Region, DEFAULT_AI_BASE_URL, DEFAULT_AI_MODEL};
    use crate::map::LatLng;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_point_at_deepseek_without_keys() {
        let config = config_from(&[("DAKA_DATA_DIR", "/tmp/daka")]).expect("config should load");

        assert_eq!(config.data_dir, PathBuf::from("/tmp/daka"));
        assert_eq!(config.region, None);
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.ai.base_url, DEFAULT_AI_BASE_URL);
        assert_eq!(config.ai.model, DEFAULT_AI_MODEL);
        assert_eq!(config.location, None);
        assert_eq!(
            config.places_path(Region::China),
            PathBuf::from("/tmp/daka/places-china.json")
        );
    }

    #[test]
    fn reads_keys_region_and_location() {
        let config = config_from(&[
            ("DAKA_DATA_DIR", "/tmp/daka"),
            ("DAKA_REGION", " China "),
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("AMAP_API_KEY", "amap"),
            ("GOOGLE_MAPS_API_KEY", "   "),
            ("DAKA_LOCATION", "23.1291, 113.2644"),
        ])
        .expect("config should load");

        assert_eq!(config.region, Some(Region::China));
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.amap_key.as_deref(), Some("amap"));
        assert_eq!(config.google_maps_key, None);
        assert_eq!(config.location, Some(LatLng::new(23.1291, 113.2644)));
    }

    #[test]
    fn rejects_bad_region_and_location() {
        assert_eq!(
            config_from(&[("DAKA_DATA_DIR", "/tmp"), ("DAKA_REGION", "mars")]),
            Err(ConfigError::UnknownRegion("mars".to_string()))
        );
        assert!(matches!(
            config_from(&[("DAKA_DATA_DIR", "/tmp"), ("DAKA_LOCATION", "23.1")]),
            Err(ConfigError::InvalidLocation(_))
        ));
        assert!(matches!(
            config_from(&[("DAKA_DATA_DIR", "/tmp"), ("DAKA_LOCATION", "123,500")]),
            Err(ConfigError::InvalidLocation(_))
        ));
        assert_eq!(
            config_from(&[("DAKA_DATA_DIR", "  ")]),
            Err(ConfigError::Blank {
                name: "DAKA_DATA_DIR"
            })
        );
    }

    #[test]
    fn regions_carry_their_capabilities() {
        assert!(Region::Global.supports_sign_in());
        assert!(!Region::China.supports_sign_in());
        assert!(Region::Global.greeting().is_none());
        assert!(Region::China.greeting().is_some());
        assert_ne!(
            Region::Global.places_file_name(),
            Region::China.places_file_name()
        );
    }
}
