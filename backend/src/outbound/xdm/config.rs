//! Environment-backed configuration for the XDM adapter.

use thiserror::Error;
use url::Url;

/// Configuration failures reported at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("environment variable {name} is required")]
    Missing { name: &'static str },
    #[error("environment variable {name} is not a valid URL: {message}")]
    InvalidUrl { name: &'static str, message: String },
}

/// Typed settings for the device-configuration service.
#[derive(Debug, Clone)]
pub struct XdmConfig {
    pub base_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Slot ids written on every embark/disembark override.
    pub override_slots: Vec<String>,
    /// Maximum points per geofence; `None` means unlimited.
    pub max_geofence_points: Option<usize>,
}

impl XdmConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is unset or a URL
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = required_url("XDM_BASE_URL", &lookup)?;
        let token_url = required_url("XDM_TOKEN_URL", &lookup)?;
        let client_id = required("XDM_CLIENT_ID", &lookup)?;
        let client_secret = required("XDM_CLIENT_SECRET", &lookup)?;
        Ok(Self {
            base_url,
            token_url,
            client_id,
            client_secret,
            override_slots: parse_slots(lookup("XDM_OVERRIDE_SLOTS")),
            max_geofence_points: parse_max_points(lookup("XDM_MAX_GEOFENCE_POINTS")),
        })
    }
}

fn required(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing { name })
}

fn required_url(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Url, ConfigError> {
    let raw = required(name, lookup)?;
    Url::parse(&raw).map_err(|error| ConfigError::InvalidUrl {
        name,
        message: error.to_string(),
    })
}

/// Comma-separated slot ids; blanks are dropped.
fn parse_slots(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|slot| !slot.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

/// Unset, empty and `"0"` all mean unlimited. A ring needs at least
/// three points, so limits below that are unusable and also read as
/// unlimited.
fn parse_max_points(raw: Option<String>) -> Option<usize> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<usize>() {
        Ok(limit) if limit >= 3 => Some(limit),
        _ => None,
    }
}
