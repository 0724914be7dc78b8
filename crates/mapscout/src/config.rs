use mapscout_common::gemini::GeminiClientConfig;

use crate::error::AppError;
use crate::model::LocationBias;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream connection settings (API key, base URL, timeouts).
    pub gemini: GeminiClientConfig,
    /// Gemini model identifier used for every search.
    pub model: String,
    /// Session location applied to searches that do not carry their own
    /// coordinates. `None` disables location bias for those searches.
    pub default_location: Option<LocationBias>,
}

impl Config {
    /// Required:
    /// - `GEMINI_API_KEY` (see `GeminiClientConfig` for the other upstream settings)
    ///
    /// Optional:
    /// - `MAPSCOUT_MODEL` (default: "gemini-2.5-flash")
    /// - `MAPSCOUT_LATITUDE` / `MAPSCOUT_LONGITUDE` (must be set together)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gemini = GeminiClientConfig::from_vars(&var)?;

        let model = var("MAPSCOUT_MODEL")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let default_location = match (var("MAPSCOUT_LATITUDE"), var("MAPSCOUT_LONGITUDE")) {
            (None, None) => None,
            (Some(lat), Some(lng)) => Some(LocationBias::new(
                parse_coord("MAPSCOUT_LATITUDE", &lat, 90.0)?,
                parse_coord("MAPSCOUT_LONGITUDE", &lng, 180.0)?,
            )),
            _ => {
                return Err(AppError::Config(
                    "MAPSCOUT_LATITUDE and MAPSCOUT_LONGITUDE must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            gemini,
            model,
            default_location,
        })
    }
}

fn parse_coord(name: &str, raw: &str, limit: f64) -> Result<f64, AppError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::Config(format!("{name} is not a number ({raw:?}): {e}")))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(AppError::Config(format!(
            "{name} must be within [-{limit}, {limit}], got {value}"
        )));
    }
    Ok(value)
}
