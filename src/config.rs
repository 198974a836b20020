use failure::Fail;
use std::env;
use std::str::FromStr;
use url::Url;

/// One year.
pub const MAX_WINDOW_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Shape match over LINE detections; one recognition call.
    Pattern,
    /// Label-gated WORD match; text and label calls.
    Label,
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pattern" => Ok(Strategy::Pattern),
            "label" => Ok(Strategy::Label),
            _ => Err(ConfigError::Invalid("PLATE_STRATEGY", s.to_string())),
        }
    }
}

#[derive(Debug, Fail, PartialEq)]
pub enum ConfigError {
    #[fail(display = "Invalid value {:?} for {}", _1, _0)]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: String,
    pub table: String,
    pub duplicate_window_minutes: i64,
    pub strategy: Strategy,
    pub max_labels: u32,
    pub recognition_url: Url,
    pub listen_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let recognition_url = get("RECOGNITION_URL", "http://localhost:8500");
        let window = get("DUPLICATE_WINDOW_MINUTES", "5");
        let duplicate_window_minutes: i64 = parse("DUPLICATE_WINDOW_MINUTES", &window)?;
        if duplicate_window_minutes < 0 || duplicate_window_minutes > MAX_WINDOW_MINUTES {
            return Err(ConfigError::Invalid("DUPLICATE_WINDOW_MINUTES", window));
        }
        Ok(Config {
            db_path: get("DB_PATH", "/data/detections.db"),
            table: get("LICENSE_PLATE_TABLE", "LicensePlateDetections"),
            duplicate_window_minutes,
            strategy: get("PLATE_STRATEGY", "pattern").parse()?,
            max_labels: parse("MAX_LABELS", &get("MAX_LABELS", "100"))?,
            recognition_url: Url::parse(&recognition_url)
                .map_err(|_| ConfigError::Invalid("RECOGNITION_URL", recognition_url.clone()))?,
            listen_port: parse("LISTEN_PORT", &get("LISTEN_PORT", "8402"))?,
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(name, value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.table, "LicensePlateDetections");
        assert_eq!(config.duplicate_window_minutes, 5);
        assert_eq!(config.strategy, Strategy::Pattern);
        assert_eq!(config.max_labels, 100);
        assert_eq!(config.listen_port, 8402);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("DUPLICATE_WINDOW_MINUTES", "15"),
            ("PLATE_STRATEGY", "Label"),
            ("LICENSE_PLATE_TABLE", "Plates"),
            ("RECOGNITION_URL", "https://rekog.internal/api"),
        ])
        .unwrap();
        assert_eq!(config.duplicate_window_minutes, 15);
        assert_eq!(config.strategy, Strategy::Label);
        assert_eq!(config.table, "Plates");
        assert_eq!(config.recognition_url.host_str(), Some("rekog.internal"));
    }

    #[test]
    fn bad_values_are_errors() {
        assert_eq!(
            config(&[("DUPLICATE_WINDOW_MINUTES", "five")]),
            Err(ConfigError::Invalid("DUPLICATE_WINDOW_MINUTES", "five".to_string()))
        );
        assert!(config(&[("DUPLICATE_WINDOW_MINUTES", "-1")]).is_err());
        assert_eq!(
            config(&[("DUPLICATE_WINDOW_MINUTES", "1000000000000")]),
            Err(ConfigError::Invalid("DUPLICATE_WINDOW_MINUTES", "1000000000000".to_string()))
        );
        assert_eq!(
            config(&[("DUPLICATE_WINDOW_MINUTES", "525600")])
                .unwrap()
                .duplicate_window_minutes,
            MAX_WINDOW_MINUTES
        );
        assert!(config(&[("PLATE_STRATEGY", "ocr")]).is_err());
        assert!(config(&[("RECOGNITION_URL", "not a url")]).is_err());
        assert!(config(&[("LISTEN_PORT", "70000")]).is_err());
    }
}
