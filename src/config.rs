// config.rs — viewer settings from defaults, an optional JSON file, CLI flags and env
//
// Precedence (later wins):
//   built-in defaults
//   JSON file given by --config <path> or CITY_PANORAMA_CONFIG
//   env: CITY_PANORAMA_ASSETS, CITY_PANORAMA_LANG
//   CLI: --assets <dir>, --city <name>, --lang <code>

use crate::error::{ViewerError, ViewerResult};
use crate::orientation::{
    ViewConfig, DEFAULT_DRIFT_RATE, DEFAULT_FOV, DEFAULT_SENSITIVITY, MAX_FOV, MIN_FOV,
};
use crate::particles::DEFAULT_PARTICLE_COUNT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub asset_dir: PathBuf,
    /// Cities offered in the picker. Empty means "whatever is in asset_dir".
    pub cities: Vec<String>,
    pub initial_city: Option<String>,
    pub auto_rotate: bool,
    pub drift_rate: f32,
    pub sensitivity: f32,
    pub field_of_view: f32,
    pub particle_count: usize,
    pub fetch_timeout_secs: Option<u64>,
    pub lang: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets").join("panoramas"),
            cities: Vec::new(),
            initial_city: None,
            auto_rotate: true,
            drift_rate: DEFAULT_DRIFT_RATE,
            sensitivity: DEFAULT_SENSITIVITY,
            field_of_view: DEFAULT_FOV,
            particle_count: DEFAULT_PARTICLE_COUNT,
            fetch_timeout_secs: None,
            lang: "en".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_file(path: &Path) -> ViewerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validated()
    }

    /// Resolves the full configuration from the process arguments and environment.
    pub fn resolve() -> ViewerResult<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::resolve_from(&args, env)
    }

    pub fn resolve_from(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> ViewerResult<Self> {
        let flags = CliFlags::parse(args)?;

        let config_path = flags
            .config
            .clone()
            .or_else(|| env("CITY_PANORAMA_CONFIG").map(PathBuf::from));
        let mut config = match config_path {
            Some(path) => {
                log::info!("reading config {}", path.display());
                Self::from_json_file(&path)?
            }
            None => Self::default(),
        };

        if let Some(dir) = env("CITY_PANORAMA_ASSETS") {
            config.asset_dir = PathBuf::from(dir);
        }
        if let Some(lang) = env("CITY_PANORAMA_LANG") {
            config.lang = lang;
        }

        if let Some(dir) = flags.assets {
            config.asset_dir = dir;
        }
        if let Some(city) = flags.city {
            config.initial_city = Some(city);
        }
        if let Some(lang) = flags.lang {
            config.lang = lang;
        }

        config.validated()
    }

    fn validated(mut self) -> ViewerResult<Self> {
        if !self.drift_rate.is_finite() {
            return Err(ViewerError::Config(format!(
                "drift_rate must be finite, got {}",
                self.drift_rate
            )));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(ViewerError::Config(format!(
                "sensitivity must be a positive number, got {}",
                self.sensitivity
            )));
        }
        if !self.field_of_view.is_finite() {
            return Err(ViewerError::Config("field_of_view must be finite".into()));
        }
        let clamped = self.field_of_view.clamp(MIN_FOV, MAX_FOV);
        if clamped != self.field_of_view {
            log::warn!(
                "field_of_view {} outside [{MIN_FOV}, {MAX_FOV}], using {clamped}",
                self.field_of_view
            );
            self.field_of_view = clamped;
        }
        if self.fetch_timeout_secs == Some(0) {
            return Err(ViewerError::Config("fetch_timeout_secs must be at least 1".into()));
        }
        self.cities.retain(|c| !c.trim().is_empty());
        Ok(self)
    }

    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            auto_rotate: self.auto_rotate,
            field_of_view: self.field_of_view,
            drift_rate: self.drift_rate,
            sensitivity: self.sensitivity,
        }
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Default)]
struct CliFlags {
    config: Option<PathBuf>,
    assets: Option<PathBuf>,
    city: Option<String>,
    lang: Option<String>,
}

impl CliFlags {
    fn parse(args: &[String]) -> ViewerResult<Self> {
        let mut flags = Self::default();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            let mut value = || {
                it.next()
                    .cloned()
                    .ok_or_else(|| ViewerError::Config(format!("{a} needs a value")))
            };
            match a.as_str() {
                "--config" => flags.config = Some(PathBuf::from(value()?)),
                "--assets" => flags.assets = Some(PathBuf::from(value()?)),
                "--city" => flags.city = Some(value()?),
                "--lang" => flags.lang = Some(value()?),
                other => log::warn!("ignoring unknown argument {other:?}"),
            }
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_input() {
        let config = ViewerConfig::resolve_from(&[], no_env).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.view_config(), ViewConfig::default());
        assert!(config.fetch_timeout().is_none());
    }

    #[test]
    fn cli_beats_env() {
        let env: HashMap<&str, &str> = [
            ("CITY_PANORAMA_ASSETS", "/env/panos"),
            ("CITY_PANORAMA_LANG", "ja"),
        ]
        .into_iter()
        .collect();
        let config = ViewerConfig::resolve_from(
            &args(&["--lang", "fr", "--city", "Kyoto"]),
            |k| env.get(k).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(config.asset_dir, PathBuf::from("/env/panos"));
        assert_eq!(config.lang, "fr");
        assert_eq!(config.initial_city.as_deref(), Some("Kyoto"));
    }

    #[test]
    fn flag_without_value_is_an_error() {
        let err = ViewerConfig::resolve_from(&args(&["--city"]), no_env).unwrap_err();
        assert!(matches!(err, ViewerError::Config(_)));
    }

    #[test]
    fn json_fields_are_validated() {
        let config: ViewerConfig =
            serde_json::from_str(r#"{ "field_of_view": 150, "cities": ["Kyoto", " "] }"#).unwrap();
        let config = config.validated().unwrap();
        assert_eq!(config.field_of_view, MAX_FOV);
        assert_eq!(config.cities, vec!["Kyoto".to_string()]);

        let bad: ViewerConfig = serde_json::from_str(r#"{ "sensitivity": 0 }"#).unwrap();
        assert!(bad.validated().is_err());

        assert!(serde_json::from_str::<ViewerConfig>(r#"{ "zoom": 3 }"#).is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = ViewerConfig::resolve_from(&args(&["--config", "/no/such/viewer.json"]), no_env)
            .unwrap_err();
        assert!(matches!(err, ViewerError::Io(_)));
    }
}
