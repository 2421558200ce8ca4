use facerec_core::{default_model_dir, ExecutionProvider, ModelPack};
use facerec_store::StoreSettings;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const REQUIRED_VARS: [&str; 6] = [
    "FACEREC_DATABASE_URI",
    "FACEREC_DATABASE_NAME",
    "FACEREC_COLLECTION_NAME",
    "FACEREC_VECTOR_INDEX_NAME",
    "FACEREC_VECTOR_FIELD_PATH",
    "FACEREC_ADMIN_PASSWORD",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Daemon configuration, loaded from `FACEREC_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreSettings,
    /// Shared secret for rename and delete.
    pub admin_password: String,
    pub model_pack: ModelPack,
    pub execution_provider: ExecutionProvider,
    /// Directory containing the model pack's ONNX files.
    pub model_dir: PathBuf,
    /// Vector-search score at or above which two faces are the same person.
    pub similarity_threshold: f32,
    /// How often the UI sends a camera frame.
    pub stream_interval: Duration,
    pub bind_addr: SocketAddr,
    /// TTF used for face labels; system fonts are probed when unset.
    pub font_path: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment. Fails on the first missing required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut required = Vec::with_capacity(REQUIRED_VARS.len());
        for key in REQUIRED_VARS {
            required.push(lookup(key).ok_or(ConfigError::Missing(key))?);
        }
        let [database_uri, database_name, collection_name, vector_index_name, vector_field_path, admin_password]: [String; 6] =
            required.try_into().map_err(|_| ConfigError::Missing("FACEREC_*"))?;

        let model_pack: ModelPack = parse_or(&lookup, "FACEREC_MODEL_NAME", ModelPack::BuffaloL)?;
        let execution_provider = parse_or(&lookup, "FACEREC_EXECUTION_PROVIDER", ExecutionProvider::Cpu)?;
        let similarity_threshold: f32 = parse_or(&lookup, "FACEREC_SIMILARITY_THRESHOLD", 0.75)?;
        let stream_interval_ms: u64 = parse_or(&lookup, "FACEREC_STREAM_INTERVAL_MS", 100)?;
        let bind_addr = parse_or(&lookup, "FACEREC_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 7860)))?;

        let model_dir = lookup("FACEREC_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_model_dir(model_pack));

        let store = StoreSettings::new(
            database_uri,
            database_name,
            collection_name,
            vector_index_name,
            vector_field_path,
        )
        .with_threshold(similarity_threshold);

        Ok(Self {
            store,
            admin_password,
            model_pack,
            execution_provider,
            model_dir,
            similarity_threshold,
            stream_interval: Duration::from_millis(stream_interval_ms),
            bind_addr,
            font_path: lookup("FACEREC_FONT_PATH").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("FACEREC_DATABASE_URI", "/var/lib/facerec"),
            ("FACEREC_DATABASE_NAME", "facerec"),
            ("FACEREC_COLLECTION_NAME", "faces"),
            ("FACEREC_VECTOR_INDEX_NAME", "vector_index"),
            ("FACEREC_VECTOR_FIELD_PATH", "embedding"),
            ("FACEREC_ADMIN_PASSWORD", "secret"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(env(&required())).unwrap();
        assert_eq!(config.admin_password, "secret");
        assert_eq!(config.store.collection_name, "faces");
        assert_eq!(config.model_pack, ModelPack::BuffaloL);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert!((config.similarity_threshold - 0.75).abs() < 1e-6);
        assert!((config.store.similarity_threshold - 0.75).abs() < 1e-6);
        assert_eq!(config.stream_interval, Duration::from_millis(100));
        assert_eq!(config.bind_addr.port(), 7860);
        assert!(config.model_dir.ends_with("facerec/models/buffalo_l"));
        assert!(config.font_path.is_none());
    }

    #[test]
    fn test_each_required_var_fails_fast() {
        for missing in REQUIRED_VARS {
            let vars: Vec<_> = required().into_iter().filter(|(k, _)| *k != missing).collect();
            match Config::from_lookup(env(&vars)) {
                Err(ConfigError::Missing(key)) => assert_eq!(key, missing),
                other => panic!("expected Missing({missing}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("FACEREC_MODEL_NAME", "buffalo_s"),
            ("FACEREC_SIMILARITY_THRESHOLD", "0.8"),
            ("FACEREC_STREAM_INTERVAL_MS", "250"),
            ("FACEREC_BIND_ADDR", "127.0.0.1:9000"),
            ("FACEREC_MODEL_DIR", "/opt/models"),
        ]);
        let config = Config::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.model_pack, ModelPack::BuffaloS);
        assert!((config.store.similarity_threshold - 0.8).abs() < 1e-6);
        assert_eq!(config.stream_interval, Duration::from_millis(250));
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
    }

    #[test]
    fn test_invalid_optional_value() {
        let mut vars = required();
        vars.push(("FACEREC_EXECUTION_PROVIDER", "cuda"));
        let err = Config::from_lookup(env(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FACEREC_EXECUTION_PROVIDER", .. }));
    }
}
