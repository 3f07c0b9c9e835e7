//! Benchmark configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! a `.env` file and process environment variables. The resulting
//! [`BenchConfig`] is cloned into every runner.

use crate::db::mochow::{HnswConfig, MochowConfig};
use crate::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const HOUR: u64 = 3600;
const MINUTE: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Root directory holding the dataset folders.
    pub dataset_local_dir: PathBuf,
    /// Vectors per `insert_embeddings` call.
    pub num_per_batch: usize,
    /// Drop an existing table before loading.
    pub drop_old: bool,
    /// Prefer `shuffle_train.fvecs` when it exists.
    pub use_shuffled_data: bool,
    pub results_local_dir: PathBuf,
    /// Pause between `init()` and the first insert.
    #[serde(with = "crate::metric::duration_secs")]
    pub warmup_delay: Duration,
    pub mochow: MochowConfig,
    pub hnsw: HnswConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dataset_local_dir: PathBuf::from("./dataset"),
            num_per_batch: 1000,
            drop_old: true,
            use_shuffled_data: true,
            results_local_dir: PathBuf::from("./results"),
            warmup_delay: Duration::from_secs(50),
            mochow: MochowConfig::default(),
            hnsw: HnswConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Load defaults, overlay `path` (TOML) if given, then `.env` and the
    /// environment.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };

        match dotenvy::dotenv() {
            Ok(env_path) => tracing::debug!(path = %env_path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(BenchError::Config(format!(".env: {e}"))),
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> BenchResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| BenchError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> BenchResult<Self> {
        toml::from_str(text).map_err(|e| BenchError::Config(e.to_string()))
    }

    /// Overlay recognised variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> BenchResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATASET_LOCAL_DIR") {
            self.dataset_local_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NUM_PER_BATCH") {
            self.num_per_batch = parse_env("NUM_PER_BATCH", &v)?;
        }
        if let Some(v) = lookup("DROP_OLD") {
            self.drop_old = parse_bool("DROP_OLD", &v)?;
        }
        if let Some(v) = lookup("USE_SHUFFLED_DATA") {
            self.use_shuffled_data = parse_bool("USE_SHUFFLED_DATA", &v)?;
        }
        if let Some(v) = lookup("RESULTS_LOCAL_DIR") {
            self.results_local_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARMUP_DELAY_SECS") {
            self.warmup_delay = Duration::from_secs_f64(parse_env("WARMUP_DELAY_SECS", &v)?);
        }
        if let Some(v) = lookup("MOCHOW_HOST") {
            self.mochow.host = v;
        }
        if let Some(v) = lookup("MOCHOW_ACCOUNT") {
            self.mochow.account = v;
        }
        if let Some(v) = lookup("MOCHOW_API_KEY") {
            self.mochow.api_key = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.num_per_batch == 0 {
            return Err(BenchError::Config("num_per_batch must be positive".into()));
        }
        Ok(())
    }

    /// `(name, value)` pairs of every non-timeout setting. Credentials are
    /// masked.
    pub fn display(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dataset_local_dir", self.dataset_local_dir.display().to_string()),
            ("num_per_batch", self.num_per_batch.to_string()),
            ("drop_old", self.drop_old.to_string()),
            ("use_shuffled_data", self.use_shuffled_data.to_string()),
            ("results_local_dir", self.results_local_dir.display().to_string()),
            ("warmup_delay", format!("{:?}", self.warmup_delay)),
            ("mochow.host", self.mochow.host.clone()),
            ("mochow.account", self.mochow.account.clone()),
            ("mochow.api_key", mask(&self.mochow.api_key)),
            ("mochow.db_label", self.mochow.db_label.clone()),
            ("hnsw.m", self.hnsw.m.to_string()),
            ("hnsw.ef_construction", self.hnsw.ef_construction.to_string()),
            ("hnsw.ef", self.hnsw.ef.to_string()),
            ("hnsw.metric_type", self.hnsw.metric_type.to_string()),
        ]
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> BenchResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BenchError::Config(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> BenchResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(BenchError::Config(format!("{key}={value:?}: not a boolean"))),
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "*".repeat(8)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Case timeouts
// ────────────────────────────────────────────────────────────────────────────────

/// Per-case deadlines, keyed by vector dimension and dataset size.
pub struct CaseTimeouts;

impl CaseTimeouts {
    pub const LOAD_DEFAULT: Duration = Duration::from_secs(5 * HOUR / 2);
    pub const OPTIMIZE_DEFAULT: Duration = Duration::from_secs(15 * MINUTE);

    /// Deadline for loading `size` vectors of `dim` dimensions.
    pub fn load(dim: usize, size: usize) -> Duration {
        let secs = match (dim, size) {
            (768, 1_000_000) => 5 * HOUR / 2,
            (768, 10_000_000) => 25 * HOUR,
            (768, 100_000_000) => 250 * HOUR,
            (1536, 500_000) => 5 * HOUR / 2,
            (1536, 5_000_000) => 25 * HOUR,
            _ => return Self::LOAD_DEFAULT,
        };
        Duration::from_secs(secs)
    }

    /// Deadline for the post-load index build.
    pub fn optimize(dim: usize, size: usize) -> Duration {
        let secs = match (dim, size) {
            (768, 1_000_000) => 15 * MINUTE,
            (768, 10_000_000) => 5 * HOUR / 2,
            (768, 100_000_000) => 25 * HOUR,
            (1536, 500_000) => 15 * MINUTE,
            (1536, 5_000_000) => 5 * HOUR / 2,
            _ => return Self::OPTIMIZE_DEFAULT,
        };
        Duration::from_secs(secs)
    }

    /// Deadline for the whole insertion phase: the last batch also rebuilds
    /// the index and waits for it, so both budgets apply back to back.
    pub fn load_phase(dim: usize, size: usize) -> Duration {
        Self::load(dim, size) + Self::optimize(dim, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MetricType;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = BenchConfig::default();
        assert_eq!(c.num_per_batch, 1000);
        assert!(c.drop_old);
        assert!(c.use_shuffled_data);
        assert_eq!(c.warmup_delay, Duration::from_secs(50));
        assert_eq!(c.hnsw.m, 32);
        assert_eq!(c.hnsw.ef_construction, 200);
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let c = BenchConfig::from_toml_str(
            r#"
            num_per_batch = 500
            warmup_delay = 0.5

            [mochow]
            host = "http://10.0.0.1:8287"

            [hnsw]
            ef = 64
            metric_type = "COSINE"
            "#,
        )
        .unwrap();
        assert_eq!(c.num_per_batch, 500);
        assert_eq!(c.warmup_delay, Duration::from_millis(500));
        assert_eq!(c.mochow.host, "http://10.0.0.1:8287");
        assert_eq!(c.mochow.account, "root");
        assert_eq!(c.hnsw.ef, 64);
        assert_eq!(c.hnsw.m, 32);
        assert_eq!(c.hnsw.metric_type, MetricType::Cosine);
        assert!(c.drop_old);
    }

    #[test]
    fn env_overrides_toml() {
        let env: HashMap<&str, &str> = [
            ("NUM_PER_BATCH", "250"),
            ("DROP_OLD", "false"),
            ("USE_SHUFFLED_DATA", "0"),
            ("WARMUP_DELAY_SECS", "0"),
            ("DATASET_LOCAL_DIR", "/data/vec"),
        ]
        .into_iter()
        .collect();

        let mut c = BenchConfig::from_toml_str("num_per_batch = 500").unwrap();
        c.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.num_per_batch, 250);
        assert!(!c.drop_old);
        assert!(!c.use_shuffled_data);
        assert_eq!(c.warmup_delay, Duration::ZERO);
        assert_eq!(c.dataset_local_dir, PathBuf::from("/data/vec"));
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut c = BenchConfig::default();
        let err = c
            .apply_env(|k| (k == "DROP_OLD").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn display_hides_timeouts_and_secrets() {
        let mut c = BenchConfig::default();
        c.mochow.api_key = "secret".into();
        let shown = c.display();
        assert!(shown.iter().all(|(k, _)| !k.contains("timeout")));
        let key = shown.iter().find(|(k, _)| *k == "mochow.api_key").unwrap();
        assert!(!key.1.contains("secret"));
    }

    #[test]
    fn timeout_table() {
        assert_eq!(CaseTimeouts::load(768, 1_000_000), Duration::from_secs(9000));
        assert_eq!(CaseTimeouts::load(768, 10_000_000), Duration::from_secs(90_000));
        assert_eq!(CaseTimeouts::load(768, 100_000_000), Duration::from_secs(900_000));
        assert_eq!(CaseTimeouts::load(1536, 5_000_000), Duration::from_secs(90_000));
        assert_eq!(CaseTimeouts::load(128, 42), CaseTimeouts::LOAD_DEFAULT);
        assert_eq!(CaseTimeouts::optimize(768, 10_000_000), Duration::from_secs(9000));
        assert_eq!(CaseTimeouts::optimize(1536, 500_000), Duration::from_secs(900));
        assert_eq!(CaseTimeouts::optimize(1, 1), CaseTimeouts::OPTIMIZE_DEFAULT);
        assert_eq!(
            CaseTimeouts::load_phase(768, 1_000_000),
            Duration::from_secs(9000 + 900)
        );
    }
}
