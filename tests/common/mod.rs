//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use settings_schema::{
    ConfigManager, EnvProvider, HarnessConfig, ValidationHarness, config::DEFAULT_SCHEMA_PATH,
};

static TRACING: Once = Once::new();
static HARNESS: OnceLock<ValidationHarness> = OnceLock::new();

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn schema_path() -> PathBuf {
    manifest_relative(Path::new(DEFAULT_SCHEMA_PATH))
}

fn manifest_relative(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(path)
    }
}

/// Configuration from the process environment, with a relative schema path
/// resolved against the crate root so test binaries run from any directory.
pub fn harness_config() -> HarnessConfig {
    let config = ConfigManager::load_config(None).expect("harness configuration must load");
    HarnessConfig {
        schema_path: manifest_relative(&config.schema_path),
        ..config
    }
}

/// In-memory environment for configuration tests
#[derive(Default)]
pub struct MockEnvProvider {
    vars: HashMap<String, String>,
}

impl MockEnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvProvider for MockEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Harness over `Settings.xsd` and the helper schema, loaded once per test binary.
pub fn harness() -> &'static ValidationHarness {
    init_tracing();
    HARNESS.get_or_init(|| {
        ValidationHarness::from_config(&harness_config()).expect("Settings.xsd must load")
    })
}
