//! # Reconciler Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     YUALAN_DATABASE_PATH, YUALAN_PORT, IPAYMU_VA, ...                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/yualan-reconciler/reconciler.toml (Linux)                │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/yualan/yualan.db"
//!
//! [gateway]
//! timeout_secs = 30
//! history_max_pages = 5
//!
//! [ipaymu]
//! enabled = true
//! va = "0000001234567890"     # platform fallback account
//! api_key = "..."
//! base_url = "https://my.ipaymu.com/api/v2"
//!
//! [server]
//! port = 8080
//! public_base_url = "https://pos.example.com"
//!
//! [[schedules]]
//! name = "frequent"
//! interval_secs = 300
//! limit = 100
//! hours = 24
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use yualan_core::{PaymentMethod, DEFAULT_CURRENCY};
use yualan_db::DbConfig;
use yualan_gateway::ipaymu::IPAYMU_PRODUCTION_URL;
use yualan_gateway::PlatformIpaymu;

use crate::error::{ReconcileError, ReconcileResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the POS database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a reconcile waits for another writer on the same file.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("yualan.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for [`yualan_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

// =============================================================================
// Gateway Settings
// =============================================================================

/// Limits applied to every gateway call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Per-call timeout. A call that exceeds it counts as a per-sale error.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Page cap for history searches.
    #[serde(default = "default_history_max_pages")]
    pub history_max_pages: u32,

    /// Currency recorded on new payment attempts.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_history_max_pages() -> u32 {
    5
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            timeout_secs: default_timeout(),
            history_max_pages: default_history_max_pages(),
            currency: default_currency(),
        }
    }
}

impl GatewaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Provider Settings
// =============================================================================

/// iPaymu, plus the platform account used for tenants without their own.
#[derive(Clone, Serialize, Deserialize)]
pub struct IpaymuSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub va: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ipaymu_url")]
    pub base_url: String,
}

fn default_true() -> bool {
    true
}

fn default_ipaymu_url() -> String {
    IPAYMU_PRODUCTION_URL.to_string()
}

impl Default for IpaymuSettings {
    fn default() -> Self {
        IpaymuSettings {
            enabled: true,
            va: None,
            api_key: None,
            base_url: default_ipaymu_url(),
        }
    }
}

impl std::fmt::Debug for IpaymuSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpaymuSettings")
            .field("enabled", &self.enabled)
            .field("va", &self.va)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl IpaymuSettings {
    /// The platform fallback account handed to the client factory.
    pub fn platform(&self) -> PlatformIpaymu {
        PlatformIpaymu {
            va: self.va.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Midtrans. Credentials are per tenant only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidtransSettings {
    #[serde(default)]
    pub enabled: bool,
}

// =============================================================================
// Server Settings
// =============================================================================

/// Webhook server and the public URL gateways call back on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base of the return, cancel and notify URLs sent to gateways.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn base(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }

    /// Where the customer lands after paying.
    pub fn return_url(&self, sale_id: &str) -> String {
        format!("{}/sales/{}/receipt", self.base(), sale_id)
    }

    /// Where the gateway sends a customer who cancels.
    pub fn cancel_url(&self, sale_id: &str) -> String {
        format!("{}/payments/{}/cancel", self.base(), sale_id)
    }

    /// Where the gateway posts notifications.
    pub fn notify_url(&self, provider: PaymentMethod) -> String {
        format!("{}/webhooks/{}", self.base(), provider)
    }
}

// =============================================================================
// Schedules
// =============================================================================

/// One periodic reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub interval_secs: u64,
    /// Most sales checked per run and provider.
    pub limit: u32,
    /// Only sales created within this many hours.
    pub hours: u32,
}

impl ScheduleConfig {
    pub fn new(name: impl Into<String>, interval_secs: u64, limit: u32, hours: u32) -> Self {
        ScheduleConfig {
            name: name.into(),
            interval_secs,
            limit,
            hours,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// A frequent narrow run and an hourly wide safety net.
fn default_schedules() -> Vec<ScheduleConfig> {
    vec![
        ScheduleConfig::new("frequent", 300, 100, 24),
        ScheduleConfig::new("sweep", 3600, 200, 72),
    ]
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete reconciler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub ipaymu: IpaymuSettings,

    #[serde(default)]
    pub midtrans: MidtransSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default = "default_schedules")]
    pub schedules: Vec<ScheduleConfig>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            database: DatabaseSettings::default(),
            gateway: GatewaySettings::default(),
            ipaymu: IpaymuSettings::default(),
            midtrans: MidtransSettings::default(),
            server: ServerSettings::default(),
            schedules: default_schedules(),
        }
    }
}

impl ReconcilerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (reconciler.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ReconcileResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading reconciler config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load reconciler config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ReconcileResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ReconcileError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Reconciler config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.schedules.is_empty() {
            return Err(ReconcileError::Config("at least one schedule is required".into()));
        }

        for schedule in &self.schedules {
            if schedule.name.trim().is_empty() {
                return Err(ReconcileError::Config("schedule name must not be empty".into()));
            }
            if schedule.interval_secs == 0 || schedule.limit == 0 || schedule.hours == 0 {
                return Err(ReconcileError::Config(format!(
                    "schedule '{}': interval_secs, limit and hours must be greater than 0",
                    schedule.name
                )));
            }
        }

        if self.gateway.timeout_secs == 0 {
            return Err(ReconcileError::Config("gateway.timeout_secs must be greater than 0".into()));
        }
        if self.gateway.history_max_pages == 0 {
            return Err(ReconcileError::Config(
                "gateway.history_max_pages must be greater than 0".into(),
            ));
        }

        let base = Url::parse(&self.server.public_base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ReconcileError::Config(format!(
                "server.public_base_url must be http(s), got: {}",
                self.server.public_base_url
            )));
        }

        if self.ipaymu.enabled {
            Url::parse(&self.ipaymu.base_url)?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("YUALAN_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(addr) = var("YUALAN_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = var("YUALAN_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid YUALAN_PORT"),
            }
        }

        if let Some(url) = var("YUALAN_PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }

        if let Some(timeout) = var("YUALAN_GATEWAY_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(t) => self.gateway.timeout_secs = t,
                Err(_) => warn!(timeout = %timeout, "Ignoring invalid YUALAN_GATEWAY_TIMEOUT_SECS"),
            }
        }

        if let Some(url) = var("IPAYMU_URL") {
            self.ipaymu.base_url = url;
        }

        if let Some(va) = var("IPAYMU_VA") {
            self.ipaymu.va = Some(va);
        }

        if let Some(key) = var("IPAYMU_API_KEY") {
            self.ipaymu.api_key = Some(key);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "yualan", "yualan-reconciler")
            .map(|dirs| dirs.config_dir().join("reconciler.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Providers the schedules reconcile, in a stable order.
    pub fn enabled_providers(&self) -> Vec<PaymentMethod> {
        let mut providers = Vec::new();
        if self.ipaymu.enabled {
            providers.push(PaymentMethod::Ipaymu);
        }
        if self.midtrans.enabled {
            providers.push(PaymentMethod::Midtrans);
        }
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ReconcilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.history_max_pages, 5);
        assert_eq!(config.gateway.currency, "IDR");
        assert_eq!(
            config.schedules,
            vec![
                ScheduleConfig::new("frequent", 300, 100, 24),
                ScheduleConfig::new("sweep", 3600, 200, 72),
            ]
        );
        assert_eq!(config.enabled_providers(), vec![PaymentMethod::Ipaymu]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ReconcilerConfig::default();

        config.schedules.clear();
        assert!(config.validate().is_err());

        config.schedules = vec![ScheduleConfig::new("frequent", 300, 0, 24)];
        assert!(config.validate().is_err());

        config.schedules = vec![ScheduleConfig::new("frequent", 300, 100, 24)];
        config.server.public_base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.server.public_base_url = "ftp://pos.example.com".into();
        assert!(config.validate().is_err());

        config.server.public_base_url = "https://pos.example.com".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("YUALAN_DATABASE_PATH", "/tmp/pos.db"),
            ("YUALAN_PORT", "9090"),
            ("YUALAN_GATEWAY_TIMEOUT_SECS", "not-a-number"),
            ("IPAYMU_VA", "PLATFORM-VA"),
            ("IPAYMU_URL", "https://sandbox.ipaymu.com/api/v2"),
        ]);

        let mut config = ReconcilerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/pos.db"));
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.ipaymu.va.as_deref(), Some("PLATFORM-VA"));
        assert_eq!(config.ipaymu.platform().base_url, "https://sandbox.ipaymu.com/api/v2");
    }

    #[test]
    fn test_callback_urls() {
        let server = ServerSettings {
            public_base_url: "https://pos.example.com/".into(),
            ..ServerSettings::default()
        };
        assert_eq!(server.cancel_url("sale-1"), "https://pos.example.com/payments/sale-1/cancel");
        assert_eq!(
            server.notify_url(PaymentMethod::Midtrans),
            "https://pos.example.com/webhooks/midtrans"
        );
        assert_eq!(server.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            [ipaymu]
            va = "VA-1"
            api_key = "KEY-1"

            [midtrans]
            enabled = true

            [[schedules]]
            name = "nightly"
            interval_secs = 86400
            limit = 500
            hours = 168
        "#;
        let config: ReconcilerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schedules.len(), 1);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(
            config.enabled_providers(),
            vec![PaymentMethod::Ipaymu, PaymentMethod::Midtrans]
        );
        assert!(!format!("{:?}", config.ipaymu).contains("KEY-1"));

        let saved = toml::to_string_pretty(&config).unwrap();
        assert!(saved.contains("[[schedules]]"));
        assert!(saved.contains("[server]"));
    }
}
