use std::time::Duration;

use anyhow::{bail, Context};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

/// HTTP listener configuration for the REST API and WebSocket push channel.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

/// PostgreSQL database connection configuration.
///
/// Holds the append-only price history table.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    #[serde(default = "default_postgres_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    #[serde(default = "default_postgres_user")]
    pub user: String,
    #[serde(default = "default_postgres_user")]
    pub password: String,
    #[serde(default = "default_postgres_database")]
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Apply pending versioned migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: default_postgres_user(),
            password: default_postgres_user(),
            database: default_postgres_database(),
            pool_size: default_pool_size(),
            run_migrations: true,
        }
    }
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_user() -> String {
    "crypto".to_string()
}

fn default_postgres_database() -> String {
    "cryptodb".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_true() -> bool {
    true
}

/// Third-party price and TVL providers.
///
/// Base URLs must end with a slash so relative paths join under them.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_coinbase_url")]
    pub coinbase_url: String,
    #[serde(default = "default_defillama_url")]
    pub defillama_url: String,
    #[serde(default = "default_celo_rpc_url")]
    pub celo_rpc_url: String,
    /// Celo Registry contract, used to resolve SortedOracles
    #[serde(default = "default_celo_registry_address")]
    pub celo_registry_address: String,
    #[serde(default = "default_cusd_address")]
    pub cusd_address: String,
    /// Upper bound on every outbound provider call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts made by the on-demand fetch path (the poller never retries)
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn parse_url(key: &str, raw: &str) -> anyhow::Result<Url> {
    Url::parse(raw).with_context(|| format!("upstream.{} is not a valid URL: {}", key, raw))
}

impl UpstreamSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn coingecko_endpoint(&self) -> anyhow::Result<Url> {
        parse_url("coingecko_url", &self.coingecko_url)
    }

    pub fn coinbase_endpoint(&self) -> anyhow::Result<Url> {
        parse_url("coinbase_url", &self.coinbase_url)
    }

    pub fn defillama_endpoint(&self) -> anyhow::Result<Url> {
        parse_url("defillama_url", &self.defillama_url)
    }

    pub fn celo_rpc_endpoint(&self) -> anyhow::Result<Url> {
        parse_url("celo_rpc_url", &self.celo_rpc_url)
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            coinbase_url: default_coinbase_url(),
            defillama_url: default_defillama_url(),
            celo_rpc_url: default_celo_rpc_url(),
            celo_registry_address: default_celo_registry_address(),
            cusd_address: default_cusd_address(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_attempts: default_fetch_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/";
const DEFAULT_COINBASE_URL: &str = "https://api.coinbase.com/v2/";
const DEFAULT_DEFILLAMA_URL: &str = "https://api.llama.fi/";
const DEFAULT_CELO_RPC_URL: &str = "https://forno.celo.org";

fn default_coingecko_url() -> String {
    DEFAULT_COINGECKO_URL.to_string()
}

fn default_coinbase_url() -> String {
    DEFAULT_COINBASE_URL.to_string()
}

fn default_defillama_url() -> String {
    DEFAULT_DEFILLAMA_URL.to_string()
}

fn default_celo_rpc_url() -> String {
    DEFAULT_CELO_RPC_URL.to_string()
}

fn default_celo_registry_address() -> String {
    "0x000000000000000000000000000000000000ce10".to_string()
}

fn default_cusd_address() -> String {
    "0x765DE816845861e75A25fCA122bb6898B8B1282a".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

/// Refresh poller and cache configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    /// Start the process in live mode
    #[serde(default)]
    pub live_on_start: bool,
    #[serde(default = "default_interval_milliseconds")]
    pub interval_milliseconds: u64,
    /// TTL of latest-price cache entries
    #[serde(default = "default_cache_retention_secs")]
    pub cache_retention_secs: u64,
    /// Cap for the interval multiplier applied after fully failed cycles
    #[serde(default = "default_max_backoff_multiplier")]
    pub max_backoff_multiplier: f64,
    /// Symbols refreshed by the poller. All configured symbols when unset.
    #[serde(default)]
    pub tracked_symbols: Option<Vec<String>>,
    #[serde(default = "default_tvl_cache_ttl_secs")]
    pub tvl_cache_ttl_secs: u64,
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_milliseconds)
    }

    pub fn cache_retention(&self) -> Duration {
        Duration::from_secs(self.cache_retention_secs)
    }

    pub fn tvl_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tvl_cache_ttl_secs)
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            live_on_start: false,
            interval_milliseconds: default_interval_milliseconds(),
            cache_retention_secs: default_cache_retention_secs(),
            max_backoff_multiplier: default_max_backoff_multiplier(),
            tracked_symbols: None,
            tvl_cache_ttl_secs: default_tvl_cache_ttl_secs(),
        }
    }
}

fn default_interval_milliseconds() -> u64 {
    30_000
}

fn default_cache_retention_secs() -> u64 {
    300
}

fn default_max_backoff_multiplier() -> f64 {
    4.0
}

fn default_tvl_cache_ttl_secs() -> u64 {
    60
}

/// Which upstream serves a symbol's price.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Coingecko,
    Coinbase,
    CeloOracle,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Coingecko => "coingecko",
            ProviderKind::Coinbase => "coinbase",
            ProviderKind::CeloOracle => "celo",
        }
    }
}

/// A tracked cryptocurrency.
///
/// `remote_id` is the provider-side identifier (CoinGecko coin id, Coinbase
/// product pair). Defaults are derived from `id` when omitted.
#[derive(Debug, Deserialize, Clone)]
pub struct SymbolSettings {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub provider: ProviderKind,
    #[serde(default)]
    pub remote_id: Option<String>,
}

fn default_symbols() -> Vec<SymbolSettings> {
    vec![
        SymbolSettings {
            id: "bitcoin".to_string(),
            aliases: vec!["btc".to_string()],
            provider: ProviderKind::Coingecko,
            remote_id: None,
        },
        SymbolSettings {
            id: "ethereum".to_string(),
            aliases: vec!["eth".to_string()],
            provider: ProviderKind::Coingecko,
            remote_id: None,
        },
        SymbolSettings {
            id: "cusd".to_string(),
            aliases: vec![],
            provider: ProviderKind::CeloOracle,
            remote_id: None,
        },
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` at startup, overridden by
/// `COINPULSE_*` environment variables (`__` separates nested keys).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolSettings>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("COINPULSE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("poller.tracked_symbols")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Parse settings from an inline YAML document.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let s = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        let settings: Settings = s
            .try_deserialize()
            .context("Invalid settings document")?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poller.interval_milliseconds == 0 {
            bail!("poller.interval_milliseconds must be greater than zero");
        }
        if !(self.poller.max_backoff_multiplier >= 1.0) {
            bail!("poller.max_backoff_multiplier must be at least 1.0");
        }
        self.upstream.coingecko_endpoint()?;
        self.upstream.coinbase_endpoint()?;
        self.upstream.defillama_endpoint()?;
        self.upstream.celo_rpc_endpoint()?;
        if self.upstream.fetch_attempts == 0 {
            bail!("upstream.fetch_attempts must be at least 1");
        }
        if self.symbols.is_empty() {
            bail!("at least one symbol must be configured");
        }
        if let Some(tracked) = &self.poller.tracked_symbols {
            for symbol in tracked {
                let known = self
                    .symbols
                    .iter()
                    .any(|s| s.id.eq_ignore_ascii_case(symbol.trim()));
                if !known {
                    bail!("tracked symbol '{}' is not a configured symbol", symbol);
                }
            }
        }
        Ok(())
    }
}
