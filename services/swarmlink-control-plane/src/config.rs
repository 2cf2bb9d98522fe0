//! Server configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then the
//! environment variables of the deployment contract (`CONTROL_PLANE_HOST`,
//! `HTTP_PORT`, `NODE_SECRET`, ...). Environment always wins.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Full control-plane configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host for both listeners
    pub host: String,
    /// Worker WebSocket listener port
    pub control_plane_port: u16,
    /// HTTP API listener port
    pub http_port: u16,
    /// Shared secret workers present in AUTH
    pub node_secret: String,
    /// Whether chat queries are charged
    pub payments_enabled: bool,
    /// Network name surfaced for payment clients
    pub payment_network: String,
    /// Price of one query in USDC
    pub query_price: Decimal,
    /// Wallet deposits must pay
    pub platform_wallet: Option<String>,
    /// Settlement facilitator base URL
    pub settlement_backend_url: Option<String>,
    /// Chain RPC URL handed to the facilitator
    pub settlement_rpc_url: String,
    /// Distribute agent payouts on-chain instead of internally
    pub onchain_distribution: bool,
    /// Directory for ledger persistence
    pub data_dir: PathBuf,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            control_plane_port: 8787,
            http_port: 3000,
            node_secret: "dev-node-secret".to_string(),
            payments_enabled: false,
            payment_network: "base-sepolia".to_string(),
            query_price: Decimal::new(10, 2),
            platform_wallet: None,
            settlement_backend_url: None,
            settlement_rpc_url: "https://sepolia.base.org".to_string(),
            onchain_distribution: false,
            data_dir: PathBuf::from("./data"),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults <- optional file <- environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder =
            config::Config::builder().add_source(config::File::with_name("config/default").required(false));
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let file_config: ServerConfig = builder
            .build()?
            .try_deserialize()
            .unwrap_or_else(|_| ServerConfig::default());

        Ok(file_config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        fn parse<T: FromStr>(name: &str) -> Option<T> {
            env(name).and_then(|v| v.parse().ok())
        }
        fn flag(name: &str) -> Option<bool> {
            env(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        }

        if let Some(v) = env("CONTROL_PLANE_HOST") {
            self.host = v;
        }
        if let Some(v) = parse("CONTROL_PLANE_PORT") {
            self.control_plane_port = v;
        }
        if let Some(v) = parse("HTTP_PORT") {
            self.http_port = v;
        }
        if let Some(v) = env("NODE_SECRET") {
            self.node_secret = v;
        }
        if let Some(v) = flag("X402_ENABLED") {
            self.payments_enabled = v;
        }
        if let Some(v) = env("X402_NETWORK") {
            self.payment_network = v;
        }
        if let Some(v) = parse("QUERY_PRICE_USDC") {
            self.query_price = v;
        }
        if let Some(v) = env("PLATFORM_WALLET") {
            self.platform_wallet = Some(v);
        }
        if let Some(v) = env("SETTLEMENT_BACKEND_URL") {
            self.settlement_backend_url = Some(v);
        }
        if let Some(v) = env("SETTLEMENT_RPC_URL") {
            self.settlement_rpc_url = v;
        }
        if let Some(v) = flag("ONCHAIN_DISTRIBUTION") {
            self.onchain_distribution = v;
        }
        if let Some(v) = env("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        self
    }

    pub fn http_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.http_port)
            .parse()
            .expect("invalid HTTP bind address")
    }

    pub fn control_plane_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.control_plane_port)
            .parse()
            .expect("invalid control-plane bind address")
    }
}
