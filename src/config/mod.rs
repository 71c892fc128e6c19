use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::wallet::{AccountId, NetworkId};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("VOTE_DAPP_CONFIG")
            .unwrap_or_else(|_| "config/vote-dapp.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("VOTE_DAPP_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/vote-dapp.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self> {
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize vote-dapp configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        ensure!(self.server.port > 0, "Server port must be greater than zero");
        ensure!(
            !self.chain.rpc_url.trim().is_empty(),
            "Wallet provider RPC URL must be specified"
        );
        let contract = self
            .chain
            .contract_address
            .parse::<AccountId>()
            .with_context(|| {
                format!(
                    "Contract address {:?} is not a 20-byte hex address",
                    self.chain.contract_address
                )
            })?;
        self.chain.contract_address = contract.to_string();
        if let Some(chain_id) = self.chain.expected_chain_id {
            ensure!(chain_id > 0, "Expected chain id must be positive");
        }
        self.chain.ensure_bounds()?;
        self.wallet.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

/// How `getProposal` hands back its fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalLayout {
    /// A single returned `Proposal memory` struct.
    #[default]
    Tuple,
    /// Eight separate return values.
    Flat,
}

/// Unit the contract expects for `createProposal`'s duration argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Seconds,
    Minutes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
    pub contract_address: String,
    pub expected_chain_id: Option<u64>,
    #[serde(default)]
    pub proposal_layout: ProposalLayout,
    #[serde(default)]
    pub duration_unit: DurationUnit,
    pub receipt_poll_interval_ms: Option<u64>,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(30_000))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.unwrap_or(1_000))
    }

    pub fn expected_network(&self) -> Option<NetworkId> {
        self.expected_chain_id.map(NetworkId)
    }

    fn ensure_bounds(&self) -> Result<()> {
        let timeout = self.request_timeout();
        ensure!(
            timeout >= Duration::from_millis(100),
            "RPC timeout must be at least 100ms"
        );
        ensure!(
            timeout <= Duration::from_secs(600),
            "RPC timeout cannot exceed 10 minutes"
        );
        let poll = self.receipt_poll_interval();
        ensure!(
            poll >= Duration::from_millis(100),
            "Receipt poll interval must be >= 100ms"
        );
        ensure!(
            poll <= Duration::from_secs(60),
            "Receipt poll interval must be <= 60 seconds"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "WalletConfig::default_account_poll_interval_ms")]
    pub account_poll_interval_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            account_poll_interval_ms: Self::default_account_poll_interval_ms(),
        }
    }
}

impl WalletConfig {
    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_millis(self.account_poll_interval_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            self.account_poll_interval_ms >= 100,
            "Account poll interval must be >= 100ms"
        );
        ensure!(
            self.account_poll_interval_ms <= 60_000,
            "Account poll interval must be <= 60 seconds"
        );
        Ok(())
    }

    const fn default_account_poll_interval_ms() -> u64 {
        5_000
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
