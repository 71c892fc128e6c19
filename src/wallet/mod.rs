use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::abi::parse_quantity;
use crate::error::{ChainError, ConnectionError};

/// Request surface of an EIP-1193 wallet provider.
pub trait WalletProvider: Send + Sync + 'static {
    /// `eth_requestAccounts`; may prompt the user.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<String>, ChainError>> + Send;
    /// `eth_accounts`; never prompts.
    fn accounts(&self) -> impl Future<Output = Result<Vec<String>, ChainError>> + Send;
    /// `eth_chainId` as the provider reports it (hex quantity).
    fn chain_id(&self) -> impl Future<Output = Result<String, ChainError>> + Send;
}

/// Push notifications a provider emits, carrying the raw values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId([u8; 20]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// `0x1234...abcd`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid account address {0:?}")]
pub struct InvalidAccount(pub String);

impl FromStr for AccountId {
    type Err = InvalidAccount;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| InvalidAccount(value.to_string()))?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| InvalidAccount(value.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub fn parse_hex(value: &str) -> Option<Self> {
        parse_quantity(value).map(Self)
    }

    pub fn name(&self) -> Option<&'static str> {
        match self.0 {
            1 => Some("Ethereum Mainnet"),
            11_155_111 => Some("Sepolia Testnet"),
            5 => Some("Goerli Testnet"),
            80_001 => Some("Polygon Mumbai"),
            137 => Some("Polygon"),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("Unknown network (ID: {})", self.0),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-scoped wallet context. Holds the latest account and network seen
/// from the provider and fans changes out to listeners.
pub struct WalletBridge<P> {
    provider: Arc<P>,
    account: watch::Sender<Option<AccountId>>,
    network: watch::Sender<Option<NetworkId>>,
}

impl<P: WalletProvider> WalletBridge<P> {
    pub fn new(provider: Arc<P>) -> Self {
        let (account, _) = watch::channel(None);
        let (network, _) = watch::channel(None);
        Self {
            provider,
            account,
            network,
        }
    }

    pub async fn connect(&self) -> Result<AccountId, ConnectionError> {
        let accounts = self.provider.request_accounts().await.map_err(|err| {
            if err.is_user_rejection() {
                ConnectionError::Rejected
            } else {
                ConnectionError::Unavailable(err.to_string())
            }
        })?;

        let first = accounts.first().ok_or(ConnectionError::NoAccounts)?;
        let account = first
            .parse::<AccountId>()
            .map_err(|_| ConnectionError::MalformedAccount(first.clone()))?;

        info!(account = %account, "Wallet connected");
        self.publish_account(Some(account));
        let _ = self.current_network().await;
        Ok(account)
    }

    /// Reads the authorised account without prompting. Provider failures are
    /// treated as "no account connected".
    pub async fn current_account(&self) -> Option<AccountId> {
        let account = match self.provider.accounts().await {
            Ok(accounts) => first_account(&accounts),
            Err(err) => {
                warn!("Failed to read wallet accounts: {err}");
                None
            }
        };
        self.publish_account(account);
        account
    }

    pub async fn current_network(&self) -> Option<NetworkId> {
        match self.provider.chain_id().await {
            Ok(raw) => {
                let network = NetworkId::parse_hex(&raw);
                if network.is_none() {
                    warn!("Wallet reported malformed chain id {raw:?}");
                }
                self.publish_network(network);
                network
            }
            Err(err) => {
                warn!("Failed to read wallet chain id: {err}");
                None
            }
        }
    }

    /// Last account observed, without a provider round-trip.
    pub fn account(&self) -> Option<AccountId> {
        *self.account.borrow()
    }

    pub fn network(&self) -> Option<NetworkId> {
        *self.network.borrow()
    }

    pub fn on_account_change<F>(&self, listener: F) -> JoinHandle<()>
    where
        F: Fn(Option<AccountId>) + Send + 'static,
    {
        spawn_listener(self.account.subscribe(), listener)
    }

    pub fn on_network_change<F>(&self, listener: F) -> JoinHandle<()>
    where
        F: Fn(Option<NetworkId>) + Send + 'static,
    {
        spawn_listener(self.network.subscribe(), listener)
    }

    pub fn apply_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                self.publish_account(first_account(&accounts));
            }
            ProviderEvent::ChainChanged(raw) => match NetworkId::parse_hex(&raw) {
                Some(network) => self.publish_network(Some(network)),
                None => warn!("Ignoring chainChanged event with malformed id {raw:?}"),
            },
        }
    }

    /// Tracks wallet changes until shutdown. Provider events are applied as
    /// they arrive; the poll interval re-reads account and network in case
    /// events are missing or unreliable.
    pub async fn run(
        &self,
        mut events: Option<mpsc::Receiver<ProviderEvent>>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        assert!(
            poll_interval >= Duration::from_millis(100),
            "Wallet poll interval below 100ms"
        );
        info!("Starting wallet change tracking");
        let mut events_open = events.is_some();
        // Ticks keep their schedule however often provider events arrive.
        let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Wallet tracking shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting wallet tracking");
                            break;
                        }
                    }
                }
                event = next_event(&mut events), if events_open => {
                    match event {
                        Some(event) => {
                            debug!(?event, "Wallet provider event");
                            self.apply_event(event);
                        }
                        None => {
                            warn!("Wallet event stream closed, relying on polling");
                            events_open = false;
                        }
                    }
                }
                _ = poll.tick() => {
                    let _ = self.current_account().await;
                    let _ = self.current_network().await;
                }
            }
        }
    }

    fn publish_account(&self, account: Option<AccountId>) {
        let changed = self.account.send_if_modified(|current| {
            if *current == account {
                return false;
            }
            *current = account;
            true
        });
        if changed {
            match account {
                Some(account) => info!(account = %account, "Wallet account changed"),
                None => info!("Wallet disconnected"),
            }
        }
    }

    fn publish_network(&self, network: Option<NetworkId>) {
        let changed = self.network.send_if_modified(|current| {
            if *current == network {
                return false;
            }
            *current = network;
            true
        });
        if changed {
            if let Some(network) = network {
                info!(network = %network, "Wallet network changed to {}", network.display_name());
            }
        }
    }
}

fn first_account(accounts: &[String]) -> Option<AccountId> {
    let raw = accounts.first()?;
    match raw.parse() {
        Ok(account) => Some(account),
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<ProviderEvent>>) -> Option<ProviderEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn spawn_listener<T, F>(mut receiver: watch::Receiver<T>, listener: F) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let value = receiver.borrow_and_update().clone();
            listener(value);
        }
    })
}
