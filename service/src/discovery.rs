//! Server discovery: turning a filter into batches of addresses
//!
//! Two directory backends are supported:
//! - [`WebApiDiscovery`] asks the Steam Web API for the whole list in one
//!   HTTPS request and delivers it as a single batch
//! - [`MasterServerDiscovery`] pages through the legacy UDP master server,
//!   delivering each page as its own batch as soon as it arrives

use crate::scheduler::SubmitError;
use log::{debug, info, warn};
use query::{DatagramChannel, QueryError};
use serde::Deserialize;
use shared::{decode_master_response, MasterRequest};
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;

pub const STEAM_WEB_API_URL: &str =
    "https://api.steampowered.com/IGameServersService/GetServerList/v1/";
pub const DEFAULT_MASTER_SERVER: &str = "hl2master.steampowered.com:27011";

/// Requests per minute the master server tolerates from one client
pub const MASTER_RATE_LIMIT: u32 = 30;

const WEB_API_TIMEOUT: Duration = Duration::from_secs(120);
const WEB_API_LIMIT: u32 = 10_000;

/// A group of addresses delivered together by a discovery backend
pub type Batch = Vec<SocketAddr>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("invalid API key (status {0})")]
    InvalidCredential(u16),
    #[error("rate limit exceeded (status 429)")]
    RateLimited,
    #[error("directory service unavailable (status {0})")]
    Unavailable(u16),
    #[error("directory service error (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode directory response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("master server query failed: {0}")]
    Master(#[from] QueryError),
    #[error(transparent)]
    Rejected(#[from] SubmitError),
}

impl DiscoveryError {
    /// HTTP-style status describing the failure class
    pub fn status_code(&self) -> u16 {
        match self {
            DiscoveryError::MissingCredential | DiscoveryError::InvalidCredential(_) => 401,
            DiscoveryError::RateLimited => 429,
            DiscoveryError::Unavailable(_) => 503,
            DiscoveryError::Http(e) if e.is_timeout() => 504,
            DiscoveryError::Http(e) if e.is_connect() => 503,
            DiscoveryError::Master(e) if e.is_timeout() => 504,
            DiscoveryError::Master(_) => 503,
            _ => 500,
        }
    }

    /// Message safe to show to users; upstream details stay in the logs
    pub fn user_message(&self) -> &'static str {
        match self.status_code() {
            401 => "Invalid Steam API Key",
            429 => "Steam API rate limit exceeded, please wait and try again",
            503 => "Cannot connect to Steam API",
            504 => "Steam API request timeout or connection error",
            _ => "Failed to query server list",
        }
    }
}

/// Server list filter in the `\key\value` directory syntax
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_id(mut self, app_id: u32) -> Self {
        self.clauses.push(format!("appid\\{}", app_id));
        self
    }

    pub fn app_ids(self, app_ids: &[u32]) -> Self {
        app_ids.iter().fold(self, |filter, id| filter.app_id(*id))
    }

    /// Matches server names; empty and `*` match everything
    pub fn name(mut self, name: &str) -> Self {
        if !name.is_empty() && name != "*" {
            self.clauses.push(format!("name_match\\{}", name));
        }
        self
    }

    pub fn gameaddr(mut self, addr: &str) -> Self {
        if !addr.is_empty() {
            self.clauses.push(format!("gameaddr\\{}", addr));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for clause in &self.clauses {
            write!(f, "\\{}", clause)?;
        }
        Ok(())
    }
}

/// A directory that yields server addresses for a filter
///
/// `on_batch` is awaited once per batch; an error from it stops the query
/// and is returned.
pub trait Discovery {
    fn query<F, Fut>(
        &self,
        filter: &Filter,
        on_batch: F,
    ) -> impl Future<Output = Result<(), DiscoveryError>> + Send
    where
        F: FnMut(Batch) -> Fut + Send,
        Fut: Future<Output = Result<(), DiscoveryError>> + Send;
}

/// Steam Web API `GetServerList` client
pub struct WebApiDiscovery {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl WebApiDiscovery {
    pub fn new(api_key: impl Into<String>) -> Result<Self, DiscoveryError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(DiscoveryError::MissingCredential);
        }

        let client = reqwest::Client::builder()
            .timeout(WEB_API_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            endpoint: STEAM_WEB_API_URL.to_string(),
            client,
        })
    }

    /// Points the client at another server list endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Discovery for WebApiDiscovery {
    async fn query<F, Fut>(&self, filter: &Filter, mut on_batch: F) -> Result<(), DiscoveryError>
    where
        F: FnMut(Batch) -> Fut + Send,
        Fut: Future<Output = Result<(), DiscoveryError>> + Send,
    {
        let filter = filter.to_string();
        let limit = WEB_API_LIMIT.to_string();
        debug!("Requesting server list with filter {}", filter);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("filter", filter.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                401 | 403 => DiscoveryError::InvalidCredential(status),
                429 => DiscoveryError::RateLimited,
                500 | 502 | 503 => DiscoveryError::Unavailable(status),
                _ => DiscoveryError::Status { status, body },
            });
        }

        let body = response.bytes().await?;
        let servers = parse_server_list(&body)?;
        info!("Server list returned {} servers", servers.len());

        if !servers.is_empty() {
            on_batch(servers).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ServerListEnvelope {
    #[serde(default)]
    response: ServerList,
}

#[derive(Debug, Default, Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<ServerListEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerListEntry {
    addr: String,
    #[serde(default)]
    gameport: u16,
}

impl ServerListEntry {
    /// Uses `addr` as is, falling back to its host part plus `gameport`
    fn socket_addr(&self) -> Option<SocketAddr> {
        if let Ok(addr) = self.addr.parse() {
            return Some(addr);
        }
        let host = self.addr.split(':').next()?;
        let ip: IpAddr = host.parse().ok()?;
        Some(SocketAddr::new(ip, self.gameport))
    }
}

/// Decodes a `GetServerList` body, skipping entries without a usable address
fn parse_server_list(body: &[u8]) -> Result<Batch, DiscoveryError> {
    let envelope: ServerListEnvelope = serde_json::from_slice(body)?;
    let servers = envelope
        .response
        .servers
        .iter()
        .filter_map(|entry| {
            let addr = entry.socket_addr();
            if addr.is_none() {
                warn!("Skipping unparsable server address {:?}", entry.addr);
            }
            addr
        })
        .collect();
    Ok(servers)
}

/// Legacy UDP master server client
pub struct MasterServerDiscovery {
    host: String,
    timeout: Duration,
    rate_limit: u32,
}

impl MasterServerDiscovery {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
            rate_limit: MASTER_RATE_LIMIT,
        }
    }

    /// Overrides the page request rate; zero disables pacing
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limit = requests_per_minute;
        self
    }

    async fn fetch_pages<F, Fut>(
        &self,
        channel: &mut DatagramChannel,
        filter: &Filter,
        on_batch: &mut F,
    ) -> Result<(), DiscoveryError>
    where
        F: FnMut(Batch) -> Fut + Send,
        Fut: Future<Output = Result<(), DiscoveryError>> + Send,
    {
        let mut request = MasterRequest::first_page(filter.to_string());

        loop {
            channel
                .send(&request.encode())
                .await
                .map_err(QueryError::from)?;
            let reply = channel.recv().await.map_err(QueryError::from)?;
            let mut page = decode_master_response(&reply).map_err(QueryError::from)?;

            let last = page.last().copied();
            let finished = match last {
                None => true,
                Some(addr) if is_terminator(&addr) => {
                    page.pop();
                    true
                }
                Some(addr) => addr == request.seed,
            };

            debug!("Master page from {} carried {} servers", request.seed, page.len());
            if !page.is_empty() {
                on_batch(page.into_iter().map(SocketAddr::V4).collect()).await?;
            }

            match last {
                Some(seed) if !finished => request.seed = seed,
                _ => return Ok(()),
            }
        }
    }
}

fn is_terminator(addr: &SocketAddrV4) -> bool {
    addr.ip().is_unspecified() && addr.port() == 0
}

impl Discovery for MasterServerDiscovery {
    async fn query<F, Fut>(&self, filter: &Filter, mut on_batch: F) -> Result<(), DiscoveryError>
    where
        F: FnMut(Batch) -> Fut + Send,
        Fut: Future<Output = Result<(), DiscoveryError>> + Send,
    {
        let mut channel = DatagramChannel::dial(&self.host, self.timeout)
            .await
            .map_err(QueryError::from)?;
        channel.set_rate_limit(self.rate_limit);

        let result = self.fetch_pages(&mut channel, filter, &mut on_batch).await;
        channel.close();
        result
    }
}
