use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::{ProviderKind, UpstreamSettings};
use crate::db::{PriceRecord, TvlSnapshot};
use crate::error::FetchError;

use super::celo::CeloOracle;
use super::normalize::{extract_price, extract_tvl};
use super::registry::{normalize_protocol, SymbolRegistry, TrackedSymbol};
use super::PriceSource;

const TVL_PROVIDER: &str = "defillama";

/// HTTP and on-chain client for every configured price/TVL provider.
///
/// Each call is a single bounded attempt; retry policy belongs to the caller.
/// The client never touches the store or the cache.
pub struct UpstreamClient {
    http: HttpClient,
    coingecko_url: Url,
    coinbase_url: Url,
    defillama_url: Url,
    registry: Arc<SymbolRegistry>,
    celo: Option<CeloOracle>,
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings, registry: Arc<SymbolRegistry>) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("coinpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let needs_celo = registry
            .symbols()
            .iter()
            .any(|s| s.provider == ProviderKind::CeloOracle);

        let celo = if needs_celo {
            Some(CeloOracle::new(
                settings.celo_rpc_endpoint()?,
                &settings.celo_registry_address,
                settings.request_timeout(),
            )?)
        } else {
            None
        };

        Ok(Self {
            http,
            coingecko_url: settings.coingecko_endpoint()?,
            coinbase_url: settings.coinbase_endpoint()?,
            defillama_url: settings.defillama_endpoint()?,
            registry,
            celo,
        })
    }

    fn endpoint(base: &Url, path: &str, provider: &'static str) -> Result<Url, FetchError> {
        base.join(path)
            .map_err(|e| FetchError::unavailable(provider, format!("invalid endpoint {}: {}", path, e)))
    }

    async fn get(
        &self,
        provider: &'static str,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, FetchError> {
        debug!("GET {} {:?}", url, query);
        self.http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::unavailable(provider, "request timed out")
                } else {
                    FetchError::unavailable(provider, e)
                }
            })
    }

    async fn read_json(provider: &'static str, response: reqwest::Response) -> Result<Value, FetchError> {
        let status = response.status();
        if !status.is_success() {
            warn!("{} responded with HTTP {}", provider, status);
            return Err(FetchError::unavailable(provider, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::unavailable(provider, e))?;

        serde_json::from_str(&body).map_err(|e| FetchError::malformed(provider, e))
    }

    async fn fetch_http_price(&self, symbol: &TrackedSymbol) -> Result<f64, FetchError> {
        let provider = symbol.provider.name();
        let response = match symbol.provider {
            ProviderKind::Coingecko => {
                let url = Self::endpoint(&self.coingecko_url, "simple/price", provider)?;
                self.get(
                    provider,
                    url,
                    &[("ids", symbol.remote_id.as_str()), ("vs_currencies", "usd")],
                )
                .await?
            },
            ProviderKind::Coinbase => {
                let path = format!("prices/{}/spot", symbol.remote_id);
                let url = Self::endpoint(&self.coinbase_url, &path, provider)?;
                self.get(provider, url, &[]).await?
            },
            ProviderKind::CeloOracle => {
                return Err(FetchError::unavailable(provider, "not an HTTP provider"));
            },
        };

        let body = Self::read_json(provider, response).await?;
        extract_price(symbol.provider, &symbol.remote_id, &body)
            .map_err(|reason| FetchError::malformed(provider, reason))
    }
}

#[async_trait]
impl PriceSource for UpstreamClient {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceRecord, FetchError> {
        let tracked = self.registry.resolve(symbol)?;

        let price = match tracked.provider {
            ProviderKind::CeloOracle => {
                let oracle = self.celo.as_ref().ok_or_else(|| {
                    FetchError::unavailable(tracked.provider.name(), "oracle not configured")
                })?;
                oracle.median_rate(&tracked.remote_id).await?
            },
            _ => self.fetch_http_price(tracked).await?,
        };

        debug!(
            "{} price for {}: {}",
            tracked.provider.name(),
            tracked.id,
            price
        );
        Ok(PriceRecord::observed_now(tracked.id.as_str(), price))
    }

    async fn fetch_tvl(&self, protocol: &str) -> Result<TvlSnapshot, FetchError> {
        let protocol = normalize_protocol(protocol)?;
        let url = Self::endpoint(
            &self.defillama_url,
            &format!("tvl/{}", protocol),
            TVL_PROVIDER,
        )?;

        let response = self.get(TVL_PROVIDER, url, &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::UnknownSymbolOrProtocol(protocol));
        }

        let body = Self::read_json(TVL_PROVIDER, response).await?;
        extract_tvl(&protocol, &body, Utc::now())
            .map_err(|reason| FetchError::malformed(TVL_PROVIDER, reason))
    }
}
