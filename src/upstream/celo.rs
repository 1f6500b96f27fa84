use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{DynProvider, ProviderBuilder};
use anyhow::Context;
use log::debug;
use url::Url;

use crate::abis::{IRegistry, ISortedOracles};
use crate::error::FetchError;
use crate::utils::ratio_to_f64;

const PROVIDER: &str = "celo";

/// Registry identifier of the SortedOracles contract.
const SORTED_ORACLES_ID: &str = "SortedOracles";

/// Reads stable-token USD rates from Celo's on-chain SortedOracles.
///
/// The oracle address is resolved through the Celo Registry on every read,
/// so a governance upgrade of SortedOracles is picked up without restart.
#[derive(Clone)]
pub struct CeloOracle {
    provider: DynProvider,
    registry: Address,
    timeout: Duration,
}

impl CeloOracle {
    pub fn new(rpc_url: Url, registry_address: &str, timeout: Duration) -> anyhow::Result<Self> {
        let registry: Address = registry_address
            .parse()
            .with_context(|| format!("Invalid Celo registry address {}", registry_address))?;

        let client = ProviderBuilder::new().connect_http(rpc_url);
        let provider = DynProvider::new(client);

        Ok(Self {
            provider,
            registry,
            timeout,
        })
    }

    /// USD price of `token` as the oracle median rate.
    pub async fn median_rate(&self, token: &str) -> Result<f64, FetchError> {
        let token: Address = token
            .parse()
            .map_err(|e| FetchError::malformed(PROVIDER, format!("bad token address: {}", e)))?;

        let registry = IRegistry::new(self.registry, &self.provider);
        let oracles_address = tokio::time::timeout(
            self.timeout,
            registry
                .getAddressForString(SORTED_ORACLES_ID.to_string())
                .call(),
        )
        .await
        .map_err(|_| FetchError::unavailable(PROVIDER, "registry lookup timed out"))?
        .map_err(|e| FetchError::unavailable(PROVIDER, e))?;

        if oracles_address == Address::ZERO {
            return Err(FetchError::malformed(
                PROVIDER,
                "registry returned zero address for SortedOracles",
            ));
        }

        let oracles = ISortedOracles::new(oracles_address, &self.provider);
        let rate = tokio::time::timeout(self.timeout, oracles.medianRate(token).call())
            .await
            .map_err(|_| FetchError::unavailable(PROVIDER, "medianRate timed out"))?
            .map_err(|e| FetchError::unavailable(PROVIDER, e))?;

        debug!(
            "SortedOracles medianRate for {}: {} / {}",
            token, rate.numerator, rate.denominator
        );

        ratio_to_f64(rate.numerator, rate.denominator)
            .ok_or_else(|| FetchError::malformed(PROVIDER, "oracle returned a zero denominator"))
    }
}
