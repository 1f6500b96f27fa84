use rustc_hash::FxHashMap;

use crate::config::{ProviderKind, SymbolSettings, UpstreamSettings};
use crate::error::FetchError;

/// Longest protocol slug accepted before anything is sent upstream.
const MAX_PROTOCOL_LEN: usize = 128;

/// A symbol the service knows how to price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSymbol {
    /// Canonical lower-case id, e.g. `bitcoin`
    pub id: String,
    pub provider: ProviderKind,
    /// Provider-side id: CoinGecko coin id, Coinbase pair, or token address
    pub remote_id: String,
}

/// Maps user input (ids and aliases, any case) to tracked symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    symbols: Vec<TrackedSymbol>,
    index: FxHashMap<String, usize>,
}

impl SymbolRegistry {
    pub fn new(symbols: &[SymbolSettings], upstream: &UpstreamSettings) -> Self {
        let mut registry = Self::default();

        for settings in symbols {
            let id = settings.id.trim().to_lowercase();
            if registry.index.contains_key(&id) {
                continue;
            }

            let remote_id = settings
                .remote_id
                .clone()
                .unwrap_or_else(|| match settings.provider {
                    ProviderKind::Coingecko => id.clone(),
                    ProviderKind::Coinbase => {
                        let base = settings.aliases.first().unwrap_or(&id);
                        format!("{}-USD", base.to_uppercase())
                    },
                    ProviderKind::CeloOracle => upstream.cusd_address.clone(),
                });

            let position = registry.symbols.len();
            registry.symbols.push(TrackedSymbol {
                id: id.clone(),
                provider: settings.provider,
                remote_id,
            });
            registry.index.insert(id, position);

            for alias in &settings.aliases {
                registry
                    .index
                    .entry(alias.trim().to_lowercase())
                    .or_insert(position);
            }
        }

        registry
    }

    /// Resolve an id or alias to its tracked symbol.
    pub fn resolve(&self, input: &str) -> Result<&TrackedSymbol, FetchError> {
        let key = input.trim().to_lowercase();
        self.index
            .get(&key)
            .map(|&i| &self.symbols[i])
            .ok_or_else(|| FetchError::UnknownSymbolOrProtocol(input.trim().to_string()))
    }

    pub fn symbols(&self) -> &[TrackedSymbol] {
        &self.symbols
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.id.as_str())
    }
}

/// Case-normalize a protocol slug, rejecting anything that is not
/// `[a-z0-9._-]+`.
pub fn normalize_protocol(input: &str) -> Result<String, FetchError> {
    let slug = input.trim().to_lowercase();
    let valid = !slug.is_empty()
        && slug.len() <= MAX_PROTOCOL_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !slug.starts_with('.');

    if valid {
        Ok(slug)
    } else {
        Err(FetchError::UnknownSymbolOrProtocol(input.trim().to_string()))
    }
}
