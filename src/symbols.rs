//! Symbol classification and filtering.

/// Which group of symbols to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SymbolKind {
    /// Crypto pairs (contain a `/`, e.g. BTC/USDT)
    Crypto,
    /// Indices, rates and commodities
    Market,
    /// The configured favorites list
    Favorite,
}

/// Crypto pairs are quoted against another asset, e.g. `ETH/USDT`.
pub fn is_crypto(symbol: &str) -> bool {
    symbol.contains('/')
}

/// Select the symbols of one kind.
///
/// Favorites are not filtered against the backend list; they are
/// returned as configured so they can be analyzed even when the backend
/// does not advertise them.
pub fn filter_symbols(all: &[String], kind: SymbolKind, favorites: &[String]) -> Vec<String> {
    match kind {
        SymbolKind::Crypto => all.iter().filter(|s| is_crypto(s)).cloned().collect(),
        SymbolKind::Market => all.iter().filter(|s| !is_crypto(s)).cloned().collect(),
        SymbolKind::Favorite => favorites.to_vec(),
    }
}

/// Built-in favorites.
pub fn default_favorites() -> Vec<String> {
    vec![
        "VIX", "SPX", "QQQ", "US10Y", "US02Y", "US30Y", "GOLD", "OIL_CRUD",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
