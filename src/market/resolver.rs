//! Matching feed assets to wallets without requiring identical symbols.

use std::collections::HashMap;

use crate::domain::{Asset, Wallet};

/// Uppercases and strips everything that isn't ASCII alphanumeric.
pub fn normalize_symbol(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Leading segment of a "BASE-QUOTE" / "BASE/QUOTE" / "BASE_QUOTE" symbol.
fn base_segment(raw: &str) -> Option<&str> {
    let (base, _) = raw.split_once(|c: char| !c.is_ascii_alphanumeric())?;
    if base.is_empty() { None } else { Some(base) }
}

struct FallbackEntry {
    position: usize,
    category: String,
    name: String,
}

/// Lookup from normalized symbol to wallet position in the wallet list.
///
/// Keys per wallet, later ones overriding earlier ones on collision:
/// base segment of `sym`/`symbol`, then `symbol`, then `sym`.
#[derive(Default)]
pub struct SymbolIndex {
    by_symbol: HashMap<String, usize>,
    fallback: Vec<FallbackEntry>,
}

impl SymbolIndex {
    /// Builds the index for the given wallet list.
    pub fn build(wallets: &[Wallet]) -> Self {
        let mut by_symbol = HashMap::new();

        for (position, wallet) in wallets.iter().enumerate() {
            for raw in wallet.symbol.iter().chain(wallet.sym.iter()) {
                if let Some(base) = base_segment(raw) {
                    by_symbol.insert(normalize_symbol(base), position);
                }
            }
        }
        for (position, wallet) in wallets.iter().enumerate() {
            if let Some(symbol) = &wallet.symbol {
                insert_key(&mut by_symbol, symbol, position);
            }
        }
        for (position, wallet) in wallets.iter().enumerate() {
            if let Some(sym) = &wallet.sym {
                insert_key(&mut by_symbol, sym, position);
            }
        }

        let fallback = wallets
            .iter()
            .enumerate()
            .filter_map(|(position, wallet)| {
                let category = wallet.category.as_deref()?.trim().to_ascii_lowercase();
                let name = normalize_symbol(&wallet.name);
                if category.is_empty() || name.is_empty() {
                    return None;
                }
                Some(FallbackEntry {
                    position,
                    category,
                    name,
                })
            })
            .collect();

        Self {
            by_symbol,
            fallback,
        }
    }

    /// Number of distinct symbol keys.
    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    /// Resolves an asset to a wallet position.
    ///
    /// Tries, in order: the asset symbol, the market id ticker, the first
    /// '/'-segment of the name, then same-category wallets whose normalized
    /// name prefixes any of those candidates.
    pub fn resolve(&self, asset: &Asset) -> Option<usize> {
        let candidates: Vec<String> = [
            asset.symbol.as_deref(),
            asset.market_ticker(),
            asset.name_head(),
        ]
        .into_iter()
        .flatten()
        .map(normalize_symbol)
        .filter(|c| !c.is_empty())
        .collect();

        for candidate in &candidates {
            if let Some(&position) = self.by_symbol.get(candidate) {
                return Some(position);
            }
        }

        let category = asset.category.as_deref()?.trim().to_ascii_lowercase();
        let full_name = asset.name.as_deref().map(normalize_symbol);
        self.fallback
            .iter()
            .filter(|entry| entry.category == category)
            .find(|entry| {
                candidates
                    .iter()
                    .chain(full_name.iter())
                    .any(|c| c.starts_with(&entry.name))
            })
            .map(|entry| entry.position)
    }
}

fn insert_key(map: &mut HashMap<String, usize>, raw: &str, position: usize) {
    let key = normalize_symbol(raw);
    if !key.is_empty() {
        map.insert(key, position);
    }
}

/// Resolves `asset` against `wallets`, building a throwaway index.
pub fn resolve_wallet_symbol<'a>(wallets: &'a [Wallet], asset: &Asset) -> Option<&'a Wallet> {
    SymbolIndex::build(wallets)
        .resolve(asset)
        .and_then(|position| wallets.get(position))
}
