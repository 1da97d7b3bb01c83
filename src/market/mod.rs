//! Live market rates: symbol resolution, the shared wallet store, and the feed client.

mod feed;
mod resolver;
mod store;

pub use feed::{FeedError, FeedStatus, RateFeed, RateFeedConfig, parse_feed_message};
pub use resolver::{SymbolIndex, normalize_symbol, resolve_wallet_symbol};
pub use store::WalletStore;
