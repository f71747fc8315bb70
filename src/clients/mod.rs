pub mod aggregator;
pub mod bus;
pub mod directory;
pub mod listing;
pub mod price_feed;
pub mod registry;

pub use aggregator::{AggregatorError, HttpAggregator, QuoteRequest, RouteProvider};
pub use bus::{EventBus, NoopBus, WebhookBus};
pub use directory::{DirectoryError, HttpDirectory, WalletDirectory};
pub use listing::HttpListingIndex;
pub use price_feed::{HttpPriceFeed, PriceError, PriceFeed, PricePoint};
pub use registry::{HttpTokenRegistry, SourceError, TokenSource};
