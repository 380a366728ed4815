//! Board game scraping core
//!
//! Turns loosely structured HTML pages and JSON API responses into typed,
//! validated game and rating records:
//! - a field registry declaring every record field's type and cleanup
//! - total value normalizers (bad input yields no value, never an error)
//! - records that enforce each field's type contract on assignment
//! - an extraction loader reducing CSS and JSON path candidates into a record
//! - request chains that enrich one entity across several responses
//!
//! Fetching and scheduling live behind the [`fetch::Fetcher`] trait and the
//! [`runner::Runner`]; spiders for Board Game Atlas and Luding are in
//! [`sources`].

pub mod chain;
pub mod config;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod fields;
pub mod item;
pub mod loader;
pub mod normalize;
pub mod runner;
pub mod sources;
pub mod testing;
pub mod value;

pub use chain::{Advance, Chain, Delivery, PendingRequest, StageHandler};
pub use config::{BgaConfig, ChainMode, CrawlConfig};
pub use error::{ExtractError, ExtractResult, FetchError, FetchResult, ItemError, ItemResult};
pub use extractors::{Document, Query, Rule};
pub use fetch::{Fetcher, HttpFetcher, RateLimitedFetcher, Response};
pub use fields::{FieldSpec, RecordKind, SemanticType};
pub use item::Record;
pub use loader::ItemLoader;
pub use normalize::Normalizer;
pub use runner::{CrawlReport, DropReason, Runner, Spider};
pub use value::FieldValue;
