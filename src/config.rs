//! Configuration for the crawl driver and the sources.

use std::env;

use serde::{Deserialize, Serialize};

use crate::normalize::parse_bool;
use crate::value::FieldValue;

/// How a chain issues its enrichment requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// One request in flight per entity; each stage sees the previous one's
    /// result.
    #[default]
    Sequential,
    /// Issue every queued request at once, then merge the responses in
    /// queue order. Only valid when stages do not depend on each other.
    FanOut,
}

/// Settings for the crawl driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum number of entity chains in flight.
    ///
    /// Default: 8.
    pub concurrency: usize,

    /// Sustained request rate across all chains of one source.
    ///
    /// Default: 2.
    pub requests_per_second: u32,

    /// Requests allowed back to back before the rate applies.
    ///
    /// Default: 1.
    pub burst: u32,

    pub chain_mode: ChainMode,

    pub user_agent: String,

    /// Per-request timeout in seconds.
    ///
    /// Default: 30.
    pub timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            requests_per_second: 2,
            burst: 1,
            chain_mode: ChainMode::Sequential,
            user_agent: concat!("board_game_scraper/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_rate(mut self, requests_per_second: u32, burst: u32) -> Self {
        self.requests_per_second = requests_per_second;
        self.burst = burst;
        self
    }

    pub fn with_chain_mode(mut self, mode: ChainMode) -> Self {
        self.chain_mode = mode;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Settings for the Board Game Atlas source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgaConfig {
    pub api_url: String,
    pub client_id: Option<String>,
    pub scrape_images: bool,
    pub scrape_videos: bool,
    pub scrape_reviews: bool,
    /// Used to size the search listing.
    ///
    /// Default: 27,500.
    pub expected_games: usize,
    /// Used to size the user review listing.
    ///
    /// Default: 35,000.
    pub expected_reviews: usize,
    pub page_size: usize,
}

impl Default for BgaConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.boardgameatlas.com/api".to_string(),
            client_id: None,
            scrape_images: false,
            scrape_videos: false,
            scrape_reviews: false,
            expected_games: 27_500,
            expected_reviews: 35_000,
            page_size: 100,
        }
    }
}

impl BgaConfig {
    /// Defaults overridden by `BGA_CLIENT_ID`, `BGA_SCRAPE_IMAGES`,
    /// `BGA_SCRAPE_VIDEOS` and `BGA_SCRAPE_REVIEWS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).and_then(|value| parse_bool(&FieldValue::Text(value)));
        let defaults = Self::default();
        Self {
            client_id: lookup("BGA_CLIENT_ID").filter(|s| !s.is_empty()),
            scrape_images: flag("BGA_SCRAPE_IMAGES").unwrap_or(defaults.scrape_images),
            scrape_videos: flag("BGA_SCRAPE_VIDEOS").unwrap_or(defaults.scrape_videos),
            scrape_reviews: flag("BGA_SCRAPE_REVIEWS").unwrap_or(defaults.scrape_reviews),
            ..defaults
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Toggle the images, videos and reviews enrichment stages.
    pub fn with_stages(mut self, images: bool, videos: bool, reviews: bool) -> Self {
        self.scrape_images = images;
        self.scrape_videos = videos;
        self.scrape_reviews = reviews;
        self
    }

    pub fn with_expected(mut self, games: usize, reviews: usize) -> Self {
        self.expected_games = games;
        self.expected_reviews = reviews;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}
