//! Board Game Atlas spider
//!
//! Reads the search API page by page. Each game becomes a chain that, as
//! configured, fetches its images, videos and reviews one after another.
//! The user review listing yields rating records with nothing to chain.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

use crate::chain::{Chain, PendingRequest};
use crate::config::BgaConfig;
use crate::error::ExtractResult;
use crate::extractors::{Document, Rule};
use crate::fetch::Response;
use crate::item::Record;
use crate::loader::ItemLoader;
use crate::normalize::{extract_bga_id, parse_float};
use crate::runner::Spider;
use crate::value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgaStage {
    /// A page of the game search listing
    Search,
    /// A page of the user review listing
    UserReviews,
    Images,
    Videos,
    Reviews,
}

const GAME_RULES: &[Rule] = &[
    Rule::path("name", "name"),
    Rule::path("alt_name", "names"),
    Rule::path("year", "year_published"),
    Rule::path("description", "description_preview"),
    Rule::path("description", "description"),
    Rule::path("designer", "designers"),
    Rule::path("artist", "artists"),
    Rule::path("publisher", "primary_publisher"),
    Rule::path("publisher", "publishers"),
    Rule::path("url", "url"),
    Rule::path("image_url", "image_url"),
    Rule::path("image_url", "thumb_url"),
    Rule::path("min_players", "min_players"),
    Rule::path("max_players", "max_players"),
    Rule::path("min_age", "min_age"),
    Rule::path("min_time", "min_playtime"),
    Rule::path("max_time", "max_playtime"),
];

const REVIEW_RULES: &[Rule] = &[
    Rule::path("bga_id", "game.id.objectId"),
    Rule::path("bga_user_id", "user.id"),
    Rule::path("bga_user_name", "user.username"),
    Rule::path("bga_user_rating", "rating"),
];

pub struct BgaSpider {
    config: BgaConfig,
}

impl BgaSpider {
    pub fn new(config: BgaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BgaConfig {
        &self.config
    }

    /// `{api_url}/{path}?{query}` with `client_id` and `limit` filled in
    /// unless given, parameters sorted by key.
    fn api_url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut params = query.to_vec();
        let has = |params: &[(&str, String)], key: &str| params.iter().any(|(k, _)| *k == key);
        if let Some(client_id) = &self.config.client_id {
            if !has(&params, "client_id") {
                params.push(("client_id", client_id.clone()));
            }
        }
        if !has(&params, "limit") {
            params.push(("limit", self.config.page_size.to_string()));
        }
        params.sort_by(|a, b| a.0.cmp(b.0));

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        format!("{}/{}?{}", self.config.api_url.trim_end_matches('/'), path, query)
    }

    /// Listing pages covering `expected` entries plus five percent.
    fn pages(&self, expected: usize) -> usize {
        (expected * 21 / 20)
            .checked_div(self.config.page_size)
            .unwrap_or(0)
    }

    fn game_requests(&self, bga_id: &str) -> Vec<PendingRequest<BgaStage>> {
        let query = [("game-id", bga_id.to_string())];
        let stages = [
            (self.config.scrape_images, "game/images", BgaStage::Images),
            (self.config.scrape_videos, "game/videos", BgaStage::Videos),
            (self.config.scrape_reviews, "game/reviews", BgaStage::Reviews),
        ];
        stages
            .into_iter()
            .filter(|(enabled, _, _)| *enabled)
            .map(|(_, path, stage)| PendingRequest::new(self.api_url(path, &query), stage))
            .collect()
    }

    fn parse_game(&self, game: &Value, scraped_at: DateTime<Utc>) -> ExtractResult<Chain<BgaStage>> {
        let bga_id = game
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .or_else(|| game.get("url").and_then(Value::as_str).and_then(extract_bga_id));

        let mut record = Record::game()
            .with("scraped_at", scraped_at)?
            .with("worst_rating", 1)?
            .with("best_rating", 5)?;
        if let Some(id) = &bga_id {
            record.assign("bga_id", id.as_str())?;
        }

        let mut loader = ItemLoader::new(record, Document::json(game));
        loader.apply(GAME_RULES)?;
        let prices: Vec<String> = loader
            .get_path("msrp")?
            .iter()
            .filter_map(parse_float)
            .filter(|price| *price != 0.0)
            .map(|price| format!("USD{price:.2}"))
            .collect();
        loader.add_values("list_price", prices)?;
        let record = loader.finalize()?;

        Ok(match bga_id {
            Some(id) => Chain::new(record, self.game_requests(&id)).with_identity(id),
            None => Chain::finished(record),
        })
    }

    fn parse_user_review(review: &Value, scraped_at: DateTime<Utc>) -> ExtractResult<Chain<BgaStage>> {
        let record = Record::rating().with("scraped_at", scraped_at)?;
        let mut loader = ItemLoader::new(record, Document::json(review));
        loader.apply(REVIEW_RULES)?;

        let comment = loader
            .get_path("title")?
            .into_iter()
            .chain(loader.get_path("description")?)
            .map(|value| value.to_text())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        loader.add_value("comment", comment)?;

        let record = loader.finalize()?;
        let identity = record.get("bga_id").map(FieldValue::to_text);
        let chain = Chain::finished(record);
        Ok(match identity {
            Some(id) => chain.with_identity(id),
            None => chain,
        })
    }
}

impl Spider for BgaSpider {
    type Stage = BgaStage;

    fn name(&self) -> &'static str {
        "bga"
    }

    fn start_requests(&self) -> Vec<PendingRequest<BgaStage>> {
        let page_size = self.config.page_size;
        let search = (0..self.pages(self.config.expected_games)).map(|page| {
            let query = [
                ("order-by", "popularity".to_string()),
                ("skip", (page * page_size).to_string()),
            ];
            PendingRequest::new(self.api_url("search", &query), BgaStage::Search)
        });
        let reviews = (0..self.pages(self.config.expected_reviews)).map(|page| {
            let query = [("skip", (page * page_size).to_string())];
            PendingRequest::new(self.api_url("reviews", &query), BgaStage::UserReviews)
        });
        search.chain(reviews).collect()
    }

    fn parse_listing(&self, stage: &BgaStage, response: &Response) -> Vec<ExtractResult<Chain<BgaStage>>> {
        let data = response.json();
        let scraped_at = Utc::now();
        let entries = |key: &str| data.get(key).and_then(Value::as_array).cloned().unwrap_or_default();

        match stage {
            BgaStage::Search => entries("games")
                .iter()
                .map(|game| self.parse_game(game, scraped_at))
                .collect(),
            BgaStage::UserReviews => entries("reviews")
                .iter()
                .map(|review| Self::parse_user_review(review, scraped_at))
                .collect(),
            other => {
                debug!(stage = ?other, url = %response.url, "not a listing stage");
                Vec::new()
            }
        }
    }

    fn parse_stage(&self, stage: &BgaStage, record: Record, response: &Response) -> ExtractResult<Record> {
        let data = response.json();
        let mut loader = ItemLoader::new(record, Document::json(&data));
        match stage {
            BgaStage::Images => {
                loader.add_path("image_url", "images[].url")?;
                loader.add_path("image_url", "images[].thumb")?;
            }
            BgaStage::Videos => loader.add_path("video_url", "videos[].url")?,
            BgaStage::Reviews => loader.add_path("review_url", "reviews[].url")?,
            BgaStage::Search | BgaStage::UserReviews => {
                debug!(stage = ?stage, url = %response.url, "not an enrichment stage");
            }
        }
        Ok(loader.finalize()?)
    }
}
