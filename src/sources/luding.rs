//! Luding spider
//!
//! Letter index pages list every game; each game page is one stage. The
//! game data sits in the table following the page headline, as label/value
//! rows.

use indexmap::IndexSet;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::chain::{Chain, PendingRequest};
use crate::error::{ExtractError, ExtractResult};
use crate::extractors::{extract_links, Document};
use crate::fetch::Response;
use crate::item::Record;
use crate::loader::ItemLoader;
use crate::normalize::{extract_bgg_id, extract_query_param};
use crate::runner::Spider;

const BASE_URL: &str = "http://luding.org/cgi-bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LudingStage {
    Letter,
    Game,
}

/// Selectors for a game page.
struct GamePage {
    headline: Selector,
    table: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
    image: Selector,
}

impl GamePage {
    fn new() -> ExtractResult<Self> {
        Ok(Self {
            headline: selector("h1")?,
            table: selector("h1 ~ table")?,
            row: selector("tr")?,
            cell: selector("td")?,
            anchor: selector("a[href]")?,
            image: selector("img[src]")?,
        })
    }

    /// The value cell of the row whose first cell reads `label`.
    fn labelled<'a>(&self, table: ElementRef<'a>, label: &str) -> Option<ElementRef<'a>> {
        table.select(&self.row).find_map(|row| {
            let mut cells = row.select(&self.cell);
            let first = cells.next()?;
            if first.text().collect::<String>().trim() != label {
                return None;
            }
            cells.next()
        })
    }
}

fn selector(css: &str) -> ExtractResult<Selector> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct LudingSpider;

impl LudingSpider {
    pub fn new() -> Self {
        Self
    }

    fn parse_game(&self, record: Record, response: &Response) -> ExtractResult<Record> {
        let page = GamePage::new()?;
        let html = Html::parse_document(&response.body);
        let root = html.root_element();
        let Some(table) = root.select(&page.table).next() else {
            debug!(url = %response.url, "no game table");
            return Ok(ItemLoader::new(record, Document::Empty).finalize()?);
        };

        let mut loader = ItemLoader::new(record, Document::Html(table)).with_base_url(&response.url);

        if let Some(headline) = root.select(&page.headline).next() {
            loader.add_value("name", headline.html())?;
        }
        let labelled = |label: &str| page.labelled(table, label);

        if let Some(cell) = labelled("Year:") {
            loader.add_value("year", cell.html())?;
        }
        if let Some(cell) = labelled("Type:") {
            loader.add_value("game_type", cell.html())?;
        }
        if let Some(cell) = labelled("Box text:") {
            loader.add_value("description", cell.html())?;
        }
        for (label, field) in [
            ("Designer:", "designer"),
            ("Art:", "artist"),
            ("Publisher name:", "publisher"),
        ] {
            if let Some(cell) = labelled(label) {
                loader.add_values(field, cell.select(&page.anchor).map(|a| a.html()))?;
            }
        }

        let hrefs: Vec<&str> = table
            .select(&page.anchor)
            .filter_map(|a| a.value().attr("href"))
            .collect();
        if let Some(last) = hrefs.last() {
            let url = loader.urljoin(last);
            loader.add_value("url", url)?;
        }

        let images: Vec<String> = table
            .select(&page.image)
            .filter_map(|img| img.value().attr("src"))
            .map(|src| loader.urljoin(src))
            .collect();
        loader.add_values("image_url", images)?;

        let links: Vec<String> = hrefs
            .iter()
            .filter(|href| href.starts_with("/cgi-bin/Redirect.py"))
            .filter_map(|href| extract_query_param(&loader.urljoin(href), "URL"))
            .collect();
        loader.add_values("bgg_id", links.iter().filter_map(|link| extract_bgg_id(link)))?;
        loader.add_values("external_link", links)?;

        if let Some(players) = labelled("No. of players:").and_then(first_text) {
            let bounds: Vec<&str> = players.split('-').collect();
            if let (Some(min), Some(max)) = (bounds.first(), bounds.last()) {
                loader.add_value("min_players", *min)?;
                loader.add_value("max_players", *max)?;
            }
        }
        let age = labelled("Age:").and_then(first_text).and_then(|age| {
            age.split(|c: char| !c.is_ascii_digit())
                .find(|digits| !digits.is_empty())
                .map(String::from)
        });
        if let Some(age) = age {
            loader.add_value("min_age", age)?;
        }

        if let Some(id) = extract_query_param(&response.url, "gameid") {
            loader.add_value("luding_id", id)?;
        }

        Ok(loader.finalize()?)
    }
}

fn first_text(cell: ElementRef<'_>) -> Option<String> {
    cell.text()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(String::from)
}

impl Spider for LudingSpider {
    type Stage = LudingStage;

    fn name(&self) -> &'static str {
        "luding"
    }

    fn start_requests(&self) -> Vec<PendingRequest<LudingStage>> {
        ('A'..='Z')
            .chain(['0'])
            .map(|letter| {
                PendingRequest::new(
                    format!("{BASE_URL}/GameFirstLetter.py?letter={letter}"),
                    LudingStage::Letter,
                )
            })
            .collect()
    }

    fn parse_listing(&self, stage: &LudingStage, response: &Response) -> Vec<ExtractResult<Chain<LudingStage>>> {
        if *stage != LudingStage::Letter {
            return Vec::new();
        }
        let html = response.html();
        let links: IndexSet<String> = extract_links(
            html.root_element(),
            "table.game-list tr > td:first-child a",
            &response.url,
        )
        .into_iter()
        .collect();

        links
            .into_iter()
            .map(|url| {
                let chain = Chain::new(Record::game(), [PendingRequest::new(url.clone(), LudingStage::Game)]);
                Ok(match extract_query_param(&url, "gameid") {
                    Some(id) => chain.with_identity(id),
                    None => chain,
                })
            })
            .collect()
    }

    fn parse_stage(&self, stage: &LudingStage, record: Record, response: &Response) -> ExtractResult<Record> {
        match stage {
            LudingStage::Game => self.parse_game(record, response),
            LudingStage::Letter => Ok(record),
        }
    }
}
