//! Crawl driver
//!
//! Fetches a spider's start requests, turns each listing response into
//! entity chains and runs those chains concurrently. Every chain stays
//! linear; concurrency is only ever across entities.

use std::fmt;
use std::pin::pin;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::chain::{Chain, PendingRequest, StageHandler};
use crate::config::CrawlConfig;
use crate::error::{ExtractResult, FetchResult};
use crate::fetch::{Fetcher, RateLimitedFetcher, Response};
use crate::item::Record;

/// A source: where to start, how to read listings, how to read each stage.
pub trait Spider: Send + Sync {
    type Stage: fmt::Debug + Send + Sync;

    fn name(&self) -> &'static str;

    fn start_requests(&self) -> Vec<PendingRequest<Self::Stage>>;

    /// One chain per entity found on a listing page. An entity that cannot
    /// even be seeded comes back as an error and is dropped.
    fn parse_listing(
        &self,
        stage: &Self::Stage,
        response: &Response,
    ) -> Vec<ExtractResult<Chain<Self::Stage>>>;

    /// Fold an enrichment response into the entity's record.
    fn parse_stage(
        &self,
        stage: &Self::Stage,
        record: Record,
        response: &Response,
    ) -> ExtractResult<Record>;
}

struct Stages<'a, P>(&'a P);

impl<P: Spider> StageHandler<P::Stage> for Stages<'_, P> {
    fn extract(&self, stage: &P::Stage, record: Record, response: &Response) -> ExtractResult<Record> {
        self.0.parse_stage(stage, record, response)
    }
}

/// Something that did not make it into the feed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropReason {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub records: Vec<Record>,
    pub drops: Vec<DropReason>,
}

pub struct Runner<F> {
    fetcher: F,
    config: CrawlConfig,
}

impl<F: Fetcher> Runner<RateLimitedFetcher<F>> {
    /// Wrap `fetcher` in the configured request rate. The limit is shared by
    /// every chain of the run, fan-out requests included.
    pub fn rate_limited(fetcher: F, config: CrawlConfig) -> Self {
        let fetcher = RateLimitedFetcher::new(fetcher, config.requests_per_second, config.burst);
        Self::new(fetcher, config)
    }
}

impl<F: Fetcher> Runner<F> {
    pub fn new(fetcher: F, config: CrawlConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Records and drops as they finish. Chains start as soon as their
    /// listing page is parsed, while later listings are still in flight.
    pub fn stream<'a, P: Spider>(
        &'a self,
        spider: &'a P,
    ) -> impl Stream<Item = Result<Record, DropReason>> + 'a {
        let concurrency = self.config.concurrency.max(1);
        let mode = self.config.chain_mode;
        let fetcher = &self.fetcher;
        let starts = spider.start_requests();
        info!(
            spider = spider.name(),
            start_requests = starts.len(),
            concurrency,
            mode = ?mode,
            "crawl starting"
        );

        stream::iter(starts)
            .map(move |request| async move {
                let outcome = fetcher.fetch(&request.url).await;
                (request, outcome)
            })
            .buffered(concurrency)
            .flat_map(move |(request, outcome)| stream::iter(seed(spider, request, outcome)))
            .map(move |seeded| async move {
                let (url, chain) = match seeded {
                    Ok(seeded) => seeded,
                    Err(dropped) => return Err(dropped),
                };
                let handler = Stages(spider);
                let result = chain.run(fetcher, &handler, mode).await.and_then(|record| {
                    record.check_required()?;
                    Ok(record)
                });
                result.map_err(|e| {
                    warn!(url = %url, error = %e, "record dropped");
                    DropReason {
                        url,
                        reason: e.to_string(),
                    }
                })
            })
            .buffer_unordered(concurrency)
    }

    pub async fn run<P: Spider>(&self, spider: &P) -> CrawlReport {
        let mut report = CrawlReport::default();
        let mut outcomes = pin!(self.stream(spider));
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(record) => report.records.push(record),
                Err(dropped) => report.drops.push(dropped),
            }
        }

        info!(
            spider = spider.name(),
            records = report.records.len(),
            drops = report.drops.len(),
            "crawl finished"
        );
        report
    }
}

type Seeded<S> = Result<(String, Chain<S>), DropReason>;

/// Turn one listing outcome into chains to run, or drops.
fn seed<P: Spider>(
    spider: &P,
    request: PendingRequest<P::Stage>,
    outcome: FetchResult<Response>,
) -> Vec<Seeded<P::Stage>> {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %request.url, error = %e, "listing request failed");
            return vec![Err(DropReason {
                url: request.url,
                reason: e.to_string(),
            })];
        }
    };
    let seeded = spider.parse_listing(&request.stage, &response);
    debug!(url = %response.url, entities = seeded.len(), "listing parsed");
    seeded
        .into_iter()
        .map(|chain| match chain {
            Ok(chain) => Ok((response.url.clone(), chain)),
            Err(e) => {
                warn!(url = %response.url, error = %e, "entity dropped while seeding");
                Err(DropReason {
                    url: response.url.clone(),
                    reason: e.to_string(),
                })
            }
        })
        .collect()
}
