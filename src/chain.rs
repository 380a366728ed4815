//! Request chain controller
//!
//! One entity's enrichment is an explicit continuation: the record built so
//! far plus the queue of requests still to issue. [`Chain::advance`] folds
//! the latest response into the record and either hands back the next
//! request to issue, together with the rest of the chain, or the finished
//! record.
//!
//! A chain is linear. Stage N's response is merged before stage N+1's
//! request is issued, and a failed request contributes nothing but does not
//! stop the chain.

use std::collections::VecDeque;
use std::fmt;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::ChainMode;
use crate::error::{ExtractResult, FetchResult};
use crate::fetch::{Fetcher, Response};
use crate::item::Record;

/// A request waiting to be issued, tagged with the stage that parses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest<S> {
    pub url: String,
    pub stage: S,
}

impl<S> PendingRequest<S> {
    pub fn new(url: impl Into<String>, stage: S) -> Self {
        Self {
            url: url.into(),
            stage,
        }
    }
}

/// Folds one stage's response into a record.
pub trait StageHandler<S>: Send + Sync {
    fn extract(&self, stage: &S, record: Record, response: &Response) -> ExtractResult<Record>;
}

/// A response, or the error in its place, for an issued request.
#[derive(Debug)]
pub struct Delivery<S> {
    pub request: PendingRequest<S>,
    pub outcome: FetchResult<Response>,
}

/// What to do after [`Chain::advance`].
#[derive(Debug)]
pub enum Advance<S> {
    /// Issue `request`, then deliver its response to `chain`.
    Issue {
        request: PendingRequest<S>,
        chain: Chain<S>,
    },
    /// Nothing left to fetch.
    Finished(Record),
}

/// A record and the enrichment requests still queued for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain<S> {
    identity: Option<String>,
    record: Record,
    queue: VecDeque<PendingRequest<S>>,
}

impl<S: fmt::Debug> Chain<S> {
    pub fn new(record: Record, queue: impl IntoIterator<Item = PendingRequest<S>>) -> Self {
        Self {
            identity: None,
            record,
            queue: queue.into_iter().collect(),
        }
    }

    /// A chain with nothing queued finishes on the first advance.
    pub fn finished(record: Record) -> Self {
        Self::new(record, [])
    }

    /// Tag the chain with the entity's external ID, for correlation in logs.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingRequest<S>> {
        self.queue.iter()
    }

    /// Merge `delivery` (if any), then pop the next request.
    pub fn advance<H>(self, delivery: Option<Delivery<S>>, handler: &H) -> ExtractResult<Advance<S>>
    where
        H: StageHandler<S> + ?Sized,
    {
        let Self {
            identity,
            mut record,
            mut queue,
        } = self;

        if let Some(delivery) = delivery {
            record = merge(identity.as_deref(), record, delivery, handler)?;
        }

        Ok(match queue.pop_front() {
            Some(request) => Advance::Issue {
                request,
                chain: Self {
                    identity,
                    record,
                    queue,
                },
            },
            None => Advance::Finished(record),
        })
    }

    /// Drive the chain to completion against `fetcher`.
    pub async fn run<F, H>(self, fetcher: &F, handler: &H, mode: ChainMode) -> ExtractResult<Record>
    where
        F: Fetcher + ?Sized,
        H: StageHandler<S> + ?Sized,
    {
        match mode {
            ChainMode::Sequential => self.run_sequential(fetcher, handler).await,
            ChainMode::FanOut => self.run_fan_out(fetcher, handler).await,
        }
    }

    async fn run_sequential<F, H>(self, fetcher: &F, handler: &H) -> ExtractResult<Record>
    where
        F: Fetcher + ?Sized,
        H: StageHandler<S> + ?Sized,
    {
        let mut chain = self;
        let mut delivery = None;
        loop {
            match chain.advance(delivery.take(), handler)? {
                Advance::Issue { request, chain: next } => {
                    debug!(url = %request.url, stage = ?request.stage, "issuing chained request");
                    let outcome = fetcher.fetch(&request.url).await;
                    delivery = Some(Delivery { request, outcome });
                    chain = next;
                }
                Advance::Finished(record) => return Ok(record),
            }
        }
    }

    async fn run_fan_out<F, H>(self, fetcher: &F, handler: &H) -> ExtractResult<Record>
    where
        F: Fetcher + ?Sized,
        H: StageHandler<S> + ?Sized,
    {
        let Self {
            identity,
            mut record,
            queue,
        } = self;

        let outcomes = join_all(queue.iter().map(|request| fetcher.fetch(&request.url))).await;
        for (request, outcome) in queue.into_iter().zip(outcomes) {
            record = merge(identity.as_deref(), record, Delivery { request, outcome }, handler)?;
        }
        Ok(record)
    }
}

fn merge<S, H>(
    identity: Option<&str>,
    record: Record,
    delivery: Delivery<S>,
    handler: &H,
) -> ExtractResult<Record>
where
    S: fmt::Debug,
    H: StageHandler<S> + ?Sized,
{
    let Delivery { request, outcome } = delivery;
    match outcome {
        Ok(response) => handler.extract(&request.stage, record, &response),
        Err(e) => {
            warn!(
                url = %request.url,
                stage = ?request.stage,
                entity = identity.unwrap_or("-"),
                error = %e,
                "stage failed, continuing without it"
            );
            Ok(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractError, ItemError};
    use crate::testing::MockFetcher;
    use crate::value::FieldValue;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Stage {
        Designers,
        Artists,
        Publishers,
        Broken,
    }

    struct Handler;

    impl StageHandler<Stage> for Handler {
        fn extract(&self, stage: &Stage, mut record: Record, response: &Response) -> ExtractResult<Record> {
            let field = match stage {
                Stage::Designers => "designer",
                Stage::Artists => "artist",
                Stage::Publishers => "publisher",
                Stage::Broken => "name",
            };
            if *stage == Stage::Broken {
                record.assign(field, 1)?;
            } else {
                record.assign(field, vec![response.body.as_str()])?;
            }
            Ok(record)
        }
    }

    fn three_stage_chain() -> Chain<Stage> {
        let record = Record::game().with("name", "Catan").unwrap();
        Chain::new(
            record,
            [
                PendingRequest::new("http://x/1", Stage::Designers),
                PendingRequest::new("http://x/2", Stage::Artists),
                PendingRequest::new("http://x/3", Stage::Publishers),
            ],
        )
        .with_identity("13")
    }

    #[test]
    fn test_advance_pops_in_order() {
        let chain = three_stage_chain();
        let Advance::Issue { request, chain } = chain.advance(None, &Handler).unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(request.url, "http://x/1");
        assert_eq!(chain.pending().count(), 2);
        assert_eq!(chain.identity(), Some("13"));

        let delivery = Delivery {
            request,
            outcome: Ok(Response::new("http://x/1", "Klaus")),
        };
        let Advance::Issue { request, chain } = chain.advance(Some(delivery), &Handler).unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(request.stage, Stage::Artists);
        assert_eq!(chain.record().get("designer"), Some(&FieldValue::from(vec!["Klaus"])));
    }

    #[test]
    fn test_empty_chain_finishes() {
        let record = Record::game().with("name", "Catan").unwrap();
        match Chain::<Stage>::finished(record.clone()).advance(None, &Handler).unwrap() {
            Advance::Finished(done) => assert_eq!(done, record),
            Advance::Issue { .. } => panic!("nothing should be queued"),
        }
    }

    #[tokio::test]
    async fn test_failed_stage_is_skipped() {
        let fetcher = MockFetcher::new()
            .with_body("http://x/1", "Klaus")
            .with_status("http://x/2", 503)
            .with_body("http://x/3", "Kosmos");

        for mode in [ChainMode::Sequential, ChainMode::FanOut] {
            let record = three_stage_chain().run(&fetcher, &Handler, mode).await.unwrap();
            assert!(record.contains("designer"));
            assert!(!record.contains("artist"));
            assert_eq!(record.get("publisher"), Some(&FieldValue::from(vec!["Kosmos"])));
        }
    }

    #[tokio::test]
    async fn test_sequential_issues_one_at_a_time_in_order() {
        let fetcher = MockFetcher::new()
            .with_body("http://x/1", "a")
            .with_body("http://x/2", "b")
            .with_body("http://x/3", "c");
        three_stage_chain()
            .run(&fetcher, &Handler, ChainMode::Sequential)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec!["http://x/1", "http://x/2", "http://x/3"]);
    }

    #[tokio::test]
    async fn test_contract_violation_aborts_record() {
        let fetcher = MockFetcher::new().with_body("http://x/broken", "");
        let chain = Chain::new(
            Record::game(),
            [PendingRequest::new("http://x/broken", Stage::Broken)],
        );
        let err = chain.run(&fetcher, &Handler, ChainMode::Sequential).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Item(ItemError::TypeContractViolation { field: "name", .. })
        ));
    }
}
