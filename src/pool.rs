use async_trait::async_trait;
use futures::future::join_all;
use log::warn;

/// What a consumer tells the engine after handling one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerSignal {
    Continue,
    Stop,
}

/// How one item sequence finished: drained fully, or halted by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

/// Per-item callback supplied by the caller of an export.
///
/// Consumers run concurrently within one batch and may suspend. A returned
/// error is contained to that one item: siblings in the batch still settle
/// and the run continues. Only `ConsumerSignal::Stop` halts scheduling.
#[async_trait]
pub trait ItemConsumer<T: Send + 'static>: Send + Sync {
    async fn process(&self, item: T) -> anyhow::Result<ConsumerSignal>;
}

/// Outcome of one `process_batches` run plus the contained failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: RunOutcome,
    pub failed: usize,
}

/// Run `consumer` over `items` with at most `concurrency` in flight.
///
/// Items are drawn from the head of the sequence in order, one batch at a
/// time. Every task in a launched batch settles before the stop flag is
/// consulted, so a stop requested by item k never cancels its siblings; it
/// only prevents the next batch from being drawn.
pub async fn process_batches<T, C>(items: Vec<T>, consumer: &C, concurrency: usize) -> BatchReport
where
    T: Send + 'static,
    C: ItemConsumer<T> + ?Sized,
{
    let concurrency = concurrency.max(1);
    let mut iter = items.into_iter();
    let mut stopped = false;
    let mut failed = 0usize;

    while !stopped {
        let batch: Vec<T> = iter.by_ref().take(concurrency).collect();
        if batch.is_empty() {
            break;
        }
        let results = join_all(batch.into_iter().map(|item| consumer.process(item))).await;
        for result in results {
            match result {
                Ok(ConsumerSignal::Continue) => {}
                Ok(ConsumerSignal::Stop) => stopped = true,
                Err(e) => {
                    failed += 1;
                    warn!("consumer failed on item: {:#}", e);
                }
            }
        }
    }

    let outcome = if stopped {
        RunOutcome::Stopped
    } else {
        RunOutcome::Completed
    };
    BatchReport { outcome, failed }
}
