use crate::config::Config;
use crate::http::{self, RetryPolicy, TransportError};
use crate::pages::{CursorEnvelope, Page, PageFetcher, StreamMeta};
use crate::pool::{self, ItemConsumer, RunOutcome};
use crate::rate::RateLimitTracker;
use crate::resources::*;
use crate::validate::{self, PageRules};
use log::{info, warn};
use serde::de::DeserializeOwned;

/// Failure taxonomy of one export session. Rate-limit waits are not errors
/// and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid page from {url}: {detail}")]
    InvalidPage { url: String, detail: String },
    #[error("invalid export URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Whether an export ran to the end of the resource or was halted early by
/// the consumer's stop signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Finished,
    Stopped,
}

/// Static per-client tuning: the rate-limit reserve and the per-resource
/// fan-out sizes. Fixed at construction, never tuned at runtime.
#[derive(Debug, Clone)]
pub struct ExportLimits {
    /// Remaining-request buffer below which the engine waits for the window
    /// reset instead of risking a rejection.
    pub reserve: u64,
    pub tickets: usize,
    pub comments: usize,
    pub users: usize,
    pub organizations: usize,
    pub groups: usize,
    pub group_memberships: usize,
    pub identities: usize,
    pub suspended_tickets: usize,
}

impl Default for ExportLimits {
    fn default() -> Self {
        Self {
            reserve: 20,
            tickets: 8,
            comments: 4,
            users: 4,
            organizations: 4,
            groups: 4,
            group_memberships: 4,
            identities: 4,
            suspended_tickets: 4,
        }
    }
}

/// Bulk-export client. One instance owns one HTTP client and one rate-limit
/// budget; instances are fully independent.
#[derive(Debug)]
pub struct ExportClient {
    client: reqwest::Client,
    cfg: Config,
    tracker: RateLimitTracker,
    retry: RetryPolicy,
    limits: ExportLimits,
}

impl ExportClient {
    pub fn new(cfg: Config) -> Result<Self, ExportError> {
        let client = http::build_client(&cfg)?;
        Ok(Self {
            client,
            cfg,
            tracker: RateLimitTracker::new(),
            retry: RetryPolicy::default(),
            limits: ExportLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: ExportLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current `(limit, remaining)` rate budget, if the server has sent one.
    pub fn rate_budget(&self) -> Option<(u64, u64)> {
        self.tracker.snapshot()
    }

    fn fetcher(&self) -> PageFetcher<'_> {
        PageFetcher {
            client: &self.client,
            cfg: &self.cfg,
            tracker: &self.tracker,
            retry: &self.retry,
        }
    }

    /// Incremental ticket export, stream style: first page by start time,
    /// then follow `after_cursor` until `end_of_stream`.
    pub async fn process_tickets<C>(
        &self,
        start_time: i64,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<Ticket> + ?Sized,
    {
        self.run_stream_session(
            "incremental/tickets/cursor.json",
            start_time,
            &validate::TICKET_PAGE,
            self.limits.tickets,
            consumer,
        )
        .await
    }

    pub async fn process_ticket_comments<C>(
        &self,
        ticket_id: u64,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<Comment> + ?Sized,
    {
        self.run_cursor_session(
            &format!("tickets/{}/comments.json", ticket_id),
            page_size,
            &validate::COMMENT_PAGE,
            self.limits.comments,
            consumer,
        )
        .await
    }

    pub async fn process_users<C>(
        &self,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<User> + ?Sized,
    {
        self.run_cursor_session(
            "users.json",
            page_size,
            &validate::USER_PAGE,
            self.limits.users,
            consumer,
        )
        .await
    }

    pub async fn process_organizations<C>(
        &self,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<Organization> + ?Sized,
    {
        self.run_cursor_session(
            "organizations.json",
            page_size,
            &validate::ORGANIZATION_PAGE,
            self.limits.organizations,
            consumer,
        )
        .await
    }

    pub async fn process_groups<C>(
        &self,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<Group> + ?Sized,
    {
        self.run_cursor_session(
            "groups.json",
            page_size,
            &validate::GROUP_PAGE,
            self.limits.groups,
            consumer,
        )
        .await
    }

    pub async fn process_group_memberships<C>(
        &self,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<GroupMembership> + ?Sized,
    {
        self.run_cursor_session(
            "group_memberships.json",
            page_size,
            &validate::GROUP_MEMBERSHIP_PAGE,
            self.limits.group_memberships,
            consumer,
        )
        .await
    }

    pub async fn process_user_identities<C>(
        &self,
        user_id: u64,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<Identity> + ?Sized,
    {
        self.run_cursor_session(
            &format!("users/{}/identities.json", user_id),
            page_size,
            &validate::IDENTITY_PAGE,
            self.limits.identities,
            consumer,
        )
        .await
    }

    pub async fn process_suspended_tickets<C>(
        &self,
        page_size: u32,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        C: ItemConsumer<SuspendedTicket> + ?Sized,
    {
        self.run_cursor_session(
            "suspended_tickets.json",
            page_size,
            &validate::SUSPENDED_TICKET_PAGE,
            self.limits.suspended_tickets,
            consumer,
        )
        .await
    }

    /// Stream-style pagination: Start fetches by start time, Continuing
    /// follows `after_cursor`, Done on `end_of_stream` (or a missing cursor,
    /// which the server should not send mid-stream).
    async fn run_stream_session<T, C>(
        &self,
        path: &str,
        start_time: i64,
        rules: &PageRules,
        concurrency: usize,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        T: DeserializeOwned + Send + 'static,
        C: ItemConsumer<T> + ?Sized,
    {
        let fetcher = self.fetcher();
        let endpoint = self.cfg.endpoint(path);
        let mut cursor: Option<String> = None;
        loop {
            self.tracker.check_and_wait(self.limits.reserve).await;
            let url = match &cursor {
                None => http::build_url(&endpoint, &[("start_time", start_time.to_string())])?,
                Some(c) => http::build_url(&endpoint, &[("cursor", c.clone())])?,
            };
            let page: Page<T, StreamMeta> = fetcher.fetch(&url, rules).await?;
            if self.deliver(path, page.items, concurrency, consumer).await == RunOutcome::Stopped {
                return Ok(ExportOutcome::Stopped);
            }
            if page.meta.end_of_stream {
                info!("{}: end of stream", path);
                return Ok(ExportOutcome::Finished);
            }
            match page.meta.after_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    warn!(
                        "{}: stream not at end but no after_cursor; treating as end of export",
                        path
                    );
                    return Ok(ExportOutcome::Finished);
                }
            }
        }
    }

    /// Meta-cursor pagination: Start fetches by page size, Continuing adds
    /// the cursor, Done on `has_more == false` (or has_more with no cursor).
    async fn run_cursor_session<T, C>(
        &self,
        path: &str,
        page_size: u32,
        rules: &PageRules,
        concurrency: usize,
        consumer: &C,
    ) -> Result<ExportOutcome, ExportError>
    where
        T: DeserializeOwned + Send + 'static,
        C: ItemConsumer<T> + ?Sized,
    {
        let fetcher = self.fetcher();
        let endpoint = self.cfg.endpoint(path);
        let mut cursor: Option<String> = None;
        loop {
            self.tracker.check_and_wait(self.limits.reserve).await;
            let mut params = vec![("page[size]", page_size.to_string())];
            if let Some(c) = &cursor {
                params.push(("page[after]", c.clone()));
            }
            let url = http::build_url(&endpoint, &params)?;
            let page: Page<T, CursorEnvelope> = fetcher.fetch(&url, rules).await?;
            if self.deliver(path, page.items, concurrency, consumer).await == RunOutcome::Stopped {
                return Ok(ExportOutcome::Stopped);
            }
            if !page.meta.meta.has_more {
                return Ok(ExportOutcome::Finished);
            }
            match page.meta.meta.after_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    warn!(
                        "{}: has_more set but no after_cursor; treating as end of export",
                        path
                    );
                    return Ok(ExportOutcome::Finished);
                }
            }
        }
    }

    /// Fan one page's items out to the consumer. The next page is never
    /// fetched before every item here has settled.
    async fn deliver<T, C>(
        &self,
        path: &str,
        items: Vec<T>,
        concurrency: usize,
        consumer: &C,
    ) -> RunOutcome
    where
        T: Send + 'static,
        C: ItemConsumer<T> + ?Sized,
    {
        let report = pool::process_batches(items, consumer, concurrency).await;
        if report.failed > 0 {
            warn!(
                "{}: {} consumer failure(s) contained in this page",
                path, report.failed
            );
        }
        if report.outcome == RunOutcome::Stopped {
            info!("{}: export stopped by consumer", path);
        }
        report.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = ExportLimits::default();
        assert_eq!(limits.reserve, 20);
        assert!(limits.tickets > limits.comments);
    }
}
