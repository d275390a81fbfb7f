use anyhow::{bail, Context};
use async_trait::async_trait;
use helpdesk_export::cli;
use helpdesk_export::config::Config;
use helpdesk_export::{ConsumerSignal, ExportClient, ExportOutcome, ItemConsumer};
use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Writes each record as one JSON line to stdout; asks the engine to stop
/// once the optional record limit is reached.
struct NdjsonConsumer {
    emitted: AtomicU64,
    limit: Option<u64>,
}

impl NdjsonConsumer {
    fn new(limit: Option<u64>) -> Self {
        Self {
            emitted: AtomicU64::new(0),
            limit,
        }
    }
}

#[async_trait]
impl<T: Serialize + Send + 'static> ItemConsumer<T> for NdjsonConsumer {
    async fn process(&self, item: T) -> anyhow::Result<ConsumerSignal> {
        let line = serde_json::to_string(&item)?;
        println!("{}", line);
        let n = self.emitted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.is_some_and(|max| n >= max) {
            return Ok(ConsumerSignal::Stop);
        }
        Ok(ConsumerSignal::Continue)
    }
}

fn parsed<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .get_one::<String>(name)
        .map(|s| s.parse::<T>())
        .transpose()
        .with_context(|| format!("invalid --{}", name))
}

/// `--start-time` accepts unix seconds or an RFC 3339 timestamp.
fn parse_start_time(raw: &str) -> anyhow::Result<i64> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    let ts = chrono::DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid --start-time: {}", raw))?;
    Ok(ts.timestamp())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    cli::init_logging(log_level.as_deref());

    if matches.get_flag("version") {
        println!("helpdesk-export {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(resource) = matches.get_one::<String>("resource").cloned() else {
        bail!("--resource is required (see --help)");
    };
    let start_time: i64 = matches
        .get_one::<String>("start-time")
        .map(|s| parse_start_time(s))
        .transpose()?
        .unwrap_or(0);
    let page_size: u32 = parsed(&matches, "page-size")?.unwrap_or(100);
    let ticket_id: Option<u64> = parsed(&matches, "ticket-id")?;
    let user_id: Option<u64> = parsed(&matches, "user-id")?;
    let limit: Option<u64> = parsed(&matches, "limit")?;

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let client = ExportClient::new(cfg)?;
    let consumer = NdjsonConsumer::new(limit);

    let outcome = match resource.as_str() {
        "tickets" => client.process_tickets(start_time, &consumer).await?,
        "comments" => {
            let Some(id) = ticket_id else {
                bail!("--ticket-id is required for comments");
            };
            client
                .process_ticket_comments(id, page_size, &consumer)
                .await?
        }
        "users" => client.process_users(page_size, &consumer).await?,
        "organizations" => client.process_organizations(page_size, &consumer).await?,
        "groups" => client.process_groups(page_size, &consumer).await?,
        "group-memberships" => {
            client
                .process_group_memberships(page_size, &consumer)
                .await?
        }
        "identities" => {
            let Some(id) = user_id else {
                bail!("--user-id is required for identities");
            };
            client
                .process_user_identities(id, page_size, &consumer)
                .await?
        }
        "suspended-tickets" => client.process_suspended_tickets(page_size, &consumer).await?,
        other => bail!("unknown resource: {}", other),
    };

    let emitted = consumer.emitted.load(Ordering::SeqCst);
    match outcome {
        ExportOutcome::Finished => info!("export finished; {} records", emitted),
        ExportOutcome::Stopped => info!("export stopped early; {} records", emitted),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_accepts_seconds_and_rfc3339() {
        assert_eq!(parse_start_time("0").unwrap(), 0);
        assert_eq!(parse_start_time("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_start_time("1970-01-01T00:01:00Z").unwrap(), 60);
        assert!(parse_start_time("yesterday").is_err());
    }
}
