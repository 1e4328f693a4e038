//! List command - paginated list through the cache

use std::time::Instant;

use anyhow::bail;
use clap::Args;
use serde_json::{json, Value};
use tokio::signal;
use tracing::info;

use crate::domain::cache::{FilterValue, QueryDescriptor, DEFAULT_PAGE_SIZE};
use crate::domain::entity::{EntityKind, Page};
use crate::domain::load::{LoadOutcome, LoadState};
use crate::infrastructure::entity::EntityCacheClient;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Entity namespace (see `entities`)
    pub entity: EntityKind,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Filter as field=value; repeatable
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, FilterValue)>,

    /// Run the same query this many times to observe cache hits
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

impl ListArgs {
    pub fn query(&self) -> QueryDescriptor {
        self.filters.iter().fold(
            QueryDescriptor::new()
                .with_page(self.page)
                .with_page_size(self.page_size),
            |query, (field, value)| query.with_filter(field.clone(), value.clone()),
        )
    }
}

/// Parses `field=value`, inferring booleans and numbers
pub fn parse_filter(raw: &str) -> Result<(String, FilterValue), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected field=value, got '{}'", raw))?;

    let field = field.trim();
    if field.is_empty() {
        return Err(format!("Missing field name in '{}'", raw));
    }

    let value = value.trim();
    // Identity numbers keep their leading zeros
    let numeric = !(value.len() > 1 && value.starts_with('0') && !value.starts_with("0."));

    let parsed = if let Ok(flag) = value.parse::<bool>() {
        FilterValue::Bool(flag)
    } else if let (true, Ok(number)) = (numeric, value.parse::<i64>()) {
        FilterValue::Integer(number)
    } else if let (true, Ok(number)) = (numeric, value.parse::<f64>()) {
        FilterValue::Float(number)
    } else {
        FilterValue::Text(value.to_string())
    };

    Ok((field.to_string(), parsed))
}

pub async fn run(base_url: Option<&str>, args: ListArgs) -> anyhow::Result<()> {
    let state = super::bootstrap(base_url).await?;
    let client: EntityCacheClient<Value> = state.client(args.entity);
    let scope = state.scope::<Page<Value>>(format!("cli:{}:list", args.entity));
    let query = args.query();

    for attempt in 1..=args.repeat.max(1) {
        let started = Instant::now();

        let outcome = tokio::select! {
            outcome = scope.load(|token| {
                let client = client.clone();
                let query = query.clone();
                async move { client.get_all(&token, &query).await }
            }) => outcome,
            _ = signal::ctrl_c() => {
                scope.cancel();
                info!("Received Ctrl+C, load cancelled");
                return Ok(());
            }
        };

        match outcome {
            LoadOutcome::Applied => {
                info!(
                    entity = %args.entity,
                    attempt,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "List loaded"
                );
            }
            LoadOutcome::Failed(e) => return Err(e.into()),
            LoadOutcome::Discarded => bail!("Load of {} was cancelled", args.entity),
        }
    }

    let LoadState::Ready(page) = scope.snapshot() else {
        bail!("No result for {}", args.entity);
    };

    let stats = client.stats();
    super::print_json(&json!({
        "page": page,
        "cached": query.is_cache_eligible(),
        "stats": stats,
        "hit_rate": stats.hit_rate(),
    }))
}
