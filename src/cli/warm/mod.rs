//! Warm command - preload first pages concurrently

use clap::Args;
use tracing::{info, warn};

use crate::domain::entity::EntityKind;

#[derive(Args, Debug)]
pub struct WarmArgs {
    /// Entities to preload; all of them when omitted
    pub entities: Vec<EntityKind>,
}

impl WarmArgs {
    pub fn kinds(&self) -> Vec<EntityKind> {
        if self.entities.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            self.entities.clone()
        }
    }
}

pub async fn run(base_url: Option<&str>, args: WarmArgs) -> anyhow::Result<()> {
    let state = super::bootstrap(base_url).await?;

    let mut failures = 0;
    for (kind, result) in state.warm(&args.kinds()).await {
        match result {
            Ok(records) => info!(entity = %kind, records, "Preloaded"),
            Err(e) => {
                failures += 1;
                warn!(entity = %kind, error = %e, "Preload failed");
            }
        }
    }

    super::print_json(&state.cache_info())?;

    if failures > 0 {
        anyhow::bail!("{} entities could not be preloaded", failures);
    }
    Ok(())
}
