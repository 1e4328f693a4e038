//! Show command - one record, straight from the backend

use clap::Args;
use serde_json::Value;

use crate::domain::entity::EntityKind;
use crate::domain::load::LoadToken;
use crate::infrastructure::entity::EntityCacheClient;

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub entity: EntityKind,

    /// Record identifier (CI, numeric id, ...)
    pub id: String,
}

pub async fn run(base_url: Option<&str>, args: ShowArgs) -> anyhow::Result<()> {
    let state = super::bootstrap(base_url).await?;
    let client: EntityCacheClient<Value> = state.client(args.entity);

    let record = client.get_by_id(&args.id, &LoadToken::detached()).await?;

    super::print_json(&record)
}
