use std::sync::Arc;

use anyhow::anyhow;
use database::DbConnectionPoolV2;

use crate::views;

pub async fn healthcheck_cmd(db_pool: Arc<DbConnectionPoolV2>) -> anyhow::Result<()> {
    views::check_health(db_pool)
        .await
        .map_err(|e| anyhow!("healthcheck failed: {e}"))?;

    tracing::info!("✅ Healthcheck passed");
    Ok(())
}
