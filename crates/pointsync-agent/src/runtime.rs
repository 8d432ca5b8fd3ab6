//! One synchronization run.

use crate::config::AgentConfig;
use crate::inventory;
use anyhow::{Context, Result};
use pointsync_adapter_haystack::{
    HaystackClient, HierarchyResolver, ReqwestTransport, TimeseriesWriter,
};
use pointsync_core::Point;
use uuid::Uuid;

/// Execute one run: authenticate, resolve the hierarchy, write history.
///
/// # Errors
///
/// Returns error on inventory, authentication, resolution or write
/// failure. Handshake failures abort the whole run; there is no partial
/// retry at this level.
pub fn run(config: &AgentConfig) -> Result<()> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("sync_run", %run_id);
    let _guard = span.enter();

    let inventory = inventory::load(&config.inventory_path)?;
    if inventory.points.is_empty() {
        tracing::info!("inventory holds no points; nothing to do");
        return Ok(());
    }

    let transport =
        ReqwestTransport::new(config.store.timeout).context("Failed to create HTTP transport")?;
    let client = HaystackClient::connect(
        transport,
        config.store.clone(),
        &config.username,
        &config.password,
    )
    .context("Authentication failed")?;

    let points: Vec<Point> = inventory.points.into_iter().map(Point::from).collect();
    tracing::info!(points = points.len(), "resolving hierarchy");

    let resolver = HierarchyResolver::new(&client);
    let batch = resolver
        .resolve(&points)
        .context("Hierarchy resolution failed")?;

    let writer = TimeseriesWriter::new(&client);
    let written = writer
        .write(&batch.points, &inventory.samples)
        .context("History write failed")?;

    tracing::info!(
        sites_created = batch.sites.len(),
        equipment_created = batch.equipment.len(),
        points_created = batch.entities.len(),
        samples_written = written,
        "synchronization complete"
    );
    Ok(())
}
