pub(crate) mod provision;
pub(crate) mod readiness;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::AppConfig;
use provision::{ProvisionReport, Provisioner, SqlxProvisioner, provision_databases};
use readiness::{LivenessProbe, PgIsReadyProbe, ReadinessSettings, wait_for_ready};

/// Public entry point for container initialisation.
///
/// Starting the server afterwards is left to the container's supervisor.
pub async fn run_init_flow(app_config: &AppConfig) -> Result<()> {
    let probe = PgIsReadyProbe::new(&app_config.postgres);
    let provisioner = SqlxProvisioner::new(&app_config.postgres);

    let report = perform_bootstrap(app_config, &probe, &provisioner, ReadinessSettings::default()).await?;

    if let Some(report) = report {
        info!(
            report = %serde_json::to_string(&report).unwrap_or_default(),
            "Bootstrap finished: {} provisioned, {} failed",
            report.provisioned().len(),
            report.failed().len()
        );
    }
    Ok(())
}

/// Blocks until the server accepts connections.
pub async fn run_wait_ready_flow(app_config: &AppConfig) -> Result<()> {
    let probe = PgIsReadyProbe::new(&app_config.postgres);
    wait_for_ready(&probe, ReadinessSettings::default())
        .await
        .context("PostgreSQL did not become ready")?;
    Ok(())
}

/// Readiness gate followed by per-database provisioning.
///
/// Returns `None` when no databases are configured (nothing to wait for).
/// A readiness failure is fatal; provisioning failures only show up in the report.
pub async fn perform_bootstrap(
    app_config: &AppConfig,
    probe: &dyn LivenessProbe,
    provisioner: &dyn Provisioner,
    settings: ReadinessSettings,
) -> Result<Option<ProvisionReport>> {
    let Some(databases) = &app_config.bootstrap.databases else {
        warn!("⚠️ POSTGRES_MULTIPLE_DATABASES is not set, skipping database creation");
        return Ok(None);
    };

    wait_for_ready(probe, settings)
        .await
        .context("PostgreSQL startup timed out")?;

    info!("Provisioning databases {:?} with extensions {:?}", databases, app_config.bootstrap.extensions);
    Ok(Some(
        provision_databases(provisioner, databases, &app_config.bootstrap.extensions).await,
    ))
}
