/// railyard - Kubernetes clusters on pluggable platforms
///
/// Provisions a cluster with Terraform, waits for it to become reachable and
/// installs the configured components.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use railyard::components::{ClusterHandle, HelmBackend, Installer};
use railyard::config::{ComponentSpec, LoadedConfig, RootConfig};
use railyard::k8s::KubernetesClient;
use railyard::monitoring::alerts::{alert_rules_polling, probe_alert_rules};
use railyard::monitoring::targets::{probe_scrape_targets, scrape_targets_polling};
use railyard::monitoring::PrometheusClient;
use railyard::platform::{load_platform, require_cluster, Platform, PlatformRegistry};
use railyard::report::VerificationReport;
use railyard::terraform::{self, Executor};
use railyard::verify;
use railyard::Error;

#[derive(Parser)]
#[command(name = "railyard")]
#[command(about = "Provision and verify Kubernetes clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "railyard.yaml")]
    config: PathBuf,

    /// YAML file with values for ${var.NAME} references
    #[arg(long)]
    vars: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster lifecycle
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Component management
    Component {
        #[command(subcommand)]
        command: ComponentCommands,
    },

    /// Monitoring stack checks
    Monitoring {
        #[command(subcommand)]
        command: MonitoringCommands,
    },

    /// List available platforms
    Platforms,

    /// Generate example configuration file
    Init,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Provision the cluster and install its components
    Install,

    /// Destroy the cluster infrastructure
    Destroy,

    /// Wait until the cluster is reachable
    Verify,

    /// Print the rendered Terraform input without applying it
    Render,
}

#[derive(Subcommand)]
enum ComponentCommands {
    /// Install configured components
    Install {
        /// Only install these components (configuration order is kept)
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MonitoringCommands {
    /// Check alert rules and scrape targets
    Verify {
        /// Prometheus base URL
        #[arg(long)]
        prometheus_url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("railyard={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = PlatformRegistry::builtin();

    // Execute command
    let result = match &cli.command {
        Commands::Cluster { command } => match command {
            ClusterCommands::Install => install_cluster(&cli, &registry).await,
            ClusterCommands::Destroy => destroy_cluster(&cli, &registry).await,
            ClusterCommands::Verify => verify_cluster(&cli, &registry).await,
            ClusterCommands::Render => render_cluster(&cli, &registry),
        },
        Commands::Component {
            command: ComponentCommands::Install { names },
        } => install_components(&cli, &registry, names).await,
        Commands::Monitoring {
            command: MonitoringCommands::Verify { prometheus_url },
        } => verify_monitoring(&cli, prometheus_url).await,
        Commands::Platforms => {
            list_platforms(&registry);
            Ok(())
        }
        Commands::Init => init_config(&cli).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    RootConfig::load(&cli.config, cli.vars.as_deref())
        .map_err(Error::Configuration)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))
}

/// Load the configuration and the platform it selects
fn load_cluster(cli: &Cli, registry: &PlatformRegistry) -> Result<(LoadedConfig, Box<dyn Platform>)> {
    let loaded = load_config(cli)?;
    let cluster = require_cluster(loaded.root.cluster.as_ref())?;
    let platform = load_platform(registry, cluster, &loaded.eval)?;

    info!("Platform: {}", platform.name());
    Ok((loaded, platform))
}

fn cluster_handle(platform: &dyn Platform) -> Result<ClusterHandle> {
    let asset_dir = platform.meta().expanded_asset_dir()?;

    Ok(ClusterHandle {
        kubeconfig: verify::kubeconfig_path(&asset_dir),
        asset_dir,
    })
}

/// Provision, wait for readiness, then install components
async fn install_cluster(cli: &Cli, registry: &PlatformRegistry) -> Result<()> {
    info!("Starting cluster installation...");

    let (loaded, platform) = load_cluster(cli, registry)?;

    let backend = HelmBackend::new();
    let installer = Installer::new(&backend);
    installer
        .validate(&loaded.root.components)
        .into_result()
        .context("Invalid component configuration")?;

    // Check prerequisites
    terraform::check_terraform_installed()
        .await
        .context("terraform is required")?;
    KubernetesClient::check_kubectl_installed()
        .await
        .context("kubectl is required")?;
    if !loaded.root.components.is_empty() {
        HelmBackend::check_helm_installed()
            .await
            .context("helm is required")?;
    }

    let handle = cluster_handle(platform.as_ref())?;
    {
        let mut executor = Executor::open(&handle.asset_dir)?;
        platform.apply(&mut executor).await?;
    }

    wait_until_ready(platform.as_ref(), &handle).await?;

    installer
        .install_components(&handle, &loaded.root.components)
        .await?;

    info!("✓ Cluster installed successfully");
    info!("Kubeconfig: {}", handle.kubeconfig.display());
    Ok(())
}

async fn wait_until_ready(platform: &dyn Platform, handle: &ClusterHandle) -> Result<()> {
    let kubeconfig = handle.kubeconfig.clone();
    verify::verify_cluster(
        &platform.meta(),
        || KubernetesClient::from_kubeconfig(&kubeconfig),
        &verify::reachability_polling(),
        &verify::nodes_polling(),
    )
    .await
    .map_err(|e| {
        if let Some(report) = VerificationReport::from_error(&e) {
            println!("{}", report);
        }
        e
    })?;

    Ok(())
}

async fn destroy_cluster(cli: &Cli, registry: &PlatformRegistry) -> Result<()> {
    warn!("Destroying cluster infrastructure...");

    let (_, platform) = load_cluster(cli, registry)?;
    terraform::check_terraform_installed()
        .await
        .context("terraform is required")?;

    let handle = cluster_handle(platform.as_ref())?;
    let mut executor = Executor::open(&handle.asset_dir)?;
    platform.destroy(&mut executor).await?;

    info!("✓ Cluster destroyed successfully");
    Ok(())
}

async fn verify_cluster(cli: &Cli, registry: &PlatformRegistry) -> Result<()> {
    let (_, platform) = load_cluster(cli, registry)?;
    KubernetesClient::check_kubectl_installed()
        .await
        .context("kubectl is required")?;

    let handle = cluster_handle(platform.as_ref())?;
    wait_until_ready(platform.as_ref(), &handle).await?;

    info!("✓ Cluster is reachable");
    Ok(())
}

fn render_cluster(cli: &Cli, registry: &PlatformRegistry) -> Result<()> {
    let (_, platform) = load_cluster(cli, registry)?;
    let rendered = platform
        .render()
        .context("Failed to render cluster definition")?;

    print!("{}", rendered);
    Ok(())
}

/// Components from the configuration, narrowed to `names` when given
fn select_components(all: &[ComponentSpec], names: &[String]) -> Result<Vec<ComponentSpec>> {
    if names.is_empty() {
        return Ok(all.to_vec());
    }

    if let Some(unknown) = names.iter().find(|n| !all.iter().any(|c| &c.name == *n)) {
        anyhow::bail!("Component {} is not in the configuration", unknown);
    }

    Ok(all
        .iter()
        .filter(|c| names.contains(&c.name))
        .cloned()
        .collect())
}

async fn install_components(
    cli: &Cli,
    registry: &PlatformRegistry,
    names: &[String],
) -> Result<()> {
    let (loaded, platform) = load_cluster(cli, registry)?;
    let selected = select_components(&loaded.root.components, names)?;

    if selected.is_empty() {
        info!("No components configured");
        return Ok(());
    }

    let backend = HelmBackend::new();
    let installer = Installer::new(&backend);
    installer
        .validate(&selected)
        .into_result()
        .context("Invalid component configuration")?;

    HelmBackend::check_helm_installed()
        .await
        .context("helm is required")?;

    let handle = cluster_handle(platform.as_ref())?;
    installer.install_components(&handle, &selected).await?;

    info!("✓ {} component(s) installed", selected.len());
    Ok(())
}

async fn verify_monitoring(cli: &Cli, prometheus_url: &str) -> Result<()> {
    let loaded = load_config(cli)?;
    let cluster = require_cluster(loaded.root.cluster.as_ref())?;
    let cases = &loaded.root.monitoring.alert_rules;

    let client = PrometheusClient::new(prometheus_url)?;
    info!("Prometheus: {}", client.base_url());

    let alerts = alert_rules_polling()
        .poll(|| probe_alert_rules(&client, cases, &cluster.name))
        .await
        .into_result();

    let targets = scrape_targets_polling()
        .poll(|| probe_scrape_targets(&client))
        .await
        .into_result();

    if let Some(report) = targets.as_ref().err().and_then(VerificationReport::from_error) {
        println!("{}", report);
    }

    let count = combine_monitoring_checks(alerts, targets)?;
    info!("✓ Alert rules loaded and all {} scrape targets are up", count);
    Ok(())
}

/// Both checks always run; either failure fails the command
fn combine_monitoring_checks(
    alerts: railyard::Result<()>,
    targets: railyard::Result<usize>,
) -> Result<usize> {
    match (alerts, targets) {
        (Ok(()), Ok(count)) => Ok(count),
        (Err(alerts), Ok(_)) => Err(alerts).context("Alert rules check failed"),
        (Ok(()), Err(targets)) => Err(targets).context("Scrape targets check failed"),
        (Err(alerts), Err(targets)) => Err(anyhow::anyhow!(
            "Alert rules check failed: {}\nScrape targets check failed: {}",
            alerts,
            targets
        )),
    }
}

fn list_platforms(registry: &PlatformRegistry) {
    for name in registry.names() {
        println!("{}", name);
    }
}

/// Generate example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = RootConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration written to {}", cli.config.display());
    info!("Edit the file, then run: railyard cluster install");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_components_keeps_config_order() {
        let all: Vec<_> = ["metallb", "cert-manager", "contour"]
            .into_iter()
            .map(ComponentSpec::new)
            .collect();

        let selected =
            select_components(&all, &["contour".to_string(), "metallb".to_string()]).unwrap();
        let names: Vec<_> = selected.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["metallb", "contour"]);

        assert_eq!(select_components(&all, &[]).unwrap().len(), 3);
        assert!(select_components(&all, &["linkerd".to_string()]).is_err());
    }

    fn timeout(check: &str) -> Error {
        Error::ReadinessTimeout {
            check: check.to_string(),
            attempts: 20,
            cause: "still failing".to_string(),
            unhealthy: vec![],
        }
    }

    #[test]
    fn test_monitoring_checks_report_both_failures() {
        assert_eq!(combine_monitoring_checks(Ok(()), Ok(7)).unwrap(), 7);

        let err =
            combine_monitoring_checks(Err(timeout("Checking alert rules")), Ok(7)).unwrap_err();
        assert!(format!("{:#}", err).contains("Checking alert rules"));

        let err = combine_monitoring_checks(
            Err(timeout("Checking alert rules")),
            Err(timeout("Checking scrape targets")),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Checking alert rules"));
        assert!(message.contains("Checking scrape targets"));
    }
}
