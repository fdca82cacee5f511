use anyhow::{bail, Result};
use nixcd_core::builder::build_host;
use nixcd_core::evaluator::list_hosts;
use nixcd_core::{Config, ConfigurationReference};
use tracing::{error, info};

/// Build `host`, or every host of the flake when none is given. A failed host
/// does not stop the others.
pub fn run(config: &Config, host: Option<&str>) -> Result<()> {
    let runner = super::runner(config);
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let hosts = match host {
            Some(h) => vec![h.to_string()],
            None => list_hosts(runner.as_ref(), &config.flake_url).await?,
        };

        let mut failed = Vec::new();
        for host in &hosts {
            let reference = ConfigurationReference::new(&config.flake_url, host);
            match build_host(runner.as_ref(), &reference).await {
                Ok(out) => {
                    info!(host = %host, "Built {}", out.display());
                    println!("{host}\t{}", out.display());
                }
                Err(e) => {
                    error!(host = %host, "Build failed: {e}");
                    failed.push(host.clone());
                }
            }
        }

        if !failed.is_empty() {
            bail!(
                "{} of {} hosts failed to build: {}",
                failed.len(),
                hosts.len(),
                failed.join(", ")
            );
        }
        Ok::<_, anyhow::Error>(())
    })
}
