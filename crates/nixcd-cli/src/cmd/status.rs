use anyhow::{Context, Result};
use nixcd_core::{Config, StatusSnapshot};

use crate::output::{print_json, print_result};

pub fn run(config: &Config, url: Option<&str>, json: bool) -> Result<()> {
    let base = match url {
        Some(u) => u.trim_end_matches('/').to_string(),
        None => format!("http://{}", config.webhook.socket_addr()?),
    };
    let endpoint = format!("{base}/status");

    let body = ureq::get(&endpoint)
        .call()
        .with_context(|| format!("can not reach the agent at {endpoint}"))?
        .into_string()
        .context("failed to read the status response")?;
    let snapshot: StatusSnapshot =
        serde_json::from_str(&body).context("unexpected status response")?;

    if json {
        return print_json(&snapshot);
    }

    println!("host:        {}", snapshot.hostname);
    println!("flake:       {}", snapshot.flake_url);
    println!("operation:   {} ({:?})", snapshot.operation, snapshot.mode);
    println!(
        "phase:       {:?}{}",
        snapshot.phase,
        if snapshot.busy { " (busy)" } else { "" }
    );
    println!(
        "deployments: {} ({} failed)",
        snapshot.deployments, snapshot.failures
    );
    if let Some(root) = &snapshot.gc_root {
        println!("gc root:     {}", root.display());
    }
    if let Some(last) = &snapshot.last_result {
        println!();
        print_result(last);
    }
    Ok(())
}
