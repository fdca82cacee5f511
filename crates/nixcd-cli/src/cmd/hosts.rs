use anyhow::Result;
use nixcd_core::evaluator::list_hosts;
use nixcd_core::Config;

use crate::output::print_json;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let runner = super::runner(config);
    let rt = tokio::runtime::Runtime::new()?;
    let hosts = rt.block_on(list_hosts(runner.as_ref(), &config.flake_url))?;

    if json {
        print_json(&hosts)?;
    } else {
        for host in &hosts {
            println!("{host}");
        }
    }
    Ok(())
}
