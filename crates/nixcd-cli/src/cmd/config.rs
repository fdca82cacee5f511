use anyhow::Result;
use nixcd_core::Config;

/// Print the effective configuration, with the webhook secret masked.
pub fn run(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if shown.webhook.secret.is_some() {
        shown.webhook.secret = Some("********".to_string());
    }
    print!("{}", shown.to_yaml()?);
    Ok(())
}
