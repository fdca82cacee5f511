use anyhow::{Context, Result};
use nixcd_core::{Config, OperationKind};
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub hostname: Option<String>,
    pub flake_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub operation: Option<OperationKind>,
    pub dry_run: bool,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(hostname) = self.hostname {
            config.hostname = hostname;
        }
        if let Some(flake_url) = self.flake_url {
            config.flake_url = flake_url;
        }
        if let Some(state_dir) = self.state_dir {
            config.state_dir = state_dir;
        }
        if let Some(operation) = self.operation {
            config.operation = operation;
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

/// Load the configuration file (or defaults), apply overrides and validate.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from '{}'", path.display()))?,
        None => Config::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let config = load(
            None,
            Overrides {
                hostname: Some("web1".into()),
                operation: Some(OperationKind::Boot),
                dry_run: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.hostname, "web1");
        assert_eq!(config.operation, OperationKind::Boot);
        assert!(config.dry_run);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let err = load(
            None,
            Overrides {
                hostname: Some("web1".into()),
                state_dir: Some(PathBuf::from("state")),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("state_dir"));
    }
}
