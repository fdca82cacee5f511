pub mod build;
pub mod config;
pub mod deploy;
pub mod hosts;
pub mod run;
pub mod status;

use std::sync::Arc;

use nixcd_core::{CommandRunner, Config, TokioCommandRunner};

pub(crate) fn runner(config: &Config) -> Arc<dyn CommandRunner> {
    Arc::new(TokioCommandRunner::new(Some(config.query_timeout())))
}
