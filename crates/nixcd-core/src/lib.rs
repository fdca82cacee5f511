pub mod activator;
pub mod builder;
pub mod config;
pub mod deployer;
pub mod error;
pub mod evaluator;
pub mod fingerprint;
pub mod gate;
pub mod gcroot;
pub mod io;
pub mod paths;
pub mod runner;
pub mod safety;
pub mod status;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::Config;
pub use deployer::{DeploySettings, Deployer};
pub use error::{DeployError, ErrorKind, Result};
pub use gate::DeployGate;
pub use runner::{CommandLine, CommandRunner, TokioCommandRunner};
pub use status::{StatusPublisher, StatusSnapshot, StatusStore};
pub use types::{
    BuildArtifact, ConfigurationReference, DeploymentFailure, DeploymentResult, ExecutionMode,
    OperationKind, Phase,
};
