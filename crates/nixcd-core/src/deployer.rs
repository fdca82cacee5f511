//! The deployment orchestrator.
//!
//! One `deploy()` call walks `Preparing → SafetyChecking → Building →
//! Activating → Finalizing` and ends in `Succeeded` or `Failed`. Every step is
//! fail-fast and nothing is rolled back: a failed activation can leave the
//! machine partially switched, and the result says so.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::activator::{activate, set_system_profile};
use crate::builder::build;
use crate::error::Result;
use crate::evaluator::{resolve_artifact, resolve_expected_identity};
use crate::fingerprint::{fingerprint_unit, needs_restart};
use crate::gcroot::GcRoots;
use crate::io::ensure_dir;
use crate::paths;
use crate::runner::CommandRunner;
use crate::safety::check_identity;
use crate::status::StatusPublisher;
use crate::types::{
    ConfigurationReference, DeploymentFailure, DeploymentResult, ExecutionMode, OperationKind,
    Phase,
};

/// Everything a deployment needs to know, fixed for the lifetime of a
/// [`Deployer`].
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub reference: ConfigurationReference,
    pub operation: OperationKind,
    pub mode: ExecutionMode,
    pub state_dir: PathBuf,
    pub agent_unit: String,
    pub identity_option: String,
    pub machine_id_file: PathBuf,
    pub system_profile: PathBuf,
}

impl DeploySettings {
    /// Switch in apply mode, with the well-known system locations.
    pub fn new(reference: ConfigurationReference, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference,
            operation: OperationKind::Switch,
            mode: ExecutionMode::Apply,
            state_dir: state_dir.into(),
            agent_unit: paths::DEFAULT_AGENT_UNIT.to_string(),
            identity_option: paths::DEFAULT_IDENTITY_OPTION.to_string(),
            machine_id_file: PathBuf::from(paths::DEFAULT_MACHINE_ID_FILE),
            system_profile: PathBuf::from(paths::DEFAULT_SYSTEM_PROFILE),
        }
    }
}

/// What a run achieved before it stopped.
#[derive(Debug, Default)]
struct Progress {
    phase: Phase,
    output_path: Option<PathBuf>,
    needs_restart: bool,
}

pub struct Deployer {
    runner: Arc<dyn CommandRunner>,
    settings: DeploySettings,
    publisher: Arc<dyn StatusPublisher>,
}

impl Deployer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: DeploySettings,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            runner,
            settings,
            publisher,
        }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Run the pipeline once. Never returns an error: failures are folded
    /// into the result together with the phase they happened in.
    pub async fn deploy(&self) -> DeploymentResult {
        let s = &self.settings;
        let started_at = Utc::now();
        info!(
            host = %s.reference.hostname,
            operation = %s.operation,
            mode = ?s.mode,
            "Starting deployment of {}",
            s.reference.flake_url
        );

        let mut progress = Progress::default();
        let error = match self.run(&mut progress).await {
            Ok(()) => None,
            Err(e) => {
                error!(host = %s.reference.hostname, phase = ?progress.phase, "Deployment failed: {e}");
                Some(DeploymentFailure {
                    phase: progress.phase,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        };

        let result = DeploymentResult {
            hostname: s.reference.hostname.clone(),
            operation: s.operation,
            mode: s.mode,
            output_path: progress.output_path,
            needs_restart: progress.needs_restart,
            error,
            started_at,
            finished_at: Utc::now(),
        };
        if result.succeeded() {
            info!(host = %result.hostname, "Deployment succeeded");
        }
        self.publisher.phase_changed(result.phase());
        self.publisher.deployment_finished(&result);
        result
    }

    fn enter(&self, progress: &mut Progress, phase: Phase) {
        progress.phase = phase;
        self.publisher.phase_changed(phase);
    }

    async fn run(&self, progress: &mut Progress) -> Result<()> {
        let s = &self.settings;
        let runner = self.runner.as_ref();

        self.enter(progress, Phase::Preparing);
        ensure_dir(&s.state_dir)?;

        self.enter(progress, Phase::SafetyChecking);
        let expected = resolve_expected_identity(runner, &s.reference, &s.identity_option).await?;
        check_identity(expected.as_deref(), &s.machine_id_file)?;

        self.enter(progress, Phase::Building);
        let artifact = resolve_artifact(runner, &s.reference).await?;
        progress.output_path = Some(artifact.output_path.clone());
        let output_path = build(runner, &artifact).await?;

        self.enter(progress, Phase::Activating);
        let restart = self.activate(&output_path).await?;
        progress.needs_restart = restart;

        self.enter(progress, Phase::Finalizing);
        GcRoots::new(&s.state_dir).record(&s.reference.hostname, &output_path, s.mode)?;
        Ok(())
    }

    /// Fingerprint, profile update, activation, fingerprint. Returns whether
    /// the agent's own unit changed.
    async fn activate(&self, output_path: &Path) -> Result<bool> {
        let s = &self.settings;
        let runner = self.runner.as_ref();

        let before = fingerprint_unit(runner, &s.agent_unit).await?;
        set_system_profile(runner, s.operation, output_path, &s.system_profile, s.mode).await?;
        activate(runner, s.operation, output_path, s.mode).await?;
        let after = fingerprint_unit(runner, &s.agent_unit).await?;

        let restart = needs_restart(&before, &after);
        if restart {
            warn!(unit = %s.agent_unit, "The agent unit changed during activation, the agent needs to restart");
        }
        Ok(restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{Reply, ScriptedRunner};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const WEB1_DRV: &str = r#"{"/nix/store/xyz-nixos-system-web1-24.05.drv":{"outputs":{"out":{"path":"/nix/store/abc-web1"}},"env":{"name":"nixos-system-web1-24.05"}}}"#;

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<Phase>>,
        finished: Mutex<usize>,
    }

    impl StatusPublisher for Recorder {
        fn phase_changed(&self, phase: Phase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn deployment_finished(&self, _result: &DeploymentResult) {
            *self.finished.lock().unwrap() += 1;
        }
    }

    fn web1_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on(" eval ", Reply::stdout("null"))
            .on("show-derivation", Reply::stdout(WEB1_DRV))
            .on("systemctl cat", Reply::stdout("[Service]\nExecStart=/nix/store/agent/bin/nixcd\n"))
    }

    fn deployer(
        runner: ScriptedRunner,
        settings: DeploySettings,
    ) -> (Deployer, Arc<ScriptedRunner>, Arc<Recorder>) {
        let runner = Arc::new(runner);
        let recorder = Arc::new(Recorder::default());
        let d = Deployer::new(runner.clone(), settings, recorder.clone());
        (d, runner, recorder)
    }

    fn web1_settings(dir: &TempDir) -> DeploySettings {
        DeploySettings::new(
            ConfigurationReference::new(".", "web1"),
            dir.path().join("state"),
        )
    }

    fn gcroot(dir: &TempDir) -> PathBuf {
        dir.path().join("state/gcroots/switch-to-configuration-web1")
    }

    #[tokio::test]
    async fn switch_deploys_and_records_gc_root() {
        let dir = TempDir::new().unwrap();
        let (d, runner, recorder) = deployer(web1_runner(), web1_settings(&dir));

        let result = d.deploy().await;

        assert!(result.succeeded(), "{:?}", result.error);
        assert_eq!(result.output_path, Some(PathBuf::from("/nix/store/abc-web1")));
        assert!(!result.needs_restart);
        assert_eq!(
            std::fs::read_link(gcroot(&dir)).unwrap(),
            PathBuf::from("/nix/store/abc-web1")
        );

        let calls = runner.calls();
        let order: Vec<&str> = calls
            .iter()
            .map(|c| {
                if c.contains(" eval ") {
                    "eval"
                } else if c.contains("show-derivation") {
                    "show-derivation"
                } else if c.contains("--no-link") {
                    "build"
                } else if c.starts_with("systemctl") {
                    "fingerprint"
                } else if c.starts_with("nix-env") {
                    "profile"
                } else {
                    "activate"
                }
            })
            .collect();
        assert_eq!(
            order,
            vec!["eval", "show-derivation", "build", "fingerprint", "profile", "activate", "fingerprint"]
        );
        assert!(calls.contains(&"/nix/store/abc-web1/bin/switch-to-configuration switch".to_string()));

        assert_eq!(
            *recorder.phases.lock().unwrap(),
            vec![
                Phase::Preparing,
                Phase::SafetyChecking,
                Phase::Building,
                Phase::Activating,
                Phase::Finalizing,
                Phase::Succeeded,
            ]
        );
        assert_eq!(*recorder.finished.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn identity_mismatch_stops_before_build() {
        let dir = TempDir::new().unwrap();
        let machine_id = dir.path().join("machine-id");
        std::fs::write(&machine_id, "ffff0000\n").unwrap();
        let runner = ScriptedRunner::new()
            .on(" eval ", Reply::stdout("\"0123abcd\""))
            .on("show-derivation", Reply::stdout(WEB1_DRV));
        let mut settings = web1_settings(&dir);
        settings.machine_id_file = machine_id;
        let (d, runner, recorder) = deployer(runner, settings);

        let result = d.deploy().await;

        let failure = result.error.expect("deployment must fail");
        assert_eq!(failure.kind, ErrorKind::IdentityMismatch);
        assert_eq!(failure.phase, Phase::SafetyChecking);
        assert_eq!(runner.count("--no-link"), 0);
        assert_eq!(runner.count("switch-to-configuration"), 0);
        assert_eq!(result.output_path, None);
        assert!(!gcroot(&dir).exists());
        assert_eq!(
            recorder.phases.lock().unwrap().last(),
            Some(&Phase::Failed)
        );
    }

    #[tokio::test]
    async fn matching_identity_proceeds() {
        let dir = TempDir::new().unwrap();
        let machine_id = dir.path().join("machine-id");
        std::fs::write(&machine_id, "0123abcd\n").unwrap();
        let runner = web1_runner().once(" eval ", Reply::stdout("\"0123abcd\""));
        let mut settings = web1_settings(&dir);
        settings.machine_id_file = machine_id;
        let (d, _, _) = deployer(runner, settings);

        assert!(d.deploy().await.succeeded());
    }

    #[tokio::test]
    async fn simulate_mutates_nothing_and_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut settings = web1_settings(&dir);
        settings.mode = ExecutionMode::Simulate;
        GcRoots::new(&settings.state_dir)
            .record("web1", Path::new("/nix/store/old-web1"), ExecutionMode::Apply)
            .unwrap();
        let (d, runner, _) = deployer(web1_runner(), settings);

        let result = d.deploy().await;

        assert!(result.succeeded(), "{:?}", result.error);
        assert!(!result.needs_restart);
        assert_eq!(runner.count("nix-env"), 0);
        assert_eq!(runner.count("bin/switch-to-configuration"), 0);
        assert_eq!(runner.count("systemctl cat"), 2);
        assert_eq!(
            std::fs::read_link(gcroot(&dir)).unwrap(),
            PathBuf::from("/nix/store/old-web1")
        );
    }

    #[tokio::test]
    async fn changed_agent_unit_requires_restart() {
        let dir = TempDir::new().unwrap();
        let runner = web1_runner().once("systemctl cat", Reply::stdout("[Service]\nExecStart=/old\n"));
        let (d, _, _) = deployer(runner, web1_settings(&dir));

        let result = d.deploy().await;

        assert!(result.succeeded());
        assert!(result.needs_restart);
    }

    #[tokio::test]
    async fn test_operation_leaves_profile_alone() {
        let dir = TempDir::new().unwrap();
        let mut settings = web1_settings(&dir);
        settings.operation = OperationKind::Test;
        let (d, runner, _) = deployer(web1_runner(), settings);

        assert!(d.deploy().await.succeeded());
        assert_eq!(runner.count("nix-env"), 0);
        assert_eq!(runner.count("bin/switch-to-configuration test"), 1);
    }

    #[tokio::test]
    async fn failed_activation_keeps_output_path_and_no_gc_root() {
        let dir = TempDir::new().unwrap();
        let runner = web1_runner().on("bin/switch-to-configuration", Reply::fail(4, "unit nginx failed"));
        let (d, runner, _) = deployer(runner, web1_settings(&dir));

        let result = d.deploy().await;

        let failure = result.error.clone().expect("deployment must fail");
        assert_eq!(failure.phase, Phase::Activating);
        assert_eq!(failure.kind, ErrorKind::ToolInvocation);
        assert!(failure.message.contains("switch-to-configuration switch"));
        assert_eq!(result.output_path, Some(PathBuf::from("/nix/store/abc-web1")));
        // Profile was already moved; nothing is rolled back.
        assert_eq!(runner.count("nix-env"), 1);
        assert_eq!(runner.count("systemctl cat"), 1);
        assert!(!gcroot(&dir).exists());
    }

    #[tokio::test]
    async fn build_failure_is_reported_in_building_phase() {
        let dir = TempDir::new().unwrap();
        let runner = web1_runner().on("--no-link", Reply::fail(1, "builder failed"));
        let (d, runner, _) = deployer(runner, web1_settings(&dir));

        let result = d.deploy().await;

        assert_eq!(result.error.map(|e| e.phase), Some(Phase::Building));
        assert_eq!(runner.count("systemctl cat"), 0);
    }

    #[tokio::test]
    async fn failed_activation_keeps_previous_gc_root() {
        let dir = TempDir::new().unwrap();
        let settings = web1_settings(&dir);
        GcRoots::new(&settings.state_dir)
            .record("web1", Path::new("/nix/store/old-web1"), ExecutionMode::Apply)
            .unwrap();
        let runner = web1_runner().on("bin/switch-to-configuration", Reply::fail(4, "unit nginx failed"));
        let (d, _, _) = deployer(runner, settings);

        let result = d.deploy().await;

        assert_eq!(result.error.map(|e| e.phase), Some(Phase::Activating));
        assert_eq!(
            std::fs::read_link(gcroot(&dir)).unwrap(),
            PathBuf::from("/nix/store/old-web1")
        );
    }

    #[tokio::test]
    async fn failed_fingerprint_after_activation_keeps_previous_gc_root() {
        let dir = TempDir::new().unwrap();
        let settings = web1_settings(&dir);
        GcRoots::new(&settings.state_dir)
            .record("web1", Path::new("/nix/store/old-web1"), ExecutionMode::Apply)
            .unwrap();
        let runner = ScriptedRunner::new()
            .on(" eval ", Reply::stdout("null"))
            .on("show-derivation", Reply::stdout(WEB1_DRV))
            .once("systemctl cat", Reply::stdout("[Service]\n"))
            .on("systemctl cat", Reply::fail(1, "Failed to connect to bus"));
        let (d, runner, _) = deployer(runner, settings);

        let result = d.deploy().await;

        let failure = result.error.expect("deployment must fail");
        assert_eq!(failure.phase, Phase::Activating);
        assert!(failure.message.contains("systemctl cat nixcd.service"));
        assert_eq!(runner.count("bin/switch-to-configuration switch"), 1);
        assert_eq!(runner.count("systemctl cat"), 2);
        assert_eq!(
            std::fs::read_link(gcroot(&dir)).unwrap(),
            PathBuf::from("/nix/store/old-web1")
        );
    }
}
