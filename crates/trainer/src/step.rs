//! Per-epoch training step interface and the external-program implementation

use bytes::Bytes;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, instrument};
use train_core::{ComputeBackend, Epoch, EpochResult, Error, ModelState, Result, StepConfig};

/// One epoch of optimization, performed outside the controller
pub trait EpochStep {
    /// Train for one epoch and report the observed metrics
    fn run_epoch(&mut self, epoch: Epoch) -> Result<EpochResult>;

    /// Current model and optimizer state, for checkpointing
    fn snapshot(&self) -> Result<ModelState>;

    /// Load state from a checkpoint before resuming
    fn restore(&mut self, _state: &ModelState) -> Result<()> {
        Ok(())
    }
}

/// Environment variable carrying the epoch number to the step program
pub const EPOCH_ENV: &str = "TRAINER_EPOCH";

/// Runs an external program once per epoch
///
/// The program must print a JSON object of metrics as the last non-empty
/// line of its stdout, and leave its weights in `model_state`.
#[derive(Debug, Clone)]
pub struct CommandStep {
    config: StepConfig,
    arch: String,
    env: Vec<(String, String)>,
    last_epoch: Epoch,
}

impl CommandStep {
    pub fn new(config: StepConfig, arch: impl Into<String>, backend: &dyn ComputeBackend) -> Self {
        Self {
            config,
            arch: arch.into(),
            env: backend.env(),
            last_epoch: 0,
        }
    }

    /// Add an environment variable for every invocation
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, epoch: Epoch) -> Command {
        let epoch_str = epoch.to_string();
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.config.args.iter().map(|a| a.replace("{epoch}", &epoch_str)))
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .envs(&self.config.env)
            .env(EPOCH_ENV, &epoch_str)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        // Keep terminal Ctrl+C away from the running epoch
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    fn read_state(&self, path: &Path) -> Result<Bytes> {
        std::fs::read(path).map(Bytes::from).map_err(|e| Error::StepFailed {
            epoch: self.last_epoch,
            message: format!("cannot read state file {}: {}", path.display(), e),
        })
    }
}

impl EpochStep for CommandStep {
    #[instrument(skip(self), fields(program = %self.config.program))]
    fn run_epoch(&mut self, epoch: Epoch) -> Result<EpochResult> {
        let output = self.command(epoch).output().map_err(|e| Error::StepFailed {
            epoch,
            message: format!("failed to start {}: {}", self.config.program, e),
        })?;

        if !output.status.success() {
            return Err(Error::StepFailed {
                epoch,
                message: format!("{} exited with {}", self.config.program, output.status),
            });
        }

        self.last_epoch = epoch;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_metrics(&stdout).map_err(|message| Error::StepFailed { epoch, message })
    }

    fn snapshot(&self) -> Result<ModelState> {
        let model = self.read_state(&self.config.model_state)?;
        let optimizer = match &self.config.optimizer_state {
            Some(path) => self.read_state(path)?,
            None => Bytes::new(),
        };

        Ok(ModelState {
            arch: self.arch.clone(),
            model,
            optimizer,
        })
    }

    fn restore(&mut self, state: &ModelState) -> Result<()> {
        write_state(&self.config.model_state, &state.model)?;
        if let Some(path) = &self.config.optimizer_state {
            write_state(path, &state.optimizer)?;
        }
        info!(path = %self.config.model_state.display(), "Restored step state");
        Ok(())
    }
}

fn write_state(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

/// Metrics from the last non-empty stdout line; non-numeric fields are ignored
fn parse_metrics(stdout: &str) -> std::result::Result<EpochResult, String> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| "step printed no metrics".to_string())?;

    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(line).map_err(|e| format!("invalid metrics line {:?}: {}", line, e))?;

    let mut result = EpochResult::new();
    for (name, value) in object {
        match value.as_f64() {
            Some(v) => {
                result.insert(name, v);
            }
            None => debug!(metric = %name, "Ignoring non-numeric metric"),
        }
    }
    Ok(result)
}
