//! Running the simulator as a child process.

use ndarray::Array1;
use std::fs::{self, File};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, debug_span};

use crate::cancel::CancellationToken;
use crate::catalog::{Catalog, CatalogData, CatalogError};
use crate::error::{CalibError, Result};
use crate::execution::config::ExecutionConfig;
use crate::execution::param_file::SimulatorParameters;
use crate::execution::workdir::RunDirectory;
use crate::execution::{ExecutionHandler, RunFailure, RunResult};
use crate::parameters::ParameterSpace;

const STDOUT_LOG: &str = "stdout.log";
const STDERR_LOG: &str = "stderr.log";
const STDERR_TAIL_LINES: usize = 20;

enum Exit {
    Finished(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs an external simulator executable, one isolated directory per run.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use swarm_calib::execution::{ExecutionConfig, ExecutionHandler, SubprocessHandler};
/// use swarm_calib::parameters::ParameterSpace;
///
/// let space: ParameterSpace = "SfrEfficiency 0.01 0.2\n".parse()?;
/// let config = ExecutionConfig::new("./sage", "runs")
///     .with_template("template.par")
///     .with_catalog("z0", "model_z0.dat")
///     .with_timeout(Duration::from_secs(600));
/// let handler = SubprocessHandler::new(config, Arc::new(space))?;
/// let result = handler.evaluate_run(&ndarray::array![0.05]);
/// # Ok::<(), swarm_calib::CalibError>(())
/// ```
#[derive(Debug)]
pub struct SubprocessHandler {
    config: ExecutionConfig,
    space: Arc<ParameterSpace>,
    template: SimulatorParameters,
    next_run: AtomicU64,
    cancel: Option<CancellationToken>,
}

impl SubprocessHandler {
    /// Validate the configuration, load the template and create the work root.
    pub fn new(config: ExecutionConfig, space: Arc<ParameterSpace>) -> Result<Self> {
        config.validate()?;
        let template = match &config.template {
            Some(path) => SimulatorParameters::load(path)?,
            None => SimulatorParameters::new(),
        };
        fs::create_dir_all(&config.work_root)
            .map_err(|e| CalibError::io("creating work root", &config.work_root, e))?;

        Ok(Self {
            config,
            space,
            template,
            next_run: AtomicU64::new(0),
            cancel: None,
        })
    }

    /// Kill in-flight runs when `token` is raised
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Number of runs started so far
    pub fn runs_started(&self) -> u64 {
        self.next_run.load(Ordering::Relaxed)
    }

    /// Parameter file contents for one vector and output directory
    pub fn render_parameters(&self, values: &Array1<f64>, output_dir: &Path) -> SimulatorParameters {
        let mut params = self.template.clone();
        for (key, value) in &self.config.overrides {
            params.set(key.as_str(), value.as_str());
        }
        for (parameter, value) in self.space.parameters().iter().zip(values.iter()) {
            params.set(parameter.name(), format!("{}", value));
        }
        params.set(self.config.output_dir_key.as_str(), output_dir.display().to_string());
        params
    }

    fn execute(&self, run: &RunDirectory, values: &Array1<f64>) -> RunResult {
        let parameter_path = run.path().join(&self.config.parameter_file);
        let params = self.render_parameters(values, &run.output_path());
        if let Err(e) = fs::write(&parameter_path, params.render()) {
            return RunResult::Failed(RunFailure::Workspace(format!(
                "cannot write {}: {}",
                parameter_path.display(),
                e
            )));
        }

        let mut child = match self.spawn(run.path(), &parameter_path) {
            Ok(child) => child,
            Err(failure) => return RunResult::Failed(failure),
        };
        let started = Instant::now();

        let exit = match self.wait(&mut child, started) {
            Ok(exit) => exit,
            Err(e) => {
                kill_process_tree(&mut child);
                let _ = child.wait();
                return RunResult::Failed(RunFailure::Process(e.to_string()));
            }
        };
        debug!(elapsed = ?started.elapsed(), "simulator finished");

        match exit {
            Exit::TimedOut => RunResult::Failed(RunFailure::Timeout {
                seconds: self.config.timeout_secs,
            }),
            Exit::Cancelled => RunResult::Failed(RunFailure::Cancelled),
            Exit::Finished(status) if status.success() => self.collect_catalogs(&run.output_path()),
            Exit::Finished(status) => {
                let stderr_tail = stderr_tail(&run.path().join(STDERR_LOG));
                match status.code() {
                    Some(code) => RunResult::Failed(RunFailure::NonZeroExit { code, stderr_tail }),
                    None => RunResult::Failed(RunFailure::Terminated { stderr_tail }),
                }
            }
        }
    }

    fn spawn(&self, run_dir: &Path, parameter_path: &Path) -> std::result::Result<Child, RunFailure> {
        let log = |name: &str| {
            File::create(run_dir.join(name)).map_err(|e| {
                RunFailure::Workspace(format!("cannot create {}: {}", name, e))
            })
        };
        let stdout = log(STDOUT_LOG)?;
        let stderr = log(STDERR_LOG)?;

        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.args)
            .arg(parameter_path)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        // Own process group, so launchers and wrapper scripts die with the run
        #[cfg(unix)]
        command.process_group(0);

        command
            .spawn()
            .map_err(|e| RunFailure::Spawn {
                executable: self.config.executable.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Poll the child until it exits, times out or the run is cancelled
    fn wait(&self, child: &mut Child, started: Instant) -> std::io::Result<Exit> {
        let timeout = self.config.timeout();
        let poll = self.config.poll_interval();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Exit::Finished(status));
            }

            let cancelled = self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
            let elapsed = started.elapsed();
            if cancelled || elapsed >= timeout {
                kill_process_tree(child);
                child.wait()?;
                return Ok(if cancelled { Exit::Cancelled } else { Exit::TimedOut });
            }

            thread::sleep(poll.min(timeout - elapsed));
        }
    }

    fn collect_catalogs(&self, output_dir: &Path) -> RunResult {
        let mut catalogs = CatalogData::new();
        for file in &self.config.catalogs {
            let path = output_dir.join(&file.path);
            if !path.is_file() {
                return RunResult::Failed(RunFailure::MissingOutput { path });
            }
            match Catalog::load(&path) {
                Ok(catalog) => catalogs.insert(file.label.as_str(), catalog),
                // Vanished or unreadable between the check and the read
                Err(CatalogError::Io(_)) => return RunResult::Failed(RunFailure::MissingOutput { path }),
                Err(e) => {
                    return RunResult::Failed(RunFailure::MalformedOutput {
                        path,
                        reason: e.to_string(),
                    })
                }
            }
        }
        RunResult::Success(catalogs)
    }
}

impl ExecutionHandler for SubprocessHandler {
    fn evaluate_run(&self, values: &Array1<f64>) -> RunResult {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!("run", id = run_id);
        let _guard = span.enter();

        if values.len() != self.space.dimension() {
            return RunResult::Failed(RunFailure::DimensionMismatch {
                expected: self.space.dimension(),
                found: values.len(),
            });
        }

        let run = match RunDirectory::create(&self.config.work_root, run_id) {
            Ok(run) => run,
            Err(e) => return RunResult::Failed(RunFailure::Workspace(e.to_string())),
        };

        let result = self.execute(&run, values);
        run.finish(self.config.retention.keeps(result.is_success()));
        result
    }
}

/// Kill the simulator together with every process it started.
///
/// The child leads its own process group, so signalling the group reaches
/// grandchildren too. The child may already have exited; errors are ignored.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group id is the unreaped child's pid
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Last lines of the simulator's stderr, for failure messages
fn stderr_tail(path: &Path) -> String {
    let bytes = fs::read(path).unwrap_or_default();
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
