//! Complete calibrations: configuration file in, result files out.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ndarray::Array1;

use swarm_calib::driver::{BEST_FIT_FILE, CHECKPOINT_FILE, PARTICLES_FILE, TRACE_FILE};
use swarm_calib::pso::{OptimizationState, TerminationReason};
use swarm_calib::shutdown::run_until;
use swarm_calib::{Calibration, CalibrationConfig, ExecutionHandler, RunResult};

use crate::test_helpers::{approx_eq, BlackHoleHandler};

/// One bin around log10(bulge mass) = 0 whose observed median black hole
/// mass is 0.05
const OBSERVED: &str = "# lower upper log10(M_bh) sigma\n-1 1 -1.30103 0.1\n";

/// Writes the parameter space, observations and configuration into `dir`
fn write_setup(dir: &Path, simulator: &str, pso: &str, extra: &str) -> PathBuf {
    fs::write(dir.join("space.txt"), "BlackHoleMass 0.01 0.2\n").unwrap();
    fs::write(dir.join("bhbm.dat"), OBSERVED).unwrap();
    let config = format!(
        r#"{{
            "parameter_space": "space.txt",
            "simulator": {simulator},
            "constraints": [
                {{"id": "BHBM_z0", "kind": "scaling_relation", "catalog": "z0",
                  "x_column": "BulgeMass", "y_column": "BlackHoleMass", "observed": "bhbm.dat"}}
            ],
            "pso": {pso},
            "output_dir": "results"{extra}
        }}"#
    );
    let path = dir.join("calib.json");
    fs::write(&path, config).unwrap();
    path
}

const UNUSED_SIMULATOR: &str =
    r#"{"executable": "sim", "work_root": "runs", "catalogs": [{"label": "z0", "path": "model_z0.dat"}]}"#;

fn run_synthetic(path: &Path) -> swarm_calib::PsoResult {
    let config = CalibrationConfig::load(path).unwrap();
    Calibration::with_handler(config, Arc::new(BlackHoleHandler))
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn test_calibration_finds_the_observed_relation() {
    let dir = tempfile::tempdir().unwrap();
    let pso = r#"{"swarm_size": 8, "max_iterations": 30, "seed": 3, "record_particles": true}"#;
    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, "");

    let result = run_synthetic(&path);
    assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    assert!(result.best_valid);
    assert!(result.best_fitness < 0.5, "fitness {}", result.best_fitness);
    assert!(
        approx_eq(result.best_position[0], 0.05, 0.01),
        "best position {}",
        result.best_position
    );

    let results = dir.path().join("results");
    let best_fit = fs::read_to_string(results.join(BEST_FIT_FILE)).unwrap();
    assert!(best_fit.starts_with("# best fitness"));
    assert!(best_fit.lines().nth(1).unwrap().starts_with("BlackHoleMass"));

    let trace = fs::read_to_string(results.join(TRACE_FILE)).unwrap();
    assert_eq!(trace.lines().count(), 31);

    let particles = fs::read_to_string(results.join(PARTICLES_FILE)).unwrap();
    assert_eq!(particles.lines().count(), 30 * 8 + 3);

    let checkpoint = OptimizationState::load(results.join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(checkpoint.iteration, 30);
    assert_eq!(checkpoint.parameter_names, vec!["BlackHoleMass".to_string()]);
}

#[test]
fn test_resume_from_a_finished_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let pso = r#"{"swarm_size": 4, "max_iterations": 5, "seed": 8}"#;
    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, "");
    let first = run_synthetic(&path);

    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, r#", "resume": true"#);
    let again = run_synthetic(&path);

    assert_eq!(again.iterations, 5);
    assert_eq!(again.evaluations, first.evaluations);
    assert_eq!(again.best_position, first.best_position);
    assert_eq!(again.history, first.history);
}

#[test]
fn test_resume_without_checkpoint_starts_afresh() {
    let dir = tempfile::tempdir().unwrap();
    let pso = r#"{"swarm_size": 4, "max_iterations": 3, "seed": 8}"#;
    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, r#", "resume": true"#);

    let result = run_synthetic(&path);
    assert_eq!(result.iterations, 3);
    assert_eq!(result.evaluations, 12);
    assert!(dir.path().join("results").join(CHECKPOINT_FILE).exists());
}

#[test]
fn test_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let pso = r#"{"swarm_size": 4}"#;

    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, r#", "active_constraints": ["SMF_z0"]"#);
    let config = CalibrationConfig::load(&path).unwrap();
    let err = Calibration::with_handler(config, Arc::new(BlackHoleHandler)).err().unwrap();
    assert!(err.is_config());

    let path = write_setup(dir.path(), UNUSED_SIMULATOR, r#"{"swarm_size": 0}"#, "");
    let config = CalibrationConfig::load(&path).unwrap();
    let err = Calibration::with_handler(config, Arc::new(BlackHoleHandler)).err().unwrap();
    assert!(err.is_config());

    fs::remove_file(dir.path().join("bhbm.dat")).unwrap();
    let config = CalibrationConfig::load(&path).unwrap();
    assert!(Calibration::with_handler(config, Arc::new(BlackHoleHandler)).is_err());
}

/// Stand-in simulator reading `OutputDir` and `BlackHoleMass` from its
/// parameter file
#[cfg(unix)]
const SIMULATOR_SCRIPT: &str = r#"
while read -r key value; do
  case "$key" in
    OutputDir) out="$value" ;;
    BlackHoleMass) bh="$value" ;;
  esac
done < "$1"
printf '# BulgeMass BlackHoleMass\n1.0 %s\n' "$bh" > "$out/model_z0.dat"
"#;

#[cfg(unix)]
#[test]
fn test_calibration_runs_the_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("sim.sh");
    fs::write(&script, SIMULATOR_SCRIPT).unwrap();
    let simulator = format!(
        r#"{{"executable": "sh", "args": ["{}"], "work_root": "runs", "poll_interval_ms": 10,
            "catalogs": [{{"label": "z0", "path": "model_z0.dat"}}]}}"#,
        script.display()
    );
    let pso = r#"{"swarm_size": 4, "max_iterations": 3, "workers": 2, "seed": 11}"#;
    let path = write_setup(dir.path(), &simulator, pso, "");

    let result = swarm_calib::driver::run_from_file(&path).unwrap();
    assert_eq!(result.evaluations, 12);
    assert_eq!(result.failed_evaluations, 0);
    assert!(result.best_valid);
    assert!(result.best_fitness.is_finite());

    // Successful run directories are removed by default
    assert_eq!(fs::read_dir(dir.path().join("runs")).unwrap().count(), 0);
    assert!(dir.path().join("results").join(BEST_FIT_FILE).exists());
}

#[cfg(unix)]
#[test]
fn test_failing_simulator_is_penalized() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("sim.sh");
    fs::write(&script, "echo 'segfault' >&2\nexit 3\n").unwrap();
    let simulator = format!(
        r#"{{"executable": "sh", "args": ["{}"], "work_root": "runs", "poll_interval_ms": 10,
            "retention": "failed_runs", "catalogs": [{{"label": "z0", "path": "model_z0.dat"}}]}}"#,
        script.display()
    );
    let pso = r#"{"swarm_size": 3, "max_iterations": 2, "seed": 11}"#;
    let path = write_setup(dir.path(), &simulator, pso, "");

    let result = swarm_calib::driver::run_from_file(&path).unwrap();
    assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    assert_eq!(result.failed_evaluations, 6);
    assert!(!result.best_valid);
    assert_eq!(result.best_fitness, 1e20);
    assert_eq!(fs::read_dir(dir.path().join("runs")).unwrap().count(), 6);
}

/// Black hole handler taking a while per run
struct SlowHandler;

impl ExecutionHandler for SlowHandler {
    fn evaluate_run(&self, values: &Array1<f64>) -> RunResult {
        thread::sleep(Duration::from_millis(10));
        BlackHoleHandler.evaluate_run(values)
    }
}

#[tokio::test]
async fn test_interrupt_checkpoints_the_last_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let pso = r#"{"swarm_size": 4, "max_iterations": 100000, "workers": 1, "seed": 5}"#;
    let path = write_setup(dir.path(), UNUSED_SIMULATOR, pso, "");
    let calibration = Calibration::with_handler(CalibrationConfig::load(&path).unwrap(), Arc::new(SlowHandler)).unwrap();
    let token = calibration.cancellation_token();

    let interrupt = tokio::time::sleep(Duration::from_millis(300));
    let result = run_until(token, move || calibration.run(), interrupt).await.unwrap();

    assert_eq!(result.termination, TerminationReason::Cancelled);
    assert!(result.iterations >= 1);
    assert!(result.iterations < 100000);

    let results = dir.path().join("results");
    let checkpoint = OptimizationState::load(results.join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(checkpoint.iteration, result.iterations);
    assert_eq!(checkpoint.termination, None);
    let trace = fs::read_to_string(results.join(TRACE_FILE)).unwrap();
    assert_eq!(trace.lines().count(), result.iterations + 1);
}
