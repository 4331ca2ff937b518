use std::process::ExitCode;

use swarm_calib::pso::TerminationReason;
use swarm_calib::Calibration;
use tracing::error;

fn main() -> ExitCode {
    swarm_calib::logging::init();

    let Some(config_path) = std::env::args_os().nth(1) else {
        eprintln!("usage: swarm-calib <calibration.json>");
        return ExitCode::from(2);
    };

    let outcome = Calibration::from_config_file(&config_path).and_then(swarm_calib::shutdown::run_interruptible);
    match outcome {
        Ok(result) => {
            println!("{}", result);
            if result.termination == TerminationReason::Cancelled {
                // Conventional status for a run stopped by SIGINT
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "calibration aborted");
            ExitCode::FAILURE
        }
    }
}
