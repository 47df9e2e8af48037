//! Build validation: dependency install, then build.
//!
//! A broken install makes any build signal meaningless, so it halts the run.
//! A failing build is an ordinary result that the report carries.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::text::tail_lines;
use crate::core::types::BuildOutcome;
use crate::error::PipelineError;
use crate::io::config::CommandSettings;
use crate::io::process::{CommandRunner, CommandSpec};

/// Install dependencies, then run the build.
///
/// Errors only for installation problems ([`PipelineError::Environment`]) or
/// invalid command settings. Every build result, including a build tool that
/// cannot be spawned, comes back as a [`BuildOutcome`].
#[instrument(skip_all)]
pub fn validate_build<R: CommandRunner>(
    runner: &R,
    settings: &CommandSettings,
) -> Result<BuildOutcome, PipelineError> {
    install_dependencies(runner, settings)?;
    Ok(run_build(runner, settings)?)
}

fn install_dependencies<R: CommandRunner>(
    runner: &R,
    settings: &CommandSettings,
) -> Result<(), PipelineError> {
    let spec = CommandSpec::from_argv(&settings.install)?;
    info!(command = %spec, "installing dependencies");
    let failure_log = match runner.run(&spec) {
        Ok(result) if result.success() => return Ok(()),
        Ok(result) => {
            warn!(exit_code = ?result.exit_code, timed_out = result.timed_out, "install failed");
            result.combined_output()
        }
        Err(err) => {
            warn!(err = %err, "install could not run");
            format!("{err:#}")
        }
    };
    Err(PipelineError::Environment {
        command: spec.to_string(),
        log_tail: tail_lines(failure_log.trim_end(), settings.log_tail_lines),
    })
}

fn run_build<R: CommandRunner>(runner: &R, settings: &CommandSettings) -> Result<BuildOutcome> {
    let spec = CommandSpec::from_argv(&settings.build)?;
    info!(command = %spec, "running build");
    let (success, log) = match runner.run(&spec) {
        Ok(result) => (result.success(), result.combined_output()),
        Err(err) => {
            warn!(err = %err, "build could not run");
            (false, format!("{err:#}"))
        }
    };
    if success {
        info!("build passed");
    } else {
        warn!("build failed");
    }
    let tail = tail_lines(log.trim_end(), settings.log_tail_lines);
    Ok(BuildOutcome { success, log, tail })
}
