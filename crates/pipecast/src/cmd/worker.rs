use std::io;

use pipecast_transport::reserve_stdout;
use pipecast_worker::{SimulatedBackend, WorkerRuntime};

use crate::cmd::{parse_duration, WorkerArgs};
use crate::exit::{transport_error, worker_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: WorkerArgs) -> CliResult<i32> {
    // Nothing may reach stdout before this point.
    let output = reserve_stdout().map_err(|err| transport_error("reserve stdout", err))?;
    let connect_delay = parse_duration(&args.sim_connect_delay)?;
    ignore_interrupts()?;

    let config = args.session.into_config();
    let backend = SimulatedBackend::new().with_connect_delay(connect_delay);
    let runtime = WorkerRuntime::start(config, Box::new(backend), io::stdin().lock(), output)
        .map_err(|err| worker_error("worker setup failed", err))?;

    let (reason, stats) = runtime
        .run()
        .map_err(|err| worker_error("worker stopped", err))?;
    tracing::info!(
        %reason,
        video_frames = stats.video_frames,
        audio_frames = stats.audio_frames,
        "worker exiting"
    );
    Ok(SUCCESS)
}

/// The controller owns shutdown. An interrupt from the terminal reaches the
/// whole process group, so the worker waits for the close command instead.
fn ignore_interrupts() -> CliResult<()> {
    ctrlc::set_handler(|| {
        tracing::debug!("interrupt ignored, waiting for controller");
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
