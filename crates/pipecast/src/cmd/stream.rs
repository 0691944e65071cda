use std::path::PathBuf;
use std::time::{Duration, Instant};

use pipecast_controller::{
    spawn_pacer, ConnectionState, Controller, ControllerError, LoopingSource, ShutdownConfig,
    StopSignal, WorkerCommand,
};
use pipecast_protocol::MediaKind;

use crate::cmd::{parse_duration, Globals, StreamArgs};
use crate::exit::{
    controller_error, io_error, protocol_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};
use crate::output::{print_summary, SessionSummary};

/// How often the supervising loop checks for a vanished worker.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: StreamArgs, globals: Globals) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let duration = args.duration.as_deref().map(parse_duration).transpose()?;

    let config = args.session.into_config();
    config
        .validate()
        .map_err(|err| protocol_error("invalid session", err))?;

    // A missing file must fail before any worker exists.
    let audio = LoopingSource::open(&args.audio_file, config.frame_size(MediaKind::Audio))
        .map_err(|err| controller_error("open audio file", err))?;
    let video = LoopingSource::open(&args.video_file, config.frame_size(MediaKind::Video))
        .map_err(|err| controller_error("open video file", err))?;

    let command = worker_command(args.worker_program, globals)?;
    let started = Instant::now();
    let controller = Controller::spawn(command, config.clone())
        .map_err(|err| controller_error("start worker", err))?;

    let stop = StopSignal::new();
    let state = controller.state();
    install_ctrlc_handler(stop.clone(), state.clone())?;

    match controller.wait_until_connected(connect_timeout) {
        Ok(()) => {}
        Err(ControllerError::Closing) if stop.is_raised() => {
            tracing::info!("interrupted before the worker connected");
        }
        Err(err) => {
            let report = controller.shutdown(&stop, Vec::new(), ShutdownConfig::default());
            tracing::debug!(code = report.worker.code, "worker stopped after failed connect");
            return Err(controller_error("connect", err));
        }
    }

    let mut pacers = Vec::with_capacity(2);
    if !stop.is_raised() {
        for (kind, source) in [(MediaKind::Audio, audio), (MediaKind::Video, video)] {
            match spawn_pacer(controller.pacer(kind, source), stop.clone()) {
                Ok(handle) => pacers.push(handle),
                Err(err) => {
                    controller.shutdown(&stop, pacers, ShutdownConfig::default());
                    return Err(controller_error("start pacers", err));
                }
            }
        }
        tracing::info!(
            channel = %config.channel_name,
            duration = ?duration,
            "streaming"
        );
    }

    let worker_lost = supervise(&stop, &state, duration);
    let report = controller.shutdown(&stop, pacers, ShutdownConfig::default());
    print_summary(
        &SessionSummary::new(&config, &report, started.elapsed()),
        globals.format,
    );

    if worker_lost || !report.worker.success() {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

/// Wait for the duration to pass, an interrupt, or the worker to vanish.
/// Returns true only in the last case.
fn supervise(stop: &StopSignal, state: &ConnectionState, duration: Option<Duration>) -> bool {
    let deadline = duration.map(|d| Instant::now() + d);
    loop {
        if state.is_worker_gone() {
            tracing::error!("worker event stream ended unexpectedly");
            return true;
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    tracing::info!("stream duration reached");
                    return false;
                }
                left.min(SUPERVISE_INTERVAL)
            }
            None => SUPERVISE_INTERVAL,
        };
        if stop.wait_timeout(slice) {
            tracing::info!("interrupted, shutting down");
            return false;
        }
    }
}

/// Re-run this binary's `worker` subcommand unless a program was given.
fn worker_command(program: Option<PathBuf>, globals: Globals) -> CliResult<WorkerCommand> {
    if let Some(program) = program {
        return Ok(WorkerCommand::new(program));
    }
    let exe = std::env::current_exe().map_err(|err| io_error("locate own executable", err))?;
    Ok(WorkerCommand::new(exe)
        .arg("--log-format")
        .arg(globals.log_format.as_arg())
        .arg("--log-level")
        .arg(globals.log_level.as_arg())
        .arg("worker"))
}

fn install_ctrlc_handler(stop: StopSignal, state: ConnectionState) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.raise();
        state.begin_close();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
