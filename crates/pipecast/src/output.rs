use std::io::IsTerminal;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipecast_controller::{PacerStats, ShutdownReport, WorkerExit};
use pipecast_protocol::SessionConfig;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct SessionSummary<'a> {
    pub channel: &'a str,
    pub user_id: &'a str,
    pub codec: &'a str,
    pub elapsed_secs: f64,
    pub close_sent: bool,
    pub worker: &'a WorkerExit,
    pub pacers: &'a [PacerStats],
}

impl<'a> SessionSummary<'a> {
    pub fn new(config: &'a SessionConfig, report: &'a ShutdownReport, elapsed: Duration) -> Self {
        Self {
            channel: &config.channel_name,
            user_id: &config.user_id,
            codec: config.video.codec.as_str(),
            elapsed_secs: elapsed.as_secs_f64(),
            close_sent: report.close_sent,
            worker: &report.worker,
            pacers: &report.pacers,
        }
    }
}

pub fn print_summary(summary: &SessionSummary<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "STREAM", "SENT", "BYTES", "SKIPPED", "REWINDS", "FAILED", "LATE", "ERROR",
                ]);
            for pacer in summary.pacers {
                table.add_row(vec![
                    pacer.kind.to_string(),
                    pacer.frames_sent.to_string(),
                    pacer.bytes_sent.to_string(),
                    pacer.skipped_disconnected.to_string(),
                    pacer.rewinds.to_string(),
                    pacer.send_failures.to_string(),
                    pacer.late_ticks.to_string(),
                    pacer.error.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
            println!(
                "channel={} user={} codec={} elapsed={:.1}s worker={}",
                summary.channel,
                summary.user_id,
                summary.codec,
                summary.elapsed_secs,
                describe_exit(summary.worker)
            );
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} user={} codec={} elapsed={:.1}s close_sent={} worker={}",
                summary.channel,
                summary.user_id,
                summary.codec,
                summary.elapsed_secs,
                summary.close_sent,
                describe_exit(summary.worker)
            );
            for pacer in summary.pacers {
                println!(
                    "  {}: sent={} bytes={} skipped={} rewinds={} failed={} late={}",
                    pacer.kind,
                    pacer.frames_sent,
                    pacer.bytes_sent,
                    pacer.skipped_disconnected,
                    pacer.rewinds,
                    pacer.send_failures,
                    pacer.late_ticks
                );
            }
        }
    }
}

pub fn describe_exit(exit: &WorkerExit) -> String {
    let mut text = match (exit.code, exit.signal) {
        (Some(code), _) => format!("exit {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown".to_string(),
    };
    if exit.killed {
        text.push_str(" (killed)");
    }
    if let Some(error) = &exit.error {
        text.push_str(&format!(" ({error})"));
    }
    text
}
