//! Logging helpers for server startup.
//!
//! Startup is a short sequence of named stages (provider client, research
//! settings, router). [`StageTimer`] times one stage and logs its outcome;
//! [`log_stage!`] prints the numbered progress line; [`log_banner!`] frames
//! the startup header.

use std::time::Instant;

/// Times one named stage and logs its outcome with the elapsed duration.
///
/// Nothing is logged at construction; the stage only becomes visible when it
/// completes via [`StageTimer::done`] or [`StageTimer::done_with`].
#[derive(Debug)]
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    /// Start timing a stage.
    #[must_use]
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    /// Log the stage as finished.
    pub fn done(self) {
        tracing::info!(
            stage = self.stage,
            elapsed_ms = self.started.elapsed().as_millis(),
            "stage finished"
        );
    }

    /// Log the stage outcome from a result, keeping the error context on
    /// failure.
    pub fn done_with<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        let elapsed_ms = self.started.elapsed().as_millis();
        match result {
            Ok(_) => {
                tracing::info!(stage = self.stage, elapsed_ms, "stage finished");
            }
            Err(e) => {
                tracing::error!(stage = self.stage, elapsed_ms, error = %e, "stage failed");
            }
        }
    }
}

/// Log one numbered startup stage, with an optional detail suffix.
#[macro_export]
macro_rules! log_stage {
    ($step:expr, $total:expr, $name:expr, $detail:expr) => {
        tracing::info!("startup {}/{}: {} ({})", $step, $total, $name, $detail);
    };
    ($step:expr, $total:expr, $name:expr) => {
        tracing::info!("startup {}/{}: {}", $step, $total, $name);
    };
}

/// Log a framed startup banner, one line per argument.
#[macro_export]
macro_rules! log_banner {
    ($($line:expr),+ $(,)?) => {
        tracing::info!("------------------------------------------------");
        $(tracing::info!("{}", $line);)+
        tracing::info!("------------------------------------------------");
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_timer_records_stage_name() {
        let timer = StageTimer::start("provider_client");
        assert_eq!(timer.stage, "provider_client");
        timer.done();
    }

    #[test]
    fn test_stage_timer_done_with_ok_and_err() {
        let timer = StageTimer::start("router");
        let ok: Result<u32, String> = Ok(7);
        timer.done_with(&ok);

        let timer = StageTimer::start("router");
        let err: Result<u32, String> = Err("bind failed".to_string());
        timer.done_with(&err);
    }
}
