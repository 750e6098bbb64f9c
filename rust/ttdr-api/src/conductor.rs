//! Streaming conductor over the research pipeline.
//!
//! Two entry points share the same pipeline: [`run_static`] runs to completion
//! with a log-only sink and returns the terminal report, while
//! [`run_streaming`] runs the pipeline on a worker task and forwards every
//! progress update through a queue that the SSE transport drains.
//!
//! Ordering: updates reach the client in production order, the event with
//! `complete: true` is always last, and a worker failure is converted into a
//! terminal `{error, complete: true}` event. If the client disconnects, the
//! worker task is aborted; the in-flight provider call finishes on its own
//! and cancellation lands at the next await point.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use ttdr_research::{ProgressUpdate, ResearchPipeline, UpdateSink};

use crate::AppState;

/// Sink that forwards updates into the streaming queue.
///
/// Sends never block; if the receiver is gone (client disconnected) the
/// update is dropped and the worker learns about it at the next suspension.
#[derive(Debug)]
struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl UpdateSink for ChannelSink {
    fn send(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }
}

/// Sink that logs intermediate updates and captures the terminal report.
#[derive(Debug, Default)]
struct CaptureSink {
    report: Arc<Mutex<Option<String>>>,
}

impl UpdateSink for CaptureSink {
    fn send(&self, update: ProgressUpdate) {
        debug!(
            complete = update.complete,
            is_intermediate = update.is_intermediate,
            "pipeline update"
        );
        if update.complete {
            if let Some(report) = update.final_report {
                *self.report.lock().expect("report slot lock") = Some(report);
            }
        }
    }
}

/// Aborts the worker when the SSE stream is dropped.
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the pipeline to completion and return the final report text.
pub async fn run_static(state: &AppState, query: &str) -> anyhow::Result<String> {
    let report_slot = Arc::new(Mutex::new(None));
    let sink = CaptureSink {
        report: Arc::clone(&report_slot),
    };

    let mut pipeline = ResearchPipeline::new(
        Arc::clone(&state.client),
        state.config.pipeline_config(),
        Box::new(sink),
    );
    pipeline.run(query).await?;

    let report = report_slot.lock().expect("report slot lock").take();
    report.ok_or_else(|| anyhow::anyhow!("pipeline completed without a final report"))
}

/// Run the pipeline on a worker task and stream its updates as SSE.
pub fn run_streaming(
    state: &AppState,
    question: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let sink = ChannelSink { tx: tx.clone() };

    let client = Arc::clone(&state.client);
    let pipeline_config = state.config.pipeline_config();

    let worker = tokio::spawn(async move {
        let mut pipeline = ResearchPipeline::new(client, pipeline_config, Box::new(sink));
        if let Err(e) = pipeline.run(&question).await {
            error!("Dynamic pipeline failed: {e}");
            let _ = tx.send(ProgressUpdate::fatal(e.to_string()));
        }
    });
    let guard = AbortOnDrop(worker);

    let stream = async_stream::stream! {
        // Holding the guard ties the worker's lifetime to the client's
        // connection.
        let _guard = guard;
        while let Some(update) = rx.recv().await {
            let complete = update.complete;
            let payload = serde_json::to_string(&update).unwrap_or_default();
            yield Ok::<_, Infallible>(Event::default().data(payload));
            if complete {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
