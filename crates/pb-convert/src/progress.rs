//! Streaming progress for a single conversion.
//!
//! Percentages are synthetic milestones tied to process lifecycle, not a
//! measurement of Pandoc's work: `starting` when the request is accepted,
//! `converting` once the process is spawned, `finalizing` once it exits.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use pb_core::{ConversionRequest, ProgressEvent, Stage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::executor::{ConversionExecutor, ExecStage};

/// Receiving end of a conversion's progress events.
///
/// Yields progress events in stage order followed by exactly one terminal
/// event, then ends. Dropping it before the terminal event cancels the
/// conversion.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressStream {
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl futures_core::Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start a conversion in the background and return its event stream.
pub fn spawn_progress(
    executor: Arc<ConversionExecutor>,
    request: ConversionRequest,
    timeout: Duration,
) -> ProgressStream {
    // At most three progress events and one terminal event are ever sent.
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(run_progress(executor, request, timeout, tx));
    ProgressStream { rx }
}

async fn run_progress(
    executor: Arc<ConversionExecutor>,
    request: ConversionRequest,
    timeout: Duration,
    tx: mpsc::Sender<ProgressEvent>,
) {
    if tx.send(ProgressEvent::Progress(Stage::Starting)).await.is_err() {
        return;
    }

    let cancel = CancellationToken::new();
    let conversion = executor.convert_observed(&request, timeout, &cancel, |stage| {
        let stage = match stage {
            ExecStage::Spawned => Stage::Converting,
            ExecStage::Exited => Stage::Finalizing,
        };
        // Capacity covers every event, so this only fails once the
        // receiver is gone.
        let _ = tx.try_send(ProgressEvent::Progress(stage));
    });
    tokio::pin!(conversion);

    let outcome = tokio::select! {
        outcome = &mut conversion => outcome,
        _ = tx.closed() => {
            tracing::debug!("Progress receiver dropped; cancelling conversion");
            cancel.cancel();
            conversion.await
        }
    };

    let _ = tx.send(ProgressEvent::from_outcome(outcome)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_executor;
    use pb_core::ErrorKind;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn success_emits_all_stages_then_complete() {
        let executor = fake_executor(1);
        let request = ConversionRequest::text("# Hi", "html").from_format("markdown");

        let events = spawn_progress(executor, request, TIMEOUT).collect().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ProgressEvent::Progress(Stage::Starting));
        assert_eq!(events[1], ProgressEvent::Progress(Stage::Converting));
        assert_eq!(events[2], ProgressEvent::Progress(Stage::Finalizing));
        let ProgressEvent::Complete(result) = &events[3] else {
            panic!("expected complete, got {:?}", events[3]);
        };
        assert!(String::from_utf8_lossy(&result.content).contains("# Hi"));
    }

    #[tokio::test]
    async fn unsupported_format_emits_starting_then_error() {
        let executor = fake_executor(1);
        let request = ConversionRequest::text("x", "html").from_format("nope");

        let events = spawn_progress(executor.clone(), request, TIMEOUT)
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ProgressEvent::Progress(Stage::Starting));
        assert!(matches!(
            events[1],
            ProgressEvent::Error {
                kind: ErrorKind::FormatNotSupported,
                ..
            }
        ));
        assert_eq!(executor.admission().spawned_total(), 0);
    }

    #[tokio::test]
    async fn failure_is_single_terminal_error() {
        let executor = fake_executor(1);
        let request = ConversionRequest::text("FAIL", "html").from_format("markdown");

        let events = spawn_progress(executor, request, TIMEOUT).collect().await;
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().unwrap().is_terminal());
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Error {
                kind: ErrorKind::ConversionFailed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn timeout_is_error_event() {
        let executor = fake_executor(1);
        let request = ConversionRequest::text("SLEEP", "html").from_format("markdown");

        let events = spawn_progress(executor, request, Duration::from_millis(300))
            .collect()
            .await;
        match events.last() {
            Some(ProgressEvent::Error { kind, message }) => {
                assert_eq!(*kind, ErrorKind::Timeout);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_stream_cancels_conversion() {
        let executor = fake_executor(1);
        let request = ConversionRequest::text("SLEEP", "html").from_format("markdown");

        let mut stream = spawn_progress(executor.clone(), request, TIMEOUT);
        assert_eq!(
            stream.next_event().await,
            Some(ProgressEvent::Progress(Stage::Starting))
        );
        assert_eq!(
            stream.next_event().await,
            Some(ProgressEvent::Progress(Stage::Converting))
        );
        assert_eq!(executor.admission().in_flight(), 1);
        drop(stream);

        let released = async {
            while executor.admission().in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), released)
            .await
            .expect("conversion was not cancelled after the stream was dropped");
    }
}
