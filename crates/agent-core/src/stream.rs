//! Step Publishing
//!
//! The orchestrator publishes each [`AgentStep`] exactly once through a
//! [`StepPublisher`]. The publisher fans the step out to its observers in a
//! fixed order (trace recorder first, then the stream emitter when the caller
//! is streaming) and keeps the ordered sequence for the final result. Trace,
//! stream and result are therefore views of one event source.
//!
//! ```text
//!                       ┌──────────────────┐
//!   Orchestrator ─────► │  StepPublisher   │──► steps (QueryResult)
//!                       └────────┬─────────┘
//!                      ┌─────────┴─────────┐
//!                      ▼                   ▼
//!               TraceRecorder        StreamEmitter ──mpsc──► QueryStream
//! ```

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{AgentError, Result};
use crate::observability::TraceRecorder;
use crate::orchestrator::{QueryFailure, QueryResult};
use crate::step::{AgentStep, StreamEvent};

/// Receiver of published steps
///
/// An error stops publication and ends the query.
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step(&self, step: &AgentStep) -> Result<()>;
}

#[async_trait]
impl StepObserver for TraceRecorder {
    async fn on_step(&self, step: &AgentStep) -> Result<()> {
        self.record(step).await;
        Ok(())
    }
}

/// Forwards steps to a streaming caller over a bounded channel
///
/// A full channel applies backpressure to the query. A dropped receiver
/// means the caller went away and is reported as `Cancelled`.
pub struct StreamEmitter {
    sender: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamEmitter {
    pub fn new(sender: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.sender.send(event) => sent.map_err(|_| {
                tracing::debug!("Stream receiver dropped");
                AgentError::Cancelled
            }),
        }
    }
}

#[async_trait]
impl StepObserver for StreamEmitter {
    async fn on_step(&self, step: &AgentStep) -> Result<()> {
        self.emit(StreamEvent::from(step)).await
    }
}

/// Single ordered event source for one query
pub struct StepPublisher<'a> {
    observers: Vec<&'a dyn StepObserver>,
    cancel: CancellationToken,
    steps: Vec<AgentStep>,
}

impl<'a> StepPublisher<'a> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            observers: Vec::new(),
            cancel,
            steps: Vec::new(),
        }
    }

    /// Add an observer; observers see steps in the order they were added
    pub fn observe(mut self, observer: &'a dyn StepObserver) -> Self {
        self.observers.push(observer);
        self
    }

    /// Publish a step to every observer.
    ///
    /// Nothing is published once the query has been cancelled.
    pub async fn publish(&mut self, step: AgentStep) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        self.steps.push(step);
        let step = &self.steps[self.steps.len() - 1];
        for observer in &self.observers {
            observer.on_step(step).await?;
        }
        Ok(())
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<AgentStep> {
        self.steps
    }
}

/// Live view of a streaming query
///
/// Yields [`StreamEvent`]s in publication order; the last one is
/// `final_answer` or `error` unless the query was cancelled. Dropping the
/// stream cancels the query.
pub struct QueryStream {
    receiver: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<std::result::Result<QueryResult, QueryFailure>>,
    guard: Option<DropGuard>,
}

impl QueryStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<StreamEvent>,
        task: JoinHandle<std::result::Result<QueryResult, QueryFailure>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            task,
            guard: Some(cancel.drop_guard()),
        }
    }

    /// Discard remaining events and wait for the query to finish
    pub async fn into_result(mut self) -> std::result::Result<QueryResult, QueryFailure> {
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
        while self.receiver.recv().await.is_some() {}

        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(QueryFailure {
                error: AgentError::Internal(format!("query task failed: {}", e)),
                steps: Vec::new(),
                trace_id: None,
            }),
        }
    }
}

impl Stream for QueryStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
