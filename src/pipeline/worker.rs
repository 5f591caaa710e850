use crate::pipeline::input::{InputState, PushDecision};
use crate::pipeline::mode::{Completion, ModeController, RowCallback, RowSubscriber};
use crate::pipeline::relay::ChunkRelay;
use crate::utils::{CsvIoError, PipelineConfig, Result};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything the row worker receives, in one ordered channel so that mode
/// changes take effect exactly between the segments sent around them.
pub enum PipelineCommand<T, R> {
    Segment(Vec<T>),
    OnRow(RowCallback<R>),
    Subscribe { id: usize, tx: mpsc::Sender<R> },
    Unsubscribe(usize),
    EndOfInput,
    SourceFailed(String),
}

impl<T, R> From<Vec<T>> for PipelineCommand<T, R> {
    fn from(segment: Vec<T>) -> Self {
        PipelineCommand::Segment(segment)
    }
}

pub type CommandRelay<T, R> = ChunkRelay<T, PipelineCommand<T, R>>;

/// Direction-specific part of a pipeline: turns input segments into units of
/// work and units into rows.
pub trait RowStage: Send + 'static {
    type Input: Send + 'static;
    type Unit: Send + 'static;
    type Row: Clone + Send + 'static;

    /// Queues the units a segment completes. Partial units stay buffered in
    /// the stage until later segments or `finish` complete them.
    fn split(&mut self, segment: Vec<Self::Input>, pending: &mut VecDeque<Self::Unit>)
        -> Result<()>;

    /// Called once after the last segment.
    fn finish(&mut self, pending: &mut VecDeque<Self::Unit>) -> Result<()>;

    /// Builds one row. `Ok(None)` produces no output for this unit.
    fn build(&mut self, unit: Self::Unit) -> Result<Option<Self::Row>>;

    fn formatting_faults(&self) -> usize {
        0
    }
}

async fn run_worker<S: RowStage>(
    mut stage: S,
    mut rx: mpsc::Receiver<PipelineCommand<S::Input, S::Row>>,
) -> Result<Completion<S::Row>> {
    let mut mode = ModeController::default();

    match drive(&mut stage, &mut mode, &mut rx).await {
        Ok(()) => {
            let completion = mode.finish(stage.formatting_faults());
            tracing::info!(
                rows = completion.rows_delivered,
                collected = completion.collected.len(),
                formatting_faults = completion.formatting_faults,
                "Pipeline finished"
            );
            Ok(completion)
        }
        Err(e) => {
            tracing::error!("Pipeline halted: {}", e);
            Err(e)
        }
    }
}

async fn drive<S: RowStage>(
    stage: &mut S,
    mode: &mut ModeController<S::Row>,
    rx: &mut mpsc::Receiver<PipelineCommand<S::Input, S::Row>>,
) -> Result<()> {
    let mut pending = VecDeque::new();

    while let Some(command) = rx.recv().await {
        match command {
            PipelineCommand::Segment(segment) => {
                stage.split(segment, &mut pending)?;
                drain(stage, mode, &mut pending).await?;
            }
            PipelineCommand::OnRow(callback) => mode.attach_callback(callback),
            PipelineCommand::Subscribe { id, tx } => {
                mode.subscribe(id, tx);
            }
            PipelineCommand::Unsubscribe(id) => {
                mode.unsubscribe(id);
            }
            PipelineCommand::EndOfInput => break,
            PipelineCommand::SourceFailed(reason) => return Err(CsvIoError::SourceFailed(reason)),
        }
    }

    stage.finish(&mut pending)?;
    drain(stage, mode, &mut pending).await
}

/// Row N+1 is not built until row N has been delivered.
async fn drain<S: RowStage>(
    stage: &mut S,
    mode: &mut ModeController<S::Row>,
    pending: &mut VecDeque<S::Unit>,
) -> Result<()> {
    while let Some(unit) = pending.pop_front() {
        if let Some(row) = stage.build(unit)? {
            mode.deliver(row).await?;
        }
    }
    Ok(())
}

/// Shared machinery behind both pipeline handles: the input state machine,
/// the relay into the row worker, and the worker's join handle.
pub(crate) struct PipelineCore<T, R> {
    relay: Option<CommandRelay<T, R>>,
    input: InputState,
    worker: Option<JoinHandle<Result<Completion<R>>>>,
    next_subscriber_id: usize,
    subscriber_capacity: usize,
}

impl<T, R> PipelineCore<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stage: S, config: &PipelineConfig) -> Self
    where
        S: RowStage<Input = T, Row = R>,
    {
        let (relay, rx) = ChunkRelay::channel(config.relay_capacity);
        let worker = tokio::spawn(run_worker(stage, rx));

        Self {
            relay: Some(relay),
            input: InputState::default(),
            worker: Some(worker),
            next_subscriber_id: 0,
            subscriber_capacity: config.subscriber_capacity.max(1),
        }
    }

    pub fn input_state(&self) -> InputState {
        self.input
    }

    pub async fn push(&mut self, unit: Vec<T>) -> Result<()> {
        if self.input.push() == PushDecision::Ignore {
            return Ok(());
        }
        match &self.relay {
            Some(relay) => relay.relay(unit).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Hands out a relay for a streaming source, or `None` when input has
    /// already ended.
    pub fn attach_stream(&mut self) -> Result<Option<CommandRelay<T, R>>> {
        if !self.input.attach_stream()? {
            return Ok(None);
        }
        Ok(self.relay.clone())
    }

    pub async fn on_row(&mut self, callback: RowCallback<R>) {
        self.command(PipelineCommand::OnRow(callback)).await;
    }

    pub async fn subscribe(&mut self) -> RowSubscriber<R> {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.command(PipelineCommand::Subscribe { id, tx }).await;
        RowSubscriber::new(id, rx)
    }

    pub async fn unsubscribe(&mut self, id: usize) {
        self.command(PipelineCommand::Unsubscribe(id)).await;
    }

    /// A command sent after end or to a halted worker is dropped; the halt
    /// itself is reported by `end`.
    async fn command(&self, command: PipelineCommand<T, R>) {
        let Some(relay) = &self.relay else {
            tracing::debug!("Command ignored, input already ended");
            return;
        };
        if relay.forward(command).await.is_err() {
            tracing::debug!("Command ignored, row worker has halted");
        }
    }

    /// Closes input and waits for the worker. Later calls return an empty
    /// completion.
    pub async fn end(&mut self) -> Result<Completion<R>> {
        self.input.end();
        self.relay.take();

        let Some(worker) = self.worker.take() else {
            return Ok(Completion::default());
        };
        match worker.await {
            Ok(result) => result,
            Err(e) => Err(CsvIoError::WorkerFailed(e.to_string())),
        }
    }
}
