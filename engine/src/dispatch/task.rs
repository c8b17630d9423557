use crate::{
    metrics::StatRecord,
    source::{
        FetchOptions,
        ObjectKind,
    },
};
use bytes::Bytes;
use strum::{
    AsRefStr,
    Display,
};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TaskKind {
    Fetch,
    Decode,
    Enrich,
    Export,
}

/// What a Fetch stage retrieves. No targets means "everything of `kind`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub kind: ObjectKind,
    pub targets: Vec<String>,
    pub options: FetchOptions,
}

impl FetchRequest {
    pub fn all(kind: ObjectKind) -> Self {
        Self {
            kind,
            targets: Vec::new(),
            options: FetchOptions::default(),
        }
    }

    pub fn targets(kind: ObjectKind, targets: Vec<String>, options: FetchOptions) -> Self {
        Self { kind, targets, options }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub kind: ObjectKind,
    pub bytes: Bytes,
}

/// The payload of a task, one variant per pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Fetch(FetchRequest),
    Decode(RawPayload),
    Enrich(StatRecord),
    Export(StatRecord),
}

impl Stage {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Fetch(_) => TaskKind::Fetch,
            Self::Decode(_) => TaskKind::Decode,
            Self::Enrich(_) => TaskKind::Enrich,
            Self::Export(_) => TaskKind::Export,
        }
    }
}

/// Delivered to callers that wait on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// A single-shot fetch returned its payload.
    Fetched(Bytes),
    Succeeded,
    Failed,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Debug)]
pub struct Task {
    stage: Stage,
    result: Option<oneshot::Sender<TaskResult>>,
}

impl Task {
    pub fn new(stage: Stage) -> Self {
        Self { stage, result: None }
    }

    /// A task whose outcome is reported on the returned receiver. The
    /// receiver errors if the task is dropped without a result.
    pub fn with_result(stage: Stage) -> (Self, oneshot::Receiver<TaskResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                stage,
                result: Some(tx),
            },
            rx,
        )
    }

    pub fn fetch(request: FetchRequest) -> Self {
        Self::new(Stage::Fetch(request))
    }

    pub fn decode(payload: RawPayload) -> Self {
        Self::new(Stage::Decode(payload))
    }

    pub fn enrich(record: StatRecord) -> Self {
        Self::new(Stage::Enrich(record))
    }

    pub fn export(record: StatRecord) -> Self {
        Self::new(Stage::Export(record))
    }

    pub fn kind(&self) -> TaskKind {
        self.stage.kind()
    }

    pub fn into_parts(self) -> (Stage, Completion) {
        (self.stage, Completion(self.result))
    }

    /// Drops the task, reporting `Failed` to a waiting caller.
    pub fn reject(self) {
        self.into_parts().1.finish(TaskResult::Failed);
    }
}

/// The result half of a task. Dropping it unfinished closes the channel.
#[derive(Debug)]
pub struct Completion(Option<oneshot::Sender<TaskResult>>);

impl Completion {
    pub fn finish(mut self, result: TaskResult) {
        if let Some(tx) = self.0.take() {
            // the caller may have stopped waiting
            let _ = tx.send(result);
        }
    }

    pub fn is_awaited(&self) -> bool {
        self.0.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}
