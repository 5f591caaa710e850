pub mod export;
pub mod import;
pub mod input;
pub mod mode;
pub mod relay;
pub mod worker;

pub use export::{ExportPipeline, ExportStage, ExportUnit};
pub use import::{ImportPipeline, ImportStage};
pub use input::{InputState, PushDecision};
pub use mode::{
    Completion, Continuation, DeliveryMode, ModeController, RowCallback, RowSubscriber,
    SubscriptionRegistry,
};
pub use relay::{split_segments, ChunkRelay, SEGMENT_SIZE};
pub use worker::{CommandRelay, PipelineCommand, RowStage};
