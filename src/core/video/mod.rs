pub mod batch;
pub mod driver;
pub mod frame;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod text_gate;

pub use batch::{BatchOrchestrator, DirectorySinkFactory, FfmpegOpener, SinkFactory, SourceOpener};
pub use driver::{DriverOptions, NoHooks, ProcessingMode, RunHooks, StopFlag, VideoDriver};
pub use frame::{Frame, FrameInfo};
pub use pipeline::{FrameOutcome, FramePipeline};
pub use sink::{DirectorySink, FrameSink, MemorySink, OutputLayout};
pub use source::{
    extract_single_frame, probe_video, FfmpegFrameSource, FrameSource, VecFrameSource, VideoInfo,
};
pub use stats::{ProcessingStats, RunSummary, VideoSummary};
pub use text_gate::{MockTextGate, OcrEngine, OcrTextGate, SubtitleGate, TextDetectionResult, TextGate};
