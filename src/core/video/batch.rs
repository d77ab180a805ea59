//! 多视频批量处理

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{error, info};

use super::driver::{RunHooks, VideoDriver};
use super::pipeline::FramePipeline;
use super::sink::{DirectorySink, FrameSink, OutputLayout};
use super::source::{FfmpegFrameSource, FrameSource};
use super::stats::{ProcessingStats, RunSummary};
use crate::core::crop::AspectRatio;
use crate::core::error::Result;

pub trait SourceOpener {
    fn open(&mut self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

impl<F> SourceOpener for F
where
    F: FnMut(&Path) -> Result<Box<dyn FrameSource>>,
{
    fn open(&mut self, path: &Path) -> Result<Box<dyn FrameSource>> {
        self(path)
    }
}

pub struct FfmpegOpener;

impl SourceOpener for FfmpegOpener {
    fn open(&mut self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameSource::open(path)?))
    }
}

pub trait SinkFactory {
    /// Sink for one video; `mode_label` is the detector mode (`yolo`, `ensemble`, ...).
    fn create(&mut self, video_path: &Path, mode_label: &str) -> Result<Box<dyn FrameSink>>;
}

impl<F> SinkFactory for F
where
    F: FnMut(&Path, &str) -> Result<Box<dyn FrameSink>>,
{
    fn create(&mut self, video_path: &Path, mode_label: &str) -> Result<Box<dyn FrameSink>> {
        self(video_path, mode_label)
    }
}

/// JPEG files under `<root>/<stem>_<aspect>_<mode>[_turbo]/`.
pub struct DirectorySinkFactory {
    pub root: PathBuf,
    pub aspect: AspectRatio,
    pub turbo: bool,
    pub jpeg_quality: u8,
}

impl SinkFactory for DirectorySinkFactory {
    fn create(&mut self, video_path: &Path, mode_label: &str) -> Result<Box<dyn FrameSink>> {
        let layout =
            OutputLayout::for_video(&self.root, video_path, self.aspect, mode_label, self.turbo);
        Ok(Box::new(DirectorySink::create(layout, self.jpeg_quality)?))
    }
}

pub fn video_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct BatchOrchestrator {
    driver: VideoDriver,
}

impl BatchOrchestrator {
    pub fn new(driver: VideoDriver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &VideoDriver {
        &self.driver
    }

    /// Run every video in order. With a single video any error is returned;
    /// with several, a failing video is logged, recorded and skipped.
    pub fn run(
        &self,
        pipeline: &mut FramePipeline,
        videos: &[PathBuf],
        opener: &mut dyn SourceOpener,
        sinks: &mut dyn SinkFactory,
        hooks: &mut dyn RunHooks,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::new(videos.len());

        for (idx, path) in videos.iter().enumerate() {
            if hooks.should_stop() {
                info!("⏹️ Stopped, {} videos not started", videos.len() - idx);
                break;
            }

            let name = video_name(path);
            info!("🎞️ [{}/{}] {}", idx + 1, videos.len(), name);

            match self.run_video(pipeline, path, &name, opener, sinks, hooks) {
                Ok(stats) => {
                    stats.log_summary(&name);
                    summary.record_video(name, stats);
                }
                Err(e) if videos.len() == 1 => return Err(e),
                Err(e) => {
                    error!("❌ {}: {}", name, e);
                    summary.record_failure(name, e);
                }
            }
        }

        summary.total_time_secs = start.elapsed().as_secs_f64();
        summary.log_summary();
        Ok(summary)
    }

    fn run_video(
        &self,
        pipeline: &mut FramePipeline,
        path: &Path,
        name: &str,
        opener: &mut dyn SourceOpener,
        sinks: &mut dyn SinkFactory,
        hooks: &mut dyn RunHooks,
    ) -> Result<ProcessingStats> {
        let mut source = opener.open(path)?;
        hooks.on_video_start(name, source.info());
        let mut sink = sinks.create(path, pipeline.mode_label())?;
        self.driver
            .run(pipeline, source.as_mut(), sink.as_mut(), hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HarvestError;
    use crate::core::video::driver::{DriverOptions, NoHooks, ProcessingMode};
    use crate::core::video::pipeline::tests::square_pipeline;
    use crate::core::video::sink::MemorySink;
    use crate::core::video::source::VecFrameSource;
    use std::cell::Cell;

    fn orchestrator() -> BatchOrchestrator {
        BatchOrchestrator::new(VideoDriver::new(DriverOptions {
            frame_interval: 1,
            mode: ProcessingMode::Standard,
            progress_every: 30,
        }))
    }

    /// `bad.mp4` cannot be opened; anything else yields `n` solid frames.
    fn opener(n: u64) -> impl FnMut(&Path) -> Result<Box<dyn FrameSource>> {
        move |path: &Path| {
            if path.ends_with("bad.mp4") {
                Err(HarvestError::source_open(path, "moov atom not found"))
            } else {
                Ok(Box::new(VecFrameSource::solid(n, 400, 400)) as Box<dyn FrameSource>)
            }
        }
    }

    fn memory_sinks(_path: &Path, _mode: &str) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(MemorySink::new()))
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_stats_are_per_video() {
        let summary = orchestrator()
            .run(
                &mut square_pipeline(),
                &paths(&["a.mp4", "b.mp4"]),
                &mut opener(3),
                &mut memory_sinks,
                &mut NoHooks,
            )
            .unwrap();

        assert_eq!(summary.total_videos, 2);
        assert_eq!(summary.processed_videos, 2);
        assert_eq!(summary.total_frames_saved, 6);
        assert_eq!(summary.videos[0].stats.saved_frames, 3);
        assert_eq!(summary.videos[1].stats.saved_frames, 3);
        assert_eq!(summary.videos[1].name, "b.mp4");
    }

    #[test]
    fn test_failed_video_skipped_in_batch() {
        let summary = orchestrator()
            .run(
                &mut square_pipeline(),
                &paths(&["a.mp4", "bad.mp4", "c.mp4"]),
                &mut opener(2),
                &mut memory_sinks,
                &mut NoHooks,
            )
            .unwrap();

        assert_eq!(summary.processed_videos, 2);
        assert_eq!(summary.total_frames_saved, 4);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "bad.mp4");
        assert!(summary.failed[0].error.contains("moov atom"));
    }

    #[test]
    fn test_single_video_failure_is_fatal() {
        let result = orchestrator().run(
            &mut square_pipeline(),
            &paths(&["bad.mp4"]),
            &mut opener(2),
            &mut memory_sinks,
            &mut NoHooks,
        );
        assert!(matches!(result, Err(HarvestError::SourceOpen { .. })));
    }

    /// Stops after a fixed number of `should_stop` polls.
    struct StopAfterPolls(Cell<u32>, u32);

    impl RunHooks for StopAfterPolls {
        fn should_stop(&self) -> bool {
            self.0.set(self.0.get() + 1);
            self.0.get() > self.1
        }
    }

    #[test]
    fn test_stop_checked_between_videos() {
        // Polls: 1 before video a, 2..=5 inside it (3 frames + end of stream),
        // 6 before video b.
        let summary = orchestrator()
            .run(
                &mut square_pipeline(),
                &paths(&["a.mp4", "b.mp4"]),
                &mut opener(3),
                &mut memory_sinks,
                &mut StopAfterPolls(Cell::new(0), 5),
            )
            .unwrap();

        assert_eq!(summary.processed_videos, 1);
        assert_eq!(summary.videos[0].stats.saved_frames, 3);
    }

    #[test]
    fn test_sink_factory_sees_mode_label() {
        let seen = std::cell::RefCell::new(Vec::new());
        let mut sinks = |path: &Path, mode: &str| -> Result<Box<dyn FrameSink>> {
            seen.borrow_mut().push(format!("{}:{}", video_name(path), mode));
            Ok(Box::new(MemorySink::new()))
        };

        orchestrator()
            .run(
                &mut square_pipeline(),
                &paths(&["clip.mp4"]),
                &mut opener(1),
                &mut sinks,
                &mut NoHooks,
            )
            .unwrap();
        assert_eq!(seen.into_inner(), vec!["clip.mp4:yolo".to_string()]);
    }
}
