//! 单视频驱动：按间隔采样帧，逐帧（标准）或分批（turbo）送入处理流程
//!
//! Turbo 模式先对整批帧并行做快速文字预筛，再顺序处理通过的帧，
//! 对外可见的统计与标准模式一致。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::frame::{Frame, FrameInfo};
use super::pipeline::{FrameOutcome, FramePipeline};
use super::sink::FrameSink;
use super::source::{FrameSource, VideoInfo};
use super::stats::ProcessingStats;
use super::text_gate::TextGate;
use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Standard,
    Turbo { batch_size: usize },
}

impl ProcessingMode {
    pub fn is_turbo(&self) -> bool {
        matches!(self, ProcessingMode::Turbo { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Only frames whose 1-based number is a multiple of this are processed
    pub frame_interval: u64,
    pub mode: ProcessingMode,
    /// Progress is reported on sampled frames whose number is a multiple of this
    pub progress_every: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            frame_interval: 30,
            mode: ProcessingMode::Standard,
            progress_every: 30,
        }
    }
}

/// Caller-supplied callbacks, invoked synchronously from the driver loop.
pub trait RunHooks {
    fn on_video_start(&mut self, _name: &str, _info: &VideoInfo) {}

    /// In turbo mode `stats` covers completed batches only; sampled frames
    /// still buffered in the pending batch are counted once it is processed.
    fn on_progress(&mut self, _percent: f64, _stats: &ProcessingStats) {}

    /// Called once per sampled frame with what the pipeline did with it.
    fn on_frame(&mut self, _frame: FrameInfo, _outcome: &FrameOutcome) {}

    /// Polled before every frame read and before every video.
    fn should_stop(&self) -> bool {
        false
    }
}

pub struct NoHooks;

impl RunHooks for NoHooks {}

/// Shared cancellation flag, e.g. set from a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl RunHooks for StopFlag {
    fn should_stop(&self) -> bool {
        self.is_stopped()
    }
}

pub struct VideoDriver {
    options: DriverOptions,
    prefilter_pool: Option<rayon::ThreadPool>,
}

impl VideoDriver {
    pub fn new(options: DriverOptions) -> Self {
        let prefilter_pool = if options.mode.is_turbo() {
            let num_threads = num_cpus::get().min(4);
            match rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("⚠️ Pre-filter thread pool unavailable, using global pool: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            options,
            prefilter_pool,
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Process one video to the end of the stream or until stopped. Source and
    /// sink errors abort the video.
    pub fn run(
        &self,
        pipeline: &mut FramePipeline,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        hooks: &mut dyn RunHooks,
    ) -> Result<ProcessingStats> {
        let start = Instant::now();
        let mut stats = ProcessingStats::new();

        match self.options.mode {
            ProcessingMode::Standard => {
                info!("▶️ Standard mode, every {} frames", self.interval());
                self.run_standard(pipeline, source, sink, hooks, &mut stats)?;
            }
            ProcessingMode::Turbo { batch_size } => {
                let batch_size = batch_size.max(1);
                info!(
                    "⚡ Turbo mode, batch size {}, every {} frames",
                    batch_size,
                    self.interval()
                );
                self.run_turbo(pipeline, source, sink, hooks, batch_size, &mut stats)?;
            }
        }

        stats.processing_time_secs = start.elapsed().as_secs_f64();
        Ok(stats)
    }

    fn interval(&self) -> u64 {
        self.options.frame_interval.max(1)
    }

    fn is_sampled(&self, frame: &Frame) -> bool {
        frame.frame_number % self.interval() == 0
    }

    fn run_standard(
        &self,
        pipeline: &mut FramePipeline,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        hooks: &mut dyn RunHooks,
        stats: &mut ProcessingStats,
    ) -> Result<()> {
        let total = source.info().total_frames;

        loop {
            if hooks.should_stop() {
                info!("⏹️ Stop requested");
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            if !self.is_sampled(&frame) {
                continue;
            }

            let outcome = pipeline.process_frame(&frame, sink, stats)?;
            hooks.on_frame(FrameInfo::from_frame(&frame), &outcome);
            self.report_progress(frame.frame_number, total, stats, hooks);
        }
        Ok(())
    }

    /// Progress is reported per sampled frame as in standard mode, but the
    /// stats snapshot leaves out frames buffered in the unfinished batch.
    fn run_turbo(
        &self,
        pipeline: &mut FramePipeline,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        hooks: &mut dyn RunHooks,
        batch_size: usize,
        stats: &mut ProcessingStats,
    ) -> Result<()> {
        let total = source.info().total_frames;
        let mut batch: Vec<Frame> = Vec::with_capacity(batch_size);

        loop {
            if hooks.should_stop() {
                info!("⏹️ Stop requested, flushing {} buffered frames", batch.len());
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            if !self.is_sampled(&frame) {
                continue;
            }

            let frame_number = frame.frame_number;
            batch.push(frame);
            if batch.len() >= batch_size {
                self.process_batch(pipeline, &mut batch, sink, hooks, stats)?;
            }
            self.report_progress(frame_number, total, stats, hooks);
        }

        if !batch.is_empty() {
            self.process_batch(pipeline, &mut batch, sink, hooks, stats)?;
        }
        Ok(())
    }

    fn process_batch(
        &self,
        pipeline: &mut FramePipeline,
        batch: &mut Vec<Frame>,
        sink: &mut dyn FrameSink,
        hooks: &mut dyn RunHooks,
        stats: &mut ProcessingStats,
    ) -> Result<()> {
        let text_mask = match pipeline.text_gate() {
            Some(gate) => self.prefilter(gate, batch),
            None => vec![false; batch.len()],
        };
        debug!(
            "Batch of {}: {} flagged as text",
            batch.len(),
            text_mask.iter().filter(|t| **t).count()
        );

        for (frame, has_text) in batch.drain(..).zip(text_mask) {
            let outcome = if has_text {
                pipeline.record_text_skip(stats)
            } else {
                pipeline.process_prefiltered(&frame, sink, stats)?
            };
            hooks.on_frame(FrameInfo::from_frame(&frame), &outcome);
        }
        Ok(())
    }

    fn prefilter(&self, gate: &dyn TextGate, batch: &[Frame]) -> Vec<bool> {
        let check = || -> Vec<bool> { batch.par_iter().map(|f| gate.quick_check(f)).collect() };
        match &self.prefilter_pool {
            Some(pool) => pool.install(check),
            None => check(),
        }
    }

    fn report_progress(
        &self,
        frame_number: u64,
        total: u64,
        stats: &ProcessingStats,
        hooks: &mut dyn RunHooks,
    ) {
        let every = self.options.progress_every.max(1);
        if frame_number % every != 0 {
            return;
        }
        let percent = if total > 0 {
            (frame_number as f64 * 100.0 / total as f64).min(100.0)
        } else {
            0.0
        };
        hooks.on_progress(percent, stats);
    }
}
