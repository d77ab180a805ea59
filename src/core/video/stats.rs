use std::fmt;

use log::info;
use serde::Serialize;

use crate::core::detection::Category;

/// 单个视频的处理统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    /// Sampled frames that entered the per-frame sequence
    pub processed_frames: u64,
    pub saved_frames: u64,
    pub skipped_text: u64,
    pub skipped_no_detection: u64,
    /// Subject found but no crop box could be produced
    pub skipped_infeasible: u64,
    /// Crop produced but quality at or below the threshold
    pub dropped_low_quality: u64,
    pub person_frames: u64,
    pub animal_frames: u64,
    pub object_frames: u64,
    pub processing_time_secs: f64,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_saved(&mut self, category: Category) {
        self.saved_frames += 1;
        match category {
            Category::Person => self.person_frames += 1,
            Category::Animal => self.animal_frames += 1,
            Category::Object => self.object_frames += 1,
        }
    }

    pub fn category_count(&self, category: Category) -> u64 {
        match category {
            Category::Person => self.person_frames,
            Category::Animal => self.animal_frames,
            Category::Object => self.object_frames,
        }
    }

    pub fn frames_per_second(&self) -> f64 {
        if self.processing_time_secs > 0.0 {
            self.processed_frames as f64 / self.processing_time_secs
        } else {
            0.0
        }
    }

    pub fn log_summary(&self, video_name: &str) {
        info!("📊 {}: {}", video_name, self);
    }
}

impl fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {}, saved {} (persons {}, animals {}, objects {}), \
             skipped text {}, no detection {}, infeasible {}, low quality {}, {:.1}s ({:.1} fps)",
            self.processed_frames,
            self.saved_frames,
            self.person_frames,
            self.animal_frames,
            self.object_frames,
            self.skipped_text,
            self.skipped_no_detection,
            self.skipped_infeasible,
            self.dropped_low_quality,
            self.processing_time_secs,
            self.frames_per_second()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub name: String,
    pub stats: ProcessingStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedVideo {
    pub name: String,
    pub error: String,
}

/// 批量运行汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_videos: usize,
    pub processed_videos: usize,
    pub total_frames_saved: u64,
    pub total_time_secs: f64,
    pub videos: Vec<VideoSummary>,
    pub failed: Vec<FailedVideo>,
}

impl RunSummary {
    pub fn new(total_videos: usize) -> Self {
        Self {
            total_videos,
            ..Default::default()
        }
    }

    pub fn record_video(&mut self, name: impl Into<String>, stats: ProcessingStats) {
        self.processed_videos += 1;
        self.total_frames_saved += stats.saved_frames;
        self.videos.push(VideoSummary {
            name: name.into(),
            stats,
        });
    }

    pub fn record_failure(&mut self, name: impl Into<String>, error: impl ToString) {
        self.failed.push(FailedVideo {
            name: name.into(),
            error: error.to_string(),
        });
    }

    pub fn log_summary(&self) {
        info!(
            "🏁 Videos processed: {}/{}, frames saved: {}, total time {:.1}s",
            self.processed_videos, self.total_videos, self.total_frames_saved, self.total_time_secs
        );
        for video in &self.videos {
            info!("   {}: {}", video.name, video.stats);
        }
        for failed in &self.failed {
            info!("   ❌ {}: {}", failed.name, failed.error);
        }
    }
}
