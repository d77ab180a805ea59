//! 视频帧来源
//!
//! 解码交给 ffmpeg（rawvideo / rgb24 输出），元数据用 ffprobe 读取

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use log::{debug, info, warn};
use serde::Serialize;

use super::frame::Frame;
use crate::core::error::{HarvestError, Result};

/// 视频元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// 0 when the container does not report a frame count
    pub total_frames: u64,
    pub duration_secs: f64,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, fps: f64, total_frames: u64) -> Self {
        let duration_secs = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        Self {
            width,
            height,
            fps,
            total_frames,
            duration_secs,
        }
    }
}

/// Ordered, finite, sequential-only frame supply.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame, numbered from 1, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Parse `30000/1001` or `29.97`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

/// Read width, height, frame rate and frame count of the first video stream.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    debug!("Running ffprobe on {}", path.display());
    let metadata = ffprobe::ffprobe(path).map_err(|e| HarvestError::source_open(path, e))?;

    let stream = metadata
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| HarvestError::source_open(path, "no video stream"))?;

    let width = stream.width.unwrap_or(0).max(0) as u32;
    let height = stream.height.unwrap_or(0).max(0) as u32;
    if width == 0 || height == 0 {
        return Err(HarvestError::source_open(path, "video stream has no dimensions"));
    }

    let fps = parse_frame_rate(&stream.avg_frame_rate)
        .filter(|f| *f > 0.0)
        .or_else(|| parse_frame_rate(&stream.r_frame_rate))
        .unwrap_or(0.0);

    let duration = metadata
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok());

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    let mut info = VideoInfo::new(width, height, fps, total_frames);
    if let Some(d) = duration {
        info.duration_secs = d;
    }
    Ok(info)
}

/// ffmpeg 解码的帧来源
pub struct FfmpegFrameSource {
    info: VideoInfo,
    child: FfmpegChild,
    events: FfmpegIterator,
    frames_read: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HarvestError::source_open(path, "file not found"));
        }
        let info = probe_video(path)?;

        let (child, events) = spawn_decoder(path, &[])?;
        info!(
            "🎬 Opened {} ({}x{}, {:.2} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );

        Ok(Self {
            info,
            child,
            events,
            frames_read: 0,
            finished: false,
        })
    }
}

fn decoder_command(path: &Path, pre_output_args: &[&str]) -> FfmpegCommand {
    let mut command = FfmpegCommand::new();
    command.hide_banner().input(path);
    command.args(pre_output_args);
    command.rawvideo();
    command
}

fn spawn_decoder(path: &Path, pre_output_args: &[&str]) -> Result<(FfmpegChild, FfmpegIterator)> {
    let mut child = decoder_command(path, pre_output_args)
        .spawn()
        .map_err(|e| HarvestError::source_open(path, e))?;
    let events = child.iter().map_err(|e| HarvestError::source_open(path, e))?;
    Ok((child, events))
}

/// Pull the next decoded frame out of the event stream.
fn next_output_frame(events: &mut FfmpegIterator) -> Result<Option<(u32, u32, Vec<u8>, f32)>> {
    for event in events.by_ref() {
        match event {
            FfmpegEvent::OutputFrame(frame) => {
                return Ok(Some((frame.width, frame.height, frame.data, frame.timestamp)));
            }
            FfmpegEvent::Log(LogLevel::Fatal, message) | FfmpegEvent::Error(message) => {
                return Err(HarvestError::Decode(message));
            }
            FfmpegEvent::Log(LogLevel::Error, message) => {
                debug!("ffmpeg: {}", message);
            }
            FfmpegEvent::Done => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        match next_output_frame(&mut self.events)? {
            Some((width, height, data, timestamp)) => {
                self.frames_read += 1;
                Ok(Some(Frame::new(
                    width,
                    height,
                    data,
                    (timestamp as f64 * 1000.0) as u64,
                    self.frames_read,
                )))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill() {
                warn!("⚠️ Failed to stop ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}

/// Decode the frame at 0-based stream position `index`. The returned frame is
/// numbered `index + 1`, matching the pipeline's numbering.
pub fn extract_single_frame(path: &Path, index: u64) -> Result<Frame> {
    if !path.is_file() {
        return Err(HarvestError::source_open(path, "file not found"));
    }

    let select = format!("select=eq(n\\,{})", index);
    let (mut child, mut events) =
        spawn_decoder(path, &["-vf", &select, "-vsync", "0", "-frames:v", "1"])?;
    let decoded = next_output_frame(&mut events);
    let _ = child.wait();

    match decoded? {
        Some((width, height, data, timestamp)) => Ok(Frame::new(
            width,
            height,
            data,
            (timestamp as f64 * 1000.0) as u64,
            index + 1,
        )),
        None => Err(HarvestError::FrameNotFound {
            path: path.display().to_string(),
            index,
        }),
    }
}

/// 内存帧来源（测试 / 演示）
pub struct VecFrameSource {
    info: VideoInfo,
    frames: VecDeque<Frame>,
    fail_after: Option<u64>,
    frames_read: u64,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        let info = VideoInfo::new(width, height, 30.0, frames.len() as u64);
        Self {
            info,
            frames: frames.into(),
            fail_after: None,
            frames_read: 0,
        }
    }

    /// `count` solid frames numbered 1..=count.
    pub fn solid(count: u64, width: u32, height: u32) -> Self {
        Self::new(
            (1..=count)
                .map(|n| Frame::filled(width, height, 128, n))
                .collect(),
        )
    }

    /// Return a decode error once `frames` frames have been read.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl FrameSource for VecFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_after == Some(self.frames_read) {
            return Err(HarvestError::Decode("corrupt packet".to_string()));
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.001);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_video_info_duration() {
        assert_eq!(VideoInfo::new(1920, 1080, 30.0, 900).duration_secs, 30.0);
        assert_eq!(VideoInfo::new(1920, 1080, 0.0, 900).duration_secs, 0.0);
    }

    #[test]
    fn test_decoder_input_keeps_raw_path() {
        let path = Path::new("/videos/holiday clip.mp4");
        let command = decoder_command(path, &["-frames:v", "1"]);
        let args: Vec<&std::ffi::OsStr> = command.get_args().collect();

        let input = args.iter().position(|a| *a == "-i").unwrap();
        assert_eq!(args[input + 1], path.as_os_str());
        assert!(args.contains(&std::ffi::OsStr::new("-frames:v")));
        assert!(args.contains(&std::ffi::OsStr::new("rawvideo")));
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_input_non_utf8_path() {
        use std::os::unix::ffi::OsStrExt;

        let raw = std::ffi::OsStr::from_bytes(b"/videos/clip_\xff.mp4");
        let command = decoder_command(Path::new(raw), &[]);
        assert!(command.get_args().any(|a| a == raw));
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let err = FfmpegFrameSource::open(Path::new("/definitely/not/here.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, HarvestError::SourceOpen { .. }));

        let err = extract_single_frame(Path::new("/definitely/not/here.mp4"), 3).unwrap_err();
        assert!(matches!(err, HarvestError::SourceOpen { .. }));
    }

    #[test]
    fn test_vec_source_is_sequential() {
        let mut source = VecFrameSource::solid(3, 8, 8);
        assert_eq!(source.info().total_frames, 3);
        assert_eq!(source.info().width, 8);

        let numbers: Vec<u64> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.frame_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_vec_source_failure() {
        let mut source = VecFrameSource::solid(3, 8, 8).failing_after(1);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().is_err());
    }
}
