//! Container metadata via ffprobe.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{Result, VideoError},
    video::types::VideoInfo,
};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

fn unreadable(path: &Path, reason: impl Into<String>) -> VideoError {
    VideoError::SourceUnreadable {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn run_ffprobe(ffprobe: &Path, path: &Path, select: &str) -> Result<FfprobeOutput> {
    if !path.is_file() {
        return Err(unreadable(path, "file does not exist").into());
    }

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .args(["-select_streams", select])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|_| VideoError::ToolMissing {
            tool: ffprobe.display().to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(unreadable(path, format!("ffprobe failed: {}", stderr.trim())).into());
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| unreadable(path, format!("unexpected ffprobe output: {}", e)).into())
}

/// Probe width, height, frame rate and frame count of the first video stream
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoInfo> {
    let probe = run_ffprobe(ffprobe, path, "v:0")?;
    let info = video_info_from_probe(&probe).map_err(|reason| unreadable(path, reason))?;

    info!("Video info: {} ({:.2}s)", info, info.duration_secs());
    Ok(info)
}

fn video_info_from_probe(probe: &FfprobeOutput) -> std::result::Result<VideoInfo, String> {
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| "frame rate unavailable".to_string())?;

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(count) => count,
        None => {
            let duration = stream
                .duration
                .as_deref()
                .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0);
            debug!("nb_frames missing, estimating from duration {:.3}s", duration);
            (duration * fps).round().max(0.0) as u64
        }
    };

    let info = VideoInfo {
        width,
        height,
        fps,
        frame_count,
    };
    if !info.is_valid() {
        return Err(format!("invalid stream parameters ({})", info));
    }
    Ok(info)
}

/// `true` when the container carries at least one audio stream
pub fn has_audio_stream(ffprobe: &Path, path: &Path) -> Result<bool> {
    let probe = run_ffprobe(ffprobe, path, "a")?;
    Ok(probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio")))
}

/// Parse `30000/1001` or `25` style rates; zero or malformed rates yield `None`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    (fps.is_finite() && fps > 0.0).then_some(fps)
}
