use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};

use tracing::{debug, info};

use crate::{
    config::EncodingConfig,
    error::{Result, VideoError},
    video::command::FfmpegCommand,
    video::types::{Frame, VideoInfo},
};

/// Sequential writer of processed frames
pub trait FrameSink: Send {
    /// Append one frame; dimensions must match the stream
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the stream
    fn finish(&mut self) -> Result<()>;
}

/// Encodes a video-only intermediate file by piping RGB24 frames into `ffmpeg`
pub struct FfmpegFrameSink {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    writer: Option<BufWriter<ChildStdin>>,
    frames_written: u64,
}

impl FfmpegFrameSink {
    /// Start an encoder writing `path` at the source's size and frame rate
    pub fn open(ffmpeg: &Path, path: &Path, info: VideoInfo, encoding: &EncodingConfig) -> Result<Self> {
        let open_failed = |reason: String| VideoError::WriterOpenFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(open_failed(format!("directory {:?} does not exist", parent)).into());
            }
        }

        let command = intermediate_command(ffmpeg, path, &info, encoding);
        let mut cmd = command.to_command();
        cmd.stdin(Stdio::piped());
        let mut child = cmd
            .spawn()
            .map_err(|e| open_failed(format!("failed to start encoder: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_failed("encoder has no input pipe".to_string()))?;

        info!("Writing intermediate video {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            info,
            child: Some(child),
            writer: Some(BufWriter::with_capacity(info.frame_bytes().max(8192), stdin)),
            frames_written: 0,
        })
    }

    /// Wait for the encoder and turn its stderr into an error reason
    fn collect_failure(&mut self, context: String) -> VideoError {
        self.writer = None;
        let stderr = self
            .child
            .take()
            .and_then(|child| child.wait_with_output().ok())
            .map(|output| String::from_utf8_lossy(&output.stderr).trim().to_string())
            .unwrap_or_default();

        VideoError::EncodingFailed {
            reason: if stderr.is_empty() {
                context
            } else {
                format!("{}: {}", context, stderr)
            },
        }
    }
}

/// `ffmpeg -f rawvideo -pix_fmt rgb24 -s WxH -r FPS -i pipe:0 -an -c:v ... path`
pub fn intermediate_command(ffmpeg: &Path, path: &Path, info: &VideoInfo, encoding: &EncodingConfig) -> FfmpegCommand {
    FfmpegCommand::new(ffmpeg)
        .input_with_args(
            [
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pix_fmt".to_string(),
                "rgb24".to_string(),
                "-s".to_string(),
                format!("{}x{}", info.width, info.height),
                "-r".to_string(),
                info.fps.to_string(),
            ],
            "pipe:0",
        )
        .no_audio()
        .video_codec(encoding.intermediate_codec.clone())
        .output_arg("-q:v")
        .output_arg(encoding.intermediate_quality.to_string())
        .pixel_format(encoding.pixel_format.clone())
        .output(path)
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.info.width || frame.height() != self.info.height {
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "frame is {}x{}, stream is {}x{}",
                    frame.width(),
                    frame.height(),
                    self.info.width,
                    self.info.height
                ),
            }
            .into());
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(VideoError::EncodingFailed {
                reason: "encoder already closed".to_string(),
            }
            .into());
        };

        if let Err(e) = writer.write_all(frame.as_rgb_bytes()) {
            let context = format!("write of frame {} failed ({})", self.frames_written, e);
            return Err(self.collect_failure(context).into());
        }

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                return Err(self.collect_failure(format!("flush failed ({})", e)).into());
            }
        }

        let Some(child) = self.child.take() else {
            return Ok(());
        };

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::EncodingFailed {
                reason: format!("encoder exited with {}: {}", output.status, stderr.trim()),
            }
            .into());
        }

        debug!("Encoded {} frames into {:?}", self.frames_written, self.path);
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            debug!("Encoder for {:?} stopped before finish", self.path);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
