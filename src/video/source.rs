use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};

use tracing::{debug, warn};

use crate::{
    error::{Result, VideoError},
    video::command::FfmpegCommand,
    video::types::{Frame, VideoInfo},
};

/// Sequential reader of decoded frames
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    /// Next frame in decode order, `Ok(None)` once the stream is exhausted
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the decoder
    fn close(&mut self) -> Result<()>;
}

/// Decodes a video through an `ffmpeg` child process emitting packed RGB24
pub struct FfmpegFrameSource {
    info: VideoInfo,
    child: Option<Child>,
    reader: Option<BufReader<ChildStdout>>,
    frames_read: u64,
}

impl FfmpegFrameSource {
    pub fn open(ffmpeg: &Path, path: &Path, info: VideoInfo) -> Result<Self> {
        let unreadable = |reason: String| VideoError::SourceUnreadable {
            path: path.display().to_string(),
            reason,
        };

        let command = FfmpegCommand::new(ffmpeg)
            .input(path)
            .output_args(["-vsync", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .output("pipe:1");

        let mut cmd = command.to_command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| unreadable(format!("failed to start decoder: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unreadable("decoder has no output pipe".to_string()))?;

        debug!("Decoder started for {:?}", path);
        Ok(Self {
            info,
            child: Some(child),
            reader: Some(BufReader::with_capacity(info.frame_bytes().max(8192), stdout)),
            frames_read: 0,
        })
    }
}

/// Fill `buf` from `reader`; returns the number of bytes actually read
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame_id = self.frames_read;
        let failed = |reason: String| VideoError::FrameReadFailed { frame_id, reason };

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut data = vec![0u8; self.info.frame_bytes()];
        let filled = read_full(reader, &mut data).map_err(|e| failed(e.to_string()))?;

        if filled == 0 {
            return Ok(None);
        }
        if filled < data.len() {
            return Err(failed(format!("truncated frame ({} of {} bytes)", filled, data.len())).into());
        }

        let frame = Frame::from_rgb_bytes(self.info.width, self.info.height, data)
            .ok_or_else(|| failed("frame buffer size mismatch".to_string()))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            // Stopping early leaves the decoder blocked on a full pipe
            if child.try_wait()?.is_none() {
                let _ = child.kill();
            }
            let status = child.wait()?;
            debug!("Decoder exited with {} after {} frames", status, self.frames_read);
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to stop decoder: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_full_handles_short_reads() {
        let data: Vec<u8> = (0..30).collect();
        let mut reader = Trickle { data: &data, chunk: 7 };

        let mut buf = [0u8; 12];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 12);
        assert_eq!(buf[11], 11);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 12);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 6);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_full_at_eof() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }
}
