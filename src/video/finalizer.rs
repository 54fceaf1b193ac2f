use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    config::{EncodingConfig, ToolsConfig},
    error::{FinalizeError, Result},
    video::command::FfmpegCommand,
    video::probe::has_audio_stream,
};

/// Name of the extracted audio track inside the scratch directory
pub const AUDIO_SCRATCH_NAME: &str = "audio.mka";

/// Produces the final container from the video-only intermediate
///
/// With audio enabled, the source's first audio track is extracted to the
/// scratch directory, muxed beside the redacted video, and removed again.
/// Without audio, the intermediate is transcoded on its own.
pub struct Finalizer {
    tools: ToolsConfig,
    encoding: EncodingConfig,
}

impl Finalizer {
    pub fn new(tools: ToolsConfig, encoding: EncodingConfig) -> Self {
        Self { tools, encoding }
    }

    pub fn finalize(
        &self,
        source: &Path,
        intermediate: &Path,
        output: &Path,
        with_audio: bool,
        scratch_dir: &Path,
    ) -> Result<()> {
        if with_audio {
            if !has_audio_stream(&self.tools.ffprobe, source)? {
                return Err(remux_failed(format!("{} has no audio track", source.display())).into());
            }

            let audio = scratch_dir.join(AUDIO_SCRATCH_NAME);
            self.extract_audio_command(source, &audio)
                .run()
                .map_err(|e| remux_failed(format!("audio extraction failed: {}", e)))?;
            debug!("Extracted audio to {:?}", audio);

            let muxed = self
                .mux_command(intermediate, &audio, output)
                .run()
                .map_err(|e| remux_failed(format!("mux failed: {}", e)));

            if let Err(e) = std::fs::remove_file(&audio) {
                debug!("Could not remove scratch audio {:?}: {}", audio, e);
            }
            muxed?;
        } else {
            self.video_only_command(intermediate, output)
                .run()
                .map_err(|e| remux_failed(format!("transcode failed: {}", e)))?;
        }

        info!("Final video written to {:?}", output);
        Ok(())
    }

    /// Copy the first audio stream out of the source untouched
    pub fn extract_audio_command(&self, source: &Path, audio: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.tools.ffmpeg)
            .input(source)
            .no_video()
            .map("0:a:0")
            .audio_codec("copy")
            .output(audio)
    }

    /// Redacted video plus the extracted audio, cut to the shorter stream
    pub fn mux_command(&self, intermediate: &Path, audio: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.tools.ffmpeg)
            .input(intermediate)
            .input(audio)
            .map("0:v:0")
            .map("1:a:0")
            .video_codec(self.encoding.video_codec.clone())
            .pixel_format(self.encoding.pixel_format.clone())
            .audio_codec(self.encoding.audio_codec.clone())
            .output_arg("-shortest")
            .output(output)
    }

    pub fn video_only_command(&self, intermediate: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.tools.ffmpeg)
            .input(intermediate)
            .map("0:v:0")
            .no_audio()
            .video_codec(self.encoding.video_codec.clone())
            .pixel_format(self.encoding.pixel_format.clone())
            .output(output)
    }
}

fn remux_failed(reason: String) -> FinalizeError {
    FinalizeError::RemuxFailed { reason }
}

/// Default location of the preview still for `output`
pub fn default_preview_path(output: &Path) -> PathBuf {
    output.with_extension("preview.png")
}
