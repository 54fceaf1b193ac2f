use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    detections::{DetectionTable, TargetClasses},
    error::{RedactorError, Result, VideoError},
    pipeline::driver::{FramePipeline, FrameStats, PipelineOutcome},
    redaction::{Redactor, StyleSpec},
    video::{
        check_tool_available, default_preview_path, probe_video, FfmpegFrameSink, FfmpegFrameSource,
        Finalizer, FrameSink, FrameSource, VideoInfo,
    },
};

/// File name of the video-only stream inside the run's scratch directory
pub const INTERMEDIATE_NAME: &str = "intermediate.mp4";

/// Everything needed to redact one video
#[derive(Debug, Clone)]
pub struct RedactionJob {
    pub video_path: PathBuf,
    pub result_path: PathBuf,
    pub output_video_path: PathBuf,
    pub style: StyleSpec,
    pub targets: TargetClasses,
    pub show_once: bool,
    pub with_audio: bool,
    pub preview_path: Option<PathBuf>,
}

impl RedactionJob {
    pub fn new(
        video_path: impl Into<PathBuf>,
        result_path: impl Into<PathBuf>,
        output_video_path: impl Into<PathBuf>,
        style: StyleSpec,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            result_path: result_path.into(),
            output_video_path: output_video_path.into(),
            style,
            targets: TargetClasses::default(),
            show_once: false,
            with_audio: true,
            preview_path: None,
        }
    }

    /// Where the preview still goes when `show_once` is set
    pub fn preview_target(&self) -> PathBuf {
        self.preview_path
            .clone()
            .unwrap_or_else(|| default_preview_path(&self.output_video_path))
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: PipelineState,
    pub style: String,
    pub frames_written: u64,
    pub frames_redacted: u64,
    pub detections_applied: u64,
    pub detections_skipped: u64,
    pub truncated_at: Option<u64>,

    /// Final container, absent when the run ended in preview
    pub output: Option<PathBuf>,

    pub preview: Option<PathBuf>,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} frames written, {} redacted, {} detections applied, {} skipped",
            self.state,
            self.style,
            self.frames_written,
            self.frames_redacted,
            self.detections_applied,
            self.detections_skipped
        )?;
        if let Some(frame_id) = self.truncated_at {
            write!(f, ", source ended early at frame {}", frame_id)?;
        }
        write!(f, " in {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Orchestrates probe -> load -> render -> finalize for one job
///
/// The frame loop and every ffmpeg invocation run on the blocking pool; the
/// loop itself stays strictly sequential. Scratch files live in a run-scoped
/// temporary directory that is removed afterwards unless
/// `workspace.keep_temp` is set.
pub struct RedactionEngine {
    config: Config,
}

impl RedactionEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, job: &RedactionJob) -> Result<RunSummary> {
        let started_at = Local::now();
        let clock = Instant::now();

        info!("Starting redaction run");
        info!("   Video: {:?}", job.video_path);
        info!("   Detections: {:?}", job.result_path);
        info!("   Output: {:?}", job.output_video_path);
        info!("   Style: {}", job.style);

        let mut state = PipelineState::Idle;
        let result = self.execute(job, &mut state).await;

        match result {
            Ok((outcome, output)) => {
                let stats = *outcome.stats();
                let preview = match outcome {
                    PipelineOutcome::Previewed { path, .. } => Some(path),
                    PipelineOutcome::Completed(_) => None,
                };
                let summary = summarize(state, job, stats, output, preview, started_at, clock.elapsed());
                info!("Run complete: {}", summary);
                Ok(summary)
            }
            Err(e) => {
                transition(&mut state, PipelineState::Aborted);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &RedactionJob,
        state: &mut PipelineState,
    ) -> Result<(PipelineOutcome, Option<PathBuf>)> {
        self.check_tools().await?;

        let info = {
            let ffprobe = self.config.tools.ffprobe.clone();
            let video = job.video_path.clone();
            blocking(move || probe_video(&ffprobe, &video)).await?
        };

        let table = {
            let path = job.result_path.clone();
            let delimiter = self.config.table.delimiter.map(|c| c as u8);
            Arc::new(blocking(move || DetectionTable::load(&path, delimiter)).await?)
        };
        let report = table.report();
        if report.rows_skipped() > 0 {
            warn!(
                "Skipped {} of {} detection rows",
                report.rows_skipped(),
                report.rows_read
            );
        }

        let redactor = Arc::new(Redactor::from_spec(&job.style, job.targets.clone())?);

        let scratch = tempfile::Builder::new()
            .prefix("video-redactor-")
            .tempdir_in(self.config.workspace.temp_root())?;
        let intermediate = scratch.path().join(INTERMEDIATE_NAME);
        debug!("Scratch directory {:?}", scratch.path());

        let source = FfmpegFrameSource::open(&self.config.tools.ffmpeg, &job.video_path, info)?;
        let sink = FfmpegFrameSink::open(&self.config.tools.ffmpeg, &intermediate, info, &self.config.encoding)?;

        transition(state, PipelineState::Running);
        let preview = job.show_once.then(|| job.preview_target());
        let outcome = self
            .render(table, redactor, preview, Box::new(source), Box::new(sink), info)
            .await?;

        let output = match outcome {
            PipelineOutcome::Completed(_) => {
                transition(state, PipelineState::Finalizing);
                Some(self.finalize(job, intermediate, scratch.path()).await?)
            }
            PipelineOutcome::Previewed { .. } => None,
        };

        if self.config.workspace.keep_temp {
            let kept = scratch.keep();
            info!("Keeping scratch files in {:?}", kept);
        } else {
            scratch.close()?;
        }

        transition(state, PipelineState::Done);
        Ok((outcome, output))
    }

    /// Run the frame loop on the blocking pool inside a sized rayon pool
    pub async fn render(
        &self,
        table: Arc<DetectionTable>,
        redactor: Arc<Redactor>,
        preview: Option<PathBuf>,
        mut source: Box<dyn FrameSource>,
        mut sink: Box<dyn FrameSink>,
        info: VideoInfo,
    ) -> Result<PipelineOutcome> {
        let threads = self.config.render.threads;
        let progress = progress_bar(info.frame_count);

        blocking(move || {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| RedactorError::generic(format!("failed to build render pool: {}", e)))?;

            let mut pipeline = FramePipeline::new(&table, &redactor).with_progress(progress);
            if let Some(path) = &preview {
                pipeline = pipeline.with_preview(path);
            }

            pool.install(|| pipeline.run(source.as_mut(), sink.as_mut()))
        })
        .await
    }

    /// Turn the intermediate into the job's output, remuxing audio when requested
    pub async fn finalize(&self, job: &RedactionJob, intermediate: PathBuf, scratch_dir: &Path) -> Result<PathBuf> {
        let finalizer = Finalizer::new(self.config.tools.clone(), self.config.encoding.clone());
        let source = job.video_path.clone();
        let output = job.output_video_path.clone();
        let with_audio = job.with_audio;
        let scratch_dir = scratch_dir.to_path_buf();
        let target = output.clone();

        blocking(move || finalizer.finalize(&source, &intermediate, &target, with_audio, &scratch_dir)).await?;
        Ok(output)
    }

    async fn check_tools(&self) -> Result<()> {
        for tool in [self.config.tools.ffmpeg.clone(), self.config.tools.ffprobe.clone()] {
            let probe = tool.clone();
            let available = task::spawn_blocking(move || check_tool_available(&probe))
                .await
                .unwrap_or(false);
            if !available {
                return Err(VideoError::ToolMissing {
                    tool: tool.display().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Run a blocking closure on tokio's blocking pool
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| RedactorError::generic(format!("worker task failed: {}", e)))?
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!("Pipeline state {} -> {}", state, next);
    *state = next;
}

fn progress_bar(total: u64) -> ProgressBar {
    let progress = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})") {
        progress.set_style(style.progress_chars("█▓▒░ "));
    }
    progress
}

fn summarize(
    state: PipelineState,
    job: &RedactionJob,
    stats: FrameStats,
    output: Option<PathBuf>,
    preview: Option<PathBuf>,
    started_at: DateTime<Local>,
    elapsed: Duration,
) -> RunSummary {
    RunSummary {
        state,
        style: job.style.name().to_string(),
        frames_written: stats.frames_written,
        frames_redacted: stats.frames_redacted,
        detections_applied: stats.detections_applied,
        detections_skipped: stats.detections_skipped,
        truncated_at: stats.truncated_at,
        output,
        preview,
        started_at,
        elapsed,
    }
}

/// `true` when both configured tools can be executed
pub fn tools_available(config: &Config) -> bool {
    check_tool_available(&config.tools.ffmpeg) && check_tool_available(&config.tools.ffprobe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::{BBox, DetectionRecord};
    use crate::error::{FinalizeError, RedactionError};
    use crate::pipeline::driver::tests::{synthetic_frames, MemorySink, MemorySource};
    use crate::video::{has_audio_stream, FfmpegCommand};
    use tempfile::tempdir;

    const REQUIRES_TOOLS: &str = "ffmpeg and ffprobe must be on PATH; run with --ignored";

    fn rect_job(dir: &Path) -> RedactionJob {
        let mut job = RedactionJob::new(
            dir.join("input.mp4"),
            dir.join("detections.csv"),
            dir.join("redacted.mp4"),
            StyleSpec::Rect,
        );
        job.targets = TargetClasses::new([0]);
        job.with_audio = false;
        job
    }

    #[test]
    fn test_job_defaults() {
        let job = RedactionJob::new("in.mp4", "det.csv", "/out/redacted.mp4", StyleSpec::Rect);
        assert!(job.with_audio);
        assert!(!job.show_once);
        assert_eq!(job.targets, TargetClasses::default());
        assert_eq!(job.preview_target(), PathBuf::from("/out/redacted.preview.png"));
    }

    #[tokio::test]
    async fn test_render_in_memory() {
        let engine = RedactionEngine::new(Config::default());
        let table = Arc::new(DetectionTable::from_records(vec![DetectionRecord::new(
            5,
            0,
            BBox::new(10.0, 10.0, 30.0, 30.0),
        )]));
        let redactor = Arc::new(
            Redactor::from_spec(&StyleSpec::Blur { kernel_size: 5 }, TargetClasses::new([0])).unwrap(),
        );

        let source = MemorySource::new(synthetic_frames());
        let info = source.info;
        let outcome = engine
            .render(table, redactor, None, Box::new(source), Box::new(MemorySink::default()), info)
            .await
            .unwrap();

        assert_eq!(outcome.stats().frames_written, 10);
        assert_eq!(outcome.stats().detections_applied, 1);
    }

    #[tokio::test]
    async fn test_missing_tools_abort_before_output() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.tools.ffmpeg = PathBuf::from("/nonexistent/ffmpeg-binary");
        config.workspace.temp_dir = Some(dir.path().to_path_buf());

        let job = rect_job(dir.path());
        let result = RedactionEngine::new(config).run(&job).await;

        assert!(matches!(
            result,
            Err(RedactorError::Video(VideoError::ToolMissing { .. }))
        ));
        assert!(!job.output_video_path.exists());
    }

    /// Render a 10-frame 64x64 clip with ffmpeg's test source
    fn make_clip(config: &Config, path: &Path) {
        FfmpegCommand::new(&config.tools.ffmpeg)
            .input_with_args(["-f", "lavfi"], "testsrc=size=64x64:rate=10")
            .output_args(["-frames:v", "10"])
            .video_codec("mpeg4")
            .output_args(["-q:v", "2"])
            .output(path)
            .run()
            .unwrap();
    }

    /// Same clip with a 440 Hz tone running past the last video frame
    fn make_clip_with_audio(config: &Config, path: &Path) {
        FfmpegCommand::new(&config.tools.ffmpeg)
            .input_with_args(["-f", "lavfi"], "testsrc=size=64x64:rate=10")
            .input_with_args(["-f", "lavfi"], "sine=frequency=440:duration=3")
            .map("0:v")
            .map("1:a")
            .output_args(["-frames:v", "10"])
            .video_codec("mpeg4")
            .output_args(["-q:v", "2"])
            .audio_codec("aac")
            .output(path)
            .run()
            .unwrap();
    }

    fn scratch_dirs(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("video-redactor-"))
            .map(|e| e.path())
            .collect()
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_end_to_end_with_ffmpeg() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut config = config;
        config.workspace.temp_dir = Some(dir.path().to_path_buf());
        config.encoding.video_codec = "mpeg4".to_string();
        let job = rect_job(dir.path());

        make_clip(&config, &job.video_path);
        std::fs::write(
            &job.result_path,
            "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n5,1,0,0.9,10,10,30,30\n",
        )
        .unwrap();

        let engine = RedactionEngine::new(config.clone());
        let summary = engine.run(&job).await.unwrap();

        assert_eq!(summary.state, PipelineState::Done);
        assert_eq!(summary.frames_written, 10);
        assert_eq!(summary.frames_redacted, 1);
        assert_eq!(summary.output.as_deref(), Some(job.output_video_path.as_path()));

        let info = probe_video(&config.tools.ffprobe, &job.output_video_path).unwrap();
        assert_eq!((info.width, info.height), (64, 64));
        assert_eq!(info.frame_count, 10);

        // Only the output remains; the scratch directory is gone
        assert!(scratch_dirs(dir.path()).is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_end_to_end_keeps_audio() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut config = config;
        config.workspace.temp_dir = Some(dir.path().to_path_buf());
        config.encoding.video_codec = "mpeg4".to_string();
        let mut job = rect_job(dir.path());
        job.with_audio = true;

        make_clip_with_audio(&config, &job.video_path);
        assert!(has_audio_stream(&config.tools.ffprobe, &job.video_path).unwrap());
        std::fs::write(
            &job.result_path,
            "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n2,1,0,0.9,10,10,30,30\n",
        )
        .unwrap();

        let summary = RedactionEngine::new(config.clone()).run(&job).await.unwrap();
        assert_eq!(summary.state, PipelineState::Done);
        assert_eq!(summary.frames_written, 10);

        assert!(has_audio_stream(&config.tools.ffprobe, &job.output_video_path).unwrap());
        let info = probe_video(&config.tools.ffprobe, &job.output_video_path).unwrap();
        assert_eq!(info.frame_count, 10);

        // Extracted audio lived in the scratch directory, which is gone
        assert!(scratch_dirs(dir.path()).is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_keep_temp_leaves_scratch_directory() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut config = config;
        config.workspace.temp_dir = Some(dir.path().to_path_buf());
        config.workspace.keep_temp = true;
        config.encoding.video_codec = "mpeg4".to_string();
        let job = rect_job(dir.path());

        make_clip(&config, &job.video_path);
        std::fs::write(&job.result_path, "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n").unwrap();

        RedactionEngine::new(config).run(&job).await.unwrap();

        let kept = scratch_dirs(dir.path());
        assert_eq!(kept.len(), 1);
        assert!(kept[0].join(INTERMEDIATE_NAME).is_file());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_truncated_render_is_finalized() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut config = config;
        config.encoding.video_codec = "mpeg4".to_string();
        let engine = RedactionEngine::new(config.clone());
        let job = rect_job(dir.path());

        let mut source = MemorySource::new(synthetic_frames());
        source.fail_at = Some(3);
        let info = source.info;

        let intermediate = dir.path().join(INTERMEDIATE_NAME);
        let sink = FfmpegFrameSink::open(&config.tools.ffmpeg, &intermediate, info, &config.encoding).unwrap();

        let table = Arc::new(DetectionTable::from_records(vec![DetectionRecord::new(
            1,
            0,
            BBox::new(10.0, 10.0, 30.0, 30.0),
        )]));
        let redactor = Arc::new(Redactor::from_spec(&StyleSpec::Rect, TargetClasses::new([0])).unwrap());

        let outcome = engine
            .render(table, redactor, None, Box::new(source), Box::new(sink), info)
            .await
            .unwrap();
        assert_eq!(outcome.stats().truncated_at, Some(3));
        assert_eq!(outcome.stats().frames_written, 3);

        let output = engine.finalize(&job, intermediate, dir.path()).await.unwrap();
        assert_eq!(output, job.output_video_path);

        let written = probe_video(&config.tools.ffprobe, &output).unwrap();
        assert_eq!((written.width, written.height), (64, 64));
        assert_eq!(written.frame_count, 3);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_audio_requested_without_track_fails() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut job = rect_job(dir.path());
        job.with_audio = true;

        make_clip(&config, &job.video_path);
        std::fs::write(&job.result_path, "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n").unwrap();

        let result = RedactionEngine::new(config).run(&job).await;
        assert!(matches!(
            result,
            Err(RedactorError::Finalize(FinalizeError::RemuxFailed { .. }))
        ));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_missing_overlay_fails_before_rendering() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut job = rect_job(dir.path());
        job.style = StyleSpec::Image {
            overlay_path: dir.path().join("missing.png"),
        };

        make_clip(&config, &job.video_path);
        std::fs::write(&job.result_path, "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n").unwrap();

        let result = RedactionEngine::new(config).run(&job).await;
        assert!(matches!(
            result,
            Err(RedactorError::Redaction(RedactionError::OverlayAssetMissing { .. }))
        ));
        assert!(!job.output_video_path.exists());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_preview_skips_finalize() {
        let config = Config::default();
        assert!(tools_available(&config), "{}", REQUIRES_TOOLS);

        let dir = tempdir().unwrap();
        let mut job = rect_job(dir.path());
        job.show_once = true;

        make_clip(&config, &job.video_path);
        std::fs::write(
            &job.result_path,
            "frame_id,tracking_id,cls,conf,x1,y1,x2,y2\n3,,0,0.5,5,5,20,20\n",
        )
        .unwrap();

        let summary = RedactionEngine::new(config).run(&job).await.unwrap();
        assert_eq!(summary.output, None);
        assert_eq!(summary.preview, Some(job.preview_target()));
        assert!(job.preview_target().is_file());
        assert!(!job.output_video_path.exists());
    }
}
