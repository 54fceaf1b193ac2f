//! FFmpeg command-line builder.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

/// One `-i` input together with the options that precede it
#[derive(Debug, Clone)]
struct Input {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg invocations with any number of inputs
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: String,
    inputs: Vec<Input>,
    output_args: Vec<String>,
    output: String,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_string_lossy().to_string(),
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: String::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input file or pipe
    pub fn input(self, source: impl AsRef<OsStr>) -> Self {
        self.input_with_args(Vec::<String>::new(), source)
    }

    /// Add an input preceded by its demuxer options
    pub fn input_with_args<I, S>(mut self, args: I, source: impl AsRef<OsStr>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(Input {
            args: args.into_iter().map(Into::into).collect(),
            source: source.as_ref().to_string_lossy().to_string(),
        });
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Drop audio from the output
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Drop video from the output
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn output(mut self, target: impl AsRef<OsStr>) -> Self {
        self.output = target.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Full argument list, without the program name
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone());

        args
    }

    /// A `Command` ready to spawn, with stdin closed and stderr captured
    pub fn to_command(&self) -> Command {
        let args = self.build_args();
        debug!("{} {}", self.program, args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
        cmd
    }

    /// Run to completion; on failure returns a description including stderr
    pub fn run(&self) -> std::result::Result<(), String> {
        let output = self
            .to_command()
            .output()
            .map_err(|e| format!("failed to execute {}: {}", self.program, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("{} exited with {}: {}", self.program, output.status, stderr.trim()))
        }
    }
}

/// `true` when `program -version` runs successfully
pub fn check_tool_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
