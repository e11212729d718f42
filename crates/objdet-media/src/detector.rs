//! Detector command builder and runner.
//!
//! The detector is invoked as
//! `<program> detect <config> <weights> <image> [extra..] -out <prefix>`
//! with every value passed as its own argument. Nothing goes through a shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Default detector timeout in seconds.
pub const DEFAULT_DETECTOR_TIMEOUT_SECS: u64 = 120;

/// Longest stderr excerpt carried in an error.
const MAX_STDERR_EXCERPT: usize = 2000;

/// Static detector settings.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Detector executable
    pub program: PathBuf,
    /// Network configuration file
    pub config_file: PathBuf,
    /// Trained weights file
    pub weights_file: PathBuf,
    /// Directory the detector runs in (inherits ours when unset)
    pub working_dir: Option<PathBuf>,
    /// Kill the detector after this many seconds
    pub timeout_secs: Option<u64>,
    /// Extra arguments placed before `-out`
    pub extra_args: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./darknet"),
            config_file: PathBuf::from("cfg/yolov3.cfg"),
            weights_file: PathBuf::from("yolov3.weights"),
            working_dir: None,
            timeout_secs: Some(DEFAULT_DETECTOR_TIMEOUT_SECS),
            extra_args: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Build the command for one image.
    pub fn command_for(&self, image: impl AsRef<Path>, output_prefix: impl AsRef<Path>) -> DetectorCommand {
        DetectorCommand::new(&self.program, &self.config_file, &self.weights_file, image)
            .args(self.extra_args.iter().cloned())
            .output_prefix(output_prefix)
    }

    /// Build a runner honouring the timeout and working directory.
    pub fn runner(&self) -> DetectorRunner {
        let mut runner = DetectorRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(dir) = &self.working_dir {
            runner = runner.with_working_dir(dir);
        }
        runner
    }
}

/// Builder for a single detector invocation.
#[derive(Debug, Clone)]
pub struct DetectorCommand {
    program: PathBuf,
    config_file: PathBuf,
    weights_file: PathBuf,
    image: PathBuf,
    output_prefix: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl DetectorCommand {
    pub fn new(
        program: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
        weights_file: impl AsRef<Path>,
        image: impl AsRef<Path>,
    ) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            config_file: config_file.as_ref().to_path_buf(),
            weights_file: weights_file.as_ref().to_path_buf(),
            image: image.as_ref().to_path_buf(),
            output_prefix: None,
            extra_args: Vec::new(),
        }
    }

    /// Where the detector writes its annotated image (it appends `.jpg`).
    pub fn output_prefix(mut self, prefix: impl AsRef<Path>) -> Self {
        self.output_prefix = Some(prefix.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "detect".to_string(),
            self.config_file.to_string_lossy().to_string(),
            self.weights_file.to_string_lossy().to_string(),
            self.image.to_string_lossy().to_string(),
        ];

        args.extend(self.extra_args.iter().cloned());

        if let Some(prefix) = &self.output_prefix {
            args.push("-out".to_string());
            args.push(prefix.to_string_lossy().to_string());
        }

        args
    }
}

/// Captured result of a successful detector run.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

/// Runs detector commands with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct DetectorRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
    working_dir: Option<PathBuf>,
}

impl DetectorRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Locate the detector executable, relative paths resolved against the working directory.
    pub fn resolve_program(&self, program: &Path) -> MediaResult<PathBuf> {
        let cwd = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        which::which_in(program, std::env::var_os("PATH"), cwd)
            .map_err(|_| MediaError::DetectorNotFound(program.to_path_buf()))
    }

    /// Run the detector and capture its output.
    ///
    /// Blocks the calling task until the process exits or the timeout fires.
    /// On timeout the process is killed.
    pub async fn run(&self, cmd: &DetectorCommand) -> MediaResult<DetectorOutput> {
        let program = self.resolve_program(cmd.program())?;
        let args = cmd.build_args();
        debug!("Running detector: {} {}", program.display(), args.join(" "));

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let child = command.spawn().map_err(|e| {
            MediaError::detector_failed(format!("Failed to start detector: {}", e), None, None)
        })?;

        let output = match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output()).await {
                    Ok(result) => result.map_err(wait_error)?,
                    Err(_) => {
                        // Dropping the wait future drops the child, which kills it.
                        warn!("Detector timed out after {} seconds, killing process", secs);
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => child.wait_with_output().await.map_err(wait_error)?,
        };

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(MediaError::detector_failed(
                "Detector exited with non-zero status",
                Some(stderr_excerpt(&stderr)).filter(|s| !s.is_empty()),
                output.status.code(),
            ));
        }

        if stdout.trim().is_empty() {
            return Err(MediaError::EmptyOutput);
        }

        debug!(
            duration_ms = duration.as_millis() as u64,
            stdout_bytes = stdout.len(),
            "Detector finished"
        );

        Ok(DetectorOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
            duration,
        })
    }
}

fn wait_error(e: std::io::Error) -> MediaError {
    MediaError::detector_failed(format!("Failed to wait for detector: {}", e), None, None)
}

/// Last part of stderr, cut on a char boundary.
fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX_STDERR_EXCERPT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_STDERR_EXCERPT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Check that the configured detector can be found.
pub fn check_detector(config: &DetectorConfig) -> MediaResult<PathBuf> {
    config.runner().resolve_program(&config.program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = DetectorCommand::new("./darknet", "cfg/yolov3.cfg", "yolov3.weights", "uploads/a b.jpg")
            .output_prefix("output/a b");

        assert_eq!(
            cmd.build_args(),
            vec![
                "detect",
                "cfg/yolov3.cfg",
                "yolov3.weights",
                "uploads/a b.jpg",
                "-out",
                "output/a b",
            ]
        );
    }

    #[test]
    fn test_hostile_values_stay_single_arguments() {
        let cmd = DetectorCommand::new("darknet", "c", "w", "x.jpg; rm -rf /")
            .output_prefix("$(reboot)");
        let args = cmd.build_args();
        assert_eq!(args.len(), 6);
        assert_eq!(args[3], "x.jpg; rm -rf /");
        assert_eq!(args[5], "$(reboot)");
    }

    #[test]
    fn test_config_command_places_extra_args_before_out() {
        let config = DetectorConfig {
            extra_args: vec!["-thresh".to_string(), "0.3".to_string()],
            ..Default::default()
        };
        let args = config.command_for("img.png", "out/img").build_args();
        assert_eq!(&args[4..], &["-thresh", "0.3", "-out", "out/img"]);
    }

    #[test]
    fn test_stderr_excerpt() {
        assert_eq!(stderr_excerpt("  short\n"), "short");

        let long = "é".repeat(MAX_STDERR_EXCERPT);
        let excerpt = stderr_excerpt(&long);
        assert!(excerpt.len() <= MAX_STDERR_EXCERPT);
        assert!(excerpt.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cmd = DetectorCommand::new("/nonexistent/darknet", "c", "w", "i.jpg");
        let err = DetectorRunner::new().run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::DetectorNotFound(_)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_run_captures_stdout_and_args() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "detector.sh", "echo \"Predicted in 0.1 seconds.\"\necho \"$@\"");

            let cmd = DetectorCommand::new(&program, "cfg", "weights", "img.jpg").output_prefix("out/img");
            let output = DetectorRunner::new().with_timeout(10).run(&cmd).await.unwrap();

            let mut lines = output.stdout.lines();
            assert_eq!(lines.next(), Some("Predicted in 0.1 seconds."));
            assert_eq!(lines.next(), Some("detect cfg weights img.jpg -out out/img"));
            assert_eq!(output.exit_code, Some(0));
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_failure() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "fail.sh", "echo 'weights missing' >&2\nexit 3");

            let cmd = DetectorCommand::new(&program, "c", "w", "i.jpg");
            let err = DetectorRunner::new().run(&cmd).await.unwrap_err();
            match err {
                MediaError::DetectorFailed { stderr, exit_code, .. } => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stderr.as_deref(), Some("weights missing"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_unrunnable_binary_is_detector_failure() {
            let dir = TempDir::new().unwrap();
            let program = dir.path().join("darknet");
            std::fs::write(&program, [0x00u8, 0xff, 0x13, 0x37, 0x42]).unwrap();
            std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

            let cmd = DetectorCommand::new(&program, "c", "w", "i.jpg");
            let err = DetectorRunner::new().run(&cmd).await.unwrap_err();
            assert!(matches!(err, MediaError::DetectorFailed { .. }), "{err:?}");
            assert!(err.is_invocation_error());
        }

        #[tokio::test]
        async fn test_blank_stdout_is_empty_output() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "quiet.sh", "echo ''");

            let cmd = DetectorCommand::new(&program, "c", "w", "i.jpg");
            let err = DetectorRunner::new().run(&cmd).await.unwrap_err();
            assert!(matches!(err, MediaError::EmptyOutput));
        }

        #[tokio::test]
        async fn test_timeout_kills_detector() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "slow.sh", "exec sleep 30");

            let cmd = DetectorCommand::new(&program, "c", "w", "i.jpg");
            let start = Instant::now();
            let err = DetectorRunner::new().with_timeout(1).run(&cmd).await.unwrap_err();
            assert!(matches!(err, MediaError::Timeout(1)));
            assert!(start.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_relative_program_resolves_in_working_dir() {
            let dir = TempDir::new().unwrap();
            script(&dir, "darknet", "pwd");

            let config = DetectorConfig {
                working_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            };
            assert!(check_detector(&config).is_ok());

            let output = config.runner().run(&config.command_for("i.jpg", "o")).await.unwrap();
            let cwd = std::fs::canonicalize(output.stdout.trim()).unwrap();
            assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
        }
    }
}
