//! Fetch engine backed by the external yt-dlp binary

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{EngineStatus, FetchEngine, FetchHooks, FetchOptions, OUTPUT_TEMPLATE_KEY, ProgressUpdate};

/// Line prefix of progress snapshots on stdout
const PROGRESS_PREFIX: &str = "[tubedl-progress] ";

/// Line prefix of the final info document on stdout
const INFO_PREFIX: &str = "[tubedl-info] ";

/// Number of stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Fetch engine that drives the external `yt-dlp` binary
///
/// Progress and the final info document are requested as line-delimited JSON
/// on stdout via `--progress-template` and `--print`, so no scraping of the
/// human-readable output is involved.
///
/// # Examples
///
/// ```no_run
/// use tubedl::fetch::YtDlpEngine;
/// use std::path::PathBuf;
///
/// // Explicit binary
/// let engine = YtDlpEngine::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let engine = YtDlpEngine::from_path();
/// ```
pub struct YtDlpEngine {
    binary_path: PathBuf,
}

impl YtDlpEngine {
    /// Create an engine with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Path of the binary this engine runs
    pub fn binary_path(&self) -> &PathBuf {
        &self.binary_path
    }

    /// Command-line arguments for fetching `url` with `options`
    ///
    /// Option keys become long flags with underscores turned into dashes.
    /// `true` adds the bare flag, `false` adds its `--no-` form, `null` is
    /// skipped, arrays repeat the flag per element, and objects are passed as
    /// JSON. The output template always goes through `-o`.
    pub fn build_args(url: &str, options: &FetchOptions) -> Vec<String> {
        let mut args = vec![
            "--no-simulate".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!("download:{}%(progress)j", PROGRESS_PREFIX),
            "--print".to_string(),
            format!("after_move:{}%()j", INFO_PREFIX),
        ];

        for (key, value) in options {
            if key == OUTPUT_TEMPLATE_KEY {
                if let Some(template) = value.as_str() {
                    args.push("-o".to_string());
                    args.push(template.to_string());
                }
                continue;
            }
            push_option(&mut args, key, value);
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

fn push_option(args: &mut Vec<String>, key: &str, value: &Value) {
    let flag = key.replace('_', "-");
    match value {
        Value::Null => {}
        Value::Bool(true) => args.push(format!("--{}", flag)),
        Value::Bool(false) => args.push(format!("--no-{}", flag)),
        Value::String(s) => {
            args.push(format!("--{}", flag));
            args.push(s.clone());
        }
        Value::Number(n) => {
            args.push(format!("--{}", flag));
            args.push(n.to_string());
        }
        Value::Array(items) => {
            for item in items {
                push_option(args, key, item);
            }
        }
        Value::Object(_) => {
            args.push(format!("--{}", flag));
            args.push(value.to_string());
        }
    }
}

/// What a single stdout line carried
#[derive(Debug, PartialEq)]
enum OutputLine {
    Progress(Map<String, Value>),
    Info(Map<String, Value>),
    Other,
}

fn parse_line(line: &str) -> OutputLine {
    let parse = |payload: &str| match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    if let Some(payload) = line.strip_prefix(PROGRESS_PREFIX) {
        return parse(payload).map_or(OutputLine::Other, OutputLine::Progress);
    }
    if let Some(payload) = line.strip_prefix(INFO_PREFIX) {
        return parse(payload).map_or(OutputLine::Other, OutputLine::Info);
    }
    OutputLine::Other
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions, hooks: &dyn FetchHooks) -> Result<()> {
        let args = Self::build_args(url, options);
        tracing::debug!(binary = %self.binary_path.display(), ?args, "running yt-dlp");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr was not captured".to_string()))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe
        let stderr_tail = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut info = None;
        let mut saw_finished = false;
        // Lines are decoded lossily; only the JSON payload lines need to be valid UTF-8
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            match parse_line(line) {
                OutputLine::Progress(raw) => {
                    if let Some(update) = ProgressUpdate::from_raw(raw) {
                        saw_finished |= update.status == EngineStatus::Finished;
                        hooks.on_progress(update).await?;
                    }
                }
                OutputLine::Info(raw) => info = Some(raw),
                OutputLine::Other => tracing::trace!(line = %line, "yt-dlp output"),
            }
        }

        let status = child.wait().await?;
        let tail = stderr_tail.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::ExternalTool(format!(
                "yt-dlp exited with {}: {}",
                status,
                if tail.is_empty() { "no error output" } else { tail.as_str() }
            )));
        }

        let info = info.ok_or_else(|| {
            Error::ExternalTool("yt-dlp exited successfully but printed no info document".to_string())
        })?;

        // Already-downloaded files skip the progress reports entirely
        if !saw_finished {
            hooks
                .on_progress(ProgressUpdate::status_only(EngineStatus::Finished))
                .await?;
        }

        hooks.on_finished(info).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
