//! Speech providers.
//!
//! Synthesis and transcription are opaque capabilities. The worker talks to
//! them through the `Synthesizer` / `Transcriber` traits; the shipped binding
//! runs each provider as a resident child process speaking JSON lines on its
//! stdin/stdout, so the model stays loaded between requests.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{Result, WorkerError};
use crate::request::{SynthesisParams, primary_subtag};
use crate::subtitle::TranscriptSegment;

/// Languages routed to the dedicated Vietnamese voice model.
const DEDICATED_LANGUAGES: &[&str] = &["vi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    /// Dedicated Vietnamese synthesis; needs a reference transcript.
    VietTts,
    /// General multilingual synthesis.
    Xtts,
    /// Speech recognition.
    Whisper,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::VietTts, Self::Xtts, Self::Whisper];

    /// Directory name under the models root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::VietTts => "viet_tts",
            Self::Xtts => "xtts_v2",
            Self::Whisper => "whisper",
        }
    }

    /// Synthesis provider for a target language.
    pub fn for_language(language: &str) -> Self {
        if DEDICATED_LANGUAGES.contains(&primary_subtag(language).as_str()) {
            Self::VietTts
        } else {
            Self::Xtts
        }
    }

    pub fn requires_reference_text(&self) -> bool {
        matches!(self, Self::VietTts)
    }

    pub fn is_synthesizer(&self) -> bool {
        !matches!(self, Self::Whisper)
    }

    fn default_temperature(&self) -> f32 {
        match self {
            Self::VietTts => 0.667,
            _ => 0.75,
        }
    }

    /// Applies defaults and clamps every knob into the provider's safe range.
    pub fn clamp_params(&self, params: &SynthesisParams) -> ClampedParams {
        ClampedParams {
            speed: params.speed.unwrap_or(1.0).clamp(0.5, 2.0),
            temperature: params
                .temperature
                .unwrap_or(self.default_temperature())
                .clamp(0.1, 1.0),
            top_k: params.top_k.unwrap_or(50).clamp(1, 100),
            top_p: params.top_p.unwrap_or(0.85).clamp(0.05, 1.0),
            repetition_penalty: params.repetition_penalty.unwrap_or(5.0).clamp(1.0, 10.0),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClampedParams {
    pub speed: f32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

/// One synthesis call: a chunk of text rendered into `output`.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisJob<'a> {
    pub text: &'a str,
    pub language: &'a str,
    pub reference_audio: &'a Path,
    pub reference_text: Option<&'a str>,
    pub output: &'a Path,
    #[serde(flatten)]
    pub params: ClampedParams,
}

#[async_trait]
pub trait Synthesizer: Send {
    async fn synthesize(&mut self, job: &SynthesisJob<'_>) -> Result<()>;
}

#[async_trait]
pub trait Transcriber: Send {
    async fn transcribe(
        &mut self,
        audio: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Builds provider handles. Construction is expected to be slow.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn synthesizer(
        &self,
        kind: ProviderKind,
        device: Device,
        model_dir: &Path,
    ) -> Result<Box<dyn Synthesizer>>;

    async fn transcriber(&self, device: Device, model_dir: &Path) -> Result<Box<dyn Transcriber>>;
}

/// Program plus leading arguments, e.g. `python3 xtts_worker.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProviderCommand {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
        })
    }
}

/// Spawns resident provider processes from configured commands.
#[derive(Debug, Clone, Default)]
pub struct CommandProviderFactory {
    commands: HashMap<ProviderKind, ProviderCommand>,
}

impl CommandProviderFactory {
    pub fn new(commands: HashMap<ProviderKind, ProviderCommand>) -> Self {
        Self { commands }
    }

    async fn spawn(
        &self,
        kind: ProviderKind,
        device: Device,
        model_dir: &Path,
    ) -> Result<ResidentProvider> {
        let command = self.commands.get(&kind).ok_or_else(|| {
            WorkerError::provider_init(kind, "no command configured for this provider")
        })?;
        ResidentProvider::spawn(kind, command, device, model_dir).await
    }
}

#[async_trait]
impl ProviderFactory for CommandProviderFactory {
    async fn synthesizer(
        &self,
        kind: ProviderKind,
        device: Device,
        model_dir: &Path,
    ) -> Result<Box<dyn Synthesizer>> {
        Ok(Box::new(self.spawn(kind, device, model_dir).await?))
    }

    async fn transcriber(&self, device: Device, model_dir: &Path) -> Result<Box<dyn Transcriber>> {
        Ok(Box::new(
            self.spawn(ProviderKind::Whisper, device, model_dir).await?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Call<'a> {
    Synthesize(&'a SynthesisJob<'a>),
    Transcribe {
        audio: &'a Path,
        language: Option<&'a str>,
    },
}

/// A provider child process. Dropping the handle kills the process, which
/// releases whatever device it held.
#[derive(Debug)]
pub struct ResidentProvider {
    kind: ProviderKind,
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ResidentProvider {
    pub async fn spawn(
        kind: ProviderKind,
        command: &ProviderCommand,
        device: Device,
        model_dir: &Path,
    ) -> Result<Self> {
        info!(
            "Starting {} provider on {}: {}",
            kind,
            device,
            command.program.display()
        );
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg("--model-dir")
            .arg(model_dir)
            .arg("--device")
            .arg(device.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::provider_init(kind, format!("failed to spawn: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::provider_init(kind, "stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::provider_init(kind, "stdout not captured"))?;

        let mut provider = Self {
            kind,
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let reply: Reply = provider
            .read_reply()
            .await
            .map_err(|e| WorkerError::provider_init(kind, e.to_string()))?;
        match reply.ready {
            Some(true) => {
                debug!("{} provider ready", kind);
                Ok(provider)
            }
            _ => Err(WorkerError::provider_init(
                kind,
                reply
                    .error
                    .unwrap_or_else(|| "provider did not report ready".to_string()),
            )),
        }
    }

    async fn call(&mut self, call: &Call<'_>) -> Result<Reply> {
        let mut line = serde_json::to_string(call)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply: Reply = self.read_reply().await?;
        if reply.ok == Some(true) {
            Ok(reply)
        } else {
            Err(WorkerError::provider(
                self.kind,
                reply
                    .error
                    .unwrap_or_else(|| "call failed without a message".to_string()),
            ))
        }
    }

    /// Reads the next JSON line; other output is passed to the log.
    async fn read_reply<T: DeserializeOwned>(&mut self) -> Result<T> {
        while let Some(line) = self.stdout.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(reply) => return Ok(reply),
                Err(_) => debug!("[{}] {}", self.kind, line),
            }
        }
        Err(WorkerError::provider(self.kind, "process exited unexpectedly"))
    }
}

#[async_trait]
impl Synthesizer for ResidentProvider {
    async fn synthesize(&mut self, job: &SynthesisJob<'_>) -> Result<()> {
        self.call(&Call::Synthesize(job)).await?;
        if !job.output.exists() {
            return Err(WorkerError::provider(
                self.kind,
                format!("reported success but wrote no file at {}", job.output.display()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transcriber for ResidentProvider {
    async fn transcribe(
        &mut self,
        audio: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        let reply = self.call(&Call::Transcribe { audio, language }).await?;
        Ok(reply.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_languages() {
        assert_eq!(ProviderKind::for_language("vi"), ProviderKind::VietTts);
        assert_eq!(ProviderKind::for_language("VI-vn"), ProviderKind::VietTts);
        assert_eq!(ProviderKind::for_language("en"), ProviderKind::Xtts);
        assert_eq!(ProviderKind::for_language("zh-cn"), ProviderKind::Xtts);
        assert!(ProviderKind::VietTts.requires_reference_text());
        assert!(!ProviderKind::Xtts.requires_reference_text());
    }

    #[test]
    fn clamps_and_defaults_parameters() {
        let params = SynthesisParams {
            speed: Some(5.0),
            temperature: Some(0.01),
            top_k: Some(0),
            top_p: None,
            repetition_penalty: Some(50.0),
        };
        let clamped = ProviderKind::Xtts.clamp_params(&params);
        assert_eq!(clamped.speed, 2.0);
        assert_eq!(clamped.temperature, 0.1);
        assert_eq!(clamped.top_k, 1);
        assert_eq!(clamped.top_p, 0.85);
        assert_eq!(clamped.repetition_penalty, 10.0);

        let defaults = SynthesisParams::default();
        assert_eq!(ProviderKind::VietTts.clamp_params(&defaults).temperature, 0.667);
        assert_eq!(ProviderKind::Xtts.clamp_params(&defaults).temperature, 0.75);
    }

    #[test]
    fn parses_provider_commands() {
        let command = ProviderCommand::parse("python3 workers/xtts.py --fp16").expect("command");
        assert_eq!(command.program, PathBuf::from("python3"));
        assert_eq!(command.args, ["workers/xtts.py", "--fp16"]);
        assert!(ProviderCommand::parse("   ").is_none());
    }

    #[test]
    fn synthesis_call_wire_format() {
        let job = SynthesisJob {
            text: "xin chào",
            language: "vi",
            reference_audio: Path::new("ref.wav"),
            reference_text: Some("mẫu"),
            output: Path::new("out.wav"),
            params: ProviderKind::VietTts.clamp_params(&SynthesisParams::default()),
        };
        let value = serde_json::to_value(Call::Synthesize(&job)).expect("serializable");
        assert_eq!(value["op"], "synthesize");
        assert_eq!(value["text"], "xin chào");
        assert_eq!(value["reference_text"], "mẫu");
        assert_eq!(value["top_k"], 50);

        let value = serde_json::to_value(Call::Transcribe {
            audio: Path::new("a.wav"),
            language: None,
        })
        .expect("serializable");
        assert_eq!(value["op"], "transcribe");
        assert!(value["language"].is_null());
    }

    #[tokio::test]
    async fn missing_command_is_an_init_error() {
        let factory = CommandProviderFactory::default();
        let err = factory
            .synthesizer(ProviderKind::Xtts, Device::Cpu, Path::new("/tmp"))
            .await
            .err()
            .expect("no command configured");
        assert!(matches!(err, WorkerError::ProviderInit { kind: ProviderKind::Xtts, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn talks_to_a_resident_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("provider.sh");
        std::fs::write(
            &script,
            "echo 'loading weights'\n\
             echo '{\"ready\":true}'\n\
             while read line; do\n\
               echo '{\"ok\":true,\"segments\":[{\"start\":0.0,\"end\":1.5,\"text\":\" hi \"}]}'\n\
             done\n",
        )
        .expect("write script");
        let command = ProviderCommand {
            program: PathBuf::from("sh"),
            args: vec![script.display().to_string()],
        };

        let mut provider =
            ResidentProvider::spawn(ProviderKind::Whisper, &command, Device::Cpu, dir.path())
                .await
                .expect("provider starts");
        let segments = provider
            .transcribe(Path::new("a.wav"), Some("vi"))
            .await
            .expect("transcribes");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, " hi ");
        assert_eq!(segments[0].end, 1.5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provider_that_never_gets_ready_fails_init() {
        let dir = tempfile::tempdir().expect("tempdir");
        let command = ProviderCommand {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo '{\"ready\":false,\"error\":\"no weights\"}'".into()],
        };
        let err = ResidentProvider::spawn(ProviderKind::Xtts, &command, Device::Cpu, dir.path())
            .await
            .err()
            .expect("init fails");
        assert!(err.to_string().contains("no weights"), "{err}");
    }
}
