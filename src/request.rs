use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorkerError};

pub const DEFAULT_OUTPUT_FILENAME: &str = "output.wav";
pub const DEFAULT_SENTENCE_PAUSE_MS: u64 = 300;
pub const DEFAULT_PARAGRAPH_PAUSE_MS: u64 = 800;
pub const MAX_PAUSE_MS: u64 = 10_000;

/// Lowercased primary language subtag: "vi-VN" -> "vi", "zh-cn" -> "zh".
pub fn primary_subtag(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "cuda")]
    Gpu,
}

/// Provider-facing knobs. Unset values fall back to provider defaults and
/// every value is clamped before the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
}

/// One synthesis request, as read from the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, alias = "speaker_wav")]
    pub reference_audio: PathBuf,
    #[serde(default, alias = "ref_text")]
    pub reference_text: Option<String>,
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
    #[serde(default, alias = "custom_output_path")]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub device: DevicePreference,
    #[serde(flatten)]
    pub params: SynthesisParams,
    #[serde(default = "default_sentence_pause")]
    pub pause_sentence_ms: u64,
    #[serde(default = "default_paragraph_pause")]
    pub pause_paragraph_ms: u64,
    #[serde(default, alias = "export_srt")]
    pub export_subtitles: bool,
    #[serde(default)]
    pub warmup_only: bool,
    #[serde(default, alias = "preload")]
    pub preload_all_providers: bool,
}

fn default_language() -> String {
    "vi".to_string()
}

fn default_output_filename() -> String {
    DEFAULT_OUTPUT_FILENAME.to_string()
}

fn default_sentence_pause() -> u64 {
    DEFAULT_SENTENCE_PAUSE_MS
}

fn default_paragraph_pause() -> u64 {
    DEFAULT_PARAGRAPH_PAUSE_MS
}

impl Request {
    /// Parses and validates a serialized request.
    pub fn from_json(raw: &str) -> Result<Self> {
        let request: Request = serde_json::from_str(raw)
            .map_err(|e| WorkerError::config(format!("invalid request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.warmup_only && self.text.trim().is_empty() {
            return Err(WorkerError::config("`text` is required"));
        }
        if !self.warmup_only && self.reference_audio.as_os_str().is_empty() {
            return Err(WorkerError::config("`reference_audio` is required"));
        }
        for (name, value) in [
            ("pause_sentence_ms", self.pause_sentence_ms),
            ("pause_paragraph_ms", self.pause_paragraph_ms),
        ] {
            if value > MAX_PAUSE_MS {
                return Err(WorkerError::config(format!(
                    "{name} must be at most {MAX_PAUSE_MS}, got {value}"
                )));
            }
        }
        if self.output_filename.contains(['/', '\\']) {
            return Err(WorkerError::config(format!(
                "output filename must not contain a path: {}",
                self.output_filename
            )));
        }
        Ok(())
    }

    /// Output file name with a `.wav` extension.
    pub fn wav_filename(&self) -> String {
        let name = self.output_filename.trim();
        let name = if name.is_empty() { DEFAULT_OUTPUT_FILENAME } else { name };
        if name.to_ascii_lowercase().ends_with(".wav") {
            name.to_string()
        } else {
            format!("{name}.wav")
        }
    }

    pub fn wants_pauses(&self) -> bool {
        self.pause_sentence_ms > 0 || self.pause_paragraph_ms > 0
    }
}

/// A parsed control line.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Synthesize(Box<Request>),
    Shutdown,
}

impl Directive {
    /// Accepts `{"action": "...", "params": {...}}` or a bare request object.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| WorkerError::Protocol(format!("not valid JSON: {e}")))?;
        let Value::Object(mut object) = value else {
            return Err(WorkerError::Protocol("expected a JSON object".into()));
        };

        let action = match object.remove("action") {
            None | Some(Value::Null) => "synthesize".to_string(),
            Some(Value::String(action)) => action.to_ascii_lowercase(),
            Some(other) => {
                return Err(WorkerError::Protocol(format!("invalid action: {other}")));
            }
        };

        match action.as_str() {
            "shutdown" => Ok(Self::Shutdown),
            "synthesize" => {
                let params = object.remove("params").unwrap_or(Value::Object(object));
                let request: Request = serde_json::from_value(params)
                    .map_err(|e| WorkerError::config(format!("invalid request: {e}")))?;
                request.validate()?;
                Ok(Self::Synthesize(Box::new(request)))
            }
            other => Err(WorkerError::Protocol(format!("unknown action: {other}"))),
        }
    }
}
