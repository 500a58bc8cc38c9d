use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{DEFAULT_PREVIEW_CHARS, WorkerConfig, discover_models_root};
use crate::device::ComputeCapability;
use crate::provider::{ProviderCommand, ProviderKind};
use crate::text::chunker::DEFAULT_MAX_WORDS;

/// Resident voice-cloning speech worker.
#[derive(Parser, Debug)]
#[clap(name = "voice-engine", version)]
pub struct Args {
    /// Serve JSON requests from stdin until shutdown
    #[clap(long, env = "VOICE_ENGINE_DAEMON")]
    pub daemon: bool,

    /// Single JSON request to run once
    #[clap(
        long,
        env = "VOICE_ENGINE_PARAMS",
        conflicts_with = "daemon",
        required_unless_present = "daemon"
    )]
    pub params: Option<String>,

    #[clap(long, env = "VOICE_ENGINE_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    #[clap(long, env = "VOICE_ENGINE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[clap(long, env = "VOICE_ENGINE_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Vietnamese synthesis provider command
    #[clap(long, env = "VOICE_ENGINE_VIET_TTS_CMD")]
    pub viet_tts_cmd: Option<String>,

    /// Multilingual synthesis provider command
    #[clap(long, env = "VOICE_ENGINE_XTTS_CMD")]
    pub xtts_cmd: Option<String>,

    /// Speech recognition provider command
    #[clap(long, env = "VOICE_ENGINE_WHISPER_CMD")]
    pub whisper_cmd: Option<String>,

    #[clap(long, env = "VOICE_ENGINE_MAX_WORDS", default_value_t = DEFAULT_MAX_WORDS)]
    pub max_words: usize,

    #[clap(long, env = "VOICE_ENGINE_PREVIEW_CHARS", default_value_t = DEFAULT_PREVIEW_CHARS)]
    pub preview_chars: usize,

    #[clap(long, env = "VOICE_ENGINE_MIN_COMPUTE_CAPABILITY", default_value = "6.1")]
    pub min_compute_capability: ComputeCapability,
}

impl Args {
    /// Builds the worker configuration. Unset directories sit next to the
    /// models root.
    pub fn config(&self, exe_dir: &Path, cwd: &Path) -> WorkerConfig {
        let models_root = discover_models_root(self.models_dir.as_deref(), exe_dir, cwd);
        let base = models_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| exe_dir.to_path_buf());
        let defaults = WorkerConfig::with_base(&base);

        let commands: HashMap<_, _> = [
            (ProviderKind::VietTts, &self.viet_tts_cmd),
            (ProviderKind::Xtts, &self.xtts_cmd),
            (ProviderKind::Whisper, &self.whisper_cmd),
        ]
        .into_iter()
        .filter_map(|(kind, raw)| Some((kind, ProviderCommand::parse(raw.as_deref()?)?)))
        .collect();

        WorkerConfig {
            models_root,
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            temp_dir: self.temp_dir.clone().unwrap_or(defaults.temp_dir),
            commands,
            max_words: self.max_words,
            preview_chars: self.preview_chars,
            min_capability: self.min_compute_capability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_flags_build_a_config() {
        let args = Args::try_parse_from([
            "voice-engine",
            "--daemon",
            "--models-dir",
            "/srv/voice/models",
            "--xtts-cmd",
            "python3 xtts_worker.py",
            "--max-words",
            "12",
        ])
        .expect("valid args");
        let config = args.config(Path::new("/opt/bin"), Path::new("/tmp"));

        assert_eq!(config.models_root, PathBuf::from("/srv/voice/models"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/voice/output"));
        assert_eq!(config.temp_dir, PathBuf::from("/srv/voice/temp_chunks"));
        assert_eq!(config.max_words, 12);
        assert_eq!(config.preview_chars, 200);
        assert_eq!(config.min_capability, ComputeCapability::new(6, 1));
        assert_eq!(
            config.commands.get(&ProviderKind::Xtts),
            Some(&ProviderCommand {
                program: PathBuf::from("python3"),
                args: vec!["xtts_worker.py".to_string()],
            })
        );
        assert!(!config.commands.contains_key(&ProviderKind::Whisper));
    }

    #[test]
    fn one_shot_needs_params() {
        assert!(Args::try_parse_from(["voice-engine"]).is_err());
        assert!(Args::try_parse_from(["voice-engine", "--daemon", "--params", "{}"]).is_err());

        let args = Args::try_parse_from([
            "voice-engine",
            "--params",
            r#"{"text":"hi"}"#,
            "--min-compute-capability",
            "7.5",
        ])
        .expect("valid args");
        assert_eq!(args.params.as_deref(), Some(r#"{"text":"hi"}"#));
        assert_eq!(args.min_compute_capability, ComputeCapability::new(7, 5));
    }
}
