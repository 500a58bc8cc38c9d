//! Worker configuration and per-request path resolution.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::device::ComputeCapability;
use crate::error::{Result, WorkerError};
use crate::provider::{ProviderCommand, ProviderKind};
use crate::request::Request;
use crate::subtitle::subtitle_path;
use crate::text::chunker::DEFAULT_MAX_WORDS;

pub const DEFAULT_PREVIEW_CHARS: usize = 200;
pub const DEFAULT_MIN_CAPABILITY: ComputeCapability = ComputeCapability::new(6, 1);

/// Settled once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub models_root: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub commands: HashMap<ProviderKind, ProviderCommand>,
    pub max_words: usize,
    pub preview_chars: usize,
    pub min_capability: ComputeCapability,
}

impl WorkerConfig {
    /// Defaults laid out under `base`: `models/`, `output/`, `temp_chunks/`.
    pub fn with_base(base: &Path) -> Self {
        Self {
            models_root: base.join("models"),
            output_dir: base.join("output"),
            temp_dir: base.join("temp_chunks"),
            commands: HashMap::new(),
            max_words: DEFAULT_MAX_WORDS,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            min_capability: DEFAULT_MIN_CAPABILITY,
        }
    }

    pub fn model_dir(&self, kind: ProviderKind) -> PathBuf {
        self.models_root.join(kind.dir_name())
    }

    /// Creates the models root, one subdirectory per provider, and the
    /// scratch directory.
    pub fn prepare(&self) -> Result<()> {
        for kind in ProviderKind::ALL {
            let dir = self.model_dir(kind);
            if !dir.is_dir() {
                info!("Creating model directory {}", dir.display());
                fs::create_dir_all(&dir)?;
            }
        }
        fs::create_dir_all(&self.temp_dir)?;
        Ok(())
    }
}

/// Picks the models root: the explicit path, else the first existing of
/// `<exe>/models`, `<exe>/../models`, `<cwd>/models`. Falls back to
/// `<exe>/models` when none exists yet.
pub fn discover_models_root(explicit: Option<&Path>, exe_dir: &Path, cwd: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let candidates = [
        exe_dir.join("models"),
        exe_dir.join("..").join("models"),
        cwd.join("models"),
    ];
    for candidate in &candidates {
        if candidate.is_dir() {
            debug!("models root found at {}", candidate.display());
            return candidate.clone();
        }
    }
    let [fallback, ..] = candidates;
    fallback
}

/// Paths one request reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub model_dirs: BTreeMap<ProviderKind, PathBuf>,
    pub output_dir: PathBuf,
    pub output_file: PathBuf,
    pub subtitle_file: PathBuf,
}

impl ResolvedPaths {
    /// The request's output directory wins only if it already exists. The
    /// chosen directory is created if needed.
    pub fn resolve(config: &WorkerConfig, request: &Request) -> Result<Self> {
        let output_dir = match &request.output_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(dir) => {
                debug!(
                    "output directory {} does not exist; using {}",
                    dir.display(),
                    config.output_dir.display()
                );
                config.output_dir.clone()
            }
            None => config.output_dir.clone(),
        };
        fs::create_dir_all(&output_dir).map_err(|e| {
            WorkerError::config(format!(
                "cannot create output directory {}: {e}",
                output_dir.display()
            ))
        })?;

        let output_file = output_dir.join(request.wav_filename());
        let subtitle_file = subtitle_path(&output_file);
        let model_dirs = ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, config.model_dir(kind)))
            .collect();

        Ok(Self {
            model_dirs,
            output_dir,
            output_file,
            subtitle_file,
        })
    }

    pub fn model_dir(&self, kind: ProviderKind) -> &Path {
        self.model_dirs
            .get(&kind)
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(kind.dir_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> Request {
        Request::from_json(json).expect("valid request")
    }

    #[test]
    fn explicit_models_root_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let explicit = dir.path().join("elsewhere");
        assert_eq!(
            discover_models_root(Some(&explicit), dir.path(), dir.path()),
            explicit
        );
    }

    #[test]
    fn discovery_prefers_existing_candidates_in_order() {
        let root = tempfile::tempdir().expect("tempdir");
        let exe = root.path().join("app").join("bin");
        let cwd = root.path().join("work");
        fs::create_dir_all(&exe).expect("exe dir");
        fs::create_dir_all(cwd.join("models")).expect("cwd models");

        assert_eq!(discover_models_root(None, &exe, &cwd), cwd.join("models"));

        fs::create_dir_all(exe.join("..").join("models")).expect("parent models");
        assert_eq!(
            discover_models_root(None, &exe, &cwd),
            exe.join("..").join("models")
        );

        fs::create_dir_all(exe.join("models")).expect("exe models");
        assert_eq!(discover_models_root(None, &exe, &cwd), exe.join("models"));
    }

    #[test]
    fn discovery_falls_back_to_exe_models() {
        let root = tempfile::tempdir().expect("tempdir");
        let exe = root.path().join("bin");
        assert_eq!(
            discover_models_root(None, &exe, root.path()),
            exe.join("models")
        );
    }

    #[test]
    fn prepare_creates_provider_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = WorkerConfig::with_base(root.path());
        config.prepare().expect("prepare");
        for name in ["viet_tts", "xtts_v2", "whisper"] {
            assert!(root.path().join("models").join(name).is_dir(), "{name}");
        }
        assert!(config.temp_dir.is_dir());
    }

    #[test]
    fn resolves_default_output_paths() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = WorkerConfig::with_base(root.path());
        let paths = ResolvedPaths::resolve(
            &config,
            &request(r#"{"text":"a","speaker_wav":"r.wav","output_filename":"take1"}"#),
        )
        .expect("resolve");

        assert_eq!(paths.output_dir, root.path().join("output"));
        assert!(paths.output_dir.is_dir());
        assert_eq!(paths.output_file, root.path().join("output").join("take1.wav"));
        assert_eq!(paths.subtitle_file, root.path().join("output").join("take1.srt"));
        assert_eq!(
            paths.model_dir(ProviderKind::Xtts),
            root.path().join("models").join("xtts_v2")
        );
    }

    #[test]
    fn output_override_needs_an_existing_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = WorkerConfig::with_base(root.path());
        let custom = root.path().join("custom");

        let json = format!(
            r#"{{"text":"a","speaker_wav":"r.wav","custom_output_path":{:?}}}"#,
            custom.display().to_string()
        );
        let paths = ResolvedPaths::resolve(&config, &request(&json)).expect("resolve");
        assert_eq!(paths.output_dir, config.output_dir);

        fs::create_dir_all(&custom).expect("custom dir");
        let paths = ResolvedPaths::resolve(&config, &request(&json)).expect("resolve");
        assert_eq!(paths.output_file, custom.join("output.wav"));
    }
}
