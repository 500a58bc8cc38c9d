//! One request, start to finish.
//!
//! ```text
//! Idle -> ResolvingPaths -> SelectingDevice -> LoadingProviders
//!     -> WarmupOnly
//!      | Normalizing -> Chunking -> Synthesizing -> Assembling
//!            -> TranscribingOptional -> Done
//! ```
//!
//! Any stage may end in `Failed`. Failure is reported through the returned
//! [`Outcome`]; it never escapes as a panic or an early exit.

use std::io;
use std::path::PathBuf;

use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::cache::ResourceCache;
use crate::config::{ResolvedPaths, WorkerConfig};
use crate::device::{Device, DeviceSelector};
use crate::error::{Result, WorkerError};
use crate::orchestrator::SynthesisOrchestrator;
use crate::provider::ProviderKind;
use crate::report::Reporter;
use crate::request::{Request, primary_subtag};
use crate::subtitle::write_srt;
use crate::text::chunker::AbbreviationAwareTokenizer;
use crate::text::{SentenceChunker, TextNormalizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ResolvingPaths,
    SelectingDevice,
    LoadingProviders,
    WarmupOnly,
    Normalizing,
    Chunking,
    Synthesizing,
    Assembling,
    TranscribingOptional,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum Outcome {
    Completed(PathBuf),
    WarmedUp,
    Failed(WorkerError),
}

/// Everything that outlives a single request. Owned by the daemon loop.
pub struct Worker {
    pub config: WorkerConfig,
    pub devices: DeviceSelector,
    pub normalizer: TextNormalizer,
    pub chunker: SentenceChunker,
    pub cache: ResourceCache,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(config: WorkerConfig, devices: DeviceSelector, cache: ResourceCache) -> Self {
        let chunker = SentenceChunker::new(
            config.max_words,
            Some(Box::new(AbbreviationAwareTokenizer)),
        );
        Self {
            config,
            devices,
            normalizer: TextNormalizer::new(),
            chunker,
            cache,
        }
    }
}

/// Borrows the worker for exactly one request.
pub struct RequestProcessor<'a> {
    worker: &'a mut Worker,
    stage: Stage,
    history: Vec<Stage>,
}

impl<'a> RequestProcessor<'a> {
    pub fn new(worker: &'a mut Worker) -> Self {
        Self {
            worker,
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stages visited so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
        self.history.push(stage);
    }

    pub async fn run<W: AsyncWrite + Unpin + Send>(
        &mut self,
        request: &Request,
        reporter: &mut Reporter<W>,
    ) -> Outcome {
        match self.drive(request, reporter).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.enter(Stage::Failed);
                Outcome::Failed(e)
            }
        }
    }

    async fn drive<W: AsyncWrite + Unpin + Send>(
        &mut self,
        request: &Request,
        reporter: &mut Reporter<W>,
    ) -> Result<Outcome> {
        self.enter(Stage::ResolvingPaths);
        let paths = ResolvedPaths::resolve(&self.worker.config, request)?;
        if !request.warmup_only && !request.reference_audio.is_file() {
            return Err(WorkerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "reference audio not found: {}",
                    request.reference_audio.display()
                ),
            )));
        }

        self.enter(Stage::SelectingDevice);
        let resolution = self.worker.devices.resolve(request.device);
        if let Some(diagnostic) = &resolution.diagnostic {
            reporter.warning(diagnostic).await?;
        }
        let device = resolution.device;
        reporter.info(&format!("Using device: {device}")).await?;

        self.enter(Stage::LoadingProviders);
        for kind in providers_for(request) {
            if self.worker.cache.is_loaded(kind, device) {
                debug!("{} already loaded on {}", kind, device);
                continue;
            }
            reporter
                .info(&format!("Loading {kind} model on {device}..."))
                .await?;
            self.worker
                .cache
                .warm(kind, device, paths.model_dir(kind))
                .await?;
        }

        if request.warmup_only {
            self.enter(Stage::WarmupOnly);
            return Ok(Outcome::WarmedUp);
        }

        self.enter(Stage::Normalizing);
        let normalized = self
            .worker
            .normalizer
            .normalize(&request.text, &request.language);
        if normalized.trim().is_empty() {
            return Err(WorkerError::config("text is empty after normalization"));
        }

        self.enter(Stage::Chunking);
        let chunks = self.worker.chunker.split(&normalized, &request.language);
        debug!("{} chunks", chunks.len());
        reporter.preview(&normalized).await?;

        self.enter(Stage::Synthesizing);
        let result = SynthesisOrchestrator::new(
            &mut self.worker.cache,
            &paths,
            &self.worker.config.temp_dir,
            device,
        )
        .synthesize(request, &chunks, reporter)
        .await?;

        self.enter(Stage::Assembling);
        let output = result.assemble(&paths.output_file)?;

        if request.export_subtitles {
            self.enter(Stage::TranscribingOptional);
            self.export_subtitles(request, &paths, device, reporter).await?;
        }

        self.enter(Stage::Done);
        info!("Request done: {}", output.display());
        Ok(Outcome::Completed(output))
    }

    async fn export_subtitles<W: AsyncWrite + Unpin + Send>(
        &mut self,
        request: &Request,
        paths: &ResolvedPaths,
        device: Device,
        reporter: &mut Reporter<W>,
    ) -> Result<()> {
        reporter.info("Generating subtitles...").await?;
        let language = primary_subtag(&request.language);
        let transcriber = self
            .worker
            .cache
            .transcriber(device, paths.model_dir(ProviderKind::Whisper))
            .await?;
        let segments = transcriber
            .transcribe(&paths.output_file, Some(&language))
            .await?;
        write_srt(&paths.subtitle_file, &segments)?;
        reporter
            .info(&format!("Subtitles saved to {}", paths.subtitle_file.display()))
            .await
    }
}

/// Providers a request needs up front: its synthesizer, plus speech
/// recognition when subtitles or a reference transcript must be produced.
fn providers_for(request: &Request) -> Vec<ProviderKind> {
    if request.preload_all_providers {
        return ProviderKind::ALL.to_vec();
    }
    let kind = ProviderKind::for_language(&request.language);
    let mut kinds = vec![kind];
    if request.warmup_only {
        return kinds;
    }
    let needs_transcript = kind.requires_reference_text()
        && request
            .reference_text
            .as_deref()
            .is_none_or(|t| t.trim().is_empty());
    if request.export_subtitles || needs_transcript {
        kinds.push(ProviderKind::Whisper);
    }
    kinds
}
