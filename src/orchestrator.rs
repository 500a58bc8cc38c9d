//! Drives one request's synthesis: provider choice, the reference
//! transcript, one provider call per chunk.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWrite;
use tracing::debug;

use crate::audio;
use crate::cache::ResourceCache;
use crate::config::ResolvedPaths;
use crate::device::Device;
use crate::error::{Result, WorkerError};
use crate::provider::{ProviderKind, SynthesisJob};
use crate::report::Reporter;
use crate::request::{Request, primary_subtag};
use crate::text::Chunk;

const PROGRESS_CHARS: usize = 30;

/// Audio produced for one request, waiting to be assembled.
#[derive(Debug)]
pub enum SynthesisResult {
    /// Single call written straight to the output file.
    Direct(PathBuf),
    /// One temporary clip per chunk, tagged with its paragraph.
    Chunked {
        clips: Vec<(usize, PathBuf)>,
        sentence_pause_ms: u64,
        paragraph_pause_ms: u64,
    },
}

impl SynthesisResult {
    /// Produces the final file. Chunk clips are consumed in the process.
    pub fn assemble(self, output: &Path) -> Result<PathBuf> {
        match self {
            Self::Direct(path) => Ok(path),
            Self::Chunked {
                clips,
                sentence_pause_ms,
                paragraph_pause_ms,
            } => audio::assemble(&clips, output, sentence_pause_ms, paragraph_pause_ms),
        }
    }
}

pub struct SynthesisOrchestrator<'a> {
    cache: &'a mut ResourceCache,
    paths: &'a ResolvedPaths,
    temp_dir: &'a Path,
    device: Device,
}

impl<'a> SynthesisOrchestrator<'a> {
    pub fn new(
        cache: &'a mut ResourceCache,
        paths: &'a ResolvedPaths,
        temp_dir: &'a Path,
        device: Device,
    ) -> Self {
        Self {
            cache,
            paths,
            temp_dir,
            device,
        }
    }

    /// Transcript of the reference voice, if the provider needs one. A
    /// supplied transcript is used as is; otherwise it is transcribed once.
    pub async fn reference_text<W: AsyncWrite + Unpin + Send>(
        &mut self,
        kind: ProviderKind,
        request: &Request,
        reporter: &mut Reporter<W>,
    ) -> Result<Option<String>> {
        if !kind.requires_reference_text() {
            return Ok(None);
        }
        if let Some(text) = request.reference_text.as_deref().map(str::trim) {
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }

        reporter.info("Transcribing reference audio...").await?;
        let language = primary_subtag(&request.language);
        let transcriber = self
            .cache
            .transcriber(self.device, self.paths.model_dir(ProviderKind::Whisper))
            .await?;
        let segments = transcriber
            .transcribe(&request.reference_audio, Some(&language))
            .await?;

        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            return Err(WorkerError::Derivation(format!(
                "reference transcript derived from {} is empty",
                request.reference_audio.display()
            )));
        }
        debug!("derived reference transcript: {}", text);
        Ok(Some(text))
    }

    /// Synthesizes every chunk in order.
    pub async fn synthesize<W: AsyncWrite + Unpin + Send>(
        &mut self,
        request: &Request,
        chunks: &[Chunk],
        reporter: &mut Reporter<W>,
    ) -> Result<SynthesisResult> {
        let kind = ProviderKind::for_language(&request.language);
        let reference_text = self.reference_text(kind, request, reporter).await?;

        if let [chunk] = chunks {
            if !request.wants_pauses() {
                reporter
                    .info(&format!(
                        "Synthesizing voice directly to {}...",
                        self.paths.output_file.display()
                    ))
                    .await?;
                let output = self.paths.output_file.clone();
                self.synthesize_one(
                    kind,
                    request,
                    reference_text.as_deref(),
                    &chunk.text,
                    &output,
                )
                .await?;
                return Ok(SynthesisResult::Direct(output));
            }
        }

        reporter.info("Synthesizing voice with custom pauses...").await?;
        let mut clips = Vec::with_capacity(chunks.len());
        let synthesized = self
            .synthesize_chunks(
                kind,
                request,
                reference_text.as_deref(),
                chunks,
                &mut clips,
                reporter,
            )
            .await;
        if let Err(e) = synthesized {
            for (_, clip) in &clips {
                if let Err(e) = fs::remove_file(clip) {
                    debug!("could not remove chunk {}: {}", clip.display(), e);
                }
            }
            return Err(e);
        }

        Ok(SynthesisResult::Chunked {
            clips,
            sentence_pause_ms: request.pause_sentence_ms,
            paragraph_pause_ms: request.pause_paragraph_ms,
        })
    }

    async fn synthesize_chunks<W: AsyncWrite + Unpin + Send>(
        &mut self,
        kind: ProviderKind,
        request: &Request,
        reference_text: Option<&str>,
        chunks: &[Chunk],
        clips: &mut Vec<(usize, PathBuf)>,
        reporter: &mut Reporter<W>,
    ) -> Result<()> {
        let stem = self
            .paths
            .output_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        for (i, chunk) in chunks.iter().enumerate() {
            let head: String = chunk.text.chars().take(PROGRESS_CHARS).collect();
            reporter.info(&format!("Processing: {head}...")).await?;

            let clip = self.temp_dir.join(format!("{stem}_chunk_{i:04}.wav"));
            self.synthesize_one(kind, request, reference_text, &chunk.text, &clip)
                .await?;
            clips.push((chunk.paragraph, clip));
        }
        Ok(())
    }

    async fn synthesize_one(
        &mut self,
        kind: ProviderKind,
        request: &Request,
        reference_text: Option<&str>,
        text: &str,
        output: &Path,
    ) -> Result<()> {
        let job = SynthesisJob {
            text,
            language: request.language.trim(),
            reference_audio: &request.reference_audio,
            reference_text,
            output,
            params: kind.clamp_params(&request.params),
        };
        let synthesizer = self
            .cache
            .synthesizer(kind, self.device, self.paths.model_dir(kind))
            .await?;
        synthesizer.synthesize(&job).await
    }
}
