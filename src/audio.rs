use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

use crate::error::{Result, WorkerError};

pub fn wav_duration_seconds(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Every chunk must share the first chunk's sample format.
pub struct AudioAssembler {
    out_path: PathBuf,
    sentence_pause_ms: u64,
    paragraph_pause_ms: u64,
    writer: Option<(WavSpec, WavWriter<BufWriter<File>>)>,
    last_paragraph: Option<usize>,
    clips: usize,
}

impl std::fmt::Debug for AudioAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAssembler")
            .field("out_path", &self.out_path)
            .field("sentence_pause_ms", &self.sentence_pause_ms)
            .field("paragraph_pause_ms", &self.paragraph_pause_ms)
            .field("clips", &self.clips)
            .finish()
    }
}

impl AudioAssembler {
    pub fn new(out_path: &Path, sentence_pause_ms: u64, paragraph_pause_ms: u64) -> Self {
        Self {
            out_path: out_path.to_path_buf(),
            sentence_pause_ms,
            paragraph_pause_ms,
            writer: None,
            last_paragraph: None,
            clips: 0,
        }
    }

    /// Appends one chunk's audio, preceded by the pause its position calls
    /// for. The chunk file is deleted once folded in.
    pub fn push(&mut self, paragraph: usize, clip: &Path) -> Result<()> {
        let mut reader = WavReader::open(clip)?;
        let spec = reader.spec();

        let pause_ms = match self.last_paragraph {
            None => 0,
            Some(last) if last == paragraph => self.sentence_pause_ms,
            Some(_) => self.paragraph_pause_ms,
        };

        let (expected, writer) = match &mut self.writer {
            Some(open) => open,
            slot @ None => {
                let writer = WavWriter::create(&self.out_path, spec)?;
                slot.insert((spec, writer))
            }
        };
        if spec != *expected {
            return Err(WorkerError::Audio(format!(
                "{} does not match the output format ({} Hz, {} ch, {} bit vs {} Hz, {} ch, {} bit)",
                clip.display(),
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample,
                expected.sample_rate,
                expected.channels,
                expected.bits_per_sample
            )));
        }

        write_silence(writer, &spec, pause_ms)?;
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample?)?;
                }
            }
        }
        drop(reader);

        self.last_paragraph = Some(paragraph);
        self.clips += 1;
        if let Err(e) = fs::remove_file(clip) {
            debug!("could not remove chunk {}: {}", clip.display(), e);
        }
        Ok(())
    }

    /// Finalises the WAV header and returns the output path.
    pub fn finish(self) -> Result<PathBuf> {
        let Some((_, writer)) = self.writer else {
            return Err(WorkerError::Audio("no audio chunks to assemble".into()));
        };
        writer.finalize()?;
        debug!("assembled {} chunks into {}", self.clips, self.out_path.display());
        Ok(self.out_path)
    }
}

/// Concatenates `(paragraph, clip)` pairs in order into `out_path`.
pub fn assemble(
    clips: &[(usize, PathBuf)],
    out_path: &Path,
    sentence_pause_ms: u64,
    paragraph_pause_ms: u64,
) -> Result<PathBuf> {
    let mut assembler = AudioAssembler::new(out_path, sentence_pause_ms, paragraph_pause_ms);
    for (paragraph, clip) in clips {
        assembler.push(*paragraph, clip)?;
    }
    assembler.finish()
}

fn write_silence(
    writer: &mut WavWriter<BufWriter<File>>,
    spec: &WavSpec,
    pause_ms: u64,
) -> Result<()> {
    let samples = u64::from(spec.sample_rate)
        .checked_mul(pause_ms)
        .map(|n| n / 1000)
        .and_then(|frames| frames.checked_mul(u64::from(spec.channels)))
        .ok_or_else(|| WorkerError::Audio(format!("pause of {pause_ms} ms is too long")))?;
    for _ in 0..samples {
        match spec.sample_format {
            SampleFormat::Int => writer.write_sample(0i32)?,
            SampleFormat::Float => writer.write_sample(0.0f32)?,
        }
    }
    Ok(())
}
