use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One recognised span of speech, in seconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Renders segments as SRT. Empty segments keep their index.
pub fn render_srt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(segment.start),
            format_srt_time(segment.end),
            segment.text.trim()
        ));
    }
    out
}

pub fn write_srt(path: &Path, segments: &[TranscriptSegment]) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    f.write_all(render_srt(segments).as_bytes())?;
    f.flush()?;
    Ok(())
}

/// `HH:MM:SS,mmm`, truncated to the millisecond.
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).floor() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Sibling subtitle file: `out/take1.wav` -> `out/take1.srt`.
pub fn subtitle_path(audio: &Path) -> PathBuf {
    audio.with_extension("srt")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn timestamps_truncate_to_milliseconds() {
        assert_eq!(format_srt_time(3725.678), "01:02:05,678");
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(1.9999), "00:00:01,999");
        assert_eq!(format_srt_time(59.5), "00:00:59,500");
        assert_eq!(format_srt_time(-2.0), "00:00:00,000");
    }

    #[test]
    fn renders_records_in_order() {
        let srt = render_srt(&[
            segment(0.0, 1.5, "  Xin chào. "),
            segment(1.5, 3.25, "Tạm biệt."),
        ]);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nXin chào.\n\n\
             2\n00:00:01,500 --> 00:00:03,250\nTạm biệt.\n\n"
        );
    }

    #[test]
    fn empty_segments_are_still_indexed() {
        let srt = render_srt(&[
            segment(0.0, 1.0, "a"),
            segment(1.0, 2.0, "   "),
            segment(2.0, 3.0, "b"),
        ]);
        assert!(srt.contains("2\n00:00:01,000 --> 00:00:02,000\n\n\n"));
        assert!(srt.contains("3\n00:00:02,000 --> 00:00:03,000\nb\n\n"));
        assert_eq!(render_srt(&[]), "");
    }

    #[test]
    fn writes_sibling_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = dir.path().join("take1.wav");
        let srt = subtitle_path(&audio);
        assert_eq!(srt, dir.path().join("take1.srt"));

        write_srt(&srt, &[segment(0.0, 0.5, "hi")]).expect("write");
        let written = std::fs::read_to_string(&srt).expect("read");
        assert_eq!(written, "1\n00:00:00,000 --> 00:00:00,500\nhi\n\n");
    }
}
