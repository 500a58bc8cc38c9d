use std::path::Path;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::error::Result;

const TRUNCATION_MARKER: &str = "...";

pub struct Reporter<W> {
    out: W,
    preview_chars: usize,
}

impl<W: AsyncWrite + Unpin + Send> Reporter<W> {
    pub fn new(out: W, preview_chars: usize) -> Self {
        Self { out, preview_chars }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    async fn line(&mut self, line: &str) -> Result<()> {
        self.out.write_all(single_line(line).as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    pub async fn info(&mut self, message: &str) -> Result<()> {
        info!("{}", message);
        self.line(&format!("INFO: {message}")).await
    }

    pub async fn warning(&mut self, message: &str) -> Result<()> {
        warn!("{}", message);
        self.line(&format!("WARNING: {message}")).await
    }

    pub async fn preview(&mut self, text: &str) -> Result<()> {
        let preview = preview(text, self.preview_chars);
        self.line(&format!("TEXT_BEFORE_TTS|{preview}")).await
    }

    pub async fn success(&mut self, output: &Path) -> Result<()> {
        info!("Request finished: {}", output.display());
        self.line(&format!("SUCCESS|{}", output.display())).await
    }

    pub async fn success_warmup(&mut self) -> Result<()> {
        info!("Warmup finished");
        self.line("SUCCESS|WARMUP").await
    }

    pub async fn success_shutdown(&mut self) -> Result<()> {
        info!("Shutting down");
        self.line("SUCCESS|SHUTDOWN").await
    }

    pub async fn error(&mut self, message: &str) -> Result<()> {
        error!("{}", message);
        self.line(&format!("ERROR|{message}")).await
    }
}

/// First `budget` characters of `text`, with a marker when cut.
pub fn preview(text: &str, budget: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(budget).collect();
    if chars.next().is_some() {
        format!("{head}{TRUNCATION_MARKER}")
    } else {
        head
    }
}

fn single_line(line: &str) -> String {
    line.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_by_characters() {
        assert_eq!(preview("Xin chào", 10), "Xin chào");
        assert_eq!(preview("Tiếng Việt có dấu", 5), "Tiếng...");
        assert_eq!(preview("", 5), "");
        assert_eq!(preview("exactly10!", 10), "exactly10!");
    }

    #[tokio::test]
    async fn protocol_lines() {
        let mut r = Reporter::new(Vec::new(), 10);
        r.info("Loading xtts_v2").await.expect("write");
        r.warning("GPU unusable").await.expect("write");
        r.preview("mot hai ba bon nam").await.expect("write");
        r.success(Path::new("/out/a.wav")).await.expect("write");
        r.success_warmup().await.expect("write");
        r.error("bad\nthing").await.expect("write");
        r.success_shutdown().await.expect("write");
        let out = String::from_utf8(r.into_inner()).expect("utf8");

        assert_eq!(
            out,
            "INFO: Loading xtts_v2\n\
             WARNING: GPU unusable\n\
             TEXT_BEFORE_TTS|mot hai ba...\n\
             SUCCESS|/out/a.wav\n\
             SUCCESS|WARMUP\n\
             ERROR|bad thing\n\
             SUCCESS|SHUTDOWN\n"
        );
    }
}
