use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tracing::{debug, info};

use crate::error::{Result, WorkerError};
use crate::processor::{Outcome, RequestProcessor, Worker};
use crate::report::Reporter;
use crate::request::Directive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Stopped,
}

pub struct DaemonLoop<R, W> {
    input: R,
    line: Vec<u8>,
    reporter: Reporter<W>,
    worker: Worker,
    state: LoopState,
}

impl<R, W> DaemonLoop<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, reporter: Reporter<W>, worker: Worker) -> Self {
        Self {
            input,
            line: Vec::new(),
            reporter,
            worker,
            state: LoopState::Idle,
        }
    }

    /// Serves requests until a shutdown directive or end of input. Only a
    /// broken control channel ends the loop with an error.
    pub async fn run(&mut self) -> Result<()> {
        info!("Daemon ready");
        while self.state != LoopState::Stopped {
            self.state = self.step().await?;
        }
        Ok(())
    }

    pub fn into_parts(self) -> (Worker, W) {
        (self.worker, self.reporter.into_inner())
    }

    async fn step(&mut self) -> Result<LoopState> {
        self.line.clear();
        if self.input.read_until(b'\n', &mut self.line).await? == 0 {
            info!("Control channel closed");
            return Ok(LoopState::Stopped);
        }
        let line = match std::str::from_utf8(&self.line) {
            Ok(line) => line.trim().to_string(),
            Err(e) => {
                let e = WorkerError::Protocol(format!("control line is not UTF-8: {e}"));
                self.reporter.error(&e.to_string()).await?;
                return Ok(LoopState::Idle);
            }
        };
        if line.is_empty() {
            return Ok(LoopState::Idle);
        }

        match Directive::parse(&line) {
            Err(e) => {
                self.reporter.error(&e.to_string()).await?;
                Ok(LoopState::Idle)
            }
            Ok(Directive::Shutdown) => {
                self.reporter.success_shutdown().await?;
                Ok(LoopState::Stopped)
            }
            Ok(Directive::Synthesize(request)) => {
                let mut processor = RequestProcessor::new(&mut self.worker);
                let outcome = processor.run(&request, &mut self.reporter).await;
                debug!("request stages: {:?}", processor.history());
                report_outcome(&mut self.reporter, outcome).await?;
                Ok(LoopState::Idle)
            }
        }
    }
}

async fn report_outcome<W: AsyncWrite + Unpin + Send>(
    reporter: &mut Reporter<W>,
    outcome: Outcome,
) -> Result<()> {
    match outcome {
        Outcome::Completed(path) => reporter.success(&path).await,
        Outcome::WarmedUp => reporter.success_warmup().await,
        Outcome::Failed(e) => reporter.error(&e.to_string()).await,
    }
}

/// Runs a single serialized request. Success is reported on the channel;
/// failure is returned to the caller.
pub async fn run_once<W: AsyncWrite + Unpin + Send>(
    worker: &mut Worker,
    raw: &str,
    reporter: &mut Reporter<W>,
) -> Result<()> {
    let request = match Directive::parse(raw)? {
        Directive::Synthesize(request) => request,
        Directive::Shutdown => {
            return Err(WorkerError::Protocol(
                "shutdown is only accepted in daemon mode".into(),
            ));
        }
    };
    let outcome = RequestProcessor::new(worker).run(&request, reporter).await;
    match outcome {
        Outcome::Completed(path) => reporter.success(&path).await,
        Outcome::WarmedUp => reporter.success_warmup().await,
        Outcome::Failed(e) => Err(e),
    }
}
