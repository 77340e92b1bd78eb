//! Invocation gateway: the single serialization point in front of the module.
//!
//! One actor task owns the virtual I/O channel. Callers hold cheap `Gateway`
//! handles and submit jobs over an unbounded queue; each job carries a
//! `oneshot` for its reply. A job is queued when `run` is *called*, not when
//! the returned future is first polled, so results line up with call order.
//!
//! # Architecture
//!
//! ```text
//!  Gateway::run ─┐
//!  Gateway::run ─┼──► mpsc queue ──► actor ──► wait for ReadyHandle
//!  Gateway::run ─┘                     │
//!                                      ▼   (one job at a time)
//!                         spawn_blocking(reset → write → invoke)
//!                                      │
//!                                      ▼
//!                               oneshot reply
//! ```
//!
//! Jobs queued before the module is ready are flushed in arrival order once it
//! is. If loading fails, every job is rejected with `Unavailable`.

use crate::{
    io::{InvocationResult, VirtualIo},
    log,
    module::{FsError, LoadError, ReadyHandle},
};
use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Infrastructure failures. Interpreter errors are never reported here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(#[from] LoadError),

    #[error("failed to write input: {0}")]
    Write(#[from] FsError),

    #[error("interpreter crashed: {0}")]
    Crashed(String),

    #[error("gateway is shut down")]
    Closed,
}

/// One query against one input. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    input: String,
    query: String,
    options: Vec<String>,
}

impl InvocationRequest {
    pub fn new(input: impl Into<String>, query: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            input: input.into(),
            query: query.into(),
            options,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }
}

/// Settings fixed for the lifetime of the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Well-known input path inside the module filesystem.
    pub input_path: PathBuf,
    /// Flags placed before caller options on every call.
    pub baseline_flags: Vec<String>,
}

type Reply = Result<InvocationResult, GatewayError>;

struct Job {
    request: InvocationRequest,
    reply: oneshot::Sender<Reply>,
}

/// Handle to the gateway actor. Clone freely; all clones share one queue.
#[derive(Debug, Clone)]
pub struct Gateway {
    tx: mpsc::UnboundedSender<Job>,
}

impl Gateway {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(ready: ReadyHandle, settings: GatewaySettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(ready, settings, rx));
        Self { tx }
    }

    /// Queue `query` against `input`. The job is enqueued before this returns.
    pub fn run(&self, input: &str, query: &str, options: &[String]) -> PendingInvocation {
        self.submit(InvocationRequest::new(input, query, options.to_vec()))
    }

    pub fn submit(&self, request: InvocationRequest) -> PendingInvocation {
        let (reply, rx) = oneshot::channel();
        let rx = self.tx.send(Job { request, reply }).ok().map(|()| rx);
        PendingInvocation { rx }
    }
}

/// Resolves to the result of one queued invocation.
#[must_use = "the invocation result is only observable by awaiting"]
#[derive(Debug)]
pub struct PendingInvocation {
    /// `None` when the actor was already gone at submit time
    rx: Option<oneshot::Receiver<Reply>>,
}

impl Future for PendingInvocation {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|reply| reply.unwrap_or(Err(GatewayError::Closed))),
            None => Poll::Ready(Err(GatewayError::Closed)),
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

async fn serve(
    mut ready: ReadyHandle,
    settings: GatewaySettings,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    let module = match ready.wait().await {
        Ok(module) => module,
        Err(err) => {
            log!("gateway"; "rejecting all requests: {err}");
            while let Some(job) = rx.recv().await {
                let _ = job.reply.send(Err(GatewayError::Unavailable(err.clone())));
            }
            return;
        }
    };

    let io = Arc::new(VirtualIo::new(module, settings.baseline_flags));
    let input_path = Arc::new(settings.input_path);

    while let Some(Job { request, reply }) = rx.recv().await {
        let io = Arc::clone(&io);
        let path = Arc::clone(&input_path);

        let outcome =
            tokio::task::spawn_blocking(move || execute(&io, &path, &request)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(join_err) => {
                log!("error"; "interpreter crashed: {join_err}");
                Err(GatewayError::Crashed(join_err.to_string()))
            }
        };

        // the caller may have stopped waiting
        let _ = reply.send(result);
    }
}

/// reset → write → invoke, all under one exclusive turn of the actor.
fn execute(io: &VirtualIo, path: &Path, request: &InvocationRequest) -> Reply {
    io.reset();
    io.write(path, request.input())?;
    let args = VirtualIo::entry_args(request.options(), request.query(), path);
    Ok(io.invoke(&args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{
        ModuleLoader, Program, ProgramEnv,
        loader::testing::{Broken, Gated, Immediate},
        testing::Echo,
    };
    use std::time::Duration;

    fn settings() -> GatewaySettings {
        GatewaySettings {
            input_path: PathBuf::from("/input.json"),
            baseline_flags: vec!["-M".into()],
        }
    }

    fn echo() -> Box<dyn Program> {
        Box::new(Echo)
    }

    /// Prints the query (second to last argument) after a short pause, so
    /// overlapping calls would interleave if the gateway did not serialize.
    struct Slow;

    impl Program for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
            let query = &args[args.len() - 2];
            env.stdout.write(&format!("{query}:begin\n"));
            std::thread::sleep(Duration::from_millis(5));
            env.stdout.write(&format!("{query}:end\n"));
            0
        }
    }

    /// Rejects every query the way a compile error would.
    struct Rejects;

    impl Program for Rejects {
        fn name(&self) -> &str {
            "rejects"
        }

        fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
            let query = &args[args.len() - 2];
            env.stderr.writeln(&format!("syntax error in `{query}`"));
            3
        }
    }

    struct Panics;

    impl Program for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn main(&mut self, args: &[String], env: &mut ProgramEnv<'_>) -> i32 {
            if args.iter().any(|arg| arg == "boom") {
                panic!("boom");
            }
            env.stdout.writeln("fine");
            0
        }
    }

    #[tokio::test]
    async fn test_run_writes_input_and_invokes() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(echo)));
        let gateway = Gateway::spawn(loader.load(), settings());

        let result = gateway.run("[1,2,3]", ".", &["-c".into()]).await.unwrap();
        assert_eq!(result.stdout, "args: -M -c . /input.json\n[1,2,3]");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_resolve_in_order() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(|| {
            Box::new(Slow) as Box<dyn Program>
        })));
        let gateway = Gateway::spawn(loader.load(), settings());

        let pending: Vec<_> = (0..8)
            .map(|i| gateway.run("{}", &format!("q{i}"), &[]))
            .collect();

        for (i, pending) in pending.into_iter().enumerate() {
            let result = pending.await.unwrap();
            assert_eq!(result.stdout, format!("q{i}:begin\nq{i}:end"));
        }
    }

    #[tokio::test]
    async fn test_second_future_polled_first_still_queued_second() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(|| {
            Box::new(Slow) as Box<dyn Program>
        })));
        let gateway = Gateway::spawn(loader.load(), settings());

        let first = gateway.run("{}", "q1", &[]);
        let second = gateway.run("{}", "q2", &[]);

        let r2 = second.await.unwrap();
        let r1 = first.await.unwrap();
        assert_eq!(r1.stdout, "q1:begin\nq1:end");
        assert_eq!(r2.stdout, "q2:begin\nq2:end");
    }

    #[tokio::test]
    async fn test_calls_before_ready_are_queued() {
        let (gated, release) = Gated::new();
        let loader = ModuleLoader::new(Arc::new(gated));
        let gateway = Gateway::spawn(loader.load(), settings());

        let first = gateway.run("one", ".", &[]);
        let second = gateway.run("two", ".", &[]);
        tokio::pin!(first);

        let early = tokio::time::timeout(Duration::from_millis(50), &mut first).await;
        assert!(early.is_err(), "resolved before the module was ready");

        release.send(()).unwrap();
        assert!(first.await.unwrap().stdout.ends_with("one"));
        assert!(second.await.unwrap().stdout.ends_with("two"));
    }

    #[tokio::test]
    async fn test_failed_load_rejects() {
        let loader = ModuleLoader::new(Arc::new(Broken));
        let gateway = Gateway::spawn(loader.load(), settings());

        let err = gateway.run("{}", ".", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(LoadError::Bootstrap { .. })));

        // later calls are rejected the same way
        let err = gateway.run("{}", ".", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_write_failure_rejects() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(echo))).with_fs_quota(4);
        let gateway = Gateway::spawn(loader.load(), settings());

        let err = gateway.run("[1,2,3]", ".", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Write(FsError::QuotaExceeded { .. })));

        // the gateway keeps serving afterwards
        let ok = gateway.run("[1]", ".", &[]).await.unwrap();
        assert!(ok.stdout.ends_with("[1]"));
    }

    #[tokio::test]
    async fn test_interpreter_errors_are_data() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(|| {
            Box::new(Rejects) as Box<dyn Program>
        })));
        let gateway = Gateway::spawn(loader.load(), settings());

        let request = InvocationRequest::new("{}", ".[", vec![]);
        assert_eq!(request.query(), ".[");
        assert_eq!(request.input(), "{}");
        assert!(request.options().is_empty());

        let result = gateway.submit(request).await.unwrap();
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "syntax error in `.[`");
        assert_eq!(result.exit_code, 3);
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_crash_is_reported_and_gateway_recovers() {
        let loader = ModuleLoader::new(Arc::new(Immediate::new(|| {
            Box::new(Panics) as Box<dyn Program>
        })));
        let gateway = Gateway::spawn(loader.load(), settings());

        let err = gateway.run("{}", "boom", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Crashed(_)));

        let result = gateway.run("{}", ".", &[]).await.unwrap();
        assert_eq!(result.stdout, "fine");
    }

    #[tokio::test]
    async fn test_closed_gateway() {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        drop(rx);
        let gateway = Gateway { tx };

        let err = gateway.run("{}", ".", &[]).await.unwrap_err();
        assert_eq!(err, GatewayError::Closed);
    }
}
