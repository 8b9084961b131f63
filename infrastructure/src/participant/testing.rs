//! In-memory participants for tests.
//!
//! [`FakeLauncher`] hands out participants that live in a tokio task and talk
//! over `tokio::io::duplex` pipes, with scripted answers and configurable
//! reactions to end-of-input, the graceful signal and kill.

use super::process::{LaunchedParticipant, Launcher, ProcessControl};
use crate::rpc::codec;
use crate::rpc::envelope::{Envelope, ErrorObject, Request, Response};
use async_trait::async_trait;
use quorum_domain::{ParticipantId, SpawnSpec};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How a fake participant answers one method
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// `{participant, method, params}`
    Echo,
    Value(Value),
    Error(i64, String),
    /// Never answer
    Silent,
    /// Exit immediately without answering
    Exit,
}

/// Scripted behavior of one fake participant
#[derive(Debug, Clone)]
pub(crate) struct FakeBehavior {
    pub methods: HashMap<String, Reply>,
    pub default_reply: Reply,
    /// Delay before each answer
    pub delay: Duration,
    /// Exit when stdin closes
    pub exit_on_eof: bool,
    /// Keep running after the graceful signal
    pub ignore_term: bool,
    /// Stop reading stdin once the handshake is answered
    pub deaf_after_handshake: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
            default_reply: Reply::Echo,
            delay: Duration::ZERO,
            exit_on_eof: true,
            ignore_term: false,
            deaf_after_handshake: false,
        }
    }
}

impl FakeBehavior {
    pub fn reply(mut self, method: &str, reply: Reply) -> Self {
        self.methods.insert(method.to_string(), reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer `initialize`, then never read stdin again
    pub fn deaf(mut self) -> Self {
        self.deaf_after_handshake = true;
        self
    }

    /// Ignore both end-of-input and the graceful signal; only kill works
    pub fn stubborn(mut self) -> Self {
        self.exit_on_eof = false;
        self.ignore_term = true;
        self
    }
}

/// Launcher for in-memory participants
#[derive(Default)]
pub(crate) struct FakeLauncher {
    behaviors: HashMap<String, FakeBehavior>,
    default_behavior: FakeBehavior,
    launch_delay: Duration,
    /// Capacity of each stdio pipe; 0 means the default
    pipe_capacity: usize,
    fail: bool,
    launches: AtomicUsize,
    alive: Arc<AtomicUsize>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, id: &str, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(id.to_string(), behavior);
        self
    }

    pub fn with_default_behavior(mut self, behavior: FakeBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Every launch fails as if the command did not exist
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Fake processes that have not exited yet
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, id: &ParticipantId, _spec: &SpawnSpec) -> io::Result<LaunchedParticipant> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such command"));
        }

        let behavior = self
            .behaviors
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());

        let capacity = match self.pipe_capacity {
            0 => 64 * 1024,
            n => n,
        };
        let (client_out, participant_in) = duplex(capacity);
        let (participant_out, client_in) = duplex(capacity);

        let process = FakeProcess {
            pid: 10_000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            ignore_term: behavior.ignore_term,
            term: CancellationToken::new(),
            kill: CancellationToken::new(),
            exited: CancellationToken::new(),
        };

        self.alive.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(run_participant(
            id.to_string(),
            behavior,
            participant_in,
            participant_out,
            process.term.clone(),
            process.kill.clone(),
            process.exited.clone(),
            Arc::clone(&self.alive),
        ));

        Ok(LaunchedParticipant {
            reader: Box::new(client_in),
            writer: Box::new(client_out),
            process: Box::new(process),
        })
    }
}

struct FakeProcess {
    pid: u32,
    ignore_term: bool,
    term: CancellationToken,
    kill: CancellationToken,
    exited: CancellationToken,
}

#[async_trait]
impl ProcessControl for FakeProcess {
    fn id(&self) -> Option<u32> {
        (!self.exited.is_cancelled()).then_some(self.pid)
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.ignore_term {
            self.term.cancel();
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.kill.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.exited.cancelled().await;
        Ok(Some(0))
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_participant(
    id: String,
    behavior: FakeBehavior,
    input: DuplexStream,
    output: DuplexStream,
    term: CancellationToken,
    kill: CancellationToken,
    exited: CancellationToken,
    alive: Arc<AtomicUsize>,
) {
    let output = Arc::new(Mutex::new(output));
    let mut lines = BufReader::new(input).lines();
    let mut replies = JoinSet::new();
    let mut reading = true;

    loop {
        tokio::select! {
            _ = kill.cancelled() => break,
            _ = term.cancelled() => break,
            line = lines.next_line(), if reading => {
                let line = match line {
                    Ok(Some(line)) => line,
                    _ => {
                        if behavior.exit_on_eof {
                            break;
                        }
                        reading = false;
                        continue;
                    }
                };
                let Ok(Envelope::Request(request)) = codec::decode(&line) else {
                    continue;
                };
                let reply = if request.method == "initialize" {
                    reading = !behavior.deaf_after_handshake;
                    behavior
                        .methods
                        .get("initialize")
                        .cloned()
                        .unwrap_or(Reply::Value(json!({"name": id, "version": "test"})))
                } else {
                    behavior
                        .methods
                        .get(&request.method)
                        .cloned()
                        .unwrap_or_else(|| behavior.default_reply.clone())
                };
                let Some(response) = answer(&id, &request, reply) else {
                    break;
                };
                let output = Arc::clone(&output);
                let delay = behavior.delay;
                replies.spawn(async move {
                    if let Some(response) = response {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        let mut line = codec::encode(&response.into()).unwrap();
                        line.push('\n');
                        let _ = output.lock().await.write_all(line.as_bytes()).await;
                    }
                });
            }
        }
    }

    replies.abort_all();
    while replies.join_next().await.is_some() {}
    drop(output);
    alive.fetch_sub(1, Ordering::SeqCst);
    exited.cancel();
}

/// `None` means exit; `Some(None)` means stay silent
fn answer(id: &str, request: &Request, reply: Reply) -> Option<Option<Response>> {
    let response = match reply {
        Reply::Echo => Response::success(
            request.id.clone(),
            json!({"participant": id, "method": request.method, "params": request.params}),
        ),
        Reply::Value(value) => Response::success(request.id.clone(), value),
        Reply::Error(code, message) => Response::error(
            Some(request.id.clone()),
            ErrorObject {
                code,
                message,
                data: None,
            },
        ),
        Reply::Silent => return Some(None),
        Reply::Exit => return None,
    };
    Some(Some(response))
}
