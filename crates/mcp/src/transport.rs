//! Stdio transport: spawn a child process and exchange line-delimited JSON-RPC
//! over its stdin/stdout.

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, ChildStdout, Command},
        sync::{Mutex, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    error::{Context, Error, InvocationFailure, Result},
    traits::McpTransport,
    types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse},
};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

/// Stdio-based transport for a tool server process.
pub struct StdioTransport {
    child: Mutex<Child>,
    /// `None` once shutdown has closed the pipe.
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process and start the reader loop.
    ///
    /// The child inherits the host environment with `env` layered on top.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Arc<Self>> {
        info!(command = %command, args = ?args, "spawning tool server process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::startup_with(format!("failed to spawn '{command}'"), e))?;

        let stdin = child
            .stdin
            .take()
            .context("failed to capture tool server stdin")
            .map_err(|e| e.into_startup("stdio setup failed"))?;
        let stdout = child
            .stdout
            .take()
            .context("failed to capture tool server stdout")
            .map_err(|e| e.into_startup("stdio setup failed"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        warn!(stderr = %trimmed, "tool server stderr");
                    }
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let handle = tokio::spawn(read_responses(stdout, Arc::clone(&pending)));

        Ok(Arc::new(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            reader_handle: Mutex::new(Some(handle)),
        }))
    }

    async fn write_line(&self, method: &str, payload: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::invocation(method, InvocationFailure::Closed))?;
        let write = async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write
            .await
            .map_err(|e| Error::invocation(method, InvocationFailure::Write(e)))
    }
}

/// Route each response line to the caller waiting on its id. When stdout
/// closes, every waiter is released with a closed-transport error.
async fn read_responses(stdout: ChildStdout, pending: PendingMap) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                trace!(raw = %trimmed, "tool server -> client");

                let value = match serde_json::from_str::<serde_json::Value>(trimmed) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(error = %e, line = %trimmed, "tool server sent non-JSON line");
                        continue;
                    },
                };
                // Server-initiated requests and notifications carry a method and
                // may reuse ids from our own sequence.
                if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                    debug!(method = %method, "ignoring server-initiated message");
                    continue;
                }

                match serde_json::from_value::<JsonRpcResponse>(value) {
                    Ok(resp) => {
                        let key = resp.correlation_key();
                        let waiter = pending.lock().await.remove(&key);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(resp);
                            },
                            None => warn!(id = %key, "response for unknown request id"),
                        }
                    },
                    Err(e) => {
                        debug!(error = %e, line = %trimmed, "tool server sent non-response line");
                    },
                }
            },
            Ok(None) => {
                debug!("tool server stdout closed");
                break;
            },
            Err(e) => {
                warn!(error = %e, "error reading tool server stdout");
                break;
            },
        }
    }
    // Dropping the senders wakes every in-flight request.
    pending.lock().await.clear();
}

#[async_trait::async_trait]
impl McpTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let key = req.id.to_string();
        let payload = serde_json::to_string(&req)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        debug!(method = %method, id, "client -> tool server");
        if let Err(e) = self.write_line(method, &payload).await {
            self.pending.lock().await.remove(&key);
            return Err(e);
        }

        let resp = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => return Err(Error::invocation(method, InvocationFailure::Closed)),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                return Err(Error::invocation(
                    method,
                    InvocationFailure::Timeout(self.request_timeout),
                ));
            },
        };

        if let Some(err) = &resp.error {
            return Err(Error::invocation(method, InvocationFailure::Rpc {
                code: err.code,
                message: err.message.clone(),
            }));
        }

        Ok(resp)
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let payload = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        trace!(method = %method, "client -> tool server (notification)");
        self.write_line(method, &payload).await
    }

    async fn shutdown(&self, grace: Duration) {
        // Closing stdin is the polite exit request for stdio servers.
        drop(self.stdin.lock().await.take());
        self.pending.lock().await.clear();

        {
            let mut child = self.child.lock().await;
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "tool server exited"),
                Ok(Err(e)) => warn!(error = %e, "failed waiting for tool server exit"),
                Err(_) => {
                    warn!(grace_ms = grace.as_millis(), "tool server did not exit, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill tool server");
                    }
                },
            }
        }

        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
    }
}
