/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Live environment reached over newline-delimited JSON.
//!
//! Each request is one line `{"id": n, "method": "...", "params": {...}}`
//! and is answered by a line carrying the same id with either `result` or
//! `error`. Lines with any other id are notifications and are skipped, as
//! is anything on the stream that is not JSON.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::LiveEnvironment;
use super::remote::{CallSite, Evaluation, PropertyDescriptor, RemoteObject};
use crate::error::EnvError;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct GlobalNames {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    result: T,
}

struct Transport {
    writer: BoxedWriter,
    reader: Lines<BufReader<BoxedReader>>,
    /// Request bytes not yet accepted by the writer. A request cut short by
    /// a timeout finishes going out before the next one starts.
    pending: Vec<u8>,
    #[cfg(feature = "process")]
    child: Option<tokio::process::Child>,
}

impl Transport {
    fn new(writer: BoxedWriter, reader: BoxedReader) -> Self {
        Self {
            writer,
            reader: BufReader::new(reader).lines(),
            pending: Vec::new(),
            #[cfg(feature = "process")]
            child: None,
        }
    }

    /// Writes out `pending`. Bytes leave the buffer only once written, so
    /// dropping this future never loses or repeats part of a line.
    async fn send(&mut self) -> Result<(), EnvError> {
        while !self.pending.is_empty() {
            let written = self.writer.write(&self.pending).await?;
            if written == 0 {
                return Err(EnvError::Closed);
            }
            self.pending.drain(..written);
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn exchange(&mut self, id: u64) -> Result<Value, EnvError> {
        self.send().await?;

        loop {
            let Some(text) = self.reader.next_line().await? else {
                return Err(EnvError::Closed);
            };
            if text.trim().is_empty() {
                continue;
            }

            let response: Response = match serde_json::from_str(&text) {
                Ok(response) => response,
                Err(err) => {
                    trace!(%err, "skipping line that is not JSON");
                    continue;
                }
            };
            if response.id != Some(id) {
                trace!(id = ?response.id, "skipping unrelated message");
                continue;
            }
            if let Some(error) = response.error {
                return Err(EnvError::Remote {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

/// Environment living in another process, or behind any pair of byte streams
pub struct ProcessEnvironment {
    transport: Mutex<Transport>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl ProcessEnvironment {
    /// Talks to an already connected pair of streams
    pub fn from_streams<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_transport(Transport::new(Box::new(writer), Box::new(reader)), timeout)
    }

    fn with_transport(transport: Transport, timeout: Duration) -> Self {
        Self {
            transport: Mutex::new(transport),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Starts `argv[0]` with the remaining arguments and talks to it over
    /// its stdin and stdout. The child is killed when this value is dropped.
    #[cfg(feature = "process")]
    pub fn spawn(argv: &[String], timeout: Duration) -> Result<Self, EnvError> {
        use std::process::Stdio;

        let Some((program, args)) = argv.split_first() else {
            return Err(EnvError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty environment command",
            )));
        };

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(EnvError::Spawn)?;

        let stdin = child.stdin.take().ok_or(EnvError::Closed)?;
        let stdout = child.stdout.take().ok_or(EnvError::Closed)?;
        debug!(program = %program, pid = ?child.id(), "spawned live environment");

        let mut transport = Transport::new(Box::new(stdin), Box::new(stdout));
        transport.child = Some(child);
        Ok(Self::with_transport(transport, timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, EnvError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Request { id, method, params })?;
        line.push('\n');

        trace!(id, method, "request");
        let mut transport = self.transport.lock().await;
        transport.pending.extend_from_slice(line.as_bytes());
        let value = tokio::time::timeout(self.timeout, transport.exchange(id))
            .await
            .map_err(|_| EnvError::Timeout(self.timeout))??;

        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl LiveEnvironment for ProcessEnvironment {
    fn backend_name(&self) -> &'static str {
        "process"
    }

    async fn evaluate(&self, expression: &str, silent: bool) -> Result<Evaluation, EnvError> {
        self.request(
            "Runtime.evaluate",
            json!({ "expression": expression, "silent": silent }),
        )
        .await
    }

    async fn global_names(&self) -> Result<Vec<String>, EnvError> {
        let names: GlobalNames = self
            .request("Runtime.globalLexicalScopeNames", json!({}))
            .await?;
        Ok(names.names)
    }

    async fn load_module(&self, specifier: &str) -> Result<Evaluation, EnvError> {
        self.request("Runtime.loadModule", json!({ "specifier": specifier }))
            .await
    }

    async fn properties(&self, object_id: &str) -> Result<Vec<PropertyDescriptor>, EnvError> {
        let properties: Wrapped<Vec<PropertyDescriptor>> = self
            .request(
                "Runtime.getProperties",
                json!({ "objectId": object_id, "ownProperties": false }),
            )
            .await?;
        Ok(properties.result)
    }

    async fn invoke_hint(
        &self,
        callee: &RemoteObject,
        call_site: &CallSite,
        line: &str,
    ) -> Result<RemoteObject, EnvError> {
        let hint: Wrapped<RemoteObject> = self
            .request(
                "Runtime.callHint",
                json!({ "callee": callee, "callSite": call_site, "line": line }),
            )
            .await?;
        Ok(hint.result)
    }

    /// Closes the request pipe and waits for the child to exit, killing it
    /// if it does not do so within the request timeout.
    async fn shutdown(&self) -> Result<(), EnvError> {
        let mut transport = self.transport.lock().await;
        transport.writer.shutdown().await?;

        #[cfg(feature = "process")]
        if let Some(child) = transport.child.as_mut() {
            if tokio::time::timeout(self.timeout, child.wait()).await.is_err() {
                debug!("live environment did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}
