use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use loginguards_core::ipc::{decode_request, encode_response, MalformedRequest, MAX_REQUEST_LINE};
use policy_engine::{PolicyDecision, PolicyEngine, PolicySnapshot};

use crate::audit;

/// How long in-flight connections may run on after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 4096;

pub struct DecisionService {
    engine: PolicyEngine,
    snapshots: watch::Receiver<Arc<PolicySnapshot>>,
}

impl DecisionService {
    pub fn new(engine: PolicyEngine, snapshots: watch::Receiver<Arc<PolicySnapshot>>) -> Self {
        Self { engine, snapshots }
    }

    fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshots.borrow().clone()
    }
}

pub enum Frame {
    Line(Zeroizing<Vec<u8>>),
    Oversized,
    Eof,
}

/// Splits a byte stream into newline-terminated frames of bounded size.
///
/// Anything buffered is zeroized on drop. A line that outgrows the cap is
/// dropped up to its newline and reported once as [`Frame::Oversized`].
pub struct FrameReader<R> {
    inner: R,
    pending: Zeroizing<Vec<u8>>,
    chunk: Zeroizing<Vec<u8>>,
    discarding: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Zeroizing::new(Vec::new()),
            chunk: Zeroizing::new(vec![0u8; READ_CHUNK]),
            discarding: false,
            eof: false,
        }
    }

    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            if let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
                let mut line = Zeroizing::new(self.pending.drain(..=pos).collect::<Vec<u8>>());
                line.pop();
                return Ok(self.finish_line(line));
            }

            // One byte of slack for a `\r` that is stripped once the newline arrives.
            if self.pending.len() > MAX_REQUEST_LINE + 1 {
                self.pending.zeroize();
                self.discarding = true;
            }

            if self.eof {
                if self.pending.is_empty() && !self.discarding {
                    return Ok(Frame::Eof);
                }
                // Unterminated last line: answer it, then report EOF.
                let line = Zeroizing::new(self.pending.drain(..).collect::<Vec<u8>>());
                return Ok(self.finish_line(line));
            }

            let read = self.inner.read(self.chunk.as_mut_slice()).await?;
            if read == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&self.chunk[..read]);
                self.chunk[..read].zeroize();
            }
        }
    }

    fn finish_line(&mut self, mut line: Zeroizing<Vec<u8>>) -> Frame {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if std::mem::take(&mut self.discarding) || line.len() > MAX_REQUEST_LINE {
            return Frame::Oversized;
        }
        Frame::Line(line)
    }
}

/// Serves one client connection until it closes or shutdown begins.
///
/// Every non-blank line is answered with exactly one response line; decode
/// failures are answered with `bad_request` and the connection stays open.
pub async fn handle_connection<S>(
    stream: S,
    service: Arc<DecisionService>,
    shutdown: CancellationToken,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    let conn = Uuid::new_v4();
    let (reader, mut writer) = tokio::io::split(stream);
    let mut frames = FrameReader::new(reader);
    debug!(conn = %conn, "client connected");

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.next_frame() => frame?,
        };

        let decision = match frame {
            Frame::Eof => break,
            Frame::Oversized => {
                let decision = PolicyDecision::bad_request(MalformedRequest::Oversized);
                audit::record(&conn, &decision, None, false);
                decision
            }
            Frame::Line(line) => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match decode_request(&line) {
                    Ok(request) => {
                        // One snapshot per request, taken before the remote call.
                        let snapshot = service.snapshot();
                        let decision = service.engine.evaluate(&snapshot, &request.password).await;
                        audit::record(&conn, &decision, Some(&request), snapshot.config.log_username);
                        decision
                    }
                    Err(malformed) => {
                        let decision = PolicyDecision::bad_request(malformed);
                        audit::record(&conn, &decision, None, false);
                        decision
                    }
                }
            }
        };

        let reply = encode_response(&decision.response());
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;
    }

    debug!(conn = %conn, "client disconnected");
    Ok(())
}

fn spawn_client<S>(
    tracker: &TaskTracker,
    stream: S,
    service: &Arc<DecisionService>,
    shutdown: &CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let service = service.clone();
    let shutdown = shutdown.clone();
    tracker.spawn(async move {
        if let Err(err) = handle_connection(stream, service, shutdown).await {
            debug!(error = %err, "connection ended with an I/O error");
        }
    });
}

async fn drain(tracker: TaskTracker) {
    tracker.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        warn!(
            remaining = tracker.len(),
            "in-flight connections did not finish within the shutdown grace period"
        );
    }
}

/// Accepts clients on a Unix domain socket until `shutdown` fires.
#[cfg(unix)]
pub async fn serve(
    endpoint: &str,
    service: Arc<DecisionService>,
    shutdown: CancellationToken,
) -> Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tokio::net::UnixListener;

    let socket_path = Path::new(endpoint);
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .with_context(|| format!("remove stale socket {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("bind socket {}", socket_path.display()))?;
    fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("set socket permissions {}", socket_path.display()))?;
    info!(endpoint, "decision service listening");

    let tracker = TaskTracker::new();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        if let Err(err) = check_peer_uid(&stream) {
            warn!(error = %err, "rejected client");
            continue;
        }
        spawn_client(&tracker, stream, &service, &shutdown);
    }

    info!("decision service stopping");
    drain(tracker).await;
    if let Err(err) = fs::remove_file(socket_path) {
        debug!(error = %err, "socket already gone");
    }
    Ok(())
}

/// Only root and the service's own account may ask for decisions.
#[cfg(unix)]
fn check_peer_uid(stream: &tokio::net::UnixStream) -> Result<()> {
    let cred = stream.peer_cred().context("read peer credentials")?;
    // SAFETY: geteuid has no preconditions and cannot fail.
    let current = unsafe { libc::geteuid() };
    if cred.uid() != 0 && cred.uid() != current {
        return Err(anyhow::anyhow!("unauthorized peer uid {}", cred.uid()));
    }
    Ok(())
}

/// Accepts clients on a local named pipe until `shutdown` fires.
///
/// A fresh pipe instance is created before each connected one is handed off,
/// so a client can always find a listening instance.
#[cfg(windows)]
pub async fn serve(
    endpoint: &str,
    service: Arc<DecisionService>,
    shutdown: CancellationToken,
) -> Result<()> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let mut server = ServerOptions::new()
        .first_pipe_instance(true)
        .reject_remote_clients(true)
        .create(endpoint)
        .with_context(|| format!("create pipe {endpoint}"))?;
    info!(endpoint, "decision service listening");

    let tracker = TaskTracker::new();
    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            connected = server.connect() => connected,
        };
        if let Err(err) = connected {
            warn!(error = %err, "pipe connect failed");
            server = ServerOptions::new()
                .reject_remote_clients(true)
                .create(endpoint)
                .with_context(|| format!("recreate pipe {endpoint}"))?;
            continue;
        }
        let next = ServerOptions::new()
            .reject_remote_clients(true)
            .create(endpoint)
            .with_context(|| format!("create pipe instance {endpoint}"))?;
        let client = std::mem::replace(&mut server, next);
        spawn_client(&tracker, client, &service, &shutdown);
    }

    info!("decision service stopping");
    drain(tracker).await;
    Ok(())
}
