//! Unix domain socket server for IPC
//!
//! Provides request-response access to the orchestrator and push
//! notifications of state events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::backend::Bridge;
use crate::events::StateEvent;
use crate::orchestrator::{OrchestratorError, OrchestratorHandle};

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared by every client handler
struct ServerContext {
    handle: OrchestratorHandle,
    /// Targets of `trigger_keyword` and `report_power`
    bridge: Bridge,
    start_time: Instant,
}

/// A decoded frame, or why it could not be decoded
type Incoming = std::result::Result<Request, String>;

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        handle: OrchestratorHandle,
        bridge: Bridge,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context: Arc::new(ServerContext {
                handle,
                bridge,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut requests) = mpsc::channel(8);
        let reader = tokio::spawn(Self::read_requests(reader, request_tx));

        let mut events: Option<broadcast::Receiver<StateEvent>> = None;
        let result = loop {
            tokio::select! {
                incoming = requests.recv() => {
                    let Some(incoming) = incoming else {
                        break Ok(());
                    };
                    let response = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            if request == Request::Subscribe && events.is_none() {
                                events = Some(context.handle.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            Self::process_request(request, &context).await
                        }
                        Err(reason) => Response::error("bad_request", reason),
                    };
                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = Self::next_event(&mut events) => {
                    let Some(event) = event else {
                        events = None;
                        continue;
                    };
                    let notification = Notification::Event { event };
                    if let Err(e) = Self::send_message(&mut writer, &notification).await {
                        break Err(e);
                    }
                }
            }
        };

        reader.abort();
        result
    }

    /// Decode frames until the client disconnects or misbehaves
    async fn read_requests(mut reader: OwnedReadHalf, requests: mpsc::Sender<Incoming>) {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return;
                }
                Err(e) => {
                    warn!(?e, "client read error");
                    return;
                }
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                warn!(len, "message too large, disconnecting");
                return;
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut msg_buf).await {
                warn!(?e, "client read error");
                return;
            }

            let incoming = serde_json::from_slice::<Request>(&msg_buf)
                .map_err(|e| format!("failed to parse request: {e}"));
            if requests.send(incoming).await.is_err() {
                return;
            }
        }
    }

    /// Next event for a subscribed client; pending forever when not subscribed
    async fn next_event(
        events: &mut Option<broadcast::Receiver<StateEvent>>,
    ) -> Option<StateEvent> {
        let Some(rx) = events.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = u32::try_from(msg_bytes.len())
            .context("message too large")?
            .to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        let handle = &context.handle;

        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus::new(
                handle.status(),
                context.start_time.elapsed().as_secs(),
            )),

            Request::Subscribe => Response::Subscribed,

            Request::ArmListening => done(handle.arm_listening().await),

            Request::DisarmListening => done(handle.disarm_listening().await),

            Request::StartRecording { max_duration_secs } => {
                let bound = max_duration_secs.map(Duration::from_secs);
                done(handle.start_manual_recording(bound).await)
            }

            Request::StopRecording => match handle.stop_recording().await {
                Ok(descriptor) => Response::Recording { descriptor },
                Err(e) => e.into(),
            },

            Request::StartTraining => done(handle.start_training_capture().await),

            Request::FinishTraining { trigger_text } => {
                match handle.stop_training_capture_and_train(trigger_text).await {
                    Ok(profile) => Response::Profile { profile },
                    Err(e) => e.into(),
                }
            }

            Request::Reset => done(handle.reset().await),

            Request::ListProfiles => Response::Profiles {
                profiles: handle.list_profiles(),
            },

            Request::ActivateProfile { id } => done(handle.activate_profile(id).await),

            Request::DeleteProfile { id } => done(handle.delete_profile(id).await),

            Request::TriggerKeyword => match &context.bridge.detector {
                Some(detector) if detector.trigger() => Response::Ok,
                Some(_) => Response::error("not_listening", "keyword listening is not armed"),
                None => Response::error(
                    "unsupported",
                    "keyword detections come from the platform detector",
                ),
            },

            Request::ReportPower { event } => match &context.bridge.power {
                Some(power) => {
                    power.apply(event);
                    Response::Ok
                }
                None => Response::error(
                    "unsupported",
                    "power status comes from the platform monitor",
                ),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn done(result: std::result::Result<(), OrchestratorError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}
