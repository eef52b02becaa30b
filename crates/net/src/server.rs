//! TCP server exposing the swap engine
//!
//! Each connection authenticates once, then issues requests as that user.
//! Engine calls are blocking SQLite work and run on the blocking pool, so a
//! slow transaction never stalls the accept loop or other sessions.
//!
//! Every accepted socket holds one of `max_connections` permits from accept
//! until close, whether or not it ever authenticates. Within a session at
//! most [`MAX_IN_FLIGHT`] requests run at once; further requests stay
//! unread on the socket until one finishes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::ReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use slotswap_core::{ErrorKind, Identity, IdentityProvider, SwapEngine};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame, write_loop};
use crate::protocol::{Message, Operation, Reply};

/// Time allowed between connect and `Authenticate`
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outgoing frames queued per connection
const OUTBOX_CAPACITY: usize = 64;

/// Requests one session may have executing at a time
pub const MAX_IN_FLIGHT: usize = 32;

/// How long a rejected socket is kept to let its handshake arrive
const REJECT_GRACE: Duration = Duration::from_secs(1);

/// Rejection reason sent when the connection cap is reached
pub(crate) const SERVER_FULL_REASON: &str = "server full";

/// An authenticated connection
struct Session {
    user_id: Uuid,
    addr: SocketAddr,
    in_flight: Arc<Semaphore>,
}

/// Server state shared across tasks
struct ServerState {
    sessions: HashMap<u64, Session>,
    next_session: u64,
}

struct Shared {
    engine: Arc<SwapEngine>,
    identity: Arc<dyn IdentityProvider>,
    connections: Arc<Semaphore>,
    state: RwLock<ServerState>,
}

/// Swap service handle
pub struct Server {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind `addr` and start accepting connections
    pub async fn start(
        addr: SocketAddr,
        engine: Arc<SwapEngine>,
        identity: Arc<dyn IdentityProvider>,
        max_connections: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, max_connections, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            engine,
            identity,
            connections: Arc::new(Semaphore::new(max_connections)),
            state: RwLock::new(ServerState {
                sessions: HashMap::new(),
                next_session: 1,
            }),
        });

        tokio::spawn(accept_loop(listener, shared.clone(), shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            shared,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of authenticated connections
    pub async fn session_count(&self) -> usize {
        self.shared.state.read().await.sessions.len()
    }

    /// Requests currently executing across all sessions
    pub async fn in_flight(&self) -> usize {
        let state = self.shared.state.read().await;
        state
            .sessions
            .values()
            .map(|s| MAX_IN_FLIGHT - s.in_flight.available_permits())
            .sum()
    }

    /// Users with at least one open session
    pub async fn connected_users(&self) -> Vec<Uuid> {
        let state = self.shared.state.read().await;
        let mut users: Vec<Uuid> = state.sessions.values().map(|s| s.user_id).collect();
        users.sort_unstable();
        users.dedup();
        users
    }

    /// Stop accepting and close every session.
    ///
    /// Requests already handed to the engine still run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => match shared.connections.clone().try_acquire_owned() {
                        Ok(permit) => {
                            debug!(addr = %addr, "New connection");
                            tokio::spawn(handle_connection(
                                stream,
                                addr,
                                permit,
                                shared.clone(),
                                shutdown_tx.subscribe(),
                            ));
                        }
                        Err(_) => {
                            warn!(addr = %addr, "Connection limit reached");
                            tokio::spawn(reject_full(stream));
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Tell a socket over the limit why it is being closed
async fn reject_full(mut stream: TcpStream) {
    let rejected = Message::AuthRejected {
        reason: SERVER_FULL_REASON.into(),
    };
    if write_frame(&mut stream, &rejected).await.is_ok() {
        // Closing with the handshake unread would reset the connection
        let _ = tokio::time::timeout(REJECT_GRACE, read_frame(&mut stream)).await;
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_permit: OwnedSemaphorePermit,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    let (session_id, identity) = match authenticate(&mut reader, addr, &in_flight, &shared).await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Authentication failed");
            let reason = match e {
                Error::Rejected(reason) => reason,
                _ => return,
            };
            let _ = write_frame(&mut writer, &Message::AuthRejected { reason }).await;
            return;
        }
    };

    let welcome = Message::Authenticated {
        user_id: identity.user_id,
        display_name: identity.display_name.clone(),
    };
    if let Err(e) = write_frame(&mut writer, &welcome).await {
        debug!(addr = %addr, error = %e, "Client left during handshake");
        remove_session(&shared, session_id).await;
        return;
    }

    info!(addr = %addr, user_id = %identity.user_id, "Session opened");

    let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
    let writer_handle = tokio::spawn(write_loop(writer, rx));

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(Message::Request { seq, op }) => {
                        // Reading pauses here while the session is at its limit
                        let Ok(permit) = in_flight.clone().acquire_owned().await else {
                            break;
                        };
                        let engine = shared.engine.clone();
                        let tx = tx.clone();
                        let user_id = identity.user_id;
                        tokio::spawn(async move {
                            let reply = dispatch(engine, user_id, op).await;
                            let _ = tx.send(Message::Response { seq, reply }).await;
                            drop(permit);
                        });
                    }
                    Ok(Message::Ping) => {
                        let _ = tx.send(Message::Pong).await;
                    }
                    Ok(other) => {
                        warn!(user_id = %identity.user_id, message = ?other, "Unexpected message");
                        break;
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!(user_id = %identity.user_id, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(user_id = %identity.user_id, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(user_id = %identity.user_id, "Closing session for shutdown");
                break;
            }
        }
    }

    // In-flight requests hold their own senders; the writer drains them
    drop(tx);
    let _ = writer_handle.await;
    remove_session(&shared, session_id).await;
    drop(connection_permit);

    info!(addr = %addr, user_id = %identity.user_id, "Session closed");
}

/// Resolve the credential, register the session, and record the profile
async fn authenticate(
    reader: &mut ReadHalf<TcpStream>,
    addr: SocketAddr,
    in_flight: &Arc<Semaphore>,
    shared: &Arc<Shared>,
) -> Result<(u64, Identity)> {
    let msg = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(reader))
        .await
        .map_err(|_| Error::Protocol("Handshake timed out".into()))??;

    let credential = match msg {
        Message::Authenticate { credential } => credential,
        _ => return Err(Error::Protocol("Expected Authenticate".into())),
    };

    let identity = shared
        .identity
        .resolve(&credential)
        .ok_or_else(|| Error::Rejected("unknown credential".into()))?;

    let session_id = {
        let mut state = shared.state.write().await;
        let id = state.next_session;
        state.next_session += 1;
        state.sessions.insert(
            id,
            Session {
                user_id: identity.user_id,
                addr,
                in_flight: in_flight.clone(),
            },
        );
        id
    };

    let engine = shared.engine.clone();
    let profile = identity.clone();
    let registered = tokio::task::spawn_blocking(move || {
        engine.register_profile(profile.user_id, &profile.display_name)
    })
    .await;

    match registered {
        Ok(Ok(_)) => Ok((session_id, identity)),
        Ok(Err(e)) => {
            remove_session(shared, session_id).await;
            Err(Error::Rejected(e.public_message()))
        }
        Err(e) => {
            remove_session(shared, session_id).await;
            error!(error = %e, "Profile registration task failed");
            Err(Error::Rejected("temporary store failure, retry later".into()))
        }
    }
}

async fn remove_session(shared: &Arc<Shared>, session_id: u64) {
    let mut state = shared.state.write().await;
    if let Some(session) = state.sessions.remove(&session_id) {
        debug!(user_id = %session.user_id, addr = %session.addr, "Session released");
    }
}

/// Run one operation on the blocking pool and fold the result into a reply
async fn dispatch(engine: Arc<SwapEngine>, user_id: Uuid, op: Operation) -> Reply {
    let name = op.name();
    match tokio::task::spawn_blocking(move || execute(&engine, user_id, op)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            debug!(op = name, user_id = %user_id, error = %e, "Operation failed");
            Reply::Failed {
                kind: e.kind(),
                message: e.public_message(),
            }
        }
        Err(e) => {
            error!(op = name, error = %e, "Engine task failed");
            Reply::Failed {
                kind: ErrorKind::Store,
                message: "temporary store failure, retry later".into(),
            }
        }
    }
}

fn execute(engine: &SwapEngine, user_id: Uuid, op: Operation) -> slotswap_core::Result<Reply> {
    let reply = match op {
        Operation::CreateSlot {
            title,
            start_time,
            end_time,
        } => Reply::Slot {
            slot: engine.create_slot(user_id, &title, start_time, end_time)?,
        },
        Operation::GetSlot { slot_id } => Reply::Slot {
            slot: engine.get_slot(user_id, slot_id)?,
        },
        Operation::ListMySlots => Reply::Slots {
            slots: engine.list_my_slots(user_id)?,
        },
        Operation::MakeSwappable { slot_id } => Reply::SlotStatus {
            slot_id,
            status: engine.make_swappable(user_id, slot_id)?,
        },
        Operation::MakeBusy { slot_id } => Reply::SlotStatus {
            slot_id,
            status: engine.make_busy(user_id, slot_id)?,
        },
        Operation::ProposeSwap {
            my_slot_id,
            their_slot_id,
        } => Reply::SwapProposed {
            request: engine.propose_swap(user_id, my_slot_id, their_slot_id)?,
        },
        Operation::RespondToSwap {
            request_id,
            accepted,
        } => Reply::SwapResolved {
            request_id,
            status: engine.respond_to_swap(user_id, request_id, accepted)?,
        },
        Operation::ListMarketplace => Reply::Marketplace {
            slots: engine.list_marketplace(user_id)?,
        },
        Operation::ListMyRequests => Reply::Requests {
            requests: engine.list_my_requests(user_id)?,
        },
    };
    Ok(reply)
}
