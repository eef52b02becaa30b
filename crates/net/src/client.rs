//! TCP client for the swap service

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::ReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use slotswap_core::{
    Identity, IncomingRequest, MarketplaceSlot, MyRequests, OutgoingRequest, Slot, SlotStatus,
    SwapRequest, SwapStatus,
};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame, write_loop};
use crate::protocol::{Message, Operation, Reply};
use crate::server::SERVER_FULL_REASON;

/// How long `ping` waits for `Pong`
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests waiting for their response
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

/// An authenticated connection to a swap server
pub struct Client {
    identity: Identity,
    outgoing: mpsc::Sender<Message>,
    pending: Arc<Mutex<Pending>>,
    pong: Arc<Notify>,
    next_seq: AtomicU64,
    reader_handle: JoinHandle<()>,
}

impl Client {
    /// Connect and authenticate with `credential`
    pub async fn connect(addr: SocketAddr, credential: &str) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(
            &mut writer,
            &Message::Authenticate {
                credential: credential.to_string(),
            },
        )
        .await?;

        let identity = match read_frame(&mut reader).await? {
            Message::Authenticated {
                user_id,
                display_name,
            } => Identity {
                user_id,
                display_name,
            },
            Message::AuthRejected { reason } if reason == SERVER_FULL_REASON => {
                return Err(Error::ServerFull);
            }
            Message::AuthRejected { reason } => {
                warn!(reason = %reason, "Authentication rejected");
                return Err(Error::Rejected(reason));
            }
            _ => return Err(Error::Protocol("Expected Authenticated".into())),
        };

        info!(user_id = %identity.user_id, "Authenticated");

        let (outgoing, outgoing_rx) = mpsc::channel(64);
        tokio::spawn(write_loop(writer, outgoing_rx));

        let pending = Arc::new(Mutex::new(Pending::default()));
        let pong = Arc::new(Notify::new());
        let reader_handle = tokio::spawn(read_loop(reader, pending.clone(), pong.clone()));

        Ok(Client {
            identity,
            outgoing,
            pending,
            pong,
            next_seq: AtomicU64::new(1),
            reader_handle,
        })
    }

    /// Who the server says we are
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Send a request and wait for its reply
    async fn call(&self, op: Operation) -> Result<Reply> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(Error::ConnectionClosed);
            }
            pending.waiters.insert(seq, tx);
        }

        if self.outgoing.send(Message::Request { seq, op }).await.is_err() {
            self.pending.lock().await.waiters.remove(&seq);
            return Err(Error::NotConnected);
        }

        match rx.await.map_err(|_| Error::ConnectionClosed)? {
            Reply::Failed { kind, message } => Err(Error::Remote { kind, message }),
            reply => Ok(reply),
        }
    }

    pub async fn create_slot(
        &self,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Slot> {
        let op = Operation::CreateSlot {
            title: title.to_string(),
            start_time,
            end_time,
        };
        match self.call(op).await? {
            Reply::Slot { slot } => Ok(slot),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<Slot> {
        match self.call(Operation::GetSlot { slot_id }).await? {
            Reply::Slot { slot } => Ok(slot),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_my_slots(&self) -> Result<Vec<Slot>> {
        match self.call(Operation::ListMySlots).await? {
            Reply::Slots { slots } => Ok(slots),
            other => Err(unexpected(other)),
        }
    }

    pub async fn make_swappable(&self, slot_id: Uuid) -> Result<SlotStatus> {
        match self.call(Operation::MakeSwappable { slot_id }).await? {
            Reply::SlotStatus { status, .. } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn make_busy(&self, slot_id: Uuid) -> Result<SlotStatus> {
        match self.call(Operation::MakeBusy { slot_id }).await? {
            Reply::SlotStatus { status, .. } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn propose_swap(&self, my_slot_id: Uuid, their_slot_id: Uuid) -> Result<SwapRequest> {
        let op = Operation::ProposeSwap {
            my_slot_id,
            their_slot_id,
        };
        match self.call(op).await? {
            Reply::SwapProposed { request } => Ok(request),
            other => Err(unexpected(other)),
        }
    }

    pub async fn respond_to_swap(&self, request_id: Uuid, accepted: bool) -> Result<SwapStatus> {
        let op = Operation::RespondToSwap {
            request_id,
            accepted,
        };
        match self.call(op).await? {
            Reply::SwapResolved { status, .. } => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_marketplace(&self) -> Result<Vec<MarketplaceSlot>> {
        match self.call(Operation::ListMarketplace).await? {
            Reply::Marketplace { slots } => Ok(slots),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_my_requests(&self) -> Result<MyRequests> {
        match self.call(Operation::ListMyRequests).await? {
            Reply::Requests { requests } => Ok(requests),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_incoming_requests(&self) -> Result<Vec<IncomingRequest>> {
        Ok(self.list_my_requests().await?.incoming)
    }

    pub async fn list_outgoing_requests(&self) -> Result<Vec<OutgoingRequest>> {
        Ok(self.list_my_requests().await?.outgoing)
    }

    /// Round-trip a keepalive
    pub async fn ping(&self) -> Result<()> {
        let pong = self.pong.notified();
        self.outgoing
            .send(Message::Ping)
            .await
            .map_err(|_| Error::NotConnected)?;
        tokio::time::timeout(PING_TIMEOUT, pong)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Close the connection
    pub fn disconnect(self) {}
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

fn unexpected(reply: Reply) -> Error {
    Error::Protocol(format!("Unexpected reply: {reply:?}"))
}

/// Route responses to their waiting callers
async fn read_loop(
    mut reader: ReadHalf<TcpStream>,
    pending: Arc<Mutex<Pending>>,
    pong: Arc<Notify>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Message::Response { seq, reply }) => {
                let waiter = pending.lock().await.waiters.remove(&seq);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!(seq, "Response with no waiting request"),
                }
            }
            Ok(Message::Pong) => pong.notify_waiters(),
            Ok(other) => {
                warn!(message = ?other, "Unexpected message from server");
                break;
            }
            Err(Error::ConnectionClosed) => {
                debug!("Server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }

    // Dropping the senders wakes every waiter with ConnectionClosed
    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.waiters.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use chrono::TimeZone;
    use slotswap_core::{ErrorKind, StaticIdentity, SwapEngine};

    struct Fixture {
        server: Server,
        alice: Uuid,
        bob: Uuid,
    }

    async fn fixture(max_connections: usize) -> Fixture {
        let engine = Arc::new(SwapEngine::open_in_memory().unwrap());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut identity = StaticIdentity::new();
        identity.insert("alice-token", alice, "Alice");
        identity.insert("bob-token", bob, "Bob");

        let server = Server::start(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            engine,
            Arc::new(identity),
            max_connections,
        )
        .await
        .unwrap();

        Fixture { server, alice, bob }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 2, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_client_connect() {
        let f = fixture(4).await;
        let client = Client::connect(f.server.addr(), "alice-token").await.unwrap();
        assert_eq!(client.identity().user_id, f.alice);
        assert_eq!(client.identity().display_name, "Alice");
        client.ping().await.unwrap();
        client.disconnect();
        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_bad_credential() {
        let f = fixture(4).await;
        let result = Client::connect(f.server.addr(), "nope").await;
        assert!(matches!(result, Err(Error::Rejected(_))));
        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_server_full() {
        let f = fixture(1).await;
        let _alice = Client::connect(f.server.addr(), "alice-token").await.unwrap();
        let result = Client::connect(f.server.addr(), "bob-token").await;
        assert!(matches!(result, Err(Error::ServerFull)));
        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_swap_over_the_wire() {
        let f = fixture(4).await;
        let alice = Client::connect(f.server.addr(), "alice-token").await.unwrap();
        let bob = Client::connect(f.server.addr(), "bob-token").await.unwrap();

        let mine = alice.create_slot("Standup", at(9), at(10)).await.unwrap();
        let theirs = bob.create_slot("Review", at(14), at(15)).await.unwrap();
        assert_eq!(
            alice.make_swappable(mine.id).await.unwrap(),
            SlotStatus::Swappable
        );
        bob.make_swappable(theirs.id).await.unwrap();

        let market = alice.list_marketplace().await.unwrap();
        assert_eq!(market.len(), 1);
        assert_eq!(market[0].slot_id, theirs.id);
        assert_eq!(market[0].owner_name, "Bob");

        let request = alice.propose_swap(mine.id, theirs.id).await.unwrap();
        assert_eq!(request.status, SwapStatus::Pending);

        let incoming = bob.list_incoming_requests().await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].requester_name, "Alice");

        assert_eq!(
            bob.respond_to_swap(request.id, true).await.unwrap(),
            SwapStatus::Accepted
        );

        let outgoing = alice.list_outgoing_requests().await.unwrap();
        assert_eq!(outgoing[0].status, SwapStatus::Accepted);

        let now_mine = alice.get_slot(theirs.id).await.unwrap();
        assert_eq!(now_mine.owner_id, f.alice);
        assert_eq!(now_mine.status, SlotStatus::Busy);
        let bobs: Vec<Uuid> = bob
            .list_my_slots()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(bobs, vec![mine.id]);
        assert_eq!(f.server.connected_users().await.len(), 2);
        assert!(f.server.connected_users().await.contains(&f.bob));

        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_remote_errors_keep_their_kind() {
        let f = fixture(4).await;
        let alice = Client::connect(f.server.addr(), "alice-token").await.unwrap();

        let err = alice.create_slot("Backwards", at(10), at(9)).await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(ErrorKind::Validation));

        let err = alice.make_busy(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(ErrorKind::PreconditionFailed));

        let err = alice.respond_to_swap(Uuid::new_v4(), true).await.unwrap_err();
        assert_eq!(err.to_string(), slotswap_core::guard::NOT_RESPONDABLE);

        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_calls_on_one_connection() {
        let f = fixture(4).await;
        let alice = Arc::new(Client::connect(f.server.addr(), "alice-token").await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let alice = alice.clone();
                tokio::spawn(async move {
                    alice
                        .create_slot(&format!("Slot {i}"), at(i + 1), at(i + 2))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(alice.list_my_slots().await.unwrap().len(), 8);
        f.server.shutdown();
    }

    #[tokio::test]
    async fn test_calls_fail_after_server_shutdown() {
        let f = fixture(4).await;
        let alice = Client::connect(f.server.addr(), "alice-token").await.unwrap();
        f.server.shutdown();

        // The session closes asynchronously; keep asking until it is gone
        let mut closed = false;
        for _ in 0..50 {
            match alice.list_my_slots().await {
                Err(Error::ConnectionClosed) | Err(Error::NotConnected) => {
                    closed = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        assert!(closed);
    }
}
