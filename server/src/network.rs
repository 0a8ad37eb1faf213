//! Server network layer handling WebSocket connections and the game loop
//!
//! One actor task owns the `GameState` and the `ClientManager`. Connection
//! tasks never touch either; they forward events over a channel and drain a
//! bounded outbound queue. The simulation tick and the round clock are two
//! timers inside the same `select!`, so every mutation happens one at a time
//! and each broadcast sees a complete step.

use crate::client_manager::{ClientManager, Delivery};
use crate::config::GameConfig;
use crate::error::ServerError;
use crate::game::GameState;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, SERVER_FULL_REASON};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Period of the round clock check
pub const ROUND_CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// How long a rejected peer gets to acknowledge the close frame
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// How long a released connection's writer may keep flushing before it is aborted
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Messages sent from connection tasks to the game loop
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        addr: SocketAddr,
        outbound: mpsc::Sender<Message>,
        /// Fired by the registry when it removes the client
        release: oneshot::Sender<()>,
        /// Receives the assigned id, or None when the arena is full
        reply: oneshot::Sender<Option<PlayerId>>,
    },
    PacketReceived {
        client_id: PlayerId,
        packet: Packet,
    },
    ClientDisconnected {
        client_id: PlayerId,
    },
    Shutdown,
}

/// Cloneable handle used to stop a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    /// Asks the game loop to stop. Returns false if it already has.
    pub fn shutdown(&self) -> bool {
        self.server_tx.send(ServerMessage::Shutdown).is_ok()
    }
}

/// Main server coordinating connections and game simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    game_state: GameState,
    tick_duration: Duration,
    queue_capacity: usize,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: GameConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(config.max_players),
            tick_duration: config.tick_duration(),
            queue_capacity: config.outbound_queue_capacity,
            game_state: GameState::new(config, Instant::now()),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task that accepts TCP connections and hands each one to
    /// its own connection task
    fn spawn_acceptor(&mut self) -> Option<JoinHandle<()>> {
        let listener = self.listener.take()?;
        let server_tx = self.server_tx.clone();
        let queue_capacity = self.queue_capacity;

        Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let server_tx = server_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, addr, server_tx, queue_capacity).await
                            {
                                warn!("Connection from {} failed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ClientConnected {
                addr,
                outbound,
                release,
                reply,
            } => {
                let client_id = self.handle_connect(addr, outbound, release);
                if reply.send(client_id).is_err() {
                    // The connection task died before hearing back
                    if let Some(client_id) = client_id {
                        self.handle_disconnect(client_id);
                    }
                }
            }
            ServerMessage::PacketReceived { client_id, packet } => {
                self.handle_packet(client_id, packet);
            }
            ServerMessage::ClientDisconnected { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerMessage::Shutdown => {}
        }
    }

    /// Admits a connection, spawns its player and greets it
    ///
    /// Everyone (the newcomer included) gets the new player count first,
    /// then the newcomer gets its `init`. At capacity nothing changes and
    /// None is returned.
    fn handle_connect(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Message>,
        release: oneshot::Sender<()>,
    ) -> Option<PlayerId> {
        let Some(client_id) = self.clients.add_client(addr, outbound, release) else {
            info!(
                "Rejecting connection from {}: server full ({} players)",
                addr,
                self.clients.len()
            );
            return None;
        };

        let player_name = self
            .clients
            .get(&client_id)
            .map(|client| client.display_name.clone())
            .unwrap_or_default();
        let player_color = self.game_state.add_player(client_id, player_name.clone());

        self.broadcast_player_count();

        let init = Packet::Init {
            player_id: client_id,
            game_state: self.game_state.snapshot(Instant::now()),
            player_color,
            player_name,
        };
        self.send_packet(client_id, &init);

        Some(client_id)
    }

    /// Removes the client and its player. Repeated calls are no-ops.
    fn handle_disconnect(&mut self, client_id: PlayerId) {
        let removed = self.clients.remove_client(&client_id);
        self.game_state.remove_player(&client_id);

        if removed {
            self.broadcast_player_count();
        }
    }

    fn handle_packet(&mut self, client_id: PlayerId, packet: Packet) {
        match packet {
            Packet::Input { player_id, input } => {
                // A connection may only steer its own player
                if player_id != client_id {
                    debug!(
                        "Ignoring input from client {} for player {}",
                        client_id, player_id
                    );
                    return;
                }
                if !self.game_state.update_player_input(player_id, input) {
                    debug!("Ignoring input for unknown player {}", player_id);
                }
            }
            other => {
                debug!(
                    "Ignoring {} message from client {}",
                    other.kind(),
                    client_id
                );
            }
        }
    }

    /// One simulation tick: physics step, then a snapshot for everyone
    fn run_tick(&mut self, now: Instant) {
        self.game_state.update_physics();

        if self.clients.is_empty() {
            return;
        }

        let update = Packet::Update {
            game_state: self.game_state.snapshot(now),
        };
        self.broadcast_packet(&update);

        // Periodic performance monitoring
        if self.game_state.tick % 60 == 0 {
            debug!(
                "Tick {}: {} clients, round {}, star at ({:.1}, {:.1})",
                self.game_state.tick,
                self.clients.len(),
                self.game_state.round.number(),
                self.game_state.star.x,
                self.game_state.star.y
            );
        }
    }

    /// Round clock check; announces the winner when a round ends
    fn run_round_clock(&mut self, now: Instant) {
        if let Some(summary) = self.game_state.check_round(now) {
            let round_end = Packet::RoundEnd {
                round: summary.round,
                winner: summary.winner_name,
            };
            self.broadcast_packet(&round_end);
        }
    }

    fn broadcast_player_count(&mut self) {
        let count = Packet::PlayerCount {
            count: self.clients.len(),
        };
        self.broadcast_packet(&count);
    }

    fn send_packet(&mut self, client_id: PlayerId, packet: &Packet) {
        let text = match packet.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} packet: {}", packet.kind(), e);
                return;
            }
        };

        if self.clients.send_to(&client_id, &text) == Delivery::Full {
            self.drop_slow_client(client_id);
        }
    }

    fn broadcast_packet(&mut self, packet: &Packet) {
        let text = match packet.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} packet: {}", packet.kind(), e);
                return;
            }
        };

        for client_id in self.clients.broadcast(&text) {
            self.drop_slow_client(client_id);
        }
    }

    fn drop_slow_client(&mut self, client_id: PlayerId) {
        warn!("Dropping client {}: outbound queue full", client_id);
        self.handle_disconnect(client_id);
    }

    /// Main server loop coordinating all operations
    ///
    /// Runs until `ServerHandle::shutdown` is called, then closes every
    /// connection with a normal close frame.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let acceptor = self.spawn_acceptor();

        let start = Instant::now();
        let mut tick_interval = interval_at(start + self.tick_duration, self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut round_interval = interval_at(start + ROUND_CLOCK_PERIOD, ROUND_CLOCK_PERIOD);
        round_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started successfully ({} Hz, {} players max)",
            self.game_state.config().tick_rate,
            self.game_state.config().max_players
        );

        loop {
            tokio::select! {
                // Handle connection events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(message) => self.handle_message(message),
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick(Instant::now());
                },

                _ = round_interval.tick() => {
                    self.run_round_clock(Instant::now());
                },
            }
        }

        if let Some(acceptor) = acceptor {
            acceptor.abort();
        }
        let closed = self.clients.close_all("Server shutting down");
        info!("Closed {} connections", closed);

        Ok(())
    }
}

/// Drives one WebSocket connection from handshake to cleanup
///
/// The game loop decides admission. A rejected peer gets a normal close
/// frame carrying the capacity reason and nothing else. An admitted peer gets
/// a writer task draining its outbound queue while this task forwards
/// incoming frames until the peer goes away or the game loop releases the
/// client. A writer still stuck on a stalled socket after that is aborted,
/// which drops the socket.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    queue_capacity: usize,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Handshake(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(queue_capacity);
    let (release_tx, mut release_rx) = oneshot::channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    server_tx
        .send(ServerMessage::ClientConnected {
            addr,
            outbound: outbound_tx,
            release: release_tx,
            reply: reply_tx,
        })
        .map_err(|_| ServerError::Network("game loop is not running".into()))?;

    let client_id = match reply_rx.await {
        Ok(Some(client_id)) => client_id,
        Ok(None) => {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: SERVER_FULL_REASON.to_string().into(),
            }));
            if let Err(e) = ws_sender.send(close).await {
                debug!("Failed to send close frame to {}: {}", addr, e);
                return Ok(());
            }
            // Wait briefly for the peer to finish the close handshake
            let _ = tokio::time::timeout(REJECT_LINGER, async {
                while let Some(Ok(_)) = ws_receiver.next().await {}
            })
            .await;
            return Ok(());
        }
        Err(_) => {
            return Err(ServerError::Network("game loop dropped the connection".into()));
        }
    };

    // Outgoing message task
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_sender.send(message).await {
                debug!("Failed to send to client {}: {}", client_id, e);
                return;
            }
            if closing {
                return;
            }
        }
        // The game loop let go of this client
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let Some(result) = incoming else { break };
                match result {
                    Ok(Message::Text(text)) => match Packet::decode(&text) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { client_id, packet })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => debug!("Ignoring message from client {}: {}", client_id, e),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Client {} requested close", client_id);
                        break;
                    }
                    Ok(Message::Binary(_)) => {
                        debug!("Ignoring binary frame from client {}", client_id);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("WebSocket error for client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            // Fires on removal, or when the registry itself is dropped
            _ = &mut release_rx => {
                debug!("Client {} released by the game loop", client_id);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::ClientDisconnected { client_id });
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        warn!("Writer for client {} stalled, dropping the socket", client_id);
        writer.abort();
    }
    Ok(())
}
