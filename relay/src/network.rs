//! Relay network layer: UDP receive, channel fan-out and lobby requests

use crate::channel_manager::{ChannelManager, SubscribeError};
use crate::lobby::{LobbyChange, LobbyRegistry};
use log::{debug, error, info, warn};
use shared::{decode, encode, GameEvent, Packet, SessionCode, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main relay loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    SubscriberTimeout {
        channel: SessionCode,
        subscriber_id: String,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum RelayMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Deliver to every subscriber of `channel`, the publisher included
    FanOut {
        channel: SessionCode,
        packet: Packet,
    },
    /// Drop every subscription of `channel`
    CloseChannel { channel: SessionCode },
}

/// Relay server tunables
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub max_subscribers: usize,
    pub subscriber_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 64,
            subscriber_timeout: Duration::from_secs(10),
        }
    }
}

/// Pub/sub relay with a lobby registry on the side
pub struct Server {
    socket: Arc<UdpSocket>,
    channels: Arc<RwLock<ChannelManager>>,
    lobbies: LobbyRegistry,
    /// How long an allocated code may sit without a subscribed channel
    unclaimed_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: RelayConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            channels: Arc::new(RwLock::new(ChannelManager::new(
                config.max_subscribers,
                config.subscriber_timeout,
            ))),
            lobbies: LobbyRegistry::new(),
            unclaimed_timeout: config.subscriber_timeout,
            server_tx,
            server_rx,
            relay_tx,
            relay_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = decode(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        // ICMP port-unreachable from a vanished client surfaces here
                        debug!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let channels = Arc::clone(&self.channels);
        let mut relay_rx = std::mem::replace(&mut self.relay_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = relay_rx.recv().await {
                match message {
                    RelayMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    RelayMessage::FanOut { channel, packet } => {
                        let addrs = {
                            let channels_guard = channels.read().await;
                            channels_guard.subscriber_addrs(&channel)
                        };

                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to deliver on {} to {}: {}", channel, addr, e);
                            }
                        }
                    }
                    RelayMessage::CloseChannel { channel } => {
                        if channels.write().await.remove_channel(&channel) {
                            info!("Channel {} closed", channel);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that drops silent subscribers
    async fn spawn_timeout_checker(&self) {
        let channels = Arc::clone(&self.channels);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut channels_guard = channels.write().await;
                    channels_guard.check_timeouts()
                };

                for (channel, subscriber_id) in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::SubscriberTimeout {
                        channel,
                        subscriber_id,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.relay_tx.send(RelayMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn fan_out(&self, channel: SessionCode, event: GameEvent) {
        let packet = Packet::Deliver {
            channel: channel.clone(),
            event,
        };
        if let Err(e) = self.relay_tx.send(RelayMessage::FanOut { channel, packet }) {
            error!("Failed to queue delivery: {}", e);
        }
    }

    /// Drops the lobby of a channel nobody listens on any more
    async fn reap_if_empty(&mut self, channel: &str) {
        let empty = {
            let channels = self.channels.read().await;
            !channels.has_channel(channel)
        };
        if empty {
            self.lobbies.remove(channel);
        }
    }

    /// Releases codes whose host never subscribed
    async fn sweep_unclaimed_lobbies(&mut self) -> usize {
        let channels = self.channels.read().await;
        self.lobbies
            .expire_unclaimed(self.unclaimed_timeout, |code| channels.has_channel(code))
            .len()
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Subscribe {
                channel,
                subscriber_id,
            } => {
                let result = {
                    let mut channels = self.channels.write().await;
                    channels.subscribe(&channel, &subscriber_id, addr)
                };
                match result {
                    Ok(()) => self.send_packet(Packet::Subscribed { channel }, addr),
                    Err(SubscribeError::ChannelFull) => {
                        warn!("Channel {} full, refusing {}", channel, subscriber_id)
                    }
                }
            }

            Packet::Unsubscribe { channel } => {
                let removed = {
                    let mut channels = self.channels.write().await;
                    channels.unsubscribe(&channel, addr)
                };
                if removed {
                    self.reap_if_empty(&channel).await;
                }
            }

            Packet::Publish { channel, event } => {
                let subscribed = {
                    let mut channels = self.channels.write().await;
                    channels.touch(addr);
                    channels.is_subscribed(&channel, addr)
                };
                if !subscribed {
                    warn!("Dropping {} from non-subscriber {}", event.event_type(), addr);
                    return;
                }

                debug!("{} on {} from {}", event.event_type(), channel, addr);
                let change = self.lobbies.observe(&channel, &event);
                self.fan_out(channel.clone(), event);

                if change == LobbyChange::Closed {
                    // Queued behind the fan-out, so the last delivery still goes out
                    if let Err(e) = self.relay_tx.send(RelayMessage::CloseChannel { channel }) {
                        error!("Failed to queue channel close: {}", e);
                    }
                }
            }

            Packet::Heartbeat { timestamp } => {
                {
                    let mut channels = self.channels.write().await;
                    channels.touch(addr);
                }
                self.send_packet(Packet::HeartbeatAck { timestamp }, addr);
            }

            Packet::AllocateCode {
                client_version,
                host_id,
            } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} at {} speaks protocol {} (relay speaks {})",
                        host_id, addr, client_version, PROTOCOL_VERSION
                    );
                }
                let code = self.lobbies.allocate(&host_id);
                self.send_packet(Packet::CodeAllocated { code, host_id }, addr);
            }

            Packet::JoinRequest {
                code,
                nickname,
                player_id,
            } => {
                let response = match self.lobbies.acknowledge_join(&code, &nickname, &player_id) {
                    Ok(ack) => Packet::JoinAccepted {
                        code,
                        player_id,
                        is_reconnect: ack.is_reconnect,
                        phase: ack.phase,
                    },
                    Err(reason) => {
                        info!("Join to {} by {} rejected: {}", code, nickname, reason);
                        Packet::JoinRejected { reason }
                    }
                };
                self.send_packet(response, addr);
            }

            _ => {
                warn!("Unexpected packet type from {}", addr);
            }
        }
    }

    /// Main relay loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut stats_interval = interval(Duration::from_secs(30));
        let mut sweep_interval = interval(Duration::from_secs(1));

        info!("Relay started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::SubscriberTimeout { channel, subscriber_id }) => {
                            debug!("{} dropped from {}", subscriber_id, channel);
                            self.reap_if_empty(&channel).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Relay shutting down");
                            break;
                        }
                    }
                },

                _ = sweep_interval.tick() => {
                    let released = self.sweep_unclaimed_lobbies().await;
                    if released > 0 {
                        debug!("Released {} unclaimed codes", released);
                    }
                },

                _ = stats_interval.tick() => {
                    let channel_count = self.channels.read().await.len();
                    if channel_count > 0 || !self.lobbies.is_empty() {
                        debug!("{} channels, {} sessions", channel_count, self.lobbies.len());
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{JoinRejection, Phase};
    use tokio::time::timeout;

    async fn start_relay() -> SocketAddr {
        let mut server = Server::new("127.0.0.1:0", RelayConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn exchange(socket: &UdpSocket, relay: SocketAddr, packet: Packet) -> Packet {
        socket.send_to(&encode(&packet).unwrap(), relay).await.unwrap();
        recv(socket).await.expect("relay did not answer")
    }

    async fn recv(socket: &UdpSocket) -> Option<Packet> {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        match timeout(Duration::from_millis(500), socket.recv_from(&mut buffer)).await {
            Ok(Ok((len, _))) => Some(decode(&buffer[..len]).unwrap()),
            _ => None,
        }
    }

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let result = tokio_test::block_on(Server::new("not an address", RelayConfig::default()));
        assert!(result.is_err());
    }

    #[test]
    fn test_relay_message_fan_out() {
        let msg = RelayMessage::FanOut {
            channel: "WXYZ".to_string(),
            packet: Packet::Deliver {
                channel: "WXYZ".to_string(),
                event: GameEvent::GameStarted,
            },
        };
        match msg {
            RelayMessage::FanOut { channel, packet } => {
                assert_eq!(channel, "WXYZ");
                assert!(matches!(packet, Packet::Deliver { .. }));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_echoes_timestamp() {
        let relay = start_relay().await;
        let socket = client().await;

        let reply = exchange(&socket, relay, Packet::Heartbeat { timestamp: 1234 }).await;
        assert_eq!(reply, Packet::HeartbeatAck { timestamp: 1234 });
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_including_sender() {
        let relay = start_relay().await;
        let host = client().await;
        let player = client().await;

        let code = match exchange(
            &host,
            relay,
            Packet::AllocateCode {
                client_version: PROTOCOL_VERSION,
                host_id: "host".to_string(),
            },
        )
        .await
        {
            Packet::CodeAllocated { code, .. } => code,
            other => panic!("Unexpected reply: {:?}", other),
        };

        for (socket, id) in [(&host, "host"), (&player, "ana")] {
            let reply = exchange(
                socket,
                relay,
                Packet::Subscribe {
                    channel: code.clone(),
                    subscriber_id: id.to_string(),
                },
            )
            .await;
            assert_eq!(reply, Packet::Subscribed { channel: code.clone() });
        }

        let publish = Packet::Publish {
            channel: code.clone(),
            event: GameEvent::GameStarted,
        };
        host.send_to(&encode(&publish).unwrap(), relay).await.unwrap();

        let expected = Packet::Deliver {
            channel: code.clone(),
            event: GameEvent::GameStarted,
        };
        assert_eq!(recv(&host).await, Some(expected.clone()));
        assert_eq!(recv(&player).await, Some(expected));
    }

    #[tokio::test]
    async fn test_publish_from_non_subscriber_is_dropped() {
        let relay = start_relay().await;
        let listener = client().await;
        let outsider = client().await;

        exchange(
            &listener,
            relay,
            Packet::Subscribe {
                channel: "WXYZ".to_string(),
                subscriber_id: "l".to_string(),
            },
        )
        .await;

        let publish = Packet::Publish {
            channel: "WXYZ".to_string(),
            event: GameEvent::GameStarted,
        };
        outsider.send_to(&encode(&publish).unwrap(), relay).await.unwrap();
        assert_eq!(recv(&listener).await, None);
    }

    #[tokio::test]
    async fn test_join_flow() {
        let relay = start_relay().await;
        let host = client().await;
        let ana = client().await;

        let code = match exchange(
            &host,
            relay,
            Packet::AllocateCode {
                client_version: PROTOCOL_VERSION,
                host_id: "host".to_string(),
            },
        )
        .await
        {
            Packet::CodeAllocated { code, .. } => code,
            other => panic!("Unexpected reply: {:?}", other),
        };

        let reply = exchange(
            &ana,
            relay,
            Packet::JoinRequest {
                code: code.clone(),
                nickname: "Ana".to_string(),
                player_id: "a".to_string(),
            },
        )
        .await;
        assert_eq!(
            reply,
            Packet::JoinAccepted {
                code: code.clone(),
                player_id: "a".to_string(),
                is_reconnect: false,
                phase: Phase::Waiting,
            }
        );

        let reply = exchange(
            &ana,
            relay,
            Packet::JoinRequest {
                code: code.clone(),
                nickname: "ANA".to_string(),
                player_id: "b".to_string(),
            },
        )
        .await;
        assert_eq!(
            reply,
            Packet::JoinRejected {
                reason: JoinRejection::NicknameTaken
            }
        );

        let reply = exchange(
            &ana,
            relay,
            Packet::JoinRequest {
                code: "ZZZZ".to_string(),
                nickname: "Bo".to_string(),
                player_id: "b".to_string(),
            },
        )
        .await;
        assert_eq!(
            reply,
            Packet::JoinRejected {
                reason: JoinRejection::NotFound
            }
        );
    }

    #[tokio::test]
    async fn test_host_leaving_closes_session() {
        let relay = start_relay().await;
        let host = client().await;
        let ana = client().await;

        let code = match exchange(
            &host,
            relay,
            Packet::AllocateCode {
                client_version: PROTOCOL_VERSION,
                host_id: "host".to_string(),
            },
        )
        .await
        {
            Packet::CodeAllocated { code, .. } => code,
            other => panic!("Unexpected reply: {:?}", other),
        };

        for (socket, id) in [(&host, "host"), (&ana, "ana")] {
            exchange(
                socket,
                relay,
                Packet::Subscribe {
                    channel: code.clone(),
                    subscriber_id: id.to_string(),
                },
            )
            .await;
        }

        let left = Packet::Publish {
            channel: code.clone(),
            event: GameEvent::PlayerLeft {
                player_id: "host".to_string(),
            },
        };
        host.send_to(&encode(&left).unwrap(), relay).await.unwrap();

        // The departure itself is still delivered
        assert!(matches!(
            recv(&ana).await,
            Some(Packet::Deliver {
                event: GameEvent::PlayerLeft { .. },
                ..
            })
        ));

        let reply = exchange(
            &ana,
            relay,
            Packet::JoinRequest {
                code,
                nickname: "Ana".to_string(),
                player_id: "ana".to_string(),
            },
        )
        .await;
        assert_eq!(
            reply,
            Packet::JoinRejected {
                reason: JoinRejection::NotFound
            }
        );
    }

    #[tokio::test]
    async fn test_codes_without_subscribers_are_released() {
        let config = RelayConfig {
            max_subscribers: 8,
            subscriber_timeout: Duration::from_millis(10),
        };
        let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
        let host_addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        for i in 0..50 {
            server
                .handle_packet(
                    Packet::AllocateCode {
                        client_version: PROTOCOL_VERSION,
                        host_id: format!("host-{}", i),
                    },
                    host_addr,
                )
                .await;
        }
        server
            .handle_packet(
                Packet::AllocateCode {
                    client_version: PROTOCOL_VERSION,
                    host_id: "live".to_string(),
                },
                host_addr,
            )
            .await;
        // Allocation is idempotent per host, so this is the code handed out above
        let live_code = server.lobbies.allocate("live");
        server
            .handle_packet(
                Packet::Subscribe {
                    channel: live_code.clone(),
                    subscriber_id: "live".to_string(),
                },
                host_addr,
            )
            .await;
        assert_eq!(server.lobbies.len(), 51);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.sweep_unclaimed_lobbies().await, 50);
        assert_eq!(server.lobbies.len(), 1);
        assert!(server.lobbies.get(&live_code).is_some());
    }
}
