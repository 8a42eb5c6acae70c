use crate::controller::{Action, SessionConfig, SessionController};
use crate::error::SessionError;
use crate::input::{parse_command, Command, HELP};
use crate::questions::QuestionBank;
use crate::rendering::{countdown_line, RenderConfig, Renderer};
use crate::utils::get_timestamp;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, normalize_code, validate_nickname, GameEvent, Packet, Phase, PlayerId,
    SessionCode, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, sleep_until, timeout, Instant};

/// How long lobby requests wait for the relay
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Silence after which the relay link counts as lost
pub const LINK_TIMEOUT: Duration = Duration::from_secs(5);

/// UDP link to the relay
pub struct RelayConnection {
    socket: UdpSocket,
    relay_addr: SocketAddr,
    fake_ping_ms: u64,
}

impl RelayConnection {
    pub async fn connect(relay_addr: &str, fake_ping_ms: u64) -> Result<Self, SessionError> {
        let relay_addr: SocketAddr = relay_addr
            .parse()
            .map_err(|_| SessionError::Config(format!("invalid relay address '{}'", relay_addr)))?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(Self {
            socket,
            relay_addr,
            fake_ping_ms,
        })
    }

    pub async fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode(packet)?;
        self.socket.send_to(&data, self.relay_addr).await?;
        Ok(())
    }

    /// Waits for the next decodable packet from the relay
    ///
    /// Datagrams from other senders and undecodable ones are skipped.
    pub async fn recv(&self, buffer: &mut [u8]) -> Result<Packet, SessionError> {
        loop {
            let (len, from) = self.socket.recv_from(buffer).await?;
            if from != self.relay_addr {
                debug!("Dropping datagram from unexpected sender {}", from);
                continue;
            }

            if self.fake_ping_ms > 0 {
                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
            }

            match decode(&buffer[..len]) {
                Ok(packet) => return Ok(packet),
                Err(e) => warn!("Undecodable packet from relay: {}", e),
            }
        }
    }

    /// Sends `packet` and waits for the first reply `accept` picks out
    async fn request<T, F>(&self, packet: &Packet, mut accept: F) -> Result<T, SessionError>
    where
        F: FnMut(Packet) -> Option<T>,
    {
        self.send(packet).await?;

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let wait = async {
            loop {
                let reply = self.recv(&mut buffer).await?;
                if let Some(value) = accept(reply) {
                    return Ok::<T, SessionError>(value);
                }
            }
        };

        match timeout(REQUEST_TIMEOUT, wait).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Unreachable {
                addr: self.relay_addr.to_string(),
                timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            }),
        }
    }

    /// Asks the relay for a fresh, unused session code
    pub async fn allocate_code(&self, host_id: &str) -> Result<SessionCode, SessionError> {
        let packet = Packet::AllocateCode {
            client_version: PROTOCOL_VERSION,
            host_id: host_id.to_string(),
        };
        self.request(&packet, |reply| match reply {
            Packet::CodeAllocated { code, host_id: id } if id == host_id => Some(code),
            _ => None,
        })
        .await
    }

    /// Asks the relay to admit `player_id` into session `code`
    ///
    /// Returns whether the relay already knew this id, and the session phase.
    pub async fn acknowledge_join(
        &self,
        code: &str,
        nickname: &str,
        player_id: &str,
    ) -> Result<(bool, Phase), SessionError> {
        let packet = Packet::JoinRequest {
            code: code.to_string(),
            nickname: nickname.to_string(),
            player_id: player_id.to_string(),
        };
        let reply = self
            .request(&packet, |reply| match reply {
                Packet::JoinAccepted {
                    player_id: id,
                    is_reconnect,
                    phase,
                    ..
                } if id == player_id => Some(Ok((is_reconnect, phase))),
                Packet::JoinRejected { reason } => Some(Err(reason)),
                _ => None,
            })
            .await?;
        Ok(reply?)
    }

    pub async fn subscribe(&self, channel: &str, subscriber_id: &str) -> Result<(), SessionError> {
        let packet = Packet::Subscribe {
            channel: channel.to_string(),
            subscriber_id: subscriber_id.to_string(),
        };
        self.request(&packet, |reply| match reply {
            Packet::Subscribed { channel: c } if c == channel => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<(), SessionError> {
        self.send(&Packet::Unsubscribe {
            channel: channel.to_string(),
        })
        .await
    }

    pub async fn publish(&self, channel: &str, event: GameEvent) -> Result<(), SessionError> {
        self.send(&Packet::Publish {
            channel: channel.to_string(),
            event,
        })
        .await
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }
}

/// Allocates a code, subscribes to it and returns the host controller
pub async fn create_session(
    connection: &RelayConnection,
    host_id: &str,
    config: SessionConfig,
) -> Result<SessionController, SessionError> {
    let code = connection.allocate_code(host_id).await?;
    connection.subscribe(&code, host_id).await?;
    info!("Session {} created", code);
    Ok(SessionController::host(host_id, code, config))
}

/// Validates input, asks the relay for admission and announces the player
///
/// Nothing is sent when the nickname or code fails local validation. The
/// returned actions carry the join announcement and must be executed.
pub async fn join_session(
    connection: &RelayConnection,
    code: &str,
    nickname: &str,
    player_id: &str,
    config: SessionConfig,
) -> Result<(SessionController, Vec<Action>), SessionError> {
    let nickname = validate_nickname(nickname)?;
    let code = normalize_code(code)?;

    let (is_reconnect, phase) = connection
        .acknowledge_join(&code, &nickname, player_id)
        .await?;
    connection.subscribe(&code, player_id).await?;
    info!(
        "Joined session {} as {} ({})",
        code,
        nickname,
        if is_reconnect { "reconnect" } else { "new" }
    );

    let mut controller = SessionController::player(player_id, nickname, code, phase, config);
    let actions = controller.announce(is_reconnect, get_timestamp());
    Ok((controller, actions))
}

/// Terminal client driving one session over the relay
pub struct Client {
    connection: RelayConnection,
    controller: SessionController,
    renderer: Renderer,
    /// Host only
    question_bank: Option<QuestionBank>,

    scheduled: Option<(Instant, u64)>,
    detached: bool,

    ping_ms: u64,
    last_ack: Instant,
    link_up: bool,
}

impl Client {
    pub fn new(
        connection: RelayConnection,
        controller: SessionController,
        question_bank: Option<QuestionBank>,
    ) -> Self {
        Client {
            connection,
            controller,
            renderer: Renderer::new(),
            question_bank,
            scheduled: None,
            detached: false,
            ping_ms: 0,
            last_ack: Instant::now(),
            link_up: true,
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(event) => {
                    let code = self.controller.code().to_string();
                    if let Err(e) = self.connection.publish(&code, event).await {
                        error!("Error publishing event: {}", e);
                    }
                }
                Action::ScheduleAdvance { delay, token } => {
                    self.scheduled = Some((Instant::now() + delay, token));
                }
                Action::Detach => {
                    let code = self.controller.code().to_string();
                    if let Err(e) = self.connection.unsubscribe(&code).await {
                        warn!("Error unsubscribing: {}", e);
                    }
                    self.detached = true;
                }
            }
        }
        self.render();
    }

    fn render(&mut self) {
        if self.detached {
            return;
        }
        let config = RenderConfig {
            local_id: self.controller.local_id(),
            is_host: self.controller.is_host(),
            fake_ping_ms: self.connection.fake_ping_ms,
        };
        if let Some(frame) = self.renderer.render(self.controller.replica(), &config) {
            println!("{}", frame);
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Deliver { channel, event } => {
                if channel != self.controller.code() {
                    debug!("Ignoring delivery for channel {}", channel);
                    return;
                }
                let actions = self.controller.handle_event(&event);
                self.execute(actions).await;
            }

            Packet::HeartbeatAck { timestamp } => {
                self.ping_ms = get_timestamp().saturating_sub(timestamp);
                self.last_ack = Instant::now();
                if !self.link_up {
                    self.restore_link().await;
                }
            }

            Packet::Subscribed { .. } => {}

            other => {
                warn!("Unexpected packet type: {:?}", other);
            }
        }
    }

    async fn restore_link(&mut self) {
        info!("Relay reachable again ({}ms)", self.ping_ms);
        let code = self.controller.code().to_string();
        let id = self.controller.local_id().to_string();
        if let Err(e) = self.connection.send(&Packet::Subscribe {
            channel: code,
            subscriber_id: id,
        })
        .await
        {
            error!("Error resubscribing: {}", e);
            return;
        }
        self.link_up = true;
        let actions = self.controller.resume(get_timestamp());
        self.execute(actions).await;
    }

    async fn on_second(&mut self) {
        let actions = self.controller.tick();
        let phase = self.controller.phase();
        self.execute(actions).await;

        if phase == Phase::Question && self.controller.phase() == Phase::Question {
            let timer = self.controller.replica().timer();
            let remaining = timer.remaining();
            if remaining <= 5 || remaining % 5 == 0 {
                println!("{}", countdown_line(timer));
            }
        }

        if let Err(e) = self
            .connection
            .send(&Packet::Heartbeat {
                timestamp: get_timestamp(),
            })
            .await
        {
            error!("Error sending heartbeat: {}", e);
        }

        if self.link_up && self.last_ack.elapsed() > LINK_TIMEOUT {
            warn!("No heartbeat ack for {:?}, relay link lost", LINK_TIMEOUT);
            self.link_up = false;
            self.controller.connection_lost();
            self.render();
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let actions = match command {
            Command::Start => {
                let game_length = self.controller.config().scoring.game_length;
                match &self.question_bank {
                    Some(bank) => {
                        let questions = bank.select(game_length, &mut rand::thread_rng());
                        self.controller.start(questions)
                    }
                    None => {
                        warn!("Only the host can start");
                        Vec::new()
                    }
                }
            }
            Command::Next => self.controller.advance(),
            Command::Reveal => self.controller.reveal(),
            Command::End => self.controller.end(),
            Command::Leave => self.controller.leave(),
            Command::Answer(index) => self.controller.submit_answer(index),
            Command::Help => {
                println!("{}", HELP);
                Vec::new()
            }
        };
        self.execute(actions).await;
    }

    pub async fn run(&mut self, initial: Vec<Action>) -> Result<(), SessionError> {
        println!("Session code: {}", self.controller.code());
        println!("{}", HELP);
        self.execute(initial).await;

        let mut second_interval = interval(Duration::from_secs(1));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        while !self.detached {
            let deadline = self.scheduled.map(|(at, _)| at).unwrap_or_else(Instant::now);
            let before = self.question_marker();

            tokio::select! {
                result = self.connection.recv(&mut buffer) => {
                    match result {
                        Ok(packet) => self.handle_packet(packet).await,
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = second_interval.tick() => {
                    self.on_second().await;
                },

                line = lines.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => {
                            match parse_command(&line) {
                                Some(command) => self.handle_command(command).await,
                                None if line.trim().is_empty() => {}
                                None => println!("Unknown command '{}', type 'help'", line.trim()),
                            }
                        }
                        Ok(None) => stdin_open = false,
                        Err(e) => {
                            error!("Error reading stdin: {}", e);
                            stdin_open = false;
                        }
                    }
                },

                _ = sleep_until(deadline), if self.scheduled.is_some() => {
                    if let Some((_, token)) = self.scheduled.take() {
                        let actions = self.controller.fire_scheduled(token);
                        self.execute(actions).await;
                    }
                },

                _ = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    info!("Interrupted, leaving session");
                    let actions = self.controller.leave();
                    self.execute(actions).await;
                },
            }

            // Count a fresh question from the moment it opened
            if entered_new_question(before, self.question_marker()) {
                second_interval.reset();
            }
        }

        Ok(())
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    fn question_marker(&self) -> (Phase, Option<usize>) {
        (self.controller.phase(), self.controller.replica().current_index())
    }
}

/// True when the replica moved into a question it was not showing before
fn entered_new_question(before: (Phase, Option<usize>), after: (Phase, Option<usize>)) -> bool {
    after.0 == Phase::Question && after != before
}

/// Creates a new session and runs it as host
pub async fn host_session(
    relay: &str,
    fake_ping_ms: u64,
    host_id: PlayerId,
    question_bank: QuestionBank,
    config: SessionConfig,
) -> Result<(), SessionError> {
    if question_bank.is_empty() {
        return Err(SessionError::QuestionBank("question bank is empty".to_string()));
    }
    let connection = RelayConnection::connect(relay, fake_ping_ms).await?;
    let controller = create_session(&connection, &host_id, config).await?;

    let mut client = Client::new(connection, controller, Some(question_bank));
    client.run(Vec::new()).await
}

/// Joins an existing session and runs it as a player
pub async fn play_session(
    relay: &str,
    fake_ping_ms: u64,
    player_id: PlayerId,
    code: &str,
    nickname: &str,
    config: SessionConfig,
) -> Result<(), SessionError> {
    let connection = RelayConnection::connect(relay, fake_ping_ms).await?;
    let (controller, actions) = join_session(&connection, code, nickname, &player_id, config).await?;

    let mut client = Client::new(connection, controller, None);
    client.run(actions).await
}
