use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch, Mutex, Notify, OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::codec::direction::Direction;
use crate::codec::message::Message;
use crate::codec::packet::Packet;
use crate::dispatch::{self, BrokerResponse, IncomingMessageKind, RequestBroker};
use crate::error::{GextError, Result};
use crate::extension_info::ExtensionInfo;
use crate::link::{HostLink, SharedHostLink};
use crate::registry::info::PacketInfoTable;
use crate::registry::intercept::{Callback, InterceptKey, InterceptMode, InterceptorRegistry};

tokio::task_local! {
    static IN_MANIPULATOR: bool;
}

fn in_manipulator_thread() -> bool {
    IN_MANIPULATOR.try_with(|v| *v).unwrap_or(false)
}

/// Connection metadata present between CONNECTION_START and CONNECTION_END
/// (spec §3 "Connection info").
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: i32,
    pub hotel_version: String,
    pub client_identifier: String,
    pub client_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeState {
    New,
    Starting,
    Running,
    Closed,
}

/// A callback registered via [`Runtime::on_event`].
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Top-level extension handle: owns the host link, the interceptor and
/// packet-info registries, the request broker, and the lifecycle state
/// machine from spec §4.H. Built once per extension process and shared as
/// an `Arc` across the reader, manipulator, and any user-spawned tasks.
pub struct Runtime {
    port: u16,
    info: ExtensionInfo,
    state: Mutex<RuntimeState>,
    link_cell: OnceCell<SharedHostLink>,
    registry: RwLock<InterceptorRegistry>,
    packet_info_table: RwLock<PacketInfoTable>,
    connection_info: RwLock<Option<ConnectionInfo>>,
    broker: Arc<RequestBroker>,
    events: RwLock<HashMap<String, Vec<EventCallback>>>,
    lost_packets: AtomicU64,
    start_barrier: Notify,
    await_connect_packet: AtomicBool,
    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,
}

impl Runtime {
    pub fn new(port: u16, info: ExtensionInfo) -> Arc<Self> {
        let (close_tx, close_rx) = watch::channel(false);
        Arc::new(Runtime {
            port,
            info,
            state: Mutex::new(RuntimeState::New),
            link_cell: OnceCell::new(),
            registry: RwLock::new(InterceptorRegistry::new()),
            packet_info_table: RwLock::new(PacketInfoTable::new()),
            connection_info: RwLock::new(None),
            broker: Arc::new(RequestBroker::new()),
            events: RwLock::new(HashMap::new()),
            lost_packets: AtomicU64::new(0),
            start_barrier: Notify::new(),
            await_connect_packet: AtomicBool::new(false),
            close_tx,
            close_rx,
        })
    }

    fn host_link(&self) -> &HostLink {
        self.link_cell
            .get()
            .expect("Runtime::start must complete before the link is used")
    }

    fn release_start_barrier(&self) {
        self.start_barrier.notify_one();
    }

    pub async fn is_closed(&self) -> bool {
        self.link_cell.get().is_none() || matches!(*self.state.lock().await, RuntimeState::Closed)
    }

    pub fn lost_packet_count(&self) -> u64 {
        self.lost_packets.load(Ordering::Relaxed)
    }

    pub async fn connection_info(&self) -> Option<ConnectionInfo> {
        self.connection_info.read().await.clone()
    }

    // --- lifecycle ---

    /// Connects to the host, spawns the reader and manipulator tasks, and
    /// blocks until the start barrier releases (immediately after INIT, or
    /// after CONNECTION_START if the extension signaled `await_connect`).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, RuntimeState::New | RuntimeState::Closed) {
                return Err(GextError::State(
                    "start() called while already starting or running".into(),
                ));
            }
            *state = RuntimeState::Starting;
        }

        self.info.validate()?;

        let host_link: SharedHostLink = Arc::new(HostLink::connect(self.port).await?);
        self.link_cell
            .set(host_link)
            .map_err(|_| GextError::State("Runtime::start called more than once".into()))?;

        let (manip_tx, manip_rx) = mpsc::channel(64);
        tokio::spawn(Arc::clone(self).run_manipulator(manip_rx));
        tokio::spawn(Arc::clone(self).run_reader(manip_tx));

        self.start_barrier.notified().await;

        *self.state.lock().await = RuntimeState::Running;
        info!(port = self.port, "extension runtime started");
        Ok(())
    }

    /// Closes the socket and signals the reader/manipulator to exit.
    /// Idempotent: stopping an already-closed runtime is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if matches!(*self.state.lock().await, RuntimeState::Closed) {
            return Ok(());
        }
        self.close().await;
        Ok(())
    }

    async fn close(&self) {
        *self.state.lock().await = RuntimeState::Closed;
        let _ = self.close_tx.send(true);
        if let Some(link) = self.link_cell.get() {
            let _ = link.shutdown().await;
        }
        *self.connection_info.write().await = None;
        self.broker.fail_pending().await;
        // Unstick start() if the host vanished before ever releasing it.
        self.release_start_barrier();
    }

    async fn run_reader(self: Arc<Self>, manip_tx: mpsc::Sender<Message>) {
        let mut close_rx = self.close_rx.clone();
        loop {
            tokio::select! {
                biased;
                _ = close_rx.changed() => {
                    debug!("reader observed close signal");
                    break;
                }
                result = self.host_link().read_packet() => {
                    match result {
                        Ok(Some(mut packet)) => {
                            if let Err(e) = self.handle_incoming(&mut packet, &manip_tx).await {
                                warn!(error = %e, "dispatch error, closing connection");
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("host closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "framing error, closing connection");
                            break;
                        }
                    }
                }
            }
        }
        self.close().await;
    }

    async fn run_manipulator(self: Arc<Self>, rx: mpsc::Receiver<Message>) {
        IN_MANIPULATOR
            .scope(true, Self::drain_manipulation_queue(self.clone(), rx))
            .await;
        debug!("manipulator exiting");
    }

    async fn drain_manipulation_queue(self: Arc<Self>, mut rx: mpsc::Receiver<Message>) {
        while let Some(mut message) = rx.recv().await {
            self.manipulate(&mut message).await;
        }
    }

    async fn handle_incoming(
        &self,
        packet: &mut Packet,
        manip_tx: &mpsc::Sender<Message>,
    ) -> Result<()> {
        let id = packet.header_id();
        let kind = dispatch::require_kind(id)?;

        match kind {
            IncomingMessageKind::OnDoubleClick => {
                self.raise_event("double_click").await;
            }
            IncomingMessageKind::InfoRequest => {
                let response = dispatch::build_extension_info(&self.info);
                self.host_link().write_packet(&response).await?;
            }
            IncomingMessageKind::PacketIntercept => {
                let message = dispatch::parse_packet_intercept(packet)?;
                if manip_tx.send(message).await.is_err() {
                    warn!("manipulation queue closed, dropping intercept");
                }
            }
            IncomingMessageKind::FlagsCheck => {
                let flags = dispatch::parse_flags_check(packet);
                self.broker.resolve(BrokerResponse::Flags(flags)).await;
            }
            IncomingMessageKind::ConnectionStart => {
                let parsed = dispatch::parse_connection_start(packet)?;
                *self.packet_info_table.write().await = parsed.info_table;
                *self.connection_info.write().await = Some(ConnectionInfo {
                    host: parsed.host,
                    port: parsed.port,
                    hotel_version: parsed.hotel_version,
                    client_identifier: parsed.client_identifier,
                    client_type: parsed.client_type,
                });
                if self.await_connect_packet.load(Ordering::SeqCst) {
                    self.release_start_barrier();
                }
                info!("connection_start");
                self.raise_event("connection_start").await;
            }
            IncomingMessageKind::ConnectionEnd => {
                *self.connection_info.write().await = None;
                self.packet_info_table.write().await.clear();
                info!("connection_end");
                self.raise_event("connection_end").await;
            }
            IncomingMessageKind::Init => {
                let log = dispatch::build_console_log("green", "", "extension initialized");
                self.host_link().write_packet(&log).await?;
                let await_connect = dispatch::parse_init(packet);
                self.await_connect_packet.store(await_connect, Ordering::SeqCst);
                if !await_connect {
                    self.release_start_barrier();
                }
                info!("init");
                self.raise_event("init").await;
            }
            IncomingMessageKind::PacketToStringResponse => {
                let (text, expression) = dispatch::parse_packet_to_string_response(packet);
                self.broker
                    .resolve(BrokerResponse::PacketText { text, expression })
                    .await;
            }
            IncomingMessageKind::StringToPacketResponse => {
                let resolved = dispatch::parse_string_to_packet_response(packet)?;
                self.broker.resolve(BrokerResponse::Packet(resolved)).await;
            }
        }
        Ok(())
    }

    async fn raise_event(&self, name: &str) {
        let callbacks = {
            let events = self.events.read().await;
            events.get(name).cloned().unwrap_or_default()
        };
        if callbacks.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for cb in callbacks {
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb())) {
                    warn!(reason = %panic_message(&panic), "event callback panicked");
                }
            }
        });
    }

    // --- registration ---

    pub async fn on_event(&self, name: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) {
        self.events
            .write()
            .await
            .entry(name.into())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Registers `callback` for `direction` under `identifier`, wrapped for
    /// `mode` per spec §4.D. `ASYNC_MODIFY` holds only a weak reference back
    /// to the runtime to re-emit the packet, avoiding a reference cycle
    /// through the registry it is stored in.
    pub async fn intercept(
        self: &Arc<Self>,
        direction: Direction,
        identifier: impl Into<InterceptKey>,
        mode: InterceptMode,
        callback: impl Fn(&mut Message) + Send + Sync + 'static,
    ) {
        let key = identifier.into();
        let wrapped: Callback = match mode {
            InterceptMode::Blocking => Arc::new(callback) as Callback,
            InterceptMode::AsyncObserve => {
                let user: Callback = Arc::new(callback) as Callback;
                Arc::new(move |message: &mut Message| {
                    let mut copy = message.share();
                    let user = user.clone();
                    tokio::spawn(async move {
                        invoke_callback(&user, &mut copy);
                    });
                }) as Callback
            }
            InterceptMode::AsyncModify => {
                let user: Callback = Arc::new(callback) as Callback;
                let runtime: Weak<Runtime> = Arc::downgrade(self);
                Arc::new(move |message: &mut Message| {
                    message.blocked = true;
                    let mut copy = message.share();
                    copy.blocked = false;
                    let user = user.clone();
                    let runtime = runtime.clone();
                    tokio::spawn(async move {
                        invoke_callback(&user, &mut copy);
                        if !copy.blocked {
                            if let Some(runtime) = runtime.upgrade() {
                                runtime.emit(copy.direction, copy.packet).await;
                            }
                        }
                    });
                }) as Callback
            }
        };
        self.registry.write().await.register(direction, key, wrapped);
    }

    pub async fn remove_intercept(&self, identifier: impl Into<InterceptKey>) {
        self.registry.write().await.remove(&identifier.into());
    }

    // --- manipulation pipeline ---

    async fn manipulate(&self, message: &mut Message) {
        let direction = message.direction;
        let header_id = message.packet.header_id();

        let catch_all = {
            let registry = self.registry.read().await;
            registry.catch_all(direction).to_vec()
        };
        for cb in &catch_all {
            message.packet.reset();
            invoke_callback(cb, message);
        }

        let mut candidates = vec![InterceptKey::Id(header_id)];
        {
            let table = self.packet_info_table.read().await;
            candidates.extend(
                table
                    .names_and_hashes_for_id(direction, header_id)
                    .into_iter()
                    .map(InterceptKey::Name),
            );
        }

        for key in &candidates {
            let callbacks = {
                let registry = self.registry.read().await;
                registry.for_key(direction, key).to_vec()
            };
            for cb in &callbacks {
                message.packet.reset();
                invoke_callback(cb, message);
            }
        }

        let response = dispatch::build_manipulated_packet(message);
        if let Err(e) = self.host_link().write_packet(&response).await {
            warn!(error = %e, "failed to send manipulated packet");
        }
    }

    // --- sending ---

    async fn emit(&self, direction: Direction, mut packet: Packet) {
        self.send(direction, &mut packet).await;
    }

    pub async fn send_to_client(&self, packet: &mut Packet) -> bool {
        self.send(Direction::ToClient, packet).await
    }

    pub async fn send_to_server(&self, packet: &mut Packet) -> bool {
        self.send(Direction::ToServer, packet).await
    }

    pub async fn send_to_client_text(&self, text: &str) -> bool {
        self.send_text(Direction::ToClient, text).await
    }

    pub async fn send_to_server_text(&self, text: &str) -> bool {
        self.send_text(Direction::ToServer, text).await
    }

    async fn send_text(&self, direction: Direction, text: &str) -> bool {
        match self.string_to_packet(text).await {
            Ok(mut packet) => self.send(direction, &mut packet).await,
            Err(e) => {
                warn!(error = %e, "could not resolve text to packet for send");
                self.lost_packets.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Spec §4.H "Sending": close/resolution/connection/corruption checks
    /// each bump the lost-packet counter and bail, otherwise a SEND_MESSAGE
    /// envelope goes out under the host link's stream mutex. A packet's
    /// deferred id is restored on every exit past a successful `fill_id`
    /// (not just a successful send) so the caller's own copy is never left
    /// observably resolved.
    async fn send(&self, direction: Direction, packet: &mut Packet) -> bool {
        if self.is_closed().await {
            self.lost_packets.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let deferred_snapshot = if packet.is_incomplete() {
            let name = packet.deferred_id().expect("is_incomplete implies Some").to_string();
            let edited = packet.edited();
            let table = self.packet_info_table.read().await;
            if !packet.fill_id(direction, Some(&table)) {
                self.lost_packets.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Some((name, edited))
        } else {
            None
        };

        if self.connection_info.read().await.is_none() {
            self.lost_packets.fetch_add(1, Ordering::Relaxed);
            if let Some((name, edited)) = deferred_snapshot {
                packet.restore_deferred(name, edited);
            }
            return false;
        }

        if packet.is_corrupted() {
            self.lost_packets.fetch_add(1, Ordering::Relaxed);
            if let Some((name, edited)) = deferred_snapshot {
                packet.restore_deferred(name, edited);
            }
            return false;
        }

        let envelope = dispatch::build_send_message(direction, packet.raw());
        let result = self.host_link().write_packet(&envelope).await;

        if let Some((name, edited)) = deferred_snapshot {
            packet.restore_deferred(name, edited);
        }

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                self.lost_packets.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    // --- synchronous helpers (spec §4.G) ---

    /// Spec §9 open question (3): the source resolves `send_to_*(string)`
    /// synchronously, which deadlocks if called from inside a blocking
    /// interceptor. This runtime does not replicate that deadlock: any
    /// synchronous helper invoked from the manipulator task fails fast with
    /// `GextError::State` instead of hanging.
    fn ensure_not_manipulator_thread(&self) -> Result<()> {
        if in_manipulator_thread() {
            return Err(GextError::State(
                "synchronous helper called from the manipulator thread would deadlock".into(),
            ));
        }
        Ok(())
    }

    pub async fn request_flags(&self) -> Result<Vec<String>> {
        self.ensure_not_manipulator_thread()?;
        let _guard = self.broker.acquire().await;
        let rx = self.broker.register().await;
        self.host_link()
            .write_packet(&dispatch::build_request_flags())
            .await?;
        match self.broker.wait(rx).await? {
            BrokerResponse::Flags(flags) => Ok(flags),
            _ => Err(GextError::State("unexpected response kind for request_flags".into())),
        }
    }

    /// Sends its own PACKET_TO_STRING_REQUEST, as does
    /// [`Runtime::packet_to_expression`]; spec §4.G notes the host's single
    /// response carries both values, but this keeps the two helpers
    /// independent rather than caching across calls.
    pub async fn packet_to_string(&self, packet: &Packet) -> Result<String> {
        self.ensure_not_manipulator_thread()?;
        let _guard = self.broker.acquire().await;
        let rx = self.broker.register().await;
        self.host_link()
            .write_packet(&dispatch::build_packet_to_string_request(packet))
            .await?;
        match self.broker.wait(rx).await? {
            BrokerResponse::PacketText { text, .. } => Ok(text),
            _ => Err(GextError::State("unexpected response kind for packet_to_string".into())),
        }
    }

    pub async fn packet_to_expression(&self, packet: &Packet) -> Result<String> {
        self.ensure_not_manipulator_thread()?;
        let _guard = self.broker.acquire().await;
        let rx = self.broker.register().await;
        self.host_link()
            .write_packet(&dispatch::build_packet_to_string_request(packet))
            .await?;
        match self.broker.wait(rx).await? {
            BrokerResponse::PacketText { expression, .. } => Ok(expression),
            _ => Err(GextError::State(
                "unexpected response kind for packet_to_expression".into(),
            )),
        }
    }

    pub async fn string_to_packet(&self, text: &str) -> Result<Packet> {
        self.ensure_not_manipulator_thread()?;
        let _guard = self.broker.acquire().await;
        let rx = self.broker.register().await;
        self.host_link()
            .write_packet(&dispatch::build_string_to_packet_request(text))
            .await?;
        match self.broker.wait(rx).await? {
            BrokerResponse::Packet(packet) => Ok(packet),
            _ => Err(GextError::State("unexpected response kind for string_to_packet".into())),
        }
    }
}

fn invoke_callback(cb: &Callback, message: &mut Message) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(message))) {
        warn!(
            reason = %panic_message(&panic),
            "intercept callback panicked; packet left as last seen"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
