//! Serial link manager with superseding connects and an independent read loop

use crate::connection::cancel::CancelFlag;
use crate::connection::link::{LinkReader, LinkSlot, LinkWriter};
use crate::connection::listener::{LinkEvent, LinkListener};
use crate::transport::{LinkStream, TransportProvider};
use blueremote_shared::codec::{self, Framing, InboundDecoder, READ_BUFFER_SIZE};
use blueremote_shared::{
    DeviceId, LinkError, LinkState, LinkStateMachine, LinkTransition, RemoteCommand,
    TransitionResult, SPP_SERVICE_UUID,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for the link manager
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Size of the buffer each read fills
    pub read_buffer_size: usize,
    /// Give up on a connect attempt after this long
    pub connect_timeout: Option<Duration>,
    /// How inbound reads become messages
    pub framing: Framing,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            connect_timeout: Some(Duration::from_secs(30)),
            framing: Framing::Chunk,
        }
    }
}

/// State guarded by the manager lock. Every listener notification is queued
/// while holding it, which keeps notifications in transition order.
struct Shared {
    fsm: LinkStateMachine,
    /// Bumped by every connect and close; tasks compare it before each side effect
    generation: u64,
    device: Option<DeviceId>,
    link: Option<LinkSlot>,
    writer: Option<Arc<AsyncMutex<LinkWriter>>>,
    cancel: Option<CancelFlag>,
    /// Connect and read-loop tasks of the current lifecycle
    tasks: Vec<JoinHandle<()>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn notify(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    /// Stop the lifecycle's tasks and drop the link before returning.
    /// Never fails and never waits on a pending read or write.
    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }

        self.writer = None;
        if let Some(link) = self.link.take() {
            if link.release() {
                debug!("[LINK] Link released");
            }
        }
    }

    /// Release the link and apply `event`, notifying once if a lifecycle ended
    fn end(&mut self, event: LinkTransition) {
        self.release();

        match self.fsm.process_event(event) {
            TransitionResult::Ended { from } => {
                debug!("[LINK] Lifecycle ended from {} on {:?}", from, event);
                self.device = None;
                self.notify(LinkEvent::Disconnected);
            }
            TransitionResult::Unchanged => {}
            other => warn!("[LINK] Unexpected transition on {:?}: {:?}", event, other),
        }
    }
}

/// Everything a spawned task needs
#[derive(Clone)]
struct LinkContext {
    provider: Arc<dyn TransportProvider>,
    config: LinkConfig,
    shared: Arc<Mutex<Shared>>,
    runtime: Handle,
}

impl LinkContext {
    async fn open(&self, device: &DeviceId) -> Result<LinkStream, LinkError> {
        let open = self.provider.open_stream(device, SPP_SERVICE_UUID);

        let result = match self.config.connect_timeout {
            Some(limit) => timeout(limit, open)
                .await
                .map_err(|_| LinkError::ConnectTimeout(limit))?,
            None => open.await,
        };

        result.map_err(|e| LinkError::ConnectFailed(format!("{:#}", e)))
    }

    /// Connection-attempt task
    async fn run_connect(self, device: DeviceId, generation: u64, cancel: CancelFlag) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("[LINK] Connect to {} superseded", device);
                return;
            }
            result = self.open(&device) => result,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[LINK] {} ({})", e, device);
                let mut shared = self.shared.lock();
                if shared.is_current(generation) {
                    shared.end(LinkTransition::Failed);
                }
                return;
            }
        };

        let state = self.shared.clone();
        let mut shared = state.lock();
        if !shared.is_current(generation) {
            debug!("[LINK] Discarding stale link to {}", device);
            return;
        }

        let (link, reader, writer) = LinkSlot::open(stream);
        shared.link = Some(link);
        shared.writer = Some(Arc::new(AsyncMutex::new(writer)));
        shared.fsm.process_event(LinkTransition::Opened);
        shared.notify(LinkEvent::Connected(device.clone()));
        info!("[LINK] Connected to {} via {}", device, self.provider.name());

        let runtime = self.runtime.clone();
        let read_loop = runtime.spawn(self.run_read_loop(reader, device, generation, cancel));
        shared.tasks.push(read_loop);
    }

    /// Read-loop task, bound to one link
    async fn run_read_loop(
        self,
        mut reader: LinkReader,
        device: DeviceId,
        generation: u64,
        cancel: CancelFlag,
    ) {
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut decoder = InboundDecoder::new(self.config.framing);
        debug!("[LINK] Reading from {} ({:?} framing)", device, decoder.framing());

        let failure = loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("[LINK] Read loop for {} cancelled", device);
                    return;
                }
                read = reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => break None,
                Ok(n) => {
                    let messages = decoder.push(&buf[..n]);
                    let shared = self.shared.lock();
                    if !shared.is_current(generation) {
                        return;
                    }
                    for message in messages {
                        shared.notify(LinkEvent::MessageReceived(message));
                    }
                }
                Err(e) => break Some(LinkError::ReadFailed(e)),
            }
        };

        let mut shared = self.shared.lock();
        if !shared.is_current(generation) {
            return;
        }

        match failure {
            None => info!("[LINK] {} closed the link", device),
            Some(e) => warn!("[LINK] Link to {} lost: {}", device, e),
        }
        shared.end(LinkTransition::Lost);
    }
}

/// Owns the single serial link to a peripheral.
///
/// `connect` and `close` never block; the attempt and the read loop run as
/// tasks on the runtime the manager was created on. The link itself is
/// dropped inside `close`, and by `connect` when it supersedes an open link.
pub struct SerialLinkManager {
    ctx: LinkContext,
}

impl SerialLinkManager {
    /// Create a manager delivering notifications to `listener`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        provider: Arc<dyn TransportProvider>,
        listener: impl LinkListener,
        config: LinkConfig,
    ) -> Self {
        let runtime = Handle::current();
        let (events, mut queue) = mpsc::unbounded_channel::<LinkEvent>();

        runtime.spawn(async move {
            while let Some(event) = queue.recv().await {
                event.deliver(&listener);
            }
        });

        let shared = Shared {
            fsm: LinkStateMachine::new(),
            generation: 0,
            device: None,
            link: None,
            writer: None,
            cancel: None,
            tasks: Vec::new(),
            events,
        };

        Self {
            ctx: LinkContext {
                provider,
                config,
                shared: Arc::new(Mutex::new(shared)),
                runtime,
            },
        }
    }

    /// Create a manager whose notifications arrive on a queue
    pub fn with_channel(
        provider: Arc<dyn TransportProvider>,
        config: LinkConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(provider, tx, config), rx)
    }

    pub fn state(&self) -> LinkState {
        self.ctx.shared.lock().fsm.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Device of the pending or open link
    pub fn device(&self) -> Option<DeviceId> {
        self.ctx.shared.lock().device.clone()
    }

    /// Number of successful connections so far
    pub fn connections(&self) -> u64 {
        self.ctx.shared.lock().fsm.connections()
    }

    pub fn transport_name(&self) -> &'static str {
        self.ctx.provider.name()
    }

    /// Start connecting to `device`, superseding any pending attempt or open link
    pub fn connect(&self, device: DeviceId) {
        let mut shared = self.ctx.shared.lock();
        shared.generation += 1;

        match shared.fsm.state() {
            LinkState::Connected => {
                info!("[LINK] Closing current link for connect to {}", device);
                shared.end(LinkTransition::Closed);
            }
            LinkState::Connecting => {
                debug!("[LINK] Superseding pending connect");
                shared.release();
            }
            LinkState::Disconnected => {}
        }

        shared.fsm.process_event(LinkTransition::ConnectRequested);
        let cancel = CancelFlag::new();
        shared.cancel = Some(cancel.clone());
        shared.device = Some(device.clone());

        info!("[LINK] Connecting to {} via {}", device, self.ctx.provider.name());
        let generation = shared.generation;
        let attempt = self
            .ctx
            .runtime
            .spawn(self.ctx.clone().run_connect(device, generation, cancel));
        shared.tasks.push(attempt);
    }

    /// Write `signal` verbatim to the open link and flush.
    ///
    /// Without a link this returns `NotConnected` immediately, as does a
    /// send still pending when the link is closed or superseded. A failed
    /// write is reported but leaves the link state alone; a dead link is
    /// detected by the read loop.
    pub async fn send(&self, signal: &str) -> Result<(), LinkError> {
        let (writer, cancel) = {
            let shared = self.ctx.shared.lock();
            match (&shared.writer, &shared.cancel) {
                (Some(writer), Some(cancel)) => (writer.clone(), cancel.clone()),
                _ => {
                    debug!("[LINK] Not connected, dropping signal {:?}", signal);
                    return Err(LinkError::NotConnected);
                }
            }
        };

        let bytes: Bytes = codec::encode_signal(signal);
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("[LINK] Link closed while sending {:?}", signal);
                return Err(LinkError::NotConnected);
            }
            written = async {
                let mut writer = writer.lock().await;
                match writer.write_all(&bytes).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                }
            } => written,
        };

        match written {
            Ok(()) => {
                debug!("[LINK] Sent signal {:?}", signal);
                Ok(())
            }
            Err(e) => {
                warn!("[LINK] Failed to send signal {:?}: {}", signal, e);
                Err(LinkError::WriteFailed(e))
            }
        }
    }

    pub async fn send_command(&self, command: RemoteCommand) -> Result<(), LinkError> {
        self.send(&command.signal()).await
    }

    /// Release the link and stop all tasks. Safe to call repeatedly.
    pub fn close(&self) {
        let mut shared = self.ctx.shared.lock();
        shared.generation += 1;
        shared.end(LinkTransition::Closed);
    }
}

impl Drop for SerialLinkManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockPeer, MockProvider};
    use tokio::io::AsyncReadExt;
    use tokio::time::sleep;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        provider: Arc<MockProvider>,
        peers: mpsc::UnboundedReceiver<MockPeer>,
        manager: SerialLinkManager,
        events: mpsc::UnboundedReceiver<LinkEvent>,
    }

    fn harness(config: LinkConfig) -> Harness {
        let (provider, peers) = MockProvider::new();
        let (manager, events) = SerialLinkManager::with_channel(provider.clone(), config);
        Harness {
            provider,
            peers,
            manager,
            events,
        }
    }

    impl Harness {
        async fn next_event(&mut self) -> LinkEvent {
            timeout(WAIT, self.events.recv())
                .await
                .expect("timed out waiting for link event")
                .expect("event queue closed")
        }

        async fn assert_quiet(&mut self) {
            let event = timeout(Duration::from_millis(100), self.events.recv()).await;
            assert!(event.is_err(), "unexpected event: {:?}", event);
        }

        async fn next_peer(&mut self) -> MockPeer {
            timeout(WAIT, self.peers.recv())
                .await
                .expect("timed out waiting for peer")
                .expect("provider gone")
        }
    }

    fn device(address: &str) -> DeviceId {
        DeviceId::new(address)
    }

    #[tokio::test]
    async fn test_connect_then_receive_message() {
        let mut h = harness(LinkConfig::default());
        let car = device("AA:BB:CC:DD:EE:FF");

        h.manager.connect(car.clone());
        assert_eq!(h.next_event().await, LinkEvent::Connected(car.clone()));
        assert!(h.manager.is_connected());
        assert_eq!(h.manager.device(), Some(car));

        let mut peer = h.next_peer().await;
        assert_eq!(peer.service, SPP_SERVICE_UUID);

        peer.stream.write_all(b"F\n").await.unwrap();
        assert_eq!(h.next_event().await, LinkEvent::MessageReceived("F\n".into()));
    }

    #[tokio::test]
    async fn test_send_writes_exact_bytes() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        h.manager.send("A").await.unwrap();

        let mut buf = [0u8; 1];
        peer.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x41]);

        let mut more = [0u8; 8];
        let extra = timeout(Duration::from_millis(50), peer.stream.read(&mut more)).await;
        assert!(extra.is_err(), "only one byte should be written");
    }

    #[tokio::test]
    async fn test_send_command_and_multichar_signal() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        h.manager.send_command(RemoteCommand::SpeedUp).await.unwrap();
        h.manager.send("XY").await.unwrap();

        let mut buf = [0u8; 3];
        peer.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"+XY");
    }

    #[tokio::test]
    async fn test_send_without_link_is_noop() {
        let mut h = harness(LinkConfig::default());

        let result = h.manager.send("A").await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert_eq!(h.manager.state(), LinkState::Disconnected);
        h.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_read_error_disconnects_once() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        peer.break_reads().await;

        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        h.assert_quiet().await;
        assert!(!h.manager.is_connected());
        assert_eq!(h.manager.device(), None);
        assert_eq!(h.provider.live(), 0);

        // A closed manager stays quiet
        h.manager.close();
        h.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_peer_hangup_disconnects() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let peer = h.next_peer().await;

        drop(peer);

        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(h.manager.state(), LinkState::Disconnected);
        assert_eq!(h.provider.live(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut h = harness(LinkConfig::default());

        // Nothing to close yet
        h.manager.close();
        h.assert_quiet().await;

        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;

        h.manager.close();
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);

        h.manager.close();
        h.manager.close();
        h.assert_quiet().await;
        assert_eq!(h.provider.live(), 0);
    }

    #[tokio::test]
    async fn test_no_messages_after_close() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        h.manager.close();
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);

        // The read half may already be gone
        let _ = peer.stream.write_all(b"late").await;
        h.assert_quiet().await;
        assert!(matches!(h.manager.send("S").await, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_failure_then_recover() {
        let mut h = harness(LinkConfig::default());
        h.provider.fail("11:22:33:44:55:66");

        h.manager.connect(device("11:22:33:44:55:66"));
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(h.manager.state(), LinkState::Disconnected);
        h.assert_quiet().await;

        let car = device("AA:BB:CC:DD:EE:FF");
        h.manager.connect(car.clone());
        assert_eq!(h.next_event().await, LinkEvent::Connected(car));
        assert_eq!(h.manager.connections(), 1);
    }

    #[tokio::test]
    async fn test_connect_timeout_disconnects() {
        let mut h = harness(LinkConfig {
            connect_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let _gate = h.provider.hold("AA:BB:CC:DD:EE:FF");

        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        assert_eq!(h.manager.state(), LinkState::Connecting);
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(h.manager.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_superseded_attempt_is_silent() {
        let mut h = harness(LinkConfig::default());
        let gate = h.provider.hold("11:11:11:11:11:11");

        h.manager.connect(device("11:11:11:11:11:11"));
        tokio::task::yield_now().await;

        let second = device("22:22:22:22:22:22");
        h.manager.connect(second.clone());
        assert_eq!(h.next_event().await, LinkEvent::Connected(second.clone()));

        // Releasing the first attempt must not touch the current link
        let _ = gate.send(());
        h.assert_quiet().await;
        assert_eq!(h.manager.device(), Some(second));
        assert_eq!(h.provider.live(), 1);
    }

    #[tokio::test]
    async fn test_close_during_pending_connect() {
        let mut h = harness(LinkConfig::default());
        let gate = h.provider.hold("AA:BB:CC:DD:EE:FF");

        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        tokio::task::yield_now().await;
        h.manager.close();

        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        let _ = gate.send(());
        h.assert_quiet().await;
        assert_eq!(h.manager.state(), LinkState::Disconnected);
        assert_eq!(h.provider.opened(), 0);
    }

    #[tokio::test]
    async fn test_connect_while_connected_ends_previous_lifecycle() {
        let mut h = harness(LinkConfig::default());
        let first = device("11:11:11:11:11:11");
        let second = device("22:22:22:22:22:22");

        h.manager.connect(first.clone());
        assert_eq!(h.next_event().await, LinkEvent::Connected(first));

        h.manager.connect(second.clone());
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(h.next_event().await, LinkEvent::Connected(second));
        assert_eq!(h.provider.live(), 1);
    }

    #[tokio::test]
    async fn test_rapid_connects_leave_one_link() {
        let mut h = harness(LinkConfig::default());

        for last in 1..=5u8 {
            h.manager.connect(device(&format!("AA:BB:CC:DD:EE:0{}", last)));
        }

        assert_eq!(
            h.next_event().await,
            LinkEvent::Connected(device("AA:BB:CC:DD:EE:05"))
        );
        assert_eq!(h.provider.live(), 1);
        h.assert_quiet().await;

        h.manager.close();
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(h.provider.live(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_state() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let peer = h.next_peer().await;

        peer.break_writes();

        let result = h.manager.send("F").await;
        assert!(matches!(result, Err(LinkError::WriteFailed(_))));
        assert_eq!(h.manager.state(), LinkState::Connected);
        h.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_chunk_framing_follows_reads() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        peer.stream.write_all(b"SPE").await.unwrap();
        assert_eq!(h.next_event().await, LinkEvent::MessageReceived("SPE".into()));

        peer.stream.write_all(b"ED 3\n").await.unwrap();
        assert_eq!(h.next_event().await, LinkEvent::MessageReceived("ED 3\n".into()));
    }

    #[tokio::test]
    async fn test_line_framing_reassembles_reads() {
        let mut h = harness(LinkConfig {
            framing: Framing::Line,
            ..Default::default()
        });
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        h.next_event().await;
        let mut peer = h.next_peer().await;

        peer.stream.write_all(b"SPE").await.unwrap();
        h.assert_quiet().await;

        peer.stream.write_all(b"ED 3\n").await.unwrap();
        assert_eq!(h.next_event().await, LinkEvent::MessageReceived("SPEED 3\n".into()));
    }

    #[tokio::test]
    async fn test_lifecycle_notification_order() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("AA:BB:CC:DD:EE:FF"));
        let mut peer = h.next_peer().await;

        peer.stream.write_all(b"OK\n").await.unwrap();
        sleep(Duration::from_millis(20)).await;
        drop(peer);

        let mut seen = Vec::new();
        loop {
            let event = h.next_event().await;
            let done = event == LinkEvent::Disconnected;
            seen.push(event);
            if done {
                break;
            }
        }

        assert!(matches!(seen.first(), Some(LinkEvent::Connected(_))));
        assert!(seen[1..seen.len() - 1]
            .iter()
            .all(|e| matches!(e, LinkEvent::MessageReceived(_))));
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_close_releases_link_before_returning() {
        let mut h = harness(LinkConfig::default());
        h.manager.connect(device("11:11:11:11:11:11"));
        h.next_event().await;
        assert_eq!(h.provider.live(), 1);

        h.manager.close();
        assert_eq!(h.provider.live(), 0);
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);

        h.manager.connect(device("22:22:22:22:22:22"));
        h.next_event().await;
        assert_eq!(h.provider.live(), 1);

        // Superseding drops the open link before the new attempt starts
        h.manager.connect(device("33:33:33:33:33:33"));
        assert_eq!(h.provider.live(), 0);
        assert_eq!(h.next_event().await, LinkEvent::Disconnected);
        assert_eq!(
            h.next_event().await,
            LinkEvent::Connected(device("33:33:33:33:33:33"))
        );
        assert_eq!(h.provider.live(), 1);
    }

    /// Start a send the peer never drains; the mock pipe holds 4 KiB
    async fn blocked_send(
        manager: &Arc<SerialLinkManager>,
    ) -> tokio::task::JoinHandle<Result<(), LinkError>> {
        let sender = manager.clone();
        let send = tokio::spawn(async move { sender.send(&"x".repeat(16 * 1024)).await });
        sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished(), "send should be stuck on a full pipe");
        send
    }

    #[tokio::test]
    async fn test_close_abandons_blocked_send() {
        let (provider, mut peers) = MockProvider::new();
        let (manager, mut events) =
            SerialLinkManager::with_channel(provider.clone(), LinkConfig::default());
        let manager = Arc::new(manager);

        manager.connect(device("11:11:11:11:11:11"));
        let event = timeout(WAIT, events.recv()).await.unwrap();
        assert!(matches!(event, Some(LinkEvent::Connected(_))));
        let _peer = timeout(WAIT, peers.recv()).await.unwrap().unwrap();

        let send = blocked_send(&manager).await;

        manager.close();
        assert_eq!(provider.live(), 0);
        let result = timeout(WAIT, send).await.expect("send stayed blocked").unwrap();
        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert_eq!(timeout(WAIT, events.recv()).await.unwrap(), Some(LinkEvent::Disconnected));

        let second = device("22:22:22:22:22:22");
        manager.connect(second.clone());
        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(LinkEvent::Connected(second))
        );
        assert_eq!(provider.live(), 1);
    }

    #[tokio::test]
    async fn test_connect_supersedes_link_with_blocked_send() {
        let (provider, mut peers) = MockProvider::new();
        let (manager, mut events) =
            SerialLinkManager::with_channel(provider.clone(), LinkConfig::default());
        let manager = Arc::new(manager);

        manager.connect(device("11:11:11:11:11:11"));
        timeout(WAIT, events.recv()).await.unwrap();
        let _first_peer = timeout(WAIT, peers.recv()).await.unwrap().unwrap();

        let send = blocked_send(&manager).await;

        let second = device("22:22:22:22:22:22");
        manager.connect(second.clone());
        assert_eq!(provider.live(), 0);

        let result = timeout(WAIT, send).await.expect("send stayed blocked").unwrap();
        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert_eq!(timeout(WAIT, events.recv()).await.unwrap(), Some(LinkEvent::Disconnected));
        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(LinkEvent::Connected(second))
        );

        sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.live(), 1);
        assert_eq!(provider.opened(), 2);
    }

    #[derive(Default)]
    struct RecordingListener {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl LinkListener for RecordingListener {
        fn on_connected(&self, device: &DeviceId) {
            self.calls.lock().push(format!("connected {}", device));
        }

        fn on_disconnected(&self) {
            self.calls.lock().push("disconnected".into());
        }

        fn on_message_received(&self, payload: &str) {
            self.calls.lock().push(format!("message {}", payload));
        }
    }

    #[tokio::test]
    async fn test_callback_listener_and_drop_closes() {
        let (provider, mut peers) = MockProvider::new();
        let listener = RecordingListener::default();
        let calls = listener.calls.clone();
        let manager = SerialLinkManager::new(provider.clone(), listener, LinkConfig::default());

        manager.connect(device("AA:BB:CC:DD:EE:FF"));
        let mut peer = timeout(WAIT, peers.recv()).await.unwrap().unwrap();
        peer.stream.write_all(b"F").await.unwrap();

        let deadline = tokio::time::Instant::now() + WAIT;
        while calls.lock().len() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "listener not called");
            sleep(Duration::from_millis(5)).await;
        }

        drop(manager);
        assert_eq!(provider.live(), 0);

        let deadline = tokio::time::Instant::now() + WAIT;
        while calls.lock().len() < 3 {
            assert!(tokio::time::Instant::now() < deadline, "manager drop did not close");
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(
            *calls.lock(),
            vec![
                "connected AA:BB:CC:DD:EE:FF".to_string(),
                "message F".to_string(),
                "disconnected".to_string(),
            ]
        );
    }
}
