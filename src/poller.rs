//! Clipboard capture poller.
//!
//! A recurring task that, while auto-capture is on, asks the bridge for the
//! clipboard text and appends a note whenever it differs from the last capture.
//! At most one clipboard request is outstanding at any time.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::{
    Config, Mailbox, Message, MessageBus, Note, NoteRepository, PollerStatus, Result,
    SettingsStore, StorimpError, Target, TickOutcome,
};

/// Timing of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between two clipboard reads
    pub interval: Duration,
    /// How long to wait for the bridge to answer
    pub response_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PollerConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            response_timeout: Duration::from_millis(config.bridge_timeout_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PollerCommand {
    /// Poll the clipboard immediately
    TickNow,
    /// Stop the poll loop
    Stop,
}

/// State shared between the poller handle and its loop
struct CaptureEngine {
    repository: NoteRepository,
    settings: SettingsStore,
    bus: MessageBus,
    response_timeout: Duration,
    /// Locked while a tick talks to the bridge; holds a request that timed out
    /// and has not been answered yet
    outstanding: TokioMutex<Option<PendingRequest>>,
    next_request_id: AtomicU64,
    status: Mutex<PollerStatus>,
}

/// A clipboard request and the mailbox its reply will arrive in
struct PendingRequest {
    id: u64,
    mailbox: Mailbox,
}

impl CaptureEngine {
    async fn tick(&self) -> Result<TickOutcome> {
        if !self.settings.is_auto_capture_enabled().await? {
            return Ok(TickOutcome::Disabled);
        }

        let mut outstanding = match self.outstanding.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(TickOutcome::Busy),
        };

        let text = match self.request_clipboard(&mut outstanding).await {
            Ok(text) => text,
            Err(e) => return Ok(TickOutcome::ReadFailed(e.to_string())),
        };

        // Both values may have changed while the request was in flight.
        if !self.settings.is_auto_capture_enabled().await? {
            return Ok(TickOutcome::DisabledMidFlight);
        }
        if text.trim().is_empty() {
            return Ok(TickOutcome::Empty);
        }
        if text == self.settings.last_copied_text().await? {
            return Ok(TickOutcome::Duplicate);
        }

        self.settings.set_last_copied_text(&text).await?;
        self.repository
            .append_note(Note::clipboard_capture(text))
            .await?;

        match self.status.lock() {
            Ok(mut status) => {
                status.last_capture_time = Some(Utc::now());
                status.captures += 1;
            }
            Err(e) => warn!("Failed to acquire lock on poller status: {}", e),
        }

        Ok(TickOutcome::Captured)
    }

    /// Asks the bridge for the clipboard text and waits for its reply.
    ///
    /// A request left unanswered by an earlier tick is waited for first and its
    /// reply discarded, since the clipboard may have changed since it was sent.
    /// While that request stays unanswered no new one is sent.
    async fn request_clipboard(&self, outstanding: &mut Option<PendingRequest>) -> Result<String> {
        if let Some(mut earlier) = outstanding.take() {
            match self.await_reply(&mut earlier).await {
                Err(e @ StorimpError::BridgeTimeout { .. }) => {
                    debug!("Clipboard request {} is still unanswered", earlier.id);
                    *outstanding = Some(earlier);
                    return Err(e);
                }
                _ => debug!("Discarded late reply to clipboard request {}", earlier.id),
            }
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut request = PendingRequest {
            id,
            mailbox: self.bus.subscribe(Target::Background),
        };

        // Our own mailbox counts as a receiver.
        if self.bus.publish(Message::read_clipboard().with_request_id(id)) <= 1 {
            return Err(StorimpError::BridgeUnavailable {
                message: "no context is listening for clipboard requests".to_string(),
            });
        }

        match self.await_reply(&mut request).await {
            Err(e @ StorimpError::BridgeTimeout { .. }) => {
                *outstanding = Some(request);
                Err(e)
            }
            reply => reply,
        }
    }

    /// Waits up to the response timeout for the reply to `request`.
    /// Replies to other requests are skipped.
    async fn await_reply(&self, request: &mut PendingRequest) -> Result<String> {
        let id = request.id;
        let mailbox = &mut request.mailbox;

        let reply = time::timeout(self.response_timeout, async {
            loop {
                match mailbox.recv().await {
                    Some(message @ Message::ClipboardData { .. })
                        if message.request_id() != Some(id) =>
                    {
                        trace!("Skipping reply to request {:?}", message.request_id());
                    }
                    Some(Message::ClipboardData {
                        error: Some(error), ..
                    }) => {
                        return Err(StorimpError::Clipboard { message: error });
                    }
                    Some(Message::ClipboardData { data, .. }) => return Ok(data),
                    Some(_) => continue,
                    None => {
                        return Err(StorimpError::BridgeUnavailable {
                            message: "message bus closed".to_string(),
                        })
                    }
                }
            }
        })
        .await;

        match reply {
            Ok(result) => result,
            Err(_) => Err(StorimpError::BridgeTimeout {
                timeout_ms: self.response_timeout.as_millis() as u64,
            }),
        }
    }

    /// Runs one tick and logs what happened
    async fn run_tick(&self, trigger: &str) {
        match self.tick().await {
            Ok(TickOutcome::Captured) => info!("{} poll captured new clipboard text", trigger),
            Ok(TickOutcome::ReadFailed(reason)) => {
                debug!("{} poll skipped, clipboard unavailable: {}", trigger, reason)
            }
            Ok(outcome) => debug!("{} poll: {:?}", trigger, outcome),
            Err(e) => error!("{} poll failed: {}", trigger, e),
        }
    }
}

/// Background task that turns new clipboard text into notes
pub struct ClipboardPoller {
    /// Timing of the loop
    config: PollerConfig,

    /// Capture logic shared with the loop task
    engine: Arc<CaptureEngine>,

    /// Channel to send commands to the poll task
    command_tx: Option<mpsc::Sender<PollerCommand>>,

    /// Handle to the poll task
    poll_task: Option<JoinHandle<()>>,
}

impl ClipboardPoller {
    pub fn new(
        repository: NoteRepository,
        settings: SettingsStore,
        bus: MessageBus,
        config: PollerConfig,
    ) -> Self {
        info!("Initializing clipboard poller with config: {:?}", config);
        Self {
            config,
            engine: Arc::new(CaptureEngine {
                repository,
                settings,
                bus,
                response_timeout: config.response_timeout,
                outstanding: TokioMutex::new(None),
                next_request_id: AtomicU64::new(0),
                status: Mutex::new(PollerStatus::default()),
            }),
            command_tx: None,
            poll_task: None,
        }
    }

    /// Runs a single poll in the caller's task.
    pub async fn tick(&self) -> Result<TickOutcome> {
        self.engine.tick().await
    }

    /// Starts the poll loop. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.poll_task.is_some() {
            debug!("Clipboard poller already running");
            return Ok(());
        }
        info!(
            "Starting clipboard poller, polling every {} ms",
            self.config.interval.as_millis()
        );

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);

        let engine = Arc::clone(&self.engine);
        let period = self.config.interval;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => engine.run_tick("Scheduled").await,
                    Some(cmd) = command_rx.recv() => match cmd {
                        PollerCommand::TickNow => engine.run_tick("Manual").await,
                        PollerCommand::Stop => {
                            info!("Clipboard poller stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.poll_task = Some(task);
        self.set_running(true);
        Ok(())
    }

    /// Stop the poll loop if it's running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.poll_task.take() {
            if let Some(command_tx) = self.command_tx.take() {
                if let Err(e) = command_tx.send(PollerCommand::Stop).await {
                    error!("Failed to send stop command to clipboard poller: {}", e);
                }
            }

            if let Err(e) = task.await {
                let error_msg = format!("Failed to stop clipboard poller: {}", e);
                error!("{}", error_msg);
                return Err(StorimpError::ApplicationError { message: error_msg });
            }

            self.set_running(false);
            info!("Clipboard poller stopped");
        } else {
            debug!("Clipboard poller is not running");
        }

        Ok(())
    }

    /// Asks the running loop to poll right away
    pub async fn tick_now(&self) -> Result<()> {
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| StorimpError::ApplicationError {
                message: "Clipboard poller is not running".to_string(),
            })?;

        command_tx
            .send(PollerCommand::TickNow)
            .await
            .map_err(|e| StorimpError::ApplicationError {
                message: format!("Failed to send poll command: {}", e),
            })
    }

    pub fn get_status(&self) -> PollerStatus {
        match self.engine.status.lock() {
            Ok(status) => status.clone(),
            Err(e) => {
                warn!("Failed to acquire lock on poller status: {}", e);
                PollerStatus::default()
            }
        }
    }

    fn set_running(&self, running: bool) {
        if let Ok(mut status) = self.engine.status.lock() {
            status.is_running = running;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        BridgeHandle, ClipboardBridge, ClipboardSource, MemoryClipboard, MemoryStore,
        SharedStore, DEFAULT_FOLDER,
    };

    struct Harness {
        repository: NoteRepository,
        settings: SettingsStore,
        bus: MessageBus,
        poller: ClipboardPoller,
    }

    fn harness() -> Harness {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = MessageBus::new();
        let repository = NoteRepository::new(Arc::clone(&store));
        let settings = SettingsStore::with_bus(store, bus.clone());
        let config = PollerConfig {
            interval: Duration::from_millis(10),
            response_timeout: Duration::from_millis(200),
        };
        let poller = ClipboardPoller::new(repository.clone(), settings.clone(), bus.clone(), config);
        Harness {
            repository,
            settings,
            bus,
            poller,
        }
    }

    fn bridge(h: &Harness, source: impl ClipboardSource + 'static) -> BridgeHandle {
        ClipboardBridge::new(h.bus.clone(), Arc::new(source)).spawn()
    }

    #[tokio::test]
    async fn disabled_tick_never_asks_the_bridge() {
        let h = harness();
        let clipboard = MemoryClipboard::with_text("secret");
        let bridge = bridge(&h, clipboard.clone());
        let mut spy = h.bus.subscribe(Target::Offscreen);

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Disabled);

        assert_eq!(clipboard.reads(), 0);
        assert!(time::timeout(Duration::from_millis(50), spy.recv()).await.is_err());
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        assert_eq!(h.settings.last_copied_text().await.unwrap(), "");
        bridge.stop().await;
    }

    #[tokio::test]
    async fn new_text_is_captured() {
        let h = harness();
        let bridge = bridge(&h, MemoryClipboard::with_text("T"));
        h.settings.set_auto_capture(true).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Captured);

        let notes = h.repository.load_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "T");
        assert_eq!(notes[0].title, "Copied Text");
        assert_eq!(notes[0].folder, DEFAULT_FOLDER);
        assert!(!notes[0].is_link);
        assert!(notes[0].timestamp.is_some());
        assert_eq!(h.settings.last_copied_text().await.unwrap(), "T");
        assert_eq!(h.poller.get_status().captures, 1);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn unchanged_text_is_not_captured_again() {
        let h = harness();
        let bridge = bridge(&h, MemoryClipboard::with_text("T"));
        h.settings.set_auto_capture(true).await.unwrap();
        h.settings.set_last_copied_text("T").await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Duplicate);
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn deleting_a_capture_does_not_recapture_it() {
        let h = harness();
        let bridge = bridge(&h, MemoryClipboard::with_text("T"));
        h.settings.set_auto_capture(true).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Captured);
        h.repository.delete_note(0).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Duplicate);
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn whitespace_is_ignored() {
        let h = harness();
        let bridge = bridge(&h, MemoryClipboard::with_text(" \n\t "));
        h.settings.set_auto_capture(true).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Empty);
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        assert_eq!(h.settings.last_copied_text().await.unwrap(), "");
        bridge.stop().await;
    }

    #[tokio::test]
    async fn read_errors_skip_the_tick() {
        let h = harness();
        let clipboard = MemoryClipboard::new();
        clipboard.fail_with("Document is not focused.").await;
        let bridge = bridge(&h, clipboard);
        h.settings.set_auto_capture(true).await.unwrap();

        match h.poller.tick().await.unwrap() {
            TickOutcome::ReadFailed(reason) => assert!(reason.contains("not focused")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn missing_bridge_skips_the_tick() {
        let h = harness();
        h.settings.set_auto_capture(true).await.unwrap();

        assert!(matches!(
            h.poller.tick().await.unwrap(),
            TickOutcome::ReadFailed(_)
        ));
    }

    struct SlowClipboard;

    #[async_trait]
    impl ClipboardSource for SlowClipboard {
        async fn read_text(&self) -> Result<String> {
            time::sleep(Duration::from_millis(600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn slow_bridge_times_out() {
        let h = harness();
        let bridge = bridge(&h, SlowClipboard);
        h.settings.set_auto_capture(true).await.unwrap();

        match h.poller.tick().await.unwrap() {
            TickOutcome::ReadFailed(reason) => assert!(reason.contains("did not respond")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        bridge.stop().await;
    }

    /// Clipboard whose first read is slow and whose later reads see new text
    struct ChangingClipboard {
        reads: AtomicU64,
    }

    #[async_trait]
    impl ClipboardSource for ChangingClipboard {
        async fn read_text(&self) -> Result<String> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                time::sleep(Duration::from_millis(300)).await;
                return Ok("OLD".to_string());
            }
            Ok("NEW".to_string())
        }
    }

    #[tokio::test]
    async fn late_reply_is_not_taken_for_a_newer_request() {
        let h = harness();
        let bridge = bridge(
            &h,
            ChangingClipboard {
                reads: AtomicU64::new(0),
            },
        );
        h.settings.set_auto_capture(true).await.unwrap();

        assert!(matches!(
            h.poller.tick().await.unwrap(),
            TickOutcome::ReadFailed(_)
        ));
        time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::Captured);
        let contents: Vec<String> = h
            .repository
            .load_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, vec!["NEW"]);
        assert_eq!(h.settings.last_copied_text().await.unwrap(), "NEW");
        bridge.stop().await;
    }

    #[tokio::test]
    async fn no_new_request_while_one_is_unanswered() {
        let h = harness();
        let clipboard = CountingSlowClipboard::default();
        let bridge = bridge(&h, clipboard.clone());
        h.settings.set_auto_capture(true).await.unwrap();

        assert!(matches!(
            h.poller.tick().await.unwrap(),
            TickOutcome::ReadFailed(_)
        ));
        assert!(matches!(
            h.poller.tick().await.unwrap(),
            TickOutcome::ReadFailed(_)
        ));

        assert_eq!(clipboard.reads.load(Ordering::SeqCst), 1);
        bridge.stop().await;
    }

    #[derive(Clone, Default)]
    struct CountingSlowClipboard {
        reads: Arc<AtomicU64>,
    }

    #[async_trait]
    impl ClipboardSource for CountingSlowClipboard {
        async fn read_text(&self) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_millis(1000)).await;
            Ok("slow".to_string())
        }
    }

    /// Clipboard whose read switches auto-capture off, as a user might mid-request
    struct DisablingClipboard {
        settings: SettingsStore,
    }

    #[async_trait]
    impl ClipboardSource for DisablingClipboard {
        async fn read_text(&self) -> Result<String> {
            self.settings.set_auto_capture(false).await?;
            Ok("in flight".to_string())
        }
    }

    #[tokio::test]
    async fn disabling_mid_flight_discards_the_read() {
        let h = harness();
        let bridge = bridge(
            &h,
            DisablingClipboard {
                settings: h.settings.clone(),
            },
        );
        h.settings.set_auto_capture(true).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickOutcome::DisabledMidFlight);
        assert!(h.repository.load_notes().await.unwrap().is_empty());
        assert_eq!(h.settings.last_copied_text().await.unwrap(), "");
        bridge.stop().await;
    }

    #[tokio::test]
    async fn running_loop_captures_and_stops() {
        let mut h = harness();
        let clipboard = MemoryClipboard::with_text("first");
        let bridge = bridge(&h, clipboard.clone());
        h.settings.set_auto_capture(true).await.unwrap();

        h.poller.start().unwrap();
        assert!(h.poller.get_status().is_running);

        let captured = time::timeout(Duration::from_secs(5), async {
            loop {
                if h.repository.load_notes().await.unwrap().len() == 1 {
                    break;
                }
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(captured.is_ok());

        clipboard.set_text("second").await;
        h.poller.tick_now().await.unwrap();
        let captured = time::timeout(Duration::from_secs(5), async {
            loop {
                if h.repository.load_notes().await.unwrap().len() == 2 {
                    break;
                }
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(captured.is_ok());

        h.poller.stop().await.unwrap();
        let status = h.poller.get_status();
        assert!(!status.is_running);
        assert_eq!(status.captures, 2);
        assert!(h.poller.tick_now().await.is_err());
        bridge.stop().await;
    }
}
