//! Per-room session: runs debates and reveals their transcript.

use chrono::{FixedOffset, Offset, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use super::message::{Message, MessageType};
use super::store::MessageStore;
use super::viewers::{
    ConnectionId, Outbound, ViewerInfo, ViewerRegistry, ROOM_CLOSED_CLOSE_CODE, ROOM_CLOSED_REASON,
};
use crate::debate::{DebateEvent, DebateSpec, Facilitator, Lang, SYSTEM_SPEAKER};
use crate::error::{ConfigError, SessionError, SessionResult};
use crate::llm::ClientFactory;
use crate::metrics::{DebateOutcome, MetricsCollector};
use crate::strategy::StrategySetup;

/// Speaker of error notices.
pub const ERROR_SPEAKER: &str = "Error";
pub const CACHE_ERROR_TEXT: &str = "Cache Error";
pub const SYSTEM_IMAGE: &str = "/images/system.png";

/// Cached transcript: agenda -> `[type, speaker, text]` lines.
pub type TranscriptCache = HashMap<String, Vec<(String, String, String)>>;

/// Settings shared by every room.
#[derive(Clone)]
pub struct SessionSettings {
    pub models: Arc<dyn ClientFactory>,
    pub strategy: Option<StrategySetup>,
    pub default_tag: String,
    pub cache_dir: PathBuf,
    /// Delay after each pushed message.
    pub pacing: Duration,
    pub utc_offset: FixedOffset,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("strategy", &self.strategy)
            .field("default_tag", &self.default_tag)
            .field("cache_dir", &self.cache_dir)
            .field("pacing", &self.pacing)
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

impl SessionSettings {
    pub fn new(models: Arc<dyn ClientFactory>) -> Self {
        Self {
            models,
            strategy: None,
            default_tag: "OpenAI".to_string(),
            cache_dir: PathBuf::from("./cache"),
            pacing: Duration::from_secs(1),
            utc_offset: FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }

    pub fn with_strategy(mut self, strategy: Option<StrategySetup>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn now(&self) -> chrono::DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.utc_offset)
    }
}

/// Everything needed to start a debate.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub spec: DebateSpec,
    pub agenda: String,
    pub lang: Lang,
    pub use_strategy: bool,
    /// File name under the cache directory.
    pub cache_file: Option<String>,
    /// Data handed to other clients with the start message.
    pub handover: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub exist_cache: bool,
}

#[derive(Default)]
struct SessionState {
    store: MessageStore,
    viewers: ViewerRegistry,
    images: HashMap<String, String>,
    user_name: String,
    lang: Lang,
}

impl SessionState {
    fn user_img(&self, name: &str) -> String {
        match self.images.get(name) {
            Some(image) => image.clone(),
            None if name == SYSTEM_SPEAKER => SYSTEM_IMAGE.to_string(),
            None => String::new(),
        }
    }

    fn broadcast_visible(&mut self) {
        let snapshot = self.store.visible_json();
        let dropped = self.viewers.broadcast(&snapshot);
        let metrics = MetricsCollector::new();
        for _ in dropped {
            metrics.viewer_disconnected();
        }
    }
}

/// Clears the busy flag when the debate task ends.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How a round ended.
enum RoundEnd {
    Finished,
    Stopped,
    Failed,
}

/// Session of one room.
///
/// Debates run on a spawned task that pushes messages into a hidden store;
/// [`SessionController::reveal_next`] moves them to viewers one at a time.
pub struct SessionController {
    room_id: u64,
    settings: Arc<SessionSettings>,
    state: Mutex<SessionState>,
    facilitator: Mutex<Option<Facilitator>>,
    running: Arc<AtomicBool>,
    should_stop: AtomicBool,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("room_id", &self.room_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SessionController {
    pub fn new(room_id: u64, settings: Arc<SessionSettings>) -> Self {
        Self {
            room_id,
            settings,
            state: Mutex::new(SessionState::default()),
            facilitator: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            should_stop: AtomicBool::new(false),
        }
    }

    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn visible_messages(&self) -> Vec<Message> {
        self.state.lock().await.store.visible().to_vec()
    }

    /// Messages generated but not yet revealed.
    pub async fn pending_messages(&self) -> usize {
        self.state.lock().await.store.pending()
    }

    pub async fn viewer_count(&self) -> usize {
        self.state.lock().await.viewers.len()
    }

    // ========================================================================
    // Viewers
    // ========================================================================

    /// Register a viewer and send it the current visible set.
    ///
    /// A second executor is rejected before registration.
    pub async fn connect(
        &self,
        info: ViewerInfo,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> SessionResult<ConnectionId> {
        let mut state = self.state.lock().await;
        let id = state.viewers.register(info, sender).map_err(|e| {
            tracing::error!(room_id = self.room_id, error = %e, "Connection rejected");
            e
        })?;
        MetricsCollector::new().viewer_connected();

        let snapshot = state.store.visible_json();
        if !state.viewers.send(&id, Outbound::Snapshot(snapshot)) {
            MetricsCollector::new().viewer_disconnected();
        }
        Ok(id)
    }

    pub async fn disconnect(&self, id: &ConnectionId) {
        if self.state.lock().await.viewers.remove(id).is_some() {
            MetricsCollector::new().viewer_disconnected();
        }
    }

    // ========================================================================
    // Transcript
    // ========================================================================

    /// Stamp and append a message to the hidden store.
    pub async fn push(&self, message: Message) {
        let mut state = self.state.lock().await;
        self.push_locked(&mut state, message);
    }

    /// Push unless a stop was requested. The flag is read under the state
    /// lock, so nothing lands in a store `stop_discussion` already cleared.
    async fn push_unless_stopped(&self, message: Message) -> bool {
        let mut state = self.state.lock().await;
        if self.stopped() {
            return false;
        }
        self.push_locked(&mut state, message);
        true
    }

    fn push_locked(&self, state: &mut SessionState, mut message: Message) {
        let now = self.settings.now();
        let img = state.user_img(message.user_name.as_deref().unwrap_or_default());
        message.stamp(now, img);

        if let Some(kind) = message.kind {
            MetricsCollector::new().record_message_pushed(kind.as_str());
        }
        tracing::debug!(
            room_id = self.room_id,
            kind = ?message.kind,
            user = message.user_name.as_deref().unwrap_or_default(),
            text = message.msg_text.as_deref().unwrap_or_default(),
            "Message pushed"
        );
        state.store.push(message);
    }

    /// Reveal one more message and broadcast the visible set if it changed.
    pub async fn reveal_next(&self) -> Vec<Message> {
        let mut state = self.state.lock().await;
        if state.store.reveal_next() {
            MetricsCollector::new().record_message_revealed();
            state.broadcast_visible();
        }
        state.store.visible().to_vec()
    }

    /// Push, then wait out the pacing delay. `false` once stopped.
    async fn push_and_wait(&self, message: Message) -> bool {
        if !self.push_unless_stopped(message).await {
            return false;
        }
        if !self.settings.pacing.is_zero() {
            tokio::time::sleep(self.settings.pacing).await;
        }
        true
    }

    // ========================================================================
    // Debate lifecycle
    // ========================================================================

    /// Start a new debate in the background.
    ///
    /// Fails with [`SessionError::Busy`] without touching any state if a
    /// debate is already running.
    pub async fn start_discussion(self: &Arc<Self>, request: StartRequest) -> SessionResult<StartOutcome> {
        self.ensure_strategy(request.use_strategy)?;
        let guard = BusyGuard::acquire(&self.running).ok_or_else(|| {
            tracing::warn!(room_id = self.room_id, "Debate already running; start rejected");
            SessionError::Busy
        })?;
        self.should_stop.store(false, Ordering::SeqCst);

        let cache = match &request.cache_file {
            Some(file) => load_cache(&self.settings.cache_dir.join(file))?,
            None => None,
        };

        let facilitator = Facilitator::new(
            &request.spec,
            self.settings.models.as_ref(),
            &self.settings.default_tag,
            self.settings.strategy.as_ref(),
        )
        .await?;

        let participants = request.spec.participants();
        let mut handover = request.handover.clone();
        if !handover.is_object() {
            handover = serde_json::json!({});
        }
        handover["participants_config"] = serde_json::to_value(&participants).unwrap_or_default();

        {
            let mut state = self.state.lock().await;
            state.user_name = request.spec.user.name.clone();
            state.images = participants
                .iter()
                .map(|p| (p.name.clone(), p.image.clone()))
                .collect();
            state.lang = request.lang;
            state.store.reset();
        }
        *self.facilitator.lock().await = Some(facilitator);

        self.push(
            Message::new(
                MessageType::SystemInfo,
                SYSTEM_SPEAKER,
                request.lang.discussion_started(),
            )
            .with_handover(handover),
        )
        .await;

        let exist_cache = cache.is_some();
        tracing::info!(
            room_id = self.room_id,
            agenda = %request.agenda,
            use_strategy = request.use_strategy,
            lang = %request.lang,
            exist_cache,
            "Starting debate"
        );

        let this = Arc::clone(self);
        let agenda = request.agenda;
        let use_strategy = request.use_strategy;
        let lang = request.lang;
        tokio::spawn(async move {
            let _guard = guard;
            this.do_discussion(agenda, false, use_strategy, lang, cache).await;
        });

        Ok(StartOutcome { exist_cache })
    }

    /// Run one more round on a new agenda with the existing panel.
    pub async fn continue_discussion(
        self: &Arc<Self>,
        agenda: String,
        use_strategy: bool,
        handover: serde_json::Value,
    ) -> SessionResult<()> {
        self.ensure_strategy(use_strategy)?;
        let guard = BusyGuard::acquire(&self.running).ok_or_else(|| {
            tracing::warn!(room_id = self.room_id, "Debate already running; continuation rejected");
            SessionError::Busy
        })?;
        if self.facilitator.lock().await.is_none() {
            return Err(SessionError::NotStarted);
        }
        self.should_stop.store(false, Ordering::SeqCst);

        let lang = self.state.lock().await.lang;
        self.push(
            Message::new(MessageType::SystemInfo, SYSTEM_SPEAKER, lang.discussion_started())
                .with_handover(handover),
        )
        .await;

        tracing::info!(room_id = self.room_id, agenda = %agenda, use_strategy, "Continuing debate");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            this.do_discussion(agenda, true, use_strategy, lang, None).await;
        });
        Ok(())
    }

    /// A strategic round needs a strategist; without one the request fails
    /// before anything is touched.
    fn ensure_strategy(&self, use_strategy: bool) -> SessionResult<()> {
        if use_strategy && self.settings.strategy.is_none() {
            tracing::error!(room_id = self.room_id, "Strategy requested but no strategist is configured");
            return Err(ConfigError::InvalidValue {
                key: "tech_enable".to_string(),
                message: "no strategist is configured".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Ask the running debate to stop and clear every message.
    ///
    /// Calls already sent to a model are not cancelled; their results are
    /// discarded.
    pub async fn stop_discussion(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.store.reset();
        state.broadcast_visible();
        tracing::info!(room_id = self.room_id, "Debate stop requested");
    }

    /// Stop the debate and close every viewer; used when the room goes away.
    pub async fn shutdown(&self) {
        self.stop_discussion().await;
        let mut state = self.state.lock().await;
        let closed = state
            .viewers
            .close_all(ROOM_CLOSED_CLOSE_CODE, ROOM_CLOSED_REASON);
        let metrics = MetricsCollector::new();
        for _ in 0..closed {
            metrics.viewer_disconnected();
        }
        tracing::info!(room_id = self.room_id, viewers = closed, "Session shut down");
    }

    fn stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    async fn do_discussion(
        &self,
        agenda: String,
        is_continuation: bool,
        use_strategy: bool,
        lang: Lang,
        cache: Option<TranscriptCache>,
    ) {
        let metrics = MetricsCollector::new();
        let (end, outcome) = match cache {
            Some(cache) => match cache.get(&agenda) {
                Some(lines) => (self.replay(lines).await, DebateOutcome::Replayed),
                None => {
                    tracing::error!(room_id = self.room_id, agenda = %agenda, "Agenda missing from cache");
                    self.push_unless_stopped(Message::new(
                        MessageType::SystemInfo,
                        ERROR_SPEAKER,
                        CACHE_ERROR_TEXT,
                    ))
                    .await;
                    metrics.record_debate(DebateOutcome::Failed);
                    return;
                }
            },
            None => {
                let user_name = self.state.lock().await.user_name.clone();
                let end = if self
                    .push_and_wait(Message::new(MessageType::Message, user_name, agenda.clone()))
                    .await
                {
                    self.generate(&agenda, is_continuation, use_strategy, lang).await
                } else {
                    RoundEnd::Stopped
                };
                (end, DebateOutcome::Completed)
            }
        };

        let end = match end {
            RoundEnd::Finished => {
                let finished = Message::new(
                    MessageType::SystemInfo,
                    SYSTEM_SPEAKER,
                    lang.discussion_finished(),
                );
                if self.push_unless_stopped(finished).await {
                    RoundEnd::Finished
                } else {
                    RoundEnd::Stopped
                }
            }
            other => other,
        };
        match end {
            RoundEnd::Finished => {
                metrics.record_debate(outcome);
                tracing::info!(room_id = self.room_id, "Debate finished");
            }
            RoundEnd::Stopped => {
                metrics.record_debate(DebateOutcome::Stopped);
                tracing::info!(room_id = self.room_id, "Debate stopped");
            }
            RoundEnd::Failed => metrics.record_debate(DebateOutcome::Failed),
        }
    }

    async fn generate(&self, agenda: &str, is_continuation: bool, use_strategy: bool, lang: Lang) -> RoundEnd {
        let mut guard = self.facilitator.lock().await;
        let Some(facilitator) = guard.as_mut() else {
            return RoundEnd::Failed;
        };

        let stream = facilitator.run(agenda, is_continuation, use_strategy, lang);
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if self.stopped() {
                return RoundEnd::Stopped;
            }
            match event {
                Ok(DebateEvent::RoundComplete) => return RoundEnd::Finished,
                Ok(event) => {
                    if let Some(message) = Message::from_event(&event) {
                        if !self.push_and_wait(message).await {
                            return RoundEnd::Stopped;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(room_id = self.room_id, error = %e, "Debate round failed");
                    let notice = Message::new(MessageType::SystemInfo, ERROR_SPEAKER, e.to_string());
                    if !self.push_unless_stopped(notice).await {
                        return RoundEnd::Stopped;
                    }
                    return RoundEnd::Failed;
                }
            }
        }
        RoundEnd::Finished
    }

    async fn replay(&self, lines: &[(String, String, String)]) -> RoundEnd {
        for (kind, speaker, text) in lines {
            if self.stopped() {
                return RoundEnd::Stopped;
            }
            let kind = MessageType::from_wire(kind).unwrap_or(MessageType::Message);
            if !self
                .push_and_wait(Message::new(kind, speaker.as_str(), text.as_str()))
                .await
            {
                return RoundEnd::Stopped;
            }
        }
        RoundEnd::Finished
    }
}

/// Read a transcript cache. A missing file is not an error.
pub fn load_cache(path: &Path) -> SessionResult<Option<TranscriptCache>> {
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "Cache file not found");
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| SessionError::Cache {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let cache: TranscriptCache = serde_json::from_str(&raw).map_err(|e| SessionError::Cache {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::info!(path = %path.display(), agendas = cache.len(), "Cache file found");
    Ok((!cache.is_empty()).then_some(cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::viewers::{RoomMode, ScreenName};
    use crate::test_support::{FailingLlmProvider, MockLlmProvider, SharedClientFactory};
    use crate::llm::LlmProvider;
    use std::io::Write;

    const SPEC: &str = r#"
user: {name: Moderator, image: /images/user.png, voice_id: 1, voice_pitch: 0}
panelists:
  - {name: Alice, persona: economist, model: OpenAI, image: /images/alice.png}
  - {name: Bob, persona: activist, model: OpenAI}
system_prompt: "You are ${__persona__}."
first_user_prompt: "Discuss ${__current_agenda__}"
subsequent_user_prompt: "Reply to ${__opponents_comments_on_current_agenda__}"
additional_first_user_prompt: "Now ${__current_agenda__}"
additional_subsequent_user_prompt: "Now ${__current_agenda__}"
additional_last_user_prompt: "Now ${__current_agenda__}"
"#;

    fn controller_with(llm: Arc<dyn LlmProvider>, cache_dir: &Path) -> Arc<SessionController> {
        let settings = SessionSettings::new(Arc::new(SharedClientFactory::new(llm)))
            .with_pacing(Duration::ZERO)
            .with_cache_dir(cache_dir);
        Arc::new(SessionController::new(1, Arc::new(settings)))
    }

    fn paced_controller(llm: Arc<dyn LlmProvider>, cache_dir: &Path) -> Arc<SessionController> {
        let settings = SessionSettings::new(Arc::new(SharedClientFactory::new(llm)))
            .with_pacing(Duration::from_millis(40))
            .with_cache_dir(cache_dir);
        Arc::new(SessionController::new(1, Arc::new(settings)))
    }

    fn request(agenda: &str) -> StartRequest {
        StartRequest {
            spec: DebateSpec::from_yaml_str(SPEC).unwrap(),
            agenda: agenda.to_string(),
            lang: Lang::Ja,
            use_strategy: false,
            cache_file: None,
            handover: serde_json::json!({"room_id": 1}),
        }
    }

    async fn wait_idle(controller: &SessionController) {
        for _ in 0..200 {
            if !controller.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("debate did not finish");
    }

    async fn all_texts(controller: &SessionController) -> Vec<String> {
        while controller.pending_messages().await > 0 {
            controller.reveal_next().await;
        }
        controller
            .visible_messages()
            .await
            .into_iter()
            .map(|m| m.msg_text.unwrap_or_default())
            .collect()
    }

    fn viewer(mode: RoomMode) -> ViewerInfo {
        ViewerInfo {
            room_id: 1,
            mode,
            screen: ScreenName::Chat,
            accepted_at: Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_full_round_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec!["「賛成」", "反対"]));
        let controller = controller_with(llm, dir.path());

        let outcome = controller.start_discussion(request("X")).await.unwrap();
        assert!(!outcome.exist_cache);
        wait_idle(&controller).await;

        assert_eq!(
            all_texts(&controller).await,
            vec!["議論開始", "X", "======== ターン1 ========", "賛成", "反対", "議論終了"]
        );

        let visible = controller.visible_messages().await;
        let start = &visible[0];
        assert_eq!(start.user_img.as_deref(), Some(SYSTEM_IMAGE));
        let participants = &start.handover_datum.as_ref().unwrap()["participants_config"];
        assert_eq!(participants[0]["name"], "Moderator");
        assert_eq!(participants[2]["name"], "Bob");
        assert_eq!(visible[1].user_name.as_deref(), Some("Moderator"));
        assert_eq!(visible[1].user_img.as_deref(), Some("/images/user.png"));
        assert_eq!(visible[3].user_img.as_deref(), Some("/images/alice.png"));
        assert_eq!(visible[4].user_img.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_reveal_and_late_viewer() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec!["a"])), dir.path());
        for i in 0..5 {
            controller
                .push(Message::new(MessageType::Message, "A", i.to_string()))
                .await;
        }

        let (early_tx, mut early_rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::View), early_tx).await.unwrap();
        assert_eq!(early_rx.recv().await.unwrap(), Outbound::Snapshot("[]".to_string()));

        for _ in 0..3 {
            controller.reveal_next().await;
        }
        let visible = controller.visible_messages().await;
        let texts: Vec<_> = visible.iter().map(|m| m.msg_text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["0", "1", "2"]);

        let (late_tx, mut late_rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::View), late_tx).await.unwrap();
        let Outbound::Snapshot(snapshot) = late_rx.recv().await.unwrap() else {
            panic!("expected snapshot");
        };
        let received: Vec<Message> = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(received, visible);

        // The early viewer saw one full snapshot per reveal.
        let mut sizes = Vec::new();
        while let Ok(Outbound::Snapshot(s)) = early_rx.try_recv() {
            sizes.push(serde_json::from_str::<Vec<Message>>(&s).unwrap().len());
        }
        assert_eq!(sizes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reveal_without_pending_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec![])), dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::View), tx).await.unwrap();
        rx.recv().await.unwrap();

        assert!(controller.reveal_next().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_executor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec![])), dir.path());
        let (tx, _rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::Exec), tx.clone()).await.unwrap();
        let err = controller.connect(viewer(RoomMode::Exec), tx).await.unwrap_err();
        assert!(matches!(err, SessionError::DuplicateExecutor));
        assert_eq!(controller.viewer_count().await, 1);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec!["a"])), dir.path());
        controller
            .push(Message::new(MessageType::Message, "A", "keep"))
            .await;

        controller.running.store(true, Ordering::SeqCst);
        let err = controller.start_discussion(request("X")).await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert_eq!(controller.pending_messages().await, 1);
        assert!(controller.facilitator.lock().await.is_none());
        assert!(controller.is_running());
    }

    #[tokio::test]
    async fn test_continue_requires_started_debate() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec![])), dir.path());
        let err = controller
            .continue_discussion("Y".to_string(), false, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotStarted));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_continuation_round() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec!["a1", "b1", "a2", "b2"]));
        let controller = controller_with(llm.clone(), dir.path());

        controller.start_discussion(request("X")).await.unwrap();
        wait_idle(&controller).await;
        controller
            .continue_discussion("Y".to_string(), false, serde_json::json!({"msg_text": "Y"}))
            .await
            .unwrap();
        wait_idle(&controller).await;

        let texts = all_texts(&controller).await;
        assert_eq!(&texts[6..], &["議論開始", "Y", "======== ターン1 ========", "a2", "b2", "議論終了"]);
        assert_eq!(llm.user_prompts()[2], "Now Y");
    }

    #[tokio::test]
    async fn test_generation_failure_clears_busy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(FailingLlmProvider), dir.path());
        controller.start_discussion(request("X")).await.unwrap();
        wait_idle(&controller).await;

        let visible = {
            all_texts(&controller).await;
            controller.visible_messages().await
        };
        let last = visible.last().unwrap();
        assert_eq!(last.user_name.as_deref(), Some(ERROR_SPEAKER));
        assert!(last.msg_text.as_deref().unwrap().contains("401"));
        assert!(controller.start_discussion(request("X")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_clears_messages() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec!["a"])), dir.path());
        for i in 0..3 {
            controller
                .push(Message::new(MessageType::Message, "A", i.to_string()))
                .await;
        }
        controller.reveal_next().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::View), tx).await.unwrap();
        rx.recv().await.unwrap();

        controller.stop_discussion().await;
        assert!(controller.visible_messages().await.is_empty());
        assert_eq!(controller.pending_messages().await, 0);
        assert_eq!(rx.recv().await.unwrap(), Outbound::Snapshot("[]".to_string()));
    }

    #[tokio::test]
    async fn test_cached_transcript_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("3_sample_ja.json")).unwrap();
        write!(
            file,
            r#"{{"X": [["system_info", "system", "T1"], ["message", "Alice", "「cached」"]]}}"#
        )
        .unwrap();

        let llm = Arc::new(MockLlmProvider::new(vec!["live"]));
        let controller = controller_with(llm.clone(), dir.path());
        let mut req = request("X");
        req.cache_file = Some("3_sample_ja.json".to_string());

        let outcome = controller.start_discussion(req).await.unwrap();
        assert!(outcome.exist_cache);
        wait_idle(&controller).await;

        assert_eq!(all_texts(&controller).await, vec!["議論開始", "T1", "cached", "議論終了"]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.json"), r#"{"other": []}"#).unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec![])), dir.path());
        let mut req = request("X");
        req.cache_file = Some("c.json".to_string());

        controller.start_discussion(req).await.unwrap();
        wait_idle(&controller).await;

        all_texts(&controller).await;
        let visible = controller.visible_messages().await;
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].user_name.as_deref(), Some(ERROR_SPEAKER));
        assert_eq!(visible[1].msg_text.as_deref(), Some(CACHE_ERROR_TEXT));
    }

    #[tokio::test]
    async fn test_missing_cache_file_generates_live() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller_with(Arc::new(MockLlmProvider::new(vec!["live"])), dir.path());
        let mut req = request("X");
        req.cache_file = Some("absent.json".to_string());
        let outcome = controller.start_discussion(req).await.unwrap();
        assert!(!outcome.exist_cache);
        wait_idle(&controller).await;
        assert!(all_texts(&controller).await.contains(&"live".to_string()));
    }

    #[tokio::test]
    async fn test_stop_during_live_round_leaves_store_empty() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec!["a", "b"]));
        let controller = paced_controller(llm, dir.path());

        controller.start_discussion(request("X")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.stop_discussion().await;
        wait_idle(&controller).await;

        assert_eq!(controller.pending_messages().await, 0);
        assert!(controller.visible_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_during_replay_leaves_store_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("r.json"),
            r#"{"X": [["message", "Alice", "one"], ["message", "Bob", "two"], ["message", "Alice", "three"]]}"#,
        )
        .unwrap();
        let controller = paced_controller(Arc::new(MockLlmProvider::new(vec![])), dir.path());
        let mut req = request("X");
        req.cache_file = Some("r.json".to_string());

        assert!(controller.start_discussion(req).await.unwrap().exist_cache);
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.stop_discussion().await;
        wait_idle(&controller).await;

        assert_eq!(controller.pending_messages().await, 0);
        assert!(all_texts(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_without_strategist_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec!["a"]));
        let controller = controller_with(llm.clone(), dir.path());
        let mut req = request("X");
        req.use_strategy = true;

        let err = controller.start_discussion(req).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Config(ConfigError::InvalidValue { ref key, .. }) if key == "tech_enable"
        ));
        assert!(!controller.is_running());
        assert_eq!(controller.pending_messages().await, 0);
        assert!(controller.facilitator.lock().await.is_none());

        controller.start_discussion(request("X")).await.unwrap();
        wait_idle(&controller).await;
        let err = controller
            .continue_discussion("Y".to_string(), true, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert!(!controller.is_running());
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_debate_and_closes_viewers() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmProvider::new(vec!["a", "b"]));
        let controller = paced_controller(llm.clone(), dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        controller.connect(viewer(RoomMode::Exec), tx).await.unwrap();

        controller.start_discussion(request("X")).await.unwrap();
        controller.shutdown().await;
        wait_idle(&controller).await;

        assert_eq!(controller.pending_messages().await, 0);
        assert_eq!(controller.viewer_count().await, 0);
        assert!(llm.calls() < 2);
        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            last = Some(frame);
        }
        assert_eq!(
            last,
            Some(Outbound::Close {
                code: ROOM_CLOSED_CLOSE_CODE,
                reason: ROOM_CLOSED_REASON.to_string()
            })
        );
    }
}
