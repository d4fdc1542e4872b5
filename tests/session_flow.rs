//! End-to-end session tests through the public API with a scripted model.

use async_trait::async_trait;
use debate_forge::debate::{DebateSpec, Lang};
use debate_forge::error::{ConfigError, LlmError, SessionError};
use debate_forge::llm::{
    Choice, ClientFactory, GenerationRequest, GenerationResponse, LlmProvider, Message as ChatMessage,
    Usage,
};
use debate_forge::session::{
    MessageType, Outbound, RoomMode, RoomRegistry, ScreenName, SessionController, SessionSettings,
    StartRequest, ViewerInfo,
};
use debate_forge::strategy::StrategySetup;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Replies "<n>番目の意見" to panelists and a state name to the judge.
struct ScriptedModel {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let content = if prompt.starts_with("STATE?") {
            "converging".to_string()
        } else {
            format!("「{}番目の意見」", n)
        };
        Ok(GenerationResponse {
            id: format!("scripted-{}", n),
            model: "scripted".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

struct ScriptedFactory {
    model: Arc<ScriptedModel>,
}

impl ClientFactory for ScriptedFactory {
    fn create(&self, tag: &str) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        match tag {
            "OpenAI" | "local" => Ok(self.model.clone()),
            other => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }
}

const DEBATE_YAML: &str = r#"
label: Tax
user: {name: Moderator, image: /images/user.png, voice_id: 1, voice_pitch: 0}
panelists:
  - {name: Alice, persona: economist, model: OpenAI, image: /images/alice.png}
  - {name: Bob, persona: politician, model: local, image: /images/bob.png}
system_prompt: "You are ${__persona__}."
first_user_prompt: "Agenda: ${__current_agenda__}"
subsequent_user_prompt: "Others said: ${__opponents_comments_on_current_agenda__}"
additional_first_user_prompt: "New agenda: ${__current_agenda__} after ${__last_agenda__}"
additional_subsequent_user_prompt: "${__opponents_comments_on_current_agenda__}"
additional_last_user_prompt: "${__opponents_comments_on_last_agenda__}"
"#;

const STRATEGIST_YAML: &str = r#"
tail_prompts:
  - " Push back firmly."
  - " Find common ground."
legal_prompts_dict:
  escalating: [1]
  converging: [0, 1]
state_names: [escalating, converging]
state_judge_prompt: "STATE? ${__comments__} ${__options__}"
embedding_model_name: hashed
embedding_dimension: 64
"#;

fn strategy_setup() -> StrategySetup {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(STRATEGIST_YAML.as_bytes()).unwrap();
    StrategySetup::load(file.path()).expect("strategist config loads")
}

async fn session(cache_dir: &std::path::Path) -> Arc<SessionController> {
    let factory = ScriptedFactory {
        model: Arc::new(ScriptedModel {
            calls: AtomicUsize::new(0),
        }),
    };
    let settings = SessionSettings::new(Arc::new(factory))
        .with_strategy(Some(strategy_setup()))
        .with_cache_dir(cache_dir)
        .with_pacing(Duration::ZERO);
    let registry = RoomRegistry::new(Arc::new(settings));
    registry.session(1).await.unwrap()
}

fn request(agenda: &str, use_strategy: bool, cache_file: Option<&str>) -> StartRequest {
    StartRequest {
        spec: DebateSpec::from_yaml_str(DEBATE_YAML).unwrap(),
        agenda: agenda.to_string(),
        lang: Lang::En,
        use_strategy,
        cache_file: cache_file.map(str::to_string),
        handover: serde_json::json!({"agenda_text": agenda}),
    }
}

async fn wait_idle(session: &SessionController) {
    for _ in 0..400 {
        if !session.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("debate did not finish");
}

async fn reveal_all(session: &SessionController) -> Vec<debate_forge::session::Message> {
    let mut visible = Vec::new();
    while session.pending_messages().await > 0 {
        visible = session.reveal_next().await;
    }
    visible
}

fn viewer(mode: RoomMode) -> ViewerInfo {
    ViewerInfo {
        room_id: 1,
        mode,
        screen: ScreenName::Chat,
        accepted_at: chrono::Utc::now().fixed_offset(),
    }
}

#[tokio::test]
async fn test_strategic_round_is_revealed_in_order() {
    let cache = tempfile::tempdir().unwrap();
    let session = session(cache.path()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.connect(viewer(RoomMode::Exec), tx).await.unwrap();
    assert_eq!(rx.recv().await, Some(Outbound::Snapshot("[]".to_string())));

    let outcome = session.start_discussion(request("VAT", true, None)).await.unwrap();
    assert!(!outcome.exist_cache);
    wait_idle(&session).await;

    let visible = reveal_all(&session).await;
    let kinds: Vec<_> = visible.iter().map(|m| m.kind.unwrap()).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::SystemInfo,
            MessageType::Message,
            MessageType::SystemInfo,
            MessageType::Message,
            MessageType::OptInfo,
            MessageType::Message,
            MessageType::SystemInfo,
        ]
    );
    let speakers: Vec<_> = visible
        .iter()
        .map(|m| m.user_name.clone().unwrap())
        .collect();
    assert_eq!(
        speakers,
        vec!["system", "Moderator", "system", "Alice", "optimizer", "Bob", "system"]
    );
    assert_eq!(visible[0].msg_text.as_deref(), Some("Discussion started"));
    assert_eq!(visible[1].msg_text.as_deref(), Some("VAT"));
    assert_eq!(visible[6].msg_text.as_deref(), Some("Discussion finished"));
    assert!(!visible[3].msg_text.as_deref().unwrap().starts_with('「'));
    assert_eq!(visible[3].user_img.as_deref(), Some("/images/alice.png"));
    assert_eq!(visible[4].user_img.as_deref(), Some("/images/system.png"));

    // One snapshot per revealed line.
    let mut snapshots = 0;
    while let Ok(Outbound::Snapshot(_)) = rx.try_recv() {
        snapshots += 1;
    }
    assert_eq!(snapshots, 7);
}

#[tokio::test]
async fn test_second_executor_rejected() {
    let cache = tempfile::tempdir().unwrap();
    let session = session(cache.path()).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    session.connect(viewer(RoomMode::Exec), tx.clone()).await.unwrap();
    session.connect(viewer(RoomMode::View), tx.clone()).await.unwrap();
    assert!(matches!(
        session.connect(viewer(RoomMode::Exec), tx).await,
        Err(SessionError::DuplicateExecutor)
    ));
    assert_eq!(session.viewer_count().await, 2);
}

#[tokio::test]
async fn test_continuation_after_first_round() {
    let cache = tempfile::tempdir().unwrap();
    let session = session(cache.path()).await;
    session.start_discussion(request("VAT", false, None)).await.unwrap();
    wait_idle(&session).await;
    let first = reveal_all(&session).await.len();

    session
        .continue_discussion("Income tax".to_string(), false, serde_json::json!({}))
        .await
        .unwrap();
    wait_idle(&session).await;
    let visible = reveal_all(&session).await;

    // start + agenda + turn + two comments + finished
    assert_eq!(visible.len(), first + 6);
    assert_eq!(visible[first + 1].msg_text.as_deref(), Some("Income tax"));
}

#[tokio::test]
async fn test_cached_transcript_is_replayed() {
    let cache = tempfile::tempdir().unwrap();
    std::fs::write(
        cache.path().join("1_tax_en.json"),
        serde_json::json!({
            "VAT": [
                ["system_info", "system", "======== Turn 1 ========"],
                ["message", "Alice", "「cached」"],
            ]
        })
        .to_string(),
    )
    .unwrap();
    let session = session(cache.path()).await;

    let outcome = session
        .start_discussion(request("VAT", false, Some("1_tax_en.json")))
        .await
        .unwrap();
    assert!(outcome.exist_cache);
    wait_idle(&session).await;

    let visible = reveal_all(&session).await;
    let texts: Vec<_> = visible
        .iter()
        .map(|m| m.msg_text.clone().unwrap())
        .collect();
    assert_eq!(
        texts,
        vec![
            "Discussion started",
            "======== Turn 1 ========",
            "cached",
            "Discussion finished"
        ]
    );
}
