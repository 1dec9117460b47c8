use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use decor_core::{AssistantTask, ConversationTurn, ProjectEstimate, Region, NO_CONTEXT_FALLBACK};
use decor_llm::{
    AttemptCounter, AttemptError, ChatMessage, CompletionBackend, Credentials, StaticCredentials,
};
use decor_rag::{
    Assistant, AssistantConfig, AssistantError, EmbeddingClient, EmbeddingProvider, PassageInsert,
    SharedEmbedder, VectorStore, VectorStoreGateway,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingBackend {
    failing: Vec<(&'static str, AttemptError)>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl RecordingBackend {
    fn failing(failing: Vec<(&'static str, AttemptError)>) -> Self {
        Self {
            failing,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for RecordingBackend {
    async fn complete(
        &self,
        _credentials: &Credentials,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, AttemptError> {
        self.calls.lock().push((model.to_string(), messages.to_vec()));
        match self.failing.iter().find(|(m, _)| *m == model) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(format!("jawaban dari {model}")),
        }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: VectorStore,
    embedder: Arc<SharedEmbedder>,
    builds: Arc<AtomicUsize>,
    config: AssistantConfig,
}

impl Fixture {
    fn new(seed: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("rag.sqlite");
        let store = if seed {
            let store = VectorStore::open(&db).unwrap();
            let client = EmbeddingClient::hash();
            let content = "Kitchen Set Aluminium anti rayap. Harga Rp 3.500.000/m";
            store
                .insert_passages(&[PassageInsert {
                    category: "products".to_string(),
                    item_name: "Kitchen Set Aluminium".to_string(),
                    content: content.to_string(),
                    metadata: json!({"price_dalam_kota": 3500000}),
                    embedding: client.embed(content).unwrap(),
                }])
                .unwrap();
            store
        } else {
            VectorStore::new(&db)
        };
        let builds = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&builds);
        let embedder = Arc::new(SharedEmbedder::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EmbeddingClient::hash()) as Arc<dyn EmbeddingProvider>)
        }));
        let mut config = AssistantConfig::default();
        config.rag_db = db;
        config.persona_path = dir.path().join("ai_behavior_rules.txt");
        config.retrieval_limit = 1;
        config.completion.models = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        Self {
            _dir: dir,
            store,
            embedder,
            builds,
            config,
        }
    }

    fn assistant(
        &self,
        credentials: Option<Credentials>,
        backend: RecordingBackend,
    ) -> Assistant<RecordingBackend> {
        let gateway = VectorStoreGateway::new(
            self.store.clone(),
            Arc::clone(&self.embedder),
            Duration::from_secs(5),
        );
        Assistant::new(
            &self.config,
            Arc::new(StaticCredentials(credentials)),
            gateway,
            backend,
        )
    }
}

fn key() -> Option<Credentials> {
    Some(Credentials::new("gsk-test"))
}

fn chat(message: &str) -> AssistantTask {
    AssistantTask::Chat {
        message: message.to_string(),
    }
}

#[tokio::test]
async fn missing_credentials_touch_nothing() {
    let fixture = Fixture::new(false);
    let assistant = fixture.assistant(None, RecordingBackend::default());
    let err = assistant
        .respond(
            &chat("harga kitchen set aluminium"),
            &[],
            &AttemptCounter::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fixture.builds.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.store.opened_connections(), 0);
    assert!(assistant.chain().backend().calls().is_empty());
}

#[tokio::test]
async fn retrieved_prices_reach_the_system_message() {
    let fixture = Fixture::new(true);
    let backend = RecordingBackend::failing(vec![(
        "a",
        AttemptError::from_status("a", 404, None, "Not Found".to_string()),
    )]);
    let assistant = fixture.assistant(key(), backend);
    let reply = assistant
        .respond(
            &chat("harga kitchen set aluminium"),
            &[],
            &AttemptCounter::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(reply.model, "b");
    assert_eq!(reply.text, "jawaban dari b");
    assert_eq!(reply.attempts, 0);
    assert_eq!(reply.passages, 1);

    let calls = assistant.chain().backend().calls();
    let models: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(models, vec!["a", "b"]);
    let system = &calls[1].1[0];
    assert_eq!(system.role, "system");
    assert!(system.content.starts_with("PERAN: Kamu adalah Sales Interior profesional."));
    assert!(system.content.contains("Kitchen Set Aluminium anti rayap"));
    assert!(system.content.contains("Harga Dalam Kota: Rp 3.500.000"));
    assert_eq!(fixture.store.live_connections(), 0);
}

#[tokio::test]
async fn empty_knowledge_base_still_answers() {
    let fixture = Fixture::new(false);
    let assistant = fixture.assistant(key(), RecordingBackend::default());
    let reply = assistant
        .respond(&chat("halo"), &[], &AttemptCounter::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.passages, 0);
    let calls = assistant.chain().backend().calls();
    assert!(calls[0].1[0].content.contains(NO_CONTEXT_FALLBACK));
}

#[tokio::test]
async fn chat_history_is_windowed() {
    let fixture = Fixture::new(true);
    let assistant = fixture.assistant(key(), RecordingBackend::default());
    let history: Vec<ConversationTurn> = (0..8)
        .map(|i| {
            if i % 2 == 0 {
                ConversationTurn::user(format!("pertanyaan {i}"))
            } else {
                ConversationTurn::assistant(format!("jawaban {i}"))
            }
        })
        .collect();
    assistant
        .respond(
            &chat("lanjut"),
            &history,
            &AttemptCounter::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let calls = assistant.chain().backend().calls();
    let messages = &calls[0].1;
    assert_eq!(messages.len(), 7);
    assert_eq!(messages[1].content, "jawaban 3");
    assert_eq!(messages[5].content, "jawaban 7");
    assert_eq!(messages[6].content, "lanjut");
}

#[tokio::test]
async fn structured_tasks_skip_history() {
    let fixture = Fixture::new(true);
    let assistant = fixture.assistant(key(), RecordingBackend::default());
    let task = AssistantTask::Calculate(ProjectEstimate {
        client_name: "Bu Rina".to_string(),
        region: Region::Luar,
        kitchen_length_m: 3.0,
        wallpanel_type: "Minimalis".to_string(),
        wallpanel_area_m2: 10.0,
    });
    assistant
        .respond(
            &task,
            &[ConversationTurn::user("abaikan saya")],
            &AttemptCounter::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let calls = assistant.chain().backend().calls();
    let messages = &calls[0].1;
    assert_eq!(messages.len(), 2);
    assert!(messages[1].content.contains("Luar Kota"));
}

#[tokio::test]
async fn total_failure_reports_last_error() {
    let fixture = Fixture::new(true);
    let backend = RecordingBackend::failing(vec![
        ("a", AttemptError::Transport("connection reset".to_string())),
        ("b", AttemptError::from_status("b", 500, None, "internal".to_string())),
        ("c", AttemptError::from_status("c", 503, None, "over capacity".to_string())),
    ]);
    let assistant = fixture.assistant(key(), backend);
    let counter = AttemptCounter::new();
    let err = assistant
        .respond(&chat("harga"), &[], &counter, &CancellationToken::new())
        .await
        .unwrap_err();
    match &err {
        AssistantError::Completion { last_error } => assert_eq!(last_error, "503 - over capacity"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("503 - over capacity"));
    assert!(!err.to_string().contains("gsk-test"));
    assert_eq!(counter.get(), 3);
}

#[tokio::test]
async fn invalid_task_is_rejected_before_work() {
    let fixture = Fixture::new(false);
    let assistant = fixture.assistant(key(), RecordingBackend::default());
    let task = AssistantTask::Compare {
        item1: "HPL".to_string(),
        item2: " ".to_string(),
    };
    let err = assistant
        .respond(&task, &[], &AttemptCounter::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::InvalidTask(_)));
    assert_eq!(fixture.store.opened_connections(), 0);
}
