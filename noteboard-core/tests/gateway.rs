//! Gateway behaviour across tier chains
//!
//! Durable tiers are stood in for by `FakeTier`, which keeps notes in a Vec
//! and can be switched off to simulate an outage.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use noteboard_core::{
    DurableTier, GatewayConfig, GatewayError, Note, NoteDraft, NoteId, NoteKind,
    PersistenceGateway, TierError, TierKind, TierResult, UpdateStatus, ValidationError,
};

const WINDOW: Duration = Duration::from_secs(10);

struct FakeTier {
    kind: TierKind,
    notes: Mutex<Vec<Note>>,
    down: AtomicBool,
    live: AtomicBool,
    calls: AtomicUsize,
    inserts: AtomicUsize,
}

impl FakeTier {
    fn new(kind: TierKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            notes: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
            live: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        })
    }

    fn down(kind: TierKind) -> Arc<Self> {
        let tier = Self::new(kind);
        tier.set_down(true);
        tier
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
        self.live.store(!down, Ordering::SeqCst);
    }

    fn seed(&self, text: &str, age: ChronoDuration) -> Note {
        let id = NoteId::new(format!("{}-seed-{}", self.kind, self.len()));
        let note = NoteDraft::new(text, None, Some(1.0), Some(1.0))
            .unwrap()
            .into_note(id, Utc::now() - age);
        self.notes.lock().unwrap().push(note.clone());
        note
    }

    fn len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> TierResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(TierError::Backend(format!("{} is down", self.kind)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableTier for FakeTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    async fn list(&self) -> TierResult<Vec<Note>> {
        self.check()?;
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn latest_with_text(&self, text: &str) -> TierResult<Option<Note>> {
        self.check()?;
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.text == text)
            .max_by_key(|n| n.created_at)
            .cloned())
    }

    async fn insert(&self, draft: &NoteDraft) -> TierResult<Note> {
        self.check()?;
        let n = self.inserts.fetch_add(1, Ordering::SeqCst);
        let note = draft
            .clone()
            .into_note(NoteId::new(format!("{}-{}", self.kind, n)), Utc::now());
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn update_position(&self, id: &NoteId, x: f64, y: f64) -> TierResult<UpdateStatus> {
        self.check()?;
        let mut notes = self.notes.lock().unwrap();
        match notes.iter_mut().find(|n| &n.id == id) {
            Some(note) => {
                note.x = x;
                note.y = y;
                Ok(UpdateStatus::Applied)
            }
            None => Ok(UpdateStatus::Missed),
        }
    }

    async fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

fn gateway(tiers: &[&Arc<FakeTier>]) -> PersistenceGateway {
    let tiers = tiers
        .iter()
        .map(|t| Arc::clone(t) as Arc<dyn DurableTier>)
        .collect();
    PersistenceGateway::with_tiers(tiers, WINDOW)
}

#[tokio::test]
async fn memory_only_create_matches_example() {
    let gw = gateway(&[]);

    let outcome = gw
        .create("Happy Birthday!", Some("note"), None, None)
        .await
        .unwrap();

    assert_eq!(outcome.tier, TierKind::Memory);
    assert!(!outcome.duplicate);
    assert_eq!(outcome.note.text, "Happy Birthday!");
    assert_eq!(outcome.note.kind, NoteKind::Note);
    assert!((0.0..450.0).contains(&outcome.note.x));
    assert!((0.0..350.0).contains(&outcome.note.y));
    assert_eq!(gw.list().await, vec![outcome.note]);
}

#[tokio::test]
async fn created_text_is_trimmed_input() {
    let gw = gateway(&[]);
    for len in [1, 2, 50, 99, 100] {
        let text = "n".repeat(len);
        let padded = format!("  {}\t", text);
        let outcome = gw.create(&padded, None, Some(0.0), Some(0.0)).await.unwrap();
        assert_eq!(outcome.note.text, text);
    }
}

#[tokio::test]
async fn blank_text_touches_no_tier() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);

    for text in ["", "   ", "\n\t "] {
        let err = gw.create(text, None, None, None).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation(ValidationError::Empty { field: "note" })
        );
    }

    assert_eq!(db.calls(), 0);
    assert_eq!(gw.debug_status().await.fallback_count, 0);
}

#[tokio::test]
async fn durable_tier_suppresses_resubmission() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);

    let first = gw.create("Meet at noon", None, None, None).await.unwrap();
    let second = gw.create("Meet at noon", Some("present"), None, None).await.unwrap();

    assert_eq!(first.tier, TierKind::Database);
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.tier, TierKind::Database);
    assert_eq!(second.note.id, first.note.id);
    assert_eq!(db.len(), 1);
}

#[tokio::test]
async fn stale_match_is_inserted_again() {
    let db = FakeTier::new(TierKind::Database);
    let old = db.seed("Meet at noon", ChronoDuration::seconds(11));
    let gw = gateway(&[&db]);

    let outcome = gw.create("Meet at noon", None, None, None).await.unwrap();

    assert!(!outcome.duplicate);
    assert_ne!(outcome.note.id, old.id);
    assert_eq!(db.len(), 2);
}

#[tokio::test]
async fn dedup_compares_latest_match_only() {
    let db = FakeTier::new(TierKind::Database);
    db.seed("again", ChronoDuration::seconds(60));
    let recent = db.seed("again", ChronoDuration::seconds(3));
    let gw = gateway(&[&db]);

    let outcome = gw.create("again", None, None, None).await.unwrap();

    assert!(outcome.duplicate);
    assert_eq!(outcome.note.id, recent.id);
}

#[tokio::test]
async fn higher_tier_duplicate_is_authoritative() {
    let remote = FakeTier::new(TierKind::Remote);
    let db = FakeTier::new(TierKind::Database);
    remote.seed("hello", ChronoDuration::seconds(1));
    let gw = gateway(&[&remote, &db]);

    let outcome = gw.create("hello", None, None, None).await.unwrap();

    assert!(outcome.duplicate);
    assert_eq!(outcome.tier, TierKind::Remote);
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn failing_tier_falls_through_in_order() {
    let remote = FakeTier::down(TierKind::Remote);
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&remote, &db]);

    let outcome = gw.create("fallthrough", None, None, None).await.unwrap();
    assert_eq!(outcome.tier, TierKind::Database);
    assert_eq!(remote.calls(), 1);

    db.set_down(true);
    let outcome = gw.create("fallthrough two", None, None, None).await.unwrap();
    assert_eq!(outcome.tier, TierKind::Memory);
    assert_eq!(gw.debug_status().await.fallback_count, 1);
}

#[tokio::test]
async fn memory_tier_never_deduplicates() {
    let db = FakeTier::down(TierKind::Database);
    let gw = gateway(&[&db]);

    let a = gw.create("twice", None, None, None).await.unwrap();
    let b = gw.create("twice", None, None, None).await.unwrap();

    assert!(!a.duplicate && !b.duplicate);
    assert_ne!(a.note.id, b.note.id);
    assert_eq!(gw.list().await.len(), 2);
}

#[tokio::test]
async fn list_uses_first_reachable_tier() {
    let remote = FakeTier::new(TierKind::Remote);
    let db = FakeTier::new(TierKind::Database);
    remote.seed("from remote", ChronoDuration::zero());
    db.seed("from db", ChronoDuration::zero());
    let gw = gateway(&[&remote, &db]);

    let texts: Vec<_> = gw.list().await.into_iter().map(|n| n.text).collect();
    assert_eq!(texts, ["from remote"]);

    remote.set_down(true);
    let texts: Vec<_> = gw.list().await.into_iter().map(|n| n.text).collect();
    assert_eq!(texts, ["from db"]);

    db.set_down(true);
    assert!(gw.list().await.is_empty());
}

#[tokio::test]
async fn update_moves_note_and_keeps_content() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);
    let created = gw
        .create("gift for sam", Some("present"), Some(10.0), Some(10.0))
        .await
        .unwrap();

    let outcome = gw
        .update_position(created.note.id.as_str(), 222.0, 111.5)
        .await
        .unwrap();
    assert_eq!(outcome.tier, TierKind::Database);

    let note = gw.list().await.into_iter().next().unwrap();
    assert_eq!((note.x, note.y), (222.0, 111.5));
    assert_eq!(note.text, "gift for sam");
    assert_eq!(note.kind, NoteKind::Present);
}

#[tokio::test]
async fn note_created_during_outage_stays_movable() {
    let db = FakeTier::down(TierKind::Database);
    let gw = gateway(&[&db]);
    let created = gw.create("offline note", None, None, None).await.unwrap();
    assert_eq!(created.tier, TierKind::Memory);

    db.set_down(false);
    let outcome = gw
        .update_position(created.note.id.as_str(), 5.0, 6.0)
        .await
        .unwrap();
    assert_eq!(outcome.tier, TierKind::Memory);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);

    let err = gw.update_position("nope", 1.0, 2.0).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::NotFound {
            id: NoteId::new("nope")
        }
    );
}

#[tokio::test]
async fn durable_id_with_tier_down_is_not_found() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);
    let created = gw.create("durable", None, None, None).await.unwrap();

    db.set_down(true);
    let err = gw
        .update_position(created.note.id.as_str(), 1.0, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound { .. }));
}

#[tokio::test]
async fn invalid_update_touches_no_tier() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);

    assert!(matches!(
        gw.update_position(" ", 1.0, 2.0).await,
        Err(GatewayError::Validation(ValidationError::Empty { field: "id" }))
    ));
    assert!(matches!(
        gw.update_position("abc", f64::NAN, 2.0).await,
        Err(GatewayError::Validation(ValidationError::NotFinite { field: "x", .. }))
    ));
    assert_eq!(db.calls(), 0);
}

#[tokio::test]
async fn status_reports_primary_liveness() {
    let db = FakeTier::new(TierKind::Database);
    let gw = gateway(&[&db]);
    assert!(gw.debug_status().await.primary_connection_live);

    db.set_down(true);
    gw.create("x", None, None, None).await.unwrap();
    let status = gw.debug_status().await;
    assert!(!status.primary_connection_live);
    assert_eq!(status.fallback_count, 1);

    // a live remote tier says nothing about the primary database
    let remote = FakeTier::new(TierKind::Remote);
    let gw = gateway(&[&remote]);
    assert!(!gw.debug_status().await.primary_connection_live);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_unique_ids() {
    let gw = Arc::new(gateway(&[]));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let gw = Arc::clone(&gw);
            tokio::spawn(async move {
                gw.create(&format!("note {}", i), None, None, None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.tier, TierKind::Memory);
        assert!(ids.insert(outcome.note.id));
    }

    let listed: HashSet<_> = gw.list().await.into_iter().map(|n| n.id).collect();
    assert_eq!(listed.len(), 50);
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn unreachable_backends_degrade_to_memory() {
    let mut config = GatewayConfig::default();
    config.database_url = Some("postgres://noteboard:pw@127.0.0.1:1/noteboard".into());
    config.remote.base_url = Some("http://127.0.0.1:1".into());
    config.remote.api_key = Some("test-key".into());
    config.selection_timeout_ms = 200;
    config.socket_timeout_ms = 500;
    config.connect_attempts = 1;

    let gw = PersistenceGateway::init(&config).await;
    assert_eq!(
        gw.tier_kinds(),
        vec![TierKind::Remote, TierKind::Database, TierKind::Memory]
    );

    let created = gw.create("still works", None, None, None).await.unwrap();
    assert_eq!(created.tier, TierKind::Memory);
    assert_eq!(gw.list().await, vec![created.note.clone()]);

    let moved = gw
        .update_position(created.note.id.as_str(), 9.0, 9.0)
        .await
        .unwrap();
    assert_eq!(moved.tier, TierKind::Memory);

    let status = gw.debug_status().await;
    assert!(!status.primary_connection_live);
    assert_eq!(status.fallback_count, 1);

    gw.shutdown().await;
}
