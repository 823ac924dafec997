// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline scenarios over mock adapters: media, speech, and
//! chat are scripted; everything between them is real.

use std::sync::Arc;
use std::time::Duration;

use echothread_core::types::{stream_id_for, Command, HeaderContent};
use echothread_core::{ChatPoster, MediaFailureKind, StreamState, TeamId, UserId};
use echothread_engine::{
    CommandRouter, RouterContext, StreamController, StreamRegistry, StreamSettings,
    StreamSpawnArgs, TranscriptionPool,
};
use echothread_storage::{Database, UserSecretStore};
use echothread_test_utils::{
    tone, MockChatLookup, MockChatPoster, MockMediaSource, MockSpeechEngine,
};
use echothread_vault::SecretBox;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const VALID_JAR: &str = "# Netscape HTTP Cookie File\n\
.youtube.com\tTRUE\t/\tTRUE\t1999999999\tSID\tabc123\n";

fn test_settings() -> StreamSettings {
    StreamSettings {
        use_energy_classifier: true,
        grace: Duration::from_secs(2),
        ..StreamSettings::default()
    }
}

fn team() -> TeamId {
    TeamId("T1".into())
}

fn user(n: u32) -> UserId {
    UserId(format!("U{n}"))
}

/// Speech burst followed by silence, in 100ms blocks.
fn speech_then_silence(speech_ms: u64, silence_ms: u64) -> Vec<Vec<i16>> {
    let mut blocks = Vec::new();
    for _ in 0..speech_ms / 100 {
        blocks.push(tone(100, 3000));
    }
    for _ in 0..silence_ms / 100 {
        blocks.push(tone(100, 0));
    }
    blocks
}

async fn wait_for_state(
    controller: &Arc<StreamController>,
    want: StreamState,
) -> StreamState {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let state = controller.state();
            if state == want || state.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state wait timed out")
}

struct Harness {
    poster: Arc<MockChatPoster>,
    registry: Arc<StreamRegistry>,
    users: UserSecretStore,
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

/// Spins up a router over mock adapters with the given media script and
/// scripted transcriptions.
async fn harness(media: Arc<MockMediaSource>, engine: MockSpeechEngine) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("e2e.db").to_str().unwrap())
        .await
        .unwrap();
    let users = UserSecretStore::new(db, Arc::new(SecretBox::from_passphrase("test")));

    let poster = MockChatPoster::new();
    let registry = StreamRegistry::new(Duration::from_secs(60));
    let pool = TranscriptionPool::new(Arc::new(engine), 2, 8);

    let router = CommandRouter::new(RouterContext {
        registry: registry.clone(),
        chat: Arc::new(MockChatLookup {
            poster: poster.clone(),
        }),
        media,
        pool,
        users: users.clone(),
        settings: test_settings(),
        version: "test".into(),
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let router_cancel = cancel.clone();
    tokio::spawn(async move { router.run(command_rx, router_cancel).await });

    Harness {
        poster,
        registry,
        users,
        command_tx,
        cancel,
        _dir: dir,
    }
}

async fn store_cookies(h: &Harness, user_id: &UserId) {
    h.users
        .put_cookies(&team(), user_id, VALID_JAR.as_bytes())
        .await
        .unwrap();
}

async fn wait_for_thread(h: &Harness) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let headers = h.poster.headers.lock().await;
            if let Some(ts) = headers.keys().next() {
                return ts.clone();
            }
            drop(headers);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no thread was opened")
}

// --- Scenario: happy path, single sentence ---

#[tokio::test]
async fn happy_path_posts_one_sentence_and_stops_on_eof() {
    let media = MockMediaSource::new(speech_then_silence(2000, 2000));
    let engine = MockSpeechEngine::with_responses(["こんにちは、世界。"]);
    let poster = MockChatPoster::new();
    let pool = TranscriptionPool::new(Arc::new(engine), 2, 8);

    let thread = poster
        .open_thread(
            "C1",
            &HeaderContent {
                title: None,
                url: "https://youtube.com/watch?v=abc".into(),
                status: "⏳ Starting…".into(),
            },
        )
        .await
        .unwrap();

    let controller = StreamController::spawn(StreamSpawnArgs {
        stream_id: stream_id_for(&team(), &user(1), &thread.thread_ts, "0"),
        team_id: team(),
        user_id: user(1),
        url: "https://youtube.com/watch?v=abc".into(),
        thread: thread.clone(),
        poster: poster.clone(),
        media,
        pool,
        cookies: Some(VALID_JAR.as_bytes().to_vec()),
        language_hint: Some("ja".into()),
        settings: test_settings(),
    });

    let final_state = controller.wait_terminal().await;
    assert_eq!(final_state, StreamState::Stopped);

    let texts = poster.thread_texts(&thread.thread_ts).await;
    assert_eq!(texts, vec!["こんにちは、世界。".to_string()]);

    let header = poster.last_header(&thread.thread_ts).await.unwrap();
    assert_eq!(header.status, "✅ Stream ended");
    assert!(controller.last_error().is_none());
}

// --- Scenario: media auth failure surfaces remediation ---

#[tokio::test]
async fn auth_failure_fails_stream_with_cookie_guidance() {
    let media = MockMediaSource::new(Vec::new());
    media.fail_next_open(MediaFailureKind::Auth).await;
    let poster = MockChatPoster::new();
    let pool = TranscriptionPool::new(Arc::new(MockSpeechEngine::new()), 1, 8);

    let thread = poster
        .open_thread(
            "C1",
            &HeaderContent {
                title: None,
                url: "https://youtube.com/watch?v=abc".into(),
                status: "⏳ Starting…".into(),
            },
        )
        .await
        .unwrap();

    let controller = StreamController::spawn(StreamSpawnArgs {
        stream_id: stream_id_for(&team(), &user(1), &thread.thread_ts, "0"),
        team_id: team(),
        user_id: user(1),
        url: "https://youtube.com/watch?v=abc".into(),
        thread: thread.clone(),
        poster: poster.clone(),
        media,
        pool,
        cookies: None,
        language_hint: None,
        settings: test_settings(),
    });

    assert_eq!(controller.wait_terminal().await, StreamState::Failed);
    let header = poster.last_header(&thread.thread_ts).await.unwrap();
    assert_eq!(header.status, "❌ Cookie authentication failed");

    let texts = poster.thread_texts(&thread.thread_ts).await;
    assert!(texts.iter().any(|t| t.contains("cookies.txt")));
    assert!(controller.last_error().is_some());
}

// --- Scenario: retry after auth failure, via the router ---

#[tokio::test]
async fn retry_after_failure_creates_new_stream_in_same_thread() {
    let media = MockMediaSource::new(speech_then_silence(1000, 2000));
    media.fail_next_open(MediaFailureKind::Auth).await;
    let h = harness(media, MockSpeechEngine::new()).await;
    store_cookies(&h, &user(1)).await;

    h.command_tx
        .send(Command::Start {
            team_id: team(),
            user_id: user(1),
            channel_id: "C1".into(),
            url: "https://youtube.com/watch?v=abc".into(),
        })
        .await
        .unwrap();

    let thread_ts = wait_for_thread(&h).await;
    let old = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(c) = h.registry.get_by_thread(&team(), &thread_ts) {
                if c.state().is_terminal() {
                    return c;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stream never failed");
    assert_eq!(old.state(), StreamState::Failed);
    let old_id = old.stream_id.clone();

    // Fresh cookies, then `retry` typed in the thread.
    h.command_tx
        .send(Command::CookieUpload {
            team_id: team(),
            user_id: user(1),
            channel_id: "D1".into(),
            content: VALID_JAR.into(),
        })
        .await
        .unwrap();
    // Commands are dispatched concurrently; wait for the upload ack before
    // asking for the retry that depends on it.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let saved = h
                .poster
                .ephemerals
                .lock()
                .await
                .iter()
                .any(|(_, _, text)| text.contains("Cookies saved"));
            if saved {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("cookie upload never acknowledged");
    h.command_tx
        .send(Command::ThreadMessage {
            team_id: team(),
            user_id: user(1),
            channel_id: "C1".into(),
            thread_ts: thread_ts.clone(),
            text: "retry".into(),
        })
        .await
        .unwrap();

    let new = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(c) = h.registry.get_by_thread(&team(), &thread_ts) {
                if c.stream_id != old_id {
                    return c;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("retry never produced a new stream");

    // New stream id, same thread; old stream stays failed and its header
    // carries the retried marker.
    assert_eq!(new.thread.thread_ts, thread_ts);
    assert_ne!(new.stream_id, old_id);
    assert_eq!(old.state(), StreamState::Failed);
    let edits = h.poster.headers.lock().await.get(&thread_ts).unwrap().clone();
    assert!(edits.iter().any(|e| e.status.contains("Retried")));

    h.cancel.cancel();
}

// --- Scenario: concurrent users, isolated credentials ---

#[tokio::test]
async fn concurrent_users_use_their_own_cookies_and_threads() {
    let media = MockMediaSource::new(speech_then_silence(1000, 2000));
    let h = harness(media.clone(), MockSpeechEngine::new()).await;

    let jar1 = format!("{VALID_JAR}.youtube.com\tTRUE\t/\tTRUE\t0\tUSER\tone\n");
    let jar2 = format!("{VALID_JAR}.youtube.com\tTRUE\t/\tTRUE\t0\tUSER\ttwo\n");
    h.users
        .put_cookies(&team(), &user(1), jar1.as_bytes())
        .await
        .unwrap();
    h.users
        .put_cookies(&team(), &user(2), jar2.as_bytes())
        .await
        .unwrap();

    for (n, url) in [(1, "https://youtube.com/watch?v=one"), (2, "https://youtube.com/watch?v=two")]
    {
        h.command_tx
            .send(Command::Start {
                team_id: team(),
                user_id: user(n),
                channel_id: format!("C{n}"),
                url: url.into(),
            })
            .await
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.registry.snapshots(Some(&team())).len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("two streams never appeared");

    let opened = media.opened_with.lock().await.clone();
    assert_eq!(opened.len(), 2);
    let blobs: Vec<String> = opened
        .iter()
        .map(|c| String::from_utf8(c.clone().unwrap()).unwrap())
        .collect();
    assert!(blobs.iter().any(|b| b.contains("one")));
    assert!(blobs.iter().any(|b| b.contains("two")));

    // Threads are per-user; no cross-posting.
    let snapshots = h.registry.snapshots(Some(&team()));
    assert_ne!(snapshots[0].thread_ts, snapshots[1].thread_ts);

    h.cancel.cancel();
}

// --- Scenario: stop mid-stream via Japanese synonym ---

#[tokio::test]
async fn thread_stop_synonym_stops_running_stream() {
    let media = MockMediaSource::endless(speech_then_silence(1000, 500));
    let h = harness(media, MockSpeechEngine::new()).await;
    store_cookies(&h, &user(1)).await;

    h.command_tx
        .send(Command::Start {
            team_id: team(),
            user_id: user(1),
            channel_id: "C1".into(),
            url: "https://youtube.com/watch?v=abc".into(),
        })
        .await
        .unwrap();

    let thread_ts = wait_for_thread(&h).await;
    let controller = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(c) = h.registry.get_by_thread(&team(), &thread_ts) {
                return c;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    wait_for_state(&controller, StreamState::Running).await;

    h.command_tx
        .send(Command::ThreadMessage {
            team_id: team(),
            user_id: user(1),
            channel_id: "C1".into(),
            thread_ts: thread_ts.clone(),
            text: "ストップ".into(),
        })
        .await
        .unwrap();

    let final_state = tokio::time::timeout(Duration::from_secs(5), controller.wait_terminal())
        .await
        .expect("stop did not reach a terminal state in time");
    assert_eq!(final_state, StreamState::Stopped);

    let header = h.poster.last_header(&thread_ts).await.unwrap();
    assert_eq!(header.status, "⏸️ Stopped");

    h.cancel.cancel();
}

// --- Scenario: duplicate start is rejected ---

#[tokio::test]
async fn duplicate_start_is_rejected_with_visible_message() {
    let media = MockMediaSource::endless(Vec::new());
    let h = harness(media, MockSpeechEngine::new()).await;
    store_cookies(&h, &user(1)).await;

    for _ in 0..2 {
        h.command_tx
            .send(Command::Start {
                team_id: team(),
                user_id: user(1),
                channel_id: "C1".into(),
                url: "https://youtube.com/watch?v=abc".into(),
            })
            .await
            .unwrap();
    }

    // The loser gets a user-visible integrity reply and the winner
    // registers exactly one stream.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let rejected = h
                .poster
                .ephemerals
                .lock()
                .await
                .iter()
                .any(|(_, _, text)| text.contains("already have"));
            if rejected && h.registry.snapshots(Some(&team())).len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("duplicate start was never rejected");

    assert_eq!(h.registry.snapshots(Some(&team())).len(), 1);

    h.cancel.cancel();
}

// --- Scenario: ordered posting under a slow chat platform ---

#[tokio::test]
async fn sentences_post_in_order_despite_slow_poster() {
    // Ten speech bursts; each transcribes to a numbered sentence.
    let mut blocks = Vec::new();
    for _ in 0..10 {
        blocks.extend(speech_then_silence(600, 600));
    }
    blocks.extend(speech_then_silence(0, 2000));
    let media = MockMediaSource::new(blocks);

    let responses: Vec<String> = (0..10).map(|i| format!("sentence number {i}.")).collect();
    let engine = MockSpeechEngine::with_responses(responses);
    let poster = MockChatPoster::new();
    poster.set_post_delay(Duration::from_millis(20)).await;
    let pool = TranscriptionPool::new(Arc::new(engine), 2, 8);

    let thread = poster
        .open_thread(
            "C1",
            &HeaderContent {
                title: None,
                url: "https://youtube.com/watch?v=abc".into(),
                status: "⏳ Starting…".into(),
            },
        )
        .await
        .unwrap();

    let controller = StreamController::spawn(StreamSpawnArgs {
        stream_id: stream_id_for(&team(), &user(1), &thread.thread_ts, "0"),
        team_id: team(),
        user_id: user(1),
        url: "https://youtube.com/watch?v=abc".into(),
        thread: thread.clone(),
        poster: poster.clone(),
        media,
        pool,
        cookies: None,
        language_hint: None,
        settings: test_settings(),
    });

    assert_eq!(controller.wait_terminal().await, StreamState::Stopped);

    let texts = poster.thread_texts(&thread.thread_ts).await;
    let expected: Vec<String> = (0..10).map(|i| format!("sentence number {i}.")).collect();
    assert_eq!(texts, expected);
}
