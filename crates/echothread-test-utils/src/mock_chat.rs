// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat poster that records every call for assertion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use echothread_core::types::{BotIdentity, HeaderContent, ThreadHandle};
use echothread_core::{ChatLookup, ChatPoster, EchoError, TeamId, UserId};
use tokio::sync::Mutex;

/// A recorded in-thread post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPost {
    pub thread_ts: String,
    pub text: String,
}

/// Mock [`ChatPoster`] capturing threads, posts, header edits, and
/// ephemeral replies. Optionally delays or fails posts to exercise retry
/// and ordering behavior.
#[derive(Default)]
pub struct MockChatPoster {
    next_ts: AtomicU64,
    pub posts: Mutex<Vec<RecordedPost>>,
    pub headers: Mutex<HashMap<String, Vec<HeaderContent>>>,
    pub ephemerals: Mutex<Vec<(String, String, String)>>,
    post_delay: Mutex<Option<Duration>>,
    fail_posts: Mutex<bool>,
}

impl MockChatPoster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every subsequent post waits this long before completing.
    pub async fn set_post_delay(&self, delay: Duration) {
        *self.post_delay.lock().await = Some(delay);
    }

    /// Every subsequent post fails permanently.
    pub async fn set_fail_posts(&self, fail: bool) {
        *self.fail_posts.lock().await = fail;
    }

    /// Texts posted into one thread, in arrival order.
    pub async fn thread_texts(&self, thread_ts: &str) -> Vec<String> {
        self.posts
            .lock()
            .await
            .iter()
            .filter(|p| p.thread_ts == thread_ts)
            .map(|p| p.text.clone())
            .collect()
    }

    /// The most recent header content for a thread.
    pub async fn last_header(&self, thread_ts: &str) -> Option<HeaderContent> {
        self.headers
            .lock()
            .await
            .get(thread_ts)
            .and_then(|edits| edits.last().cloned())
    }

    fn mint_ts(&self) -> String {
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst);
        format!("1700000000.{n:06}")
    }
}

#[async_trait]
impl ChatPoster for MockChatPoster {
    async fn open_thread(
        &self,
        channel: &str,
        header: &HeaderContent,
    ) -> Result<ThreadHandle, EchoError> {
        let ts = self.mint_ts();
        self.headers
            .lock()
            .await
            .entry(ts.clone())
            .or_default()
            .push(header.clone());
        Ok(ThreadHandle {
            channel: channel.to_string(),
            thread_ts: ts,
        })
    }

    async fn post_in_thread(
        &self,
        thread: &ThreadHandle,
        text: &str,
    ) -> Result<String, EchoError> {
        if let Some(delay) = *self.post_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_posts.lock().await {
            return Err(EchoError::post_permanent("mock poster is failing"));
        }
        self.posts.lock().await.push(RecordedPost {
            thread_ts: thread.thread_ts.clone(),
            text: text.to_string(),
        });
        Ok(self.mint_ts())
    }

    async fn edit_header(
        &self,
        thread: &ThreadHandle,
        header: &HeaderContent,
    ) -> Result<(), EchoError> {
        self.headers
            .lock()
            .await
            .entry(thread.thread_ts.clone())
            .or_default()
            .push(header.clone());
        Ok(())
    }

    async fn reply_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
    ) -> Result<(), EchoError> {
        self.ephemerals
            .lock()
            .await
            .push((channel.to_string(), user.to_string(), text.to_string()));
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> Result<Option<String>, EchoError> {
        Ok(Some(format!("C_{}", name.trim_start_matches('#'))))
    }

    async fn whoami(&self) -> Result<BotIdentity, EchoError> {
        Ok(BotIdentity {
            team_id: TeamId("T_MOCK".into()),
            bot_user_id: UserId("U_BOT".into()),
        })
    }

    async fn open_dm(&self, user: &str) -> Result<String, EchoError> {
        Ok(format!("D_{user}"))
    }
}

/// [`ChatLookup`] that hands the same mock poster to every team.
pub struct MockChatLookup {
    pub poster: Arc<MockChatPoster>,
}

#[async_trait]
impl ChatLookup for MockChatLookup {
    async fn poster_for(&self, _team: &TeamId) -> Option<Arc<dyn ChatPoster>> {
        Some(self.poster.clone() as Arc<dyn ChatPoster>)
    }
}
