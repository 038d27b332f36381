//! `Queue` — the external collaborator the mixer pulls items from.
//!
//! spec §4.2 treats the queue as given: "the mixer asks the queue for the
//! next item". This module defines the trait boundary plus an in-memory
//! implementation used by tests and as a reference for a real persisted
//! queue.

use async_trait::async_trait;

use crate::common::types::{AnyResult, PlayerId};
use crate::model::QueueItem;

#[async_trait]
pub trait Queue: Send + Sync {
    /// Called once per `StreamSession`; lets the queue record which player
    /// started it (used to scope DACP controls, spec §4.7).
    async fn start_session(&self, player_id: &PlayerId) -> AnyResult<()>;

    /// `None` once the queue is exhausted — the mixer tears the session down.
    async fn next_item(&self, player_id: &PlayerId) -> AnyResult<Option<QueueItem>>;

    /// Looks up one item by id for the HTTP single-item variant (spec §4.3).
    /// `None` ⇒ caller returns `404 "Invalid Queue item Id"`.
    async fn find_item(&self, item_id: &crate::common::types::ItemId) -> Option<QueueItem>;

    /// Patches `QueueItem.duration` with the value actually observed during
    /// playback (spec §4.2 "Duration correction").
    async fn correct_duration(&self, item_id: &crate::common::types::ItemId, seconds: f64);

    fn crossfade_enabled(&self, player_id: &PlayerId) -> bool;
    fn crossfade_duration_s(&self, player_id: &PlayerId) -> u32;
    fn max_sample_rate(&self, player_id: &PlayerId) -> u32;

    /// Control sinks the DACP server dispatches into (spec §3, §4.7's
    /// `nextitem`/`previtem`/`play`/`playpause`/`pause`/`shuffle_songs`
    /// table). Implementations own playback/ordering state for `player_id`;
    /// this crate only forwards the command.
    async fn play(&self, player_id: &PlayerId) -> AnyResult<()>;
    async fn play_pause(&self, player_id: &PlayerId) -> AnyResult<()>;
    async fn pause(&self, player_id: &PlayerId) -> AnyResult<()>;
    async fn stop(&self, player_id: &PlayerId) -> AnyResult<()>;
    async fn skip(&self, player_id: &PlayerId) -> AnyResult<()>;
    async fn previous(&self, player_id: &PlayerId) -> AnyResult<()>;
    fn shuffle_enabled(&self, player_id: &PlayerId) -> bool;
    async fn set_shuffle(&self, player_id: &PlayerId, shuffle: bool) -> AnyResult<()>;
    async fn set_volume(&self, player_id: &PlayerId, volume: u8) -> AnyResult<()>;
}

pub mod memory {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    /// Reference queue: a fixed playlist, no persistence, fixed player
    /// policy. Used by pipeline/mixer unit tests and as the default queue
    /// when no real catalogue-backed queue is wired in.
    pub struct InMemoryQueue {
        items: Mutex<VecDeque<QueueItem>>,
        history: Mutex<VecDeque<QueueItem>>,
        playing: Mutex<bool>,
        shuffle: Mutex<bool>,
        crossfade_enabled: bool,
        crossfade_duration_s: u32,
        max_sample_rate: u32,
    }

    impl InMemoryQueue {
        pub fn new(items: Vec<QueueItem>) -> Self {
            Self {
                items: Mutex::new(items.into()),
                history: Mutex::new(VecDeque::new()),
                playing: Mutex::new(false),
                shuffle: Mutex::new(false),
                crossfade_enabled: true,
                crossfade_duration_s: 6,
                max_sample_rate: 96_000,
            }
        }
    }

    #[async_trait]
    impl Queue for InMemoryQueue {
        async fn start_session(&self, _player_id: &PlayerId) -> AnyResult<()> {
            Ok(())
        }

        async fn next_item(&self, _player_id: &PlayerId) -> AnyResult<Option<QueueItem>> {
            let item = self.items.lock().pop_front();
            if let Some(item) = &item {
                self.history.lock().push_back(item.clone());
            }
            Ok(item)
        }

        async fn find_item(&self, item_id: &crate::common::types::ItemId) -> Option<QueueItem> {
            self.items.lock().iter().find(|i| &i.item_id == item_id).cloned()
        }

        async fn correct_duration(&self, _item_id: &crate::common::types::ItemId, _seconds: f64) {}

        fn crossfade_enabled(&self, _player_id: &PlayerId) -> bool {
            self.crossfade_enabled
        }

        fn crossfade_duration_s(&self, _player_id: &PlayerId) -> u32 {
            self.crossfade_duration_s
        }

        fn max_sample_rate(&self, _player_id: &PlayerId) -> u32 {
            self.max_sample_rate
        }

        async fn play(&self, _player_id: &PlayerId) -> AnyResult<()> {
            *self.playing.lock() = true;
            Ok(())
        }

        async fn play_pause(&self, _player_id: &PlayerId) -> AnyResult<()> {
            let mut playing = self.playing.lock();
            *playing = !*playing;
            Ok(())
        }

        async fn pause(&self, _player_id: &PlayerId) -> AnyResult<()> {
            *self.playing.lock() = false;
            Ok(())
        }

        async fn stop(&self, _player_id: &PlayerId) -> AnyResult<()> {
            *self.playing.lock() = false;
            Ok(())
        }

        async fn skip(&self, _player_id: &PlayerId) -> AnyResult<()> {
            let skipped = self.items.lock().pop_front();
            if let Some(skipped) = skipped {
                self.history.lock().push_back(skipped);
            }
            Ok(())
        }

        async fn previous(&self, _player_id: &PlayerId) -> AnyResult<()> {
            if let Some(last) = self.history.lock().pop_back() {
                self.items.lock().push_front(last);
            }
            Ok(())
        }

        fn shuffle_enabled(&self, _player_id: &PlayerId) -> bool {
            *self.shuffle.lock()
        }

        async fn set_shuffle(&self, _player_id: &PlayerId, shuffle: bool) -> AnyResult<()> {
            *self.shuffle.lock() = shuffle;
            if shuffle {
                let mut items = self.items.lock();
                let mut rng = rand::thread_rng();
                let mut shuffled: Vec<_> = items.drain(..).collect();
                for i in (1..shuffled.len()).rev() {
                    let j = rand::Rng::gen_range(&mut rng, 0..=i);
                    shuffled.swap(i, j);
                }
                *items = shuffled.into();
            }
            Ok(())
        }

        async fn set_volume(&self, _player_id: &PlayerId, _volume: u8) -> AnyResult<()> {
            Ok(())
        }
    }
}
