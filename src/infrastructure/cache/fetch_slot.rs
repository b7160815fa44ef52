use crate::shared::error::AppError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::hash::Hash;

pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, AppError>>>;

/// 進行中フェッチへの参加券
#[derive(Clone)]
pub struct FetchTicket<T: Clone> {
    pub generation: u64,
    pub joined: bool,
    pub future: SharedFetch<T>,
}

struct SlotEntry<T: Clone> {
    generation: u64,
    pending: Option<SharedFetch<T>>,
}

/// キーごとの世代番号と進行中フェッチを管理する
///
/// 世代番号はキーをまたいで単調増加する。エントリを破棄しても同じ番号は再利用されない。
pub struct FetchSlots<K, T: Clone> {
    slots: HashMap<K, SlotEntry<T>>,
    last_generation: u64,
}

impl<K, T> FetchSlots<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            last_generation: 0,
        }
    }

    /// 進行中のフェッチがあれば参加券を返す
    pub fn join(&self, key: &K) -> Option<FetchTicket<T>> {
        let entry = self.slots.get(key)?;
        let future = entry.pending.clone()?;
        Some(FetchTicket {
            generation: entry.generation,
            joined: true,
            future,
        })
    }

    /// 新しい世代を確保する。以前の世代は以後 `is_current` にならない
    pub fn begin(&mut self, key: &K) -> u64 {
        self.last_generation += 1;
        let generation = self.last_generation;
        let entry = self.slots.entry(key.clone()).or_insert(SlotEntry {
            generation,
            pending: None,
        });
        entry.generation = generation;
        entry.pending = None;
        generation
    }

    /// `begin` で確保した世代にフェッチ本体を結び付け、tokio タスクで駆動する
    pub fn attach(
        &mut self,
        key: &K,
        generation: u64,
        fetch: BoxFuture<'static, Result<T, AppError>>,
    ) -> FetchTicket<T> {
        let future = fetch.shared();
        // 呼び出し側が future を破棄してもフェッチは最後まで進める
        tokio::spawn(future.clone());
        if let Some(entry) = self.slots.get_mut(key) {
            if entry.generation == generation {
                entry.pending = Some(future.clone());
            }
        }
        FetchTicket {
            generation,
            joined: false,
            future,
        }
    }

    pub fn is_current(&self, key: &K, generation: u64) -> bool {
        self.slots
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// 直近のリクエストの世代（新しいほど大きい）
    pub fn generation(&self, key: &K) -> Option<u64> {
        self.slots.get(key).map(|entry| entry.generation)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots
            .get(key)
            .is_some_and(|entry| entry.pending.is_some())
    }

    /// 世代が最新なら進行中フラグを下ろして `true` を返す
    pub fn finish(&mut self, key: &K, generation: u64) -> bool {
        match self.slots.get_mut(key) {
            Some(entry) if entry.generation == generation && entry.pending.is_some() => {
                entry.pending = None;
                true
            }
            _ => false,
        }
    }

    /// エントリを破棄する。進行中の応答は以後捨てられる
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn invalidate_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.slots.len();
        self.slots.retain(|key, _| !predicate(key));
        before - self.slots.len()
    }
}

impl<K, T> Default for FetchSlots<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
