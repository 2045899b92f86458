use std::collections::HashSet;

use domain::{Identity, PresenceEntry, RosterEvent};

/// 在线列表协调器
///
/// 把 `chatlist-response` 事件流投影为一份一致的在线列表：按 `user_id` 唯一，
/// 保留首次插入顺序便于稳定展示。同一用户的事件顺序由传输层的有序投递保证。
#[derive(Debug, Clone, Default)]
pub struct PresenceReconciler {
    entries: Vec<PresenceEntry>,
}

impl PresenceReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一个在线列表事件，返回列表是否发生变化
    pub fn apply(&mut self, event: RosterEvent) -> bool {
        match event {
            RosterEvent::Snapshot(entries) => self.replace(entries),
            RosterEvent::Joined(entry) => self.insert(entry),
            RosterEvent::Left(user_id) => self.remove(&user_id),
        }
    }

    /// 整体替换；快照内重复的 `user_id` 只保留第一次出现
    fn replace(&mut self, entries: Vec<PresenceEntry>) -> bool {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut deduped = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen.insert(entry.user_id.clone()) {
                deduped.push(entry);
            } else {
                tracing::debug!(user_id = %entry.user_id, "快照中存在重复用户，已忽略");
            }
        }

        if deduped == self.entries {
            return false;
        }
        self.entries = deduped;
        true
    }

    /// 已存在同一用户时不重复插入
    fn insert(&mut self, entry: PresenceEntry) -> bool {
        if self.contains(&entry.user_id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// 移除未知用户是无操作
    fn remove(&mut self, user_id: &Identity) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.user_id != user_id);
        self.entries.len() != before
    }

    pub fn roster(&self) -> &[PresenceEntry] {
        &self.entries
    }

    pub fn get(&self, user_id: &Identity) -> Option<&PresenceEntry> {
        self.entries.iter().find(|entry| &entry.user_id == user_id)
    }

    pub fn contains(&self, user_id: &Identity) -> bool {
        self.get(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
