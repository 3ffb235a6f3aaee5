use lru::LruCache;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Discord channel type codes this service cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// `GUILD_TEXT` (0): flat messages
    Text,
    /// `GUILD_FORUM` (15): one thread per post
    Forum,
    /// Any other type code; delivery is refused
    Other(u8),
}

impl ChannelKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelKind::Text,
            15 => ChannelKind::Forum,
            other => ChannelKind::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ChannelKind::Text => 0,
            ChannelKind::Forum => 15,
            ChannelKind::Other(code) => code,
        }
    }
}

/// Cached result of `GET /channels/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(rename = "type", deserialize_with = "deserialize_kind")]
    pub kind: ChannelKind,
    #[serde(default)]
    pub name: Option<String>,
}

fn deserialize_kind<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ChannelKind, D::Error> {
    u8::deserialize(d).map(ChannelKind::from_code)
}

/// Channel id → [`ChannelInfo`] lookup shared by every check.
///
/// Channel types practically never change, so entries live until evicted
/// by capacity or dropped through [`ChannelCache::invalidate`] when a
/// subscription is pointed at another channel. The lock is never held
/// across an await.
pub struct ChannelCache {
    entries: Mutex<LruCache<String, ChannelInfo>>,
}

impl ChannelCache {
    /// Default number of channels kept
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, channel_id: &str) -> Option<ChannelInfo> {
        self.lock().get(channel_id).cloned()
    }

    /// Caches `info` under the id it was requested by.
    pub fn insert(&self, channel_id: &str, info: ChannelInfo) {
        self.lock().put(channel_id.to_string(), info);
    }

    /// Drops a cached entry; returns whether one existed.
    pub fn invalidate(&self, channel_id: &str) -> bool {
        let removed = self.lock().pop(channel_id).is_some();
        if removed {
            tracing::debug!(channel = %channel_id, "Channel cache entry invalidated");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, ChannelInfo>> {
        // Poisoning is ignored: entries are independent lookups
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ChannelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCache")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for ChannelCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
