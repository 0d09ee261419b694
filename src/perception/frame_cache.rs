use std::sync::{Arc, RwLock};

use crate::perception::types::EncodedFrame;

/// Latest composited frame together with its capture time.
#[derive(Debug)]
pub struct CachedFrame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the Unix epoch, strictly increasing across stores.
    pub timestamp_ms: i64,
    pub sequence: u64,
}

/// Single-slot cache shared between the capture task and HTTP pollers.
///
/// A frame and its timestamp live in one `Arc`, so readers always see a
/// matching pair.
#[derive(Debug, Default)]
pub struct FrameCache {
    slot: RwLock<Option<Arc<CachedFrame>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: EncodedFrame) -> Arc<CachedFrame> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut slot = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (timestamp_ms, sequence) = match slot.as_ref() {
            Some(prev) => (now.max(prev.timestamp_ms + 1), prev.sequence + 1),
            None => (now, 1),
        };
        let cached = Arc::new(CachedFrame {
            png: frame.png,
            width: frame.width,
            height: frame.height,
            timestamp_ms,
            sequence,
        });
        *slot = Some(Arc::clone(&cached));
        cached
    }

    pub fn latest(&self) -> Option<Arc<CachedFrame>> {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        let mut slot = match self.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}
