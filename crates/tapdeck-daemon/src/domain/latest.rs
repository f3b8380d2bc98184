//! Latest scan result
//!
//! Single shared cell written by the tag worker and read by the façade.
//! Results are replaced whole under the lock, so a reader never sees a
//! partially updated value.

use parking_lot::RwLock;
use tapdeck_common::LatestResult;

#[derive(Debug, Default)]
pub struct LatestCell {
    inner: RwLock<Option<LatestResult>>,
}

impl LatestCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored result
    pub fn publish(&self, result: LatestResult) {
        *self.inner.write() = Some(result);
    }

    /// Copy of the stored result, `None` before the first scan
    pub fn get(&self) -> Option<LatestResult> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tapdeck_common::TagUid;

    #[test]
    fn test_empty_until_published() {
        let cell = LatestCell::new();
        assert!(cell.get().is_none());

        cell.publish(LatestResult {
            uid: TagUid::parse("01").unwrap(),
            resolved: None,
            scanned_at: Utc::now(),
        });
        let latest = cell.get().unwrap();
        assert_eq!(latest.uid.as_str(), "01");
        assert!(!latest.is_registered());
    }

    #[test]
    fn test_concurrent_publish_and_read() {
        let cell = Arc::new(LatestCell::new());
        let writer = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    cell.publish(LatestResult {
                        uid: TagUid::parse(&format!("{i:04X}")).unwrap(),
                        resolved: None,
                        scanned_at: Utc::now(),
                    });
                }
            })
        };

        for _ in 0..500 {
            if let Some(latest) = cell.get() {
                assert_eq!(latest.uid.as_str().len(), 4);
            }
        }
        writer.join().unwrap();
        assert_eq!(cell.get().unwrap().uid.as_str(), "01F3");
    }
}
