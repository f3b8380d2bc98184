//! Query/mutation façade
//!
//! The surface external request handlers consume. Holds the shared
//! registry and latest-scan cell, never the hardware.

use std::collections::BTreeMap;
use std::sync::Arc;

use tapdeck_common::{ActionKind, Binding, LatestResult, Result};
use tracing::instrument;

use crate::domain::dispatch::{DispatchStats, Dispatcher};
use crate::domain::latest::LatestCell;
use crate::infra::registry::Registry;

/// Tapdeck query and mutation service
#[derive(Clone)]
pub struct TapdeckService {
    registry: Arc<Registry>,
    latest: Arc<LatestCell>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl TapdeckService {
    pub fn new(registry: Arc<Registry>, latest: Arc<LatestCell>) -> Self {
        Self {
            registry,
            latest,
            dispatcher: None,
        }
    }

    /// Expose dispatch counters of a running dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Most recent accepted scan, `None` before the first one
    pub fn get_latest(&self) -> Option<LatestResult> {
        self.latest.get()
    }

    /// All bindings, ordered by uid
    pub fn list_bindings(&self) -> Vec<Binding> {
        let mut bindings = self.registry.all();
        bindings.sort_by(|a, b| a.uid.cmp(&b.uid));
        bindings
    }

    /// Register a tag under an action kind given by name
    #[instrument(skip(self, alias, parameter))]
    pub fn register(
        &self,
        action_kind: &str,
        uid: &str,
        alias: Option<&str>,
        parameter: Option<&str>,
    ) -> Result<Binding> {
        let kind = ActionKind::from_name(action_kind)?;
        self.registry.register(kind, uid, alias, parameter)
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, uid: &str) -> Result<Binding> {
        self.registry.unregister(uid)
    }

    /// Kind name → description, for every action kind
    pub fn list_action_kinds(&self) -> BTreeMap<&'static str, &'static str> {
        ActionKind::ALL
            .iter()
            .map(|kind| (kind.name(), kind.description()))
            .collect()
    }

    pub fn binding_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> Option<DispatchStats> {
        self.dispatcher.as_ref().map(|d| d.metrics().snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::registry::MemorySnapshot;
    use chrono::Utc;
    use tapdeck_common::{Action, RegistryError, TagUid, TapdeckError, ValidationError};

    fn service() -> (TapdeckService, MemorySnapshot) {
        let snapshot = MemorySnapshot::new();
        let registry = Arc::new(Registry::open(snapshot.clone()).unwrap());
        (
            TapdeckService::new(registry, Arc::new(LatestCell::new())),
            snapshot,
        )
    }

    #[test]
    fn test_register_by_kind_name() {
        let (service, _) = service();
        let binding = service
            .register("SetVolume", " 04a1b2 ", Some("Quiet"), Some("20"))
            .unwrap();
        assert_eq!(binding.uid.as_str(), "04A1B2");
        assert_eq!(binding.action, Action::SetVolume { percent: 20 });

        let legacy = service.register("Volume", "05", None, Some("80")).unwrap();
        assert_eq!(legacy.action, Action::SetVolume { percent: 80 });

        let err = service.register("Rewind", "06", None, None).unwrap_err();
        assert!(matches!(
            err,
            TapdeckError::Validation(ValidationError::UnknownActionKind(_))
        ));
    }

    #[test]
    fn test_volume_contract() {
        let (service, _) = service();
        for bad in ["101", "-1", "abc"] {
            assert!(service.register("SetVolume", "01", None, Some(bad)).is_err());
        }
        for good in ["0", "100"] {
            assert!(service.register("SetVolume", "01", None, Some(good)).is_ok());
        }
        assert!(service.register("PlayPause", "02", None, Some("x")).is_err());
        assert!(service.register("PlayPause", "02", None, None).is_ok());
    }

    #[test]
    fn test_list_bindings_sorted() {
        let (service, _) = service();
        service.register("Stop", "0C", None, None).unwrap();
        service.register("NextTrack", "0A", None, None).unwrap();
        service.register("PreviousTrack", "0B", None, None).unwrap();

        let uids: Vec<_> = service
            .list_bindings()
            .into_iter()
            .map(|b| b.uid.to_string())
            .collect();
        assert_eq!(uids, vec!["0A", "0B", "0C"]);
        assert_eq!(service.binding_count(), 3);
    }

    #[test]
    fn test_unregister_unknown_is_not_found() {
        let (service, snapshot) = service();
        service.register("Stop", "01", None, None).unwrap();
        let before = snapshot.records();

        let err = service.unregister("02").unwrap_err();
        assert!(matches!(err, TapdeckError::Registry(RegistryError::NotFound(_))));
        assert_eq!(snapshot.records(), before);
        assert_eq!(service.binding_count(), 1);
    }

    #[test]
    fn test_action_kinds_listed() {
        let (service, _) = service();
        let kinds = service.list_action_kinds();
        assert_eq!(kinds.len(), ActionKind::ALL.len());
        assert!(kinds.contains_key("ReplaceTracklist"));
        assert!(kinds.contains_key("Shutdown"));
    }

    #[test]
    fn test_latest_passthrough() {
        let latest = Arc::new(LatestCell::new());
        let registry = Arc::new(Registry::open(MemorySnapshot::new()).unwrap());
        let service = TapdeckService::new(registry, latest.clone());
        assert!(service.get_latest().is_none());
        assert!(service.stats().is_none());

        latest.publish(LatestResult {
            uid: TagUid::parse("AB").unwrap(),
            resolved: None,
            scanned_at: Utc::now(),
        });
        assert_eq!(service.get_latest().unwrap().uid.as_str(), "AB");
    }
}
