//! View registry and garbage collection
//!
//! Entries are keyed by view id and never removed. A sweep retires entries
//! whose anchor is gone: the camera is snapshotted, the handle torn down and
//! dropped, and everything else stays addressable so the next registration
//! under the same id can resurrect the view where it left off.

use std::collections::BTreeMap;

use crate::view::{ViewId, ViewInstance};

/// Table of every view seen in this session
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: BTreeMap<ViewId, ViewInstance>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    ///
    /// A replaced entry that still has a handle is torn down first. The
    /// previous entry is returned.
    pub fn register(&mut self, instance: ViewInstance) -> Option<ViewInstance> {
        let mut prior = self.views.remove(&instance.id);
        if let Some(prior) = prior.as_mut() {
            if prior.is_live() {
                tracing::debug!(view = %prior.id, "replacing live view");
                retire(prior);
            }
        }
        self.views.insert(instance.id.clone(), instance);
        prior
    }

    pub fn get(&self, id: &ViewId) -> Option<&ViewInstance> {
        self.views.get(id)
    }

    pub fn get_mut(&mut self, id: &ViewId) -> Option<&mut ViewInstance> {
        self.views.get_mut(id)
    }

    pub fn contains(&self, id: &ViewId) -> bool {
        self.views.contains_key(id)
    }

    /// Visit every entry, retired ones included
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut ViewInstance),
    {
        for view in self.views.values_mut() {
            f(view);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewInstance> {
        self.views.values()
    }

    /// Every registered id in order
    pub fn ids(&self) -> Vec<ViewId> {
        self.views.keys().cloned().collect()
    }

    /// Ids of entries that still have a handle
    pub fn live_ids(&self) -> Vec<ViewId> {
        self.views
            .values()
            .filter(|view| view.is_live())
            .map(|view| view.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Retire every live entry whose anchor is disconnected
    ///
    /// Returns the ids retired by this call. Already retired entries are
    /// skipped, so repeated sweeps are no-ops.
    pub fn sweep(&mut self) -> Vec<ViewId> {
        let mut retired = Vec::new();
        for view in self.views.values_mut() {
            if view.is_live() && !view.is_connected() {
                retire(view);
                tracing::info!(view = %view.id, "retired disconnected view");
                retired.push(view.id.clone());
            }
        }
        retired
    }
}

/// Snapshot the camera, tear down the handle, drop subscriptions, null the handle
fn retire(view: &mut ViewInstance) {
    if let Some(mut handle) = view.handle.take() {
        match handle.camera_view() {
            Ok(camera) => view.note_camera(camera),
            Err(e) => tracing::warn!(view = %view.id, "Failed to snapshot camera: {}", e),
        }

        if let Err(e) = handle.teardown() {
            tracing::warn!(view = %view.id, "Failed to tear down handle: {}", e);
        }

        for subscription in view.subscriptions.drain(..) {
            handle.unsubscribe(subscription);
        }
    }
    view.subscriptions.clear();
    view.warmup_until = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::DataDomain;
    use crate::camera::CameraView;
    use crate::handle::{EventInbox, RenderHandle, ViewEventKind};
    use crate::headless::HeadlessHandle;
    use crate::view::ViewAnchor;
    use std::rc::Rc;

    fn instance(id: &str, handle: &HeadlessHandle, anchor: &Rc<ViewAnchor>) -> ViewInstance {
        ViewInstance::new(
            ViewId::from(id),
            Box::new(handle.clone()),
            anchor,
            4,
            DataDomain::try_new("x", 0.0, 1.0).unwrap(),
            DataDomain::try_new("y", 0.0, 1.0).unwrap(),
        )
    }

    #[test]
    fn test_sweep_retires_disconnected() {
        let mut registry = ViewRegistry::new();
        let inbox = EventInbox::new();
        let handle = HeadlessHandle::new().with_camera(CameraView::new([0.2, 0.1], 3.0));
        let anchor = ViewAnchor::new();

        let mut view = instance("p1", &handle, &anchor);
        let mut subscribed = handle.clone();
        view.subscriptions.push(
            subscribed
                .subscribe(
                    ViewEventKind::Camera,
                    inbox.sink(ViewId::from("p1"), ViewEventKind::Camera),
                )
                .unwrap(),
        );
        view.warmup_until = Some(std::time::Instant::now());
        registry.register(view);

        anchor.detach();
        let retired = registry.sweep();

        assert_eq!(retired, vec![ViewId::from("p1")]);
        let view = registry.get(&ViewId::from("p1")).unwrap();
        assert!(!view.is_live());
        assert!(view.warmup_until.is_none());
        assert_eq!(view.saved_camera, Some(CameraView::new([0.2, 0.1], 3.0)));
        assert!(handle.is_destroyed());
        assert_eq!(handle.subscription_count(), 0);
    }

    #[test]
    fn test_sweep_idempotent() {
        let mut registry = ViewRegistry::new();
        let handle = HeadlessHandle::new();
        let anchor = ViewAnchor::new();
        registry.register(instance("p1", &handle, &anchor));
        drop(anchor);

        assert_eq!(registry.sweep().len(), 1);
        assert!(registry.sweep().is_empty());
        assert_eq!(handle.stats().teardowns, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_teardown_failure_swallowed() {
        let mut registry = ViewRegistry::new();
        let handle = HeadlessHandle::new().failing_teardown();
        let anchor = ViewAnchor::new();
        registry.register(instance("p1", &handle, &anchor));

        anchor.detach();
        assert_eq!(registry.sweep().len(), 1);
        assert!(!registry.get(&ViewId::from("p1")).unwrap().is_live());
    }

    #[test]
    fn test_connected_views_untouched() {
        let mut registry = ViewRegistry::new();
        let handle = HeadlessHandle::new();
        let anchor = ViewAnchor::new();
        registry.register(instance("p1", &handle, &anchor));

        assert!(registry.sweep().is_empty());
        assert_eq!(registry.live_ids(), vec![ViewId::from("p1")]);
    }

    #[test]
    fn test_register_replaces_and_tears_down_prior() {
        let mut registry = ViewRegistry::new();
        let old = HeadlessHandle::new();
        let new = HeadlessHandle::new();
        let anchor = ViewAnchor::new();

        registry.register(instance("p1", &old, &anchor));
        let prior = registry.register(instance("p1", &new, &anchor));

        assert!(prior.is_some());
        assert!(old.is_destroyed());
        assert!(!new.is_destroyed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_for_each_visits_retired() {
        let mut registry = ViewRegistry::new();
        let a = ViewAnchor::new();
        let b = ViewAnchor::new();
        registry.register(instance("p1", &HeadlessHandle::new(), &a));
        registry.register(instance("p2", &HeadlessHandle::new(), &b));
        b.detach();
        registry.sweep();

        let mut seen = Vec::new();
        registry.for_each(|view| seen.push(view.id.to_string()));
        assert_eq!(seen, vec!["p1", "p2"]);
        assert_eq!(registry.ids().len(), 2);
        assert_eq!(registry.live_ids(), vec![ViewId::from("p1")]);
    }
}
