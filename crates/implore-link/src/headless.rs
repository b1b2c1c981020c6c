//! In-memory rendering handle
//!
//! `HeadlessHandle` keeps camera, selection and visible subset in memory and
//! reports changes through its subscriptions exactly like a real renderer
//! would. It backs the replay host and the tests, and can simulate user
//! gestures with the `user_*` methods.
//!
//! Clones share state, so a host can hand one clone to the session and keep
//! another to drive gestures and inspect the result.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::camera::CameraView;
use crate::error::{HandleError, HandleResult};
use crate::handle::{
    Apply, EventSink, RenderHandle, SubscriptionId, ViewEventKind, ViewEventPayload,
};

/// Call counters for assertions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// `set_camera_view` calls from the coordination layer
    pub camera_sets: usize,
    /// `select` calls from the coordination layer
    pub selects: usize,
    /// `deselect` calls from the coordination layer
    pub deselects: usize,
    /// `set_visible_subset` and `clear_visible_subset` calls
    pub visibility_pushes: usize,
    pub teardowns: usize,
    /// Camera notifications raised, own gestures included
    pub camera_events: usize,
    /// Select and deselect notifications raised
    pub selection_events: usize,
}

#[derive(Debug)]
struct HeadlessState {
    camera: CameraView,
    selection: Vec<u32>,
    visible: Option<Vec<u32>>,
    destroyed: bool,
    honor_silent: bool,
    fail_teardown: bool,
    next_subscription: u64,
    subscriptions: BTreeMap<SubscriptionId, EventSink>,
    stats: HeadlessStats,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            camera: CameraView::default(),
            selection: Vec::new(),
            visible: None,
            destroyed: false,
            honor_silent: true,
            fail_teardown: false,
            next_subscription: 0,
            subscriptions: BTreeMap::new(),
            stats: HeadlessStats::default(),
        }
    }
}

/// Headless `RenderHandle`
#[derive(Debug, Clone, Default)]
pub struct HeadlessHandle {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a non-identity camera
    pub fn with_camera(self, camera: CameraView) -> Self {
        self.state.borrow_mut().camera = camera;
        self
    }

    /// Notify subscribers even for `Apply::Silent` mutations
    pub fn ignoring_silent(self) -> Self {
        self.state.borrow_mut().honor_silent = false;
        self
    }

    /// Make `teardown` report a backend error
    pub fn failing_teardown(self) -> Self {
        self.state.borrow_mut().fail_teardown = true;
        self
    }

    /// Simulate a pan/zoom gesture
    pub fn user_set_camera(&self, camera: CameraView) -> HandleResult<()> {
        self.write_camera(camera, true)
    }

    /// Simulate a lasso or click selection
    pub fn user_select(&self, indices: &[u32]) -> HandleResult<()> {
        self.write_selection(indices.to_vec(), true)
    }

    /// Simulate clearing the selection
    pub fn user_deselect(&self) -> HandleResult<()> {
        self.write_selection(Vec::new(), true)
    }

    /// Simulate the renderer losing its context
    pub fn destroy(&self) {
        self.state.borrow_mut().destroyed = true;
    }

    pub fn camera(&self) -> CameraView {
        self.state.borrow().camera
    }

    pub fn selection(&self) -> Vec<u32> {
        self.state.borrow().selection.clone()
    }

    /// Visible subset; `None` when every point is drawn
    pub fn visible(&self) -> Option<Vec<u32>> {
        self.state.borrow().visible.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats.clone()
    }

    fn check_alive(&self) -> HandleResult<()> {
        if self.state.borrow().destroyed {
            return Err(HandleError::Destroyed);
        }
        Ok(())
    }

    fn should_notify(&self, notify: bool) -> bool {
        notify || !self.state.borrow().honor_silent
    }

    fn write_camera(&self, camera: CameraView, notify: bool) -> HandleResult<()> {
        self.check_alive()?;
        self.state.borrow_mut().camera = camera;
        if self.should_notify(notify) {
            self.state.borrow_mut().stats.camera_events += 1;
            self.emit(ViewEventPayload::Camera { camera });
        }
        Ok(())
    }

    fn write_selection(&self, indices: Vec<u32>, notify: bool) -> HandleResult<()> {
        self.check_alive()?;
        let payload = if indices.is_empty() {
            ViewEventPayload::Deselect
        } else {
            ViewEventPayload::Select {
                indices: indices.clone(),
            }
        };
        self.state.borrow_mut().selection = indices;
        if self.should_notify(notify) {
            self.state.borrow_mut().stats.selection_events += 1;
            self.emit(payload);
        }
        Ok(())
    }

    fn emit(&self, payload: ViewEventPayload) {
        let kind = payload.kind();
        // Sinks are cloned out so no borrow is held while the inbox runs
        let sinks: Vec<EventSink> = self
            .state
            .borrow()
            .subscriptions
            .values()
            .filter(|sink| sink.kind() == kind)
            .cloned()
            .collect();
        for sink in sinks {
            sink.emit(payload.clone());
        }
    }
}

impl RenderHandle for HeadlessHandle {
    fn camera_view(&self) -> HandleResult<CameraView> {
        self.check_alive()?;
        Ok(self.state.borrow().camera)
    }

    fn set_camera_view(&mut self, camera: &CameraView, apply: Apply) -> HandleResult<()> {
        self.check_alive()?;
        self.state.borrow_mut().stats.camera_sets += 1;
        self.write_camera(*camera, !apply.is_silent())
    }

    fn set_visible_subset(&mut self, indices: &[u32]) -> HandleResult<()> {
        self.check_alive()?;
        let mut state = self.state.borrow_mut();
        state.stats.visibility_pushes += 1;
        state.visible = Some(indices.to_vec());
        Ok(())
    }

    fn clear_visible_subset(&mut self) -> HandleResult<()> {
        self.check_alive()?;
        let mut state = self.state.borrow_mut();
        state.stats.visibility_pushes += 1;
        state.visible = None;
        Ok(())
    }

    fn select(&mut self, indices: &[u32], apply: Apply) -> HandleResult<()> {
        self.check_alive()?;
        self.state.borrow_mut().stats.selects += 1;
        self.write_selection(indices.to_vec(), !apply.is_silent())
    }

    fn deselect(&mut self, apply: Apply) -> HandleResult<()> {
        self.check_alive()?;
        self.state.borrow_mut().stats.deselects += 1;
        self.write_selection(Vec::new(), !apply.is_silent())
    }

    fn teardown(&mut self) -> HandleResult<()> {
        let mut state = self.state.borrow_mut();
        state.stats.teardowns += 1;
        let was_destroyed = state.destroyed;
        state.destroyed = true;
        if state.fail_teardown {
            return Err(HandleError::Backend("teardown failed".to_string()));
        }
        if was_destroyed {
            return Err(HandleError::Destroyed);
        }
        Ok(())
    }

    fn subscribe(&mut self, kind: ViewEventKind, sink: EventSink) -> HandleResult<SubscriptionId> {
        self.check_alive()?;
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        if sink.kind() != kind {
            tracing::debug!(view = %sink.view_id(), ?kind, "sink kind differs from subscription kind");
        }
        state.subscriptions.insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.state.borrow_mut().subscriptions.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::EventInbox;
    use crate::view::ViewId;

    fn subscribed(handle: &mut HeadlessHandle, inbox: &EventInbox) {
        for kind in ViewEventKind::ALL {
            handle
                .subscribe(kind, inbox.sink(ViewId::from("h"), kind))
                .unwrap();
        }
    }

    #[test]
    fn test_silent_apply_does_not_notify() {
        let inbox = EventInbox::new();
        let mut handle = HeadlessHandle::new();
        subscribed(&mut handle, &inbox);

        let camera = CameraView::new([0.3, 0.1], 2.0);
        handle.set_camera_view(&camera, Apply::Silent).unwrap();
        handle.select(&[1, 2], Apply::Silent).unwrap();

        assert!(inbox.is_empty());
        assert_eq!(handle.camera(), camera);
        assert_eq!(handle.selection(), vec![1, 2]);
        assert_eq!(handle.stats().camera_sets, 1);
    }

    #[test]
    fn test_notify_apply_and_gestures_notify() {
        let inbox = EventInbox::new();
        let mut handle = HeadlessHandle::new();
        subscribed(&mut handle, &inbox);

        handle.deselect(Apply::Notify).unwrap();
        handle.user_select(&[4]).unwrap();
        handle.user_set_camera(CameraView::new([0.0, 0.0], 3.0)).unwrap();

        assert_eq!(inbox.pop().unwrap().payload, ViewEventPayload::Deselect);
        assert_eq!(
            inbox.pop().unwrap().payload,
            ViewEventPayload::Select { indices: vec![4] }
        );
        assert!(matches!(
            inbox.pop().unwrap().payload,
            ViewEventPayload::Camera { .. }
        ));
        // Gestures are not coordination-layer calls
        assert_eq!(handle.stats().camera_sets, 0);
        assert_eq!(handle.stats().camera_events, 1);
    }

    #[test]
    fn test_ignoring_silent_leaks_notifications() {
        let inbox = EventInbox::new();
        let mut handle = HeadlessHandle::new().ignoring_silent();
        subscribed(&mut handle, &inbox);

        handle
            .set_camera_view(&CameraView::default(), Apply::Silent)
            .unwrap();
        assert_eq!(inbox.len(), 1);
    }

    #[test]
    fn test_destroyed_handle_rejects_calls() {
        let mut handle = HeadlessHandle::new();
        handle.teardown().unwrap();

        assert_eq!(handle.camera_view(), Err(HandleError::Destroyed));
        assert_eq!(handle.select(&[1], Apply::Silent), Err(HandleError::Destroyed));
        assert_eq!(handle.teardown(), Err(HandleError::Destroyed));
        assert!(handle.user_set_camera(CameraView::default()).is_err());
    }

    #[test]
    fn test_unsubscribe_stops_events() {
        let inbox = EventInbox::new();
        let mut handle = HeadlessHandle::new();
        let id = handle
            .subscribe(
                ViewEventKind::Select,
                inbox.sink(ViewId::from("h"), ViewEventKind::Select),
            )
            .unwrap();
        handle.unsubscribe(id);

        handle.user_select(&[1]).unwrap();
        assert!(inbox.is_empty());
        assert_eq!(handle.subscription_count(), 0);
    }

    #[test]
    fn test_visible_subset() {
        let mut handle = HeadlessHandle::new();
        handle.set_visible_subset(&[0, 2]).unwrap();
        assert_eq!(handle.visible(), Some(vec![0, 2]));

        handle.clear_visible_subset().unwrap();
        assert_eq!(handle.visible(), None);
        assert_eq!(handle.stats().visibility_pushes, 2);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = HeadlessHandle::new();
        let mut boxed: Box<dyn RenderHandle> = Box::new(handle.clone());
        boxed.select(&[9], Apply::Silent).unwrap();
        assert_eq!(handle.selection(), vec![9]);
    }
}
