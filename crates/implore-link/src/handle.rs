//! Rendering handle contract and the event inbox
//!
//! A `RenderHandle` is the externally owned renderer behind one view. The
//! coordination layer only ever asks it to move its camera, change its
//! selection, restrict its visible subset, tear itself down, and report
//! user-driven changes through an `EventSink`.
//!
//! Events are not delivered by callback. Handles push them into a shared
//! `EventInbox`, and the session drains that inbox in arrival order. While a
//! broadcast is in flight on a channel, every event pushed on that channel is
//! stamped with the broadcast's `Provenance`, which is how followers recognize
//! echoes of a change they did not originate.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::camera::CameraView;
use crate::error::HandleResult;
use crate::view::ViewId;

/// Whether a mutation should raise the handle's own change notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Apply {
    /// Update state without notifying subscribers
    Silent,
    /// Update state and notify subscribers
    Notify,
}

impl Apply {
    pub fn is_silent(self) -> bool {
        matches!(self, Apply::Silent)
    }
}

/// Notification kinds a handle can be subscribed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewEventKind {
    Camera,
    Select,
    Deselect,
}

impl ViewEventKind {
    pub const ALL: [ViewEventKind; 3] = [
        ViewEventKind::Camera,
        ViewEventKind::Select,
        ViewEventKind::Deselect,
    ];

    /// Broadcast channel this kind travels on
    pub fn channel(self) -> SyncChannel {
        match self {
            ViewEventKind::Camera => SyncChannel::Camera,
            ViewEventKind::Select | ViewEventKind::Deselect => SyncChannel::Selection,
        }
    }
}

/// Independent broadcast channels, each with its own re-entrancy guard
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncChannel {
    Camera,
    Selection,
}

/// Origin tag of a broadcast: which view started it, and its sequence number
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: ViewId,
    pub seq: u64,
}

/// Payload of a handle notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewEventPayload {
    Camera { camera: CameraView },
    Select { indices: Vec<u32> },
    Deselect,
}

impl ViewEventPayload {
    pub fn kind(&self) -> ViewEventKind {
        match self {
            ViewEventPayload::Camera { .. } => ViewEventKind::Camera,
            ViewEventPayload::Select { .. } => ViewEventKind::Select,
            ViewEventPayload::Deselect => ViewEventKind::Deselect,
        }
    }
}

/// A notification waiting in the inbox
#[derive(Clone, Debug, PartialEq)]
pub struct ViewEvent {
    /// View whose handle raised the event
    pub view_id: ViewId,
    pub payload: ViewEventPayload,
    /// Broadcast that was in flight when the event was raised, if any
    pub caused_by: Option<Provenance>,
}

impl ViewEvent {
    /// Whether this event was raised while applying someone else's broadcast
    pub fn is_echo(&self) -> bool {
        self.caused_by.is_some()
    }
}

/// Opaque subscription token returned by `RenderHandle::subscribe`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Externally owned renderer behind a view
pub trait RenderHandle {
    /// Current camera
    fn camera_view(&self) -> HandleResult<CameraView>;

    /// Move the camera
    fn set_camera_view(&mut self, camera: &CameraView, apply: Apply) -> HandleResult<()>;

    /// Restrict drawing to `indices`
    fn set_visible_subset(&mut self, indices: &[u32]) -> HandleResult<()>;

    /// Draw every point again
    fn clear_visible_subset(&mut self) -> HandleResult<()>;

    /// Replace the selection
    fn select(&mut self, indices: &[u32], apply: Apply) -> HandleResult<()>;

    /// Clear the selection
    fn deselect(&mut self, apply: Apply) -> HandleResult<()>;

    /// Release every rendering resource; the handle is unusable afterwards
    fn teardown(&mut self) -> HandleResult<()>;

    /// Route notifications of `kind` into `sink`
    fn subscribe(&mut self, kind: ViewEventKind, sink: EventSink) -> HandleResult<SubscriptionId>;

    /// Stop routing notifications for a subscription
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// A boxed handle for dynamic dispatch
pub type BoxedHandle = Box<dyn RenderHandle>;

#[derive(Debug, Default)]
struct InboxState {
    queue: RefCell<VecDeque<ViewEvent>>,
    camera_in_flight: RefCell<Option<Provenance>>,
    selection_in_flight: RefCell<Option<Provenance>>,
}

impl InboxState {
    fn in_flight(&self, channel: SyncChannel) -> &RefCell<Option<Provenance>> {
        match channel {
            SyncChannel::Camera => &self.camera_in_flight,
            SyncChannel::Selection => &self.selection_in_flight,
        }
    }
}

/// Shared FIFO of handle notifications
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct EventInbox {
    state: Rc<InboxState>,
}

impl EventInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that tags events with `view_id`
    pub fn sink(&self, view_id: ViewId, kind: ViewEventKind) -> EventSink {
        EventSink {
            view_id,
            kind,
            inbox: self.clone(),
        }
    }

    /// Enqueue an event, stamping it with the in-flight broadcast of its channel
    pub fn push(&self, view_id: ViewId, payload: ViewEventPayload) {
        let channel = payload.kind().channel();
        let caused_by = self.state.in_flight(channel).borrow().clone();
        self.state.queue.borrow_mut().push_back(ViewEvent {
            view_id,
            payload,
            caused_by,
        });
    }

    /// Take the oldest pending event
    pub fn pop(&self) -> Option<ViewEvent> {
        self.state.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.queue.borrow().is_empty()
    }

    /// Broadcast currently in flight on `channel`
    pub fn in_flight(&self, channel: SyncChannel) -> Option<Provenance> {
        self.state.in_flight(channel).borrow().clone()
    }

    /// Mark a broadcast as in flight until the returned guard is dropped
    pub fn begin_broadcast(&self, channel: SyncChannel, provenance: Provenance) -> BroadcastGuard {
        *self.state.in_flight(channel).borrow_mut() = Some(provenance);
        BroadcastGuard {
            inbox: self.clone(),
            channel,
        }
    }
}

/// Clears a channel's in-flight marker on drop
#[derive(Debug)]
pub struct BroadcastGuard {
    inbox: EventInbox,
    channel: SyncChannel,
}

impl Drop for BroadcastGuard {
    fn drop(&mut self) {
        *self.inbox.state.in_flight(self.channel).borrow_mut() = None;
    }
}

/// Per-view, per-kind endpoint handed to a handle on subscribe
#[derive(Debug, Clone)]
pub struct EventSink {
    view_id: ViewId,
    kind: ViewEventKind,
    inbox: EventInbox,
}

impl EventSink {
    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    pub fn kind(&self) -> ViewEventKind {
        self.kind
    }

    /// Report a notification; payloads of another kind are dropped
    pub fn emit(&self, payload: ViewEventPayload) {
        if payload.kind() != self.kind {
            tracing::debug!(view = %self.view_id, expected = ?self.kind, got = ?payload.kind(), "dropping mismatched event");
            return;
        }
        self.inbox.push(self.view_id.clone(), payload);
    }
}
