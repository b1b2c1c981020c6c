//! View identity, liveness anchors, and per-view registry entries
//!
//! This module defines:
//! - ViewId: Stable string key of a view
//! - ViewAnchor: Liveness token owned by the host's UI element
//! - ViewInstance: Everything the coordination layer knows about one view

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use crate::axis::{AxisDomains, DataDomain};
use crate::camera::CameraView;
use crate::filter::IndexSet;
use crate::handle::{BoxedHandle, SubscriptionId};
use crate::sync::SyncGroup;

/// Stable identifier of a view
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ViewId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ViewId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Liveness token for a view's host-side element
///
/// The host owns the `Rc`; the registry keeps only a `Weak`. A view counts as
/// disconnected once the host drops its anchor or calls `detach`.
#[derive(Debug)]
pub struct ViewAnchor {
    connected: Cell<bool>,
}

impl ViewAnchor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            connected: Cell::new(true),
        })
    }

    /// Mark the element as removed from the UI
    pub fn detach(&self) {
        self.connected.set(false);
    }

    /// Mark the element as attached again
    pub fn reattach(&self) {
        self.connected.set(true);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

/// Registry entry for one view
///
/// An instance outlives its handle: after retirement `handle` is `None` while
/// `saved_camera` and the rest of the state stay addressable.
pub struct ViewInstance {
    pub id: ViewId,

    /// Rendering handle; `None` once retired
    pub handle: Option<BoxedHandle>,

    /// Weak reference to the host element, liveness only
    pub anchor: Weak<ViewAnchor>,

    /// Subscriptions registered on the current handle
    pub subscriptions: Vec<SubscriptionId>,

    /// Point count of the current dataset generation
    pub n_points: usize,

    /// Per-variable values, each at most `n_points` long
    pub variables: BTreeMap<String, Vec<f32>>,

    /// Host-supplied allowed indices for this view only
    pub server_filter: Option<IndexSet>,

    /// Group this view rebroadcasts camera and selection within
    pub sync_group: Option<SyncGroup>,

    /// Camera events before this instant are initial framing, not user intent
    pub warmup_until: Option<Instant>,

    /// Last known camera, kept across retirement
    pub saved_camera: Option<CameraView>,

    pub x_domain: DataDomain,
    pub y_domain: DataDomain,

    /// Visible data window under the current camera
    pub axes: AxisDomains,
}

impl ViewInstance {
    /// Create an instance with an identity camera
    pub fn new(
        id: ViewId,
        handle: BoxedHandle,
        anchor: &Rc<ViewAnchor>,
        n_points: usize,
        x_domain: DataDomain,
        y_domain: DataDomain,
    ) -> Self {
        Self {
            id,
            handle: Some(handle),
            anchor: Rc::downgrade(anchor),
            subscriptions: Vec::new(),
            n_points,
            variables: BTreeMap::new(),
            server_filter: None,
            sync_group: None,
            warmup_until: None,
            saved_camera: None,
            axes: AxisDomains::from_camera(&CameraView::default(), &x_domain, &y_domain),
            x_domain,
            y_domain,
        }
    }

    /// Whether the host element is still attached
    pub fn is_connected(&self) -> bool {
        self.anchor
            .upgrade()
            .map(|anchor| anchor.is_connected())
            .unwrap_or(false)
    }

    /// Whether the view has a handle (not retired)
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether camera events are still initial framing
    pub fn is_initializing(&self, now: Instant) -> bool {
        self.warmup_until.map(|until| now < until).unwrap_or(false)
    }

    /// Values of a variable, if this view carries it
    pub fn variable(&self, name: &str) -> Option<&[f32]> {
        self.variables.get(name).map(Vec::as_slice)
    }

    /// Record a new camera and recompute the visible axes
    pub fn note_camera(&mut self, camera: CameraView) {
        self.saved_camera = Some(camera);
        self.axes = AxisDomains::from_camera(&camera, &self.x_domain, &self.y_domain);
    }

    /// Current camera: live handle first, then the saved snapshot
    pub fn current_camera(&self) -> Option<CameraView> {
        match &self.handle {
            Some(handle) => match handle.camera_view() {
                Ok(camera) => Some(camera),
                Err(e) => {
                    tracing::warn!(view = %self.id, "Failed to read camera: {}", e);
                    self.saved_camera
                }
            },
            None => self.saved_camera,
        }
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .field("n_points", &self.n_points)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("saved_camera", &self.saved_camera)
            .finish()
    }
}
