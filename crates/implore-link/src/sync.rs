//! Camera and selection sync within groups of views
//!
//! Views that share a `SyncGroup` instance rebroadcast camera and selection
//! changes to each other. Feedback loops are prevented three ways:
//! - Every broadcast carries a `Provenance`; events it causes are echoes and
//!   are never rebroadcast
//! - A time-boxed leader token lets only one view lead per gesture
//! - A per-channel in-flight marker blocks broadcasts started from inside a
//!   broadcast
//!
//! Broadcasts apply silently and never fail as a whole: a member that errors
//! is logged and skipped.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::camera::CameraView;
use crate::handle::{Apply, EventInbox, Provenance, SyncChannel};
use crate::registry::ViewRegistry;
use crate::view::{ViewId, ViewInstance};

/// Shared, mutable set of view ids
///
/// Views belong to the same group only if they hold the same instance;
/// two groups with equal members are still distinct.
#[derive(Debug, Clone, Default)]
pub struct SyncGroup {
    members: Rc<RefCell<BTreeSet<ViewId>>>,
}

impl SyncGroup {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = ViewId>,
    {
        Self {
            members: Rc::new(RefCell::new(ids.into_iter().collect())),
        }
    }

    pub fn contains(&self, id: &ViewId) -> bool {
        self.members.borrow().contains(id)
    }

    pub fn insert(&self, id: ViewId) -> bool {
        self.members.borrow_mut().insert(id)
    }

    /// Snapshot of the member ids
    pub fn members(&self) -> Vec<ViewId> {
        self.members.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Whether both handles refer to the same group instance
    pub fn same_group(&self, other: &SyncGroup) -> bool {
        Rc::ptr_eq(&self.members, &other.members)
    }
}

/// Time-boxed claim to lead camera sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderToken {
    pub holder: ViewId,
    pub expires_at: Instant,
}

impl LeaderToken {
    pub fn is_held_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// What happened to a camera event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraOutcome {
    /// The view is not registered or has been retired
    Retired,
    /// Sync is switched off
    Disabled,
    /// The view belongs to no group
    Ungrouped,
    /// Initial framing of a freshly rendered view
    WarmingUp,
    /// Raised while applying another view's broadcast
    Echo,
    /// Another view leads the current window
    Follower,
    /// A camera broadcast is already in flight
    Reentrant,
    /// Broadcast to `delivered` members
    Broadcast { delivered: usize },
}

/// What happened to a selection event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The view is not registered or has been retired
    Retired,
    /// Raised while applying another view's broadcast; not reported
    Echo,
    /// A selection broadcast is already in flight; not reported
    Reentrant,
    /// Reported to the host and forwarded to `forwarded` members
    Reported { forwarded: usize },
}

impl SelectionOutcome {
    pub fn is_reported(&self) -> bool {
        matches!(self, SelectionOutcome::Reported { .. })
    }
}

/// Counters for diagnostics and tests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub camera_broadcasts: usize,
    pub selection_broadcasts: usize,
    pub echoes_suppressed: usize,
    pub followers_suppressed: usize,
    pub warmup_suppressed: usize,
    pub delivery_failures: usize,
}

/// Group membership, leadership and broadcast bookkeeping
#[derive(Debug)]
pub struct SyncCoordinator {
    enabled: bool,
    current_group: Option<SyncGroup>,
    leader: Option<LeaderToken>,
    leader_window: Duration,
    seq: u64,
    stats: SyncStats,
}

impl SyncCoordinator {
    pub fn new(leader_window: Duration) -> Self {
        Self {
            enabled: false,
            current_group: None,
            leader: None,
            leader_window,
            seq: 0,
            stats: SyncStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flip the session-wide switch without touching groups
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.leader = None;
        }
    }

    /// Group that late registrations may join
    pub fn current_group(&self) -> Option<&SyncGroup> {
        self.current_group.as_ref()
    }

    pub fn leader(&self) -> Option<&LeaderToken> {
        self.leader.as_ref()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Create or dissolve a group
    ///
    /// An empty `ids` means every live view when enabling and every
    /// registered view, retired ones included, when disabling. Enabling
    /// creates a fresh group shared by the named views; disabling detaches
    /// them from any group.
    pub fn set_group(&mut self, enabled: bool, ids: &[ViewId], registry: &mut ViewRegistry) {
        let ids: Vec<ViewId> = match (ids.is_empty(), enabled) {
            (false, _) => ids.to_vec(),
            (true, true) => registry.live_ids(),
            (true, false) => registry.ids(),
        };

        self.set_enabled(enabled);
        if enabled {
            let group = SyncGroup::new(ids.iter().cloned());
            for id in &ids {
                if let Some(view) = registry.get_mut(id) {
                    view.sync_group = Some(group.clone());
                }
            }
            tracing::info!(members = group.len(), "sync group created");
            self.current_group = Some(group);
        } else {
            for id in &ids {
                if let Some(view) = registry.get_mut(id) {
                    view.sync_group = None;
                }
            }
            tracing::info!(members = ids.len(), "sync group dissolved");
            self.current_group = None;
        }
    }

    /// Group a (re)registered view should belong to
    ///
    /// A view keeps its previous group; otherwise it joins the current group
    /// if that group names it.
    pub fn group_for(&self, id: &ViewId, previous: Option<&SyncGroup>) -> Option<SyncGroup> {
        previous.cloned().or_else(|| {
            self.current_group
                .as_ref()
                .filter(|group| group.contains(id))
                .cloned()
        })
    }

    fn next_provenance(&mut self, origin: &ViewId) -> Provenance {
        self.seq += 1;
        Provenance {
            origin: origin.clone(),
            seq: self.seq,
        }
    }

    /// Handle a camera notification from `id`
    ///
    /// The view's own camera bookkeeping is always updated; the broadcast
    /// only happens for a genuine change by the current leader.
    pub fn on_camera_changed(
        &mut self,
        id: &ViewId,
        camera: CameraView,
        caused_by: Option<&Provenance>,
        now: Instant,
        registry: &mut ViewRegistry,
        inbox: &EventInbox,
    ) -> CameraOutcome {
        let group = match registry.get_mut(id) {
            Some(view) if view.is_live() => {
                view.note_camera(camera);
                if !self.enabled {
                    return CameraOutcome::Disabled;
                }
                let Some(group) = view.sync_group.clone() else {
                    return CameraOutcome::Ungrouped;
                };
                if view.is_initializing(now) {
                    self.stats.warmup_suppressed += 1;
                    tracing::debug!(view = %id, "camera change during warm-up");
                    return CameraOutcome::WarmingUp;
                }
                group
            }
            _ => return CameraOutcome::Retired,
        };

        if let Some(provenance) = caused_by {
            self.stats.echoes_suppressed += 1;
            tracing::debug!(view = %id, origin = %provenance.origin, seq = provenance.seq, "camera echo");
            return CameraOutcome::Echo;
        }

        if let Some(token) = &self.leader {
            if token.holder != *id && token.is_held_at(now) {
                self.stats.followers_suppressed += 1;
                tracing::debug!(view = %id, leader = %token.holder, "camera follower");
                return CameraOutcome::Follower;
            }
        }
        self.leader = Some(LeaderToken {
            holder: id.clone(),
            expires_at: now + self.leader_window,
        });

        if inbox.in_flight(SyncChannel::Camera).is_some() {
            return CameraOutcome::Reentrant;
        }

        let provenance = self.next_provenance(id);
        let _guard = inbox.begin_broadcast(SyncChannel::Camera, provenance);
        let mut delivered = 0;
        for member in group.members() {
            if member == *id {
                continue;
            }
            let Some(target) = registry.get_mut(&member) else {
                continue;
            };
            if !holds_group(target, &group) {
                continue;
            }
            if !target.is_connected() || target.is_initializing(now) {
                continue;
            }
            let Some(handle) = target.handle.as_mut() else {
                continue;
            };
            match handle.set_camera_view(&camera, Apply::Silent) {
                Ok(()) => {
                    target.note_camera(camera);
                    delivered += 1;
                }
                Err(e) => {
                    self.stats.delivery_failures += 1;
                    tracing::warn!(view = %member, "Failed to apply synced camera: {}", e);
                }
            }
        }

        self.stats.camera_broadcasts += 1;
        tracing::debug!(view = %id, delivered, "camera broadcast");
        CameraOutcome::Broadcast { delivered }
    }

    /// Handle a select (`Some`) or deselect (`None`) notification from `id`
    ///
    /// Genuine events are always reported; they are forwarded only while
    /// sync is enabled and the view belongs to a group.
    pub fn on_selection_changed(
        &mut self,
        id: &ViewId,
        indices: Option<&[u32]>,
        caused_by: Option<&Provenance>,
        registry: &mut ViewRegistry,
        inbox: &EventInbox,
    ) -> SelectionOutcome {
        if !registry.get(id).map(ViewInstance::is_live).unwrap_or(false) {
            return SelectionOutcome::Retired;
        }

        if let Some(provenance) = caused_by {
            self.stats.echoes_suppressed += 1;
            tracing::debug!(view = %id, origin = %provenance.origin, "selection echo");
            return SelectionOutcome::Echo;
        }

        if inbox.in_flight(SyncChannel::Selection).is_some() {
            return SelectionOutcome::Reentrant;
        }

        let forwarded = self.forward_selection(id, indices, registry, inbox);
        SelectionOutcome::Reported { forwarded }
    }

    /// Silently apply a selection to every other member of `origin`'s group
    ///
    /// No-op while sync is disabled or `origin` is ungrouped. Retired members
    /// are skipped. Returns the number of members updated.
    pub fn forward_selection(
        &mut self,
        origin: &ViewId,
        indices: Option<&[u32]>,
        registry: &mut ViewRegistry,
        inbox: &EventInbox,
    ) -> usize {
        if !self.enabled {
            return 0;
        }
        let Some(group) = registry.get(origin).and_then(|view| view.sync_group.clone()) else {
            return 0;
        };

        let provenance = self.next_provenance(origin);
        let _guard = inbox.begin_broadcast(SyncChannel::Selection, provenance);
        let mut forwarded = 0;
        for member in group.members() {
            if member == *origin {
                continue;
            }
            let Some(target) = registry.get_mut(&member) else {
                continue;
            };
            if !holds_group(target, &group) {
                continue;
            }
            if !target.is_connected() {
                continue;
            }
            let Some(handle) = target.handle.as_mut() else {
                continue;
            };
            let result = match indices {
                Some(indices) => handle.select(indices, Apply::Silent),
                None => handle.deselect(Apply::Silent),
            };
            match result {
                Ok(()) => forwarded += 1,
                Err(e) => {
                    self.stats.delivery_failures += 1;
                    tracing::warn!(view = %member, "Failed to apply synced selection: {}", e);
                }
            }
        }

        self.stats.selection_broadcasts += 1;
        tracing::debug!(view = %origin, forwarded, "selection broadcast");
        forwarded
    }
}

/// Whether `view` still holds this exact group instance
fn holds_group(view: &ViewInstance, group: &SyncGroup) -> bool {
    view.sync_group
        .as_ref()
        .is_some_and(|held| held.same_group(group))
}
