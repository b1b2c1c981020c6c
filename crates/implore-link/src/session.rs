//! Linked-view coordination session
//!
//! A `LinkSession` is the coordination context every view of one host page
//! shares. It owns:
//! - The view registry (live and retired views)
//! - The global filter tables
//! - The sync coordinator (groups, leader token, broadcast guards)
//! - The inbox handles report into, and the outbox of host events
//!
//! Everything runs on the caller's thread. Host commands take effect
//! immediately; handle notifications wait in the inbox until
//! `dispatch_pending` is called.

use implore_link_io::{DatasetDescriptor, DecodedDataset, EncodedBuffer};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use crate::axis::DataDomain;
use crate::camera::CameraView;
use crate::clock::{Clock, SystemClock};
use crate::config::LinkConfig;
use crate::error::{LinkError, LinkResult};
use crate::events::HostEvent;
use crate::filter::{FilterCommand, FilterState, IndexSet, ToggleMode, Visibility};
use crate::handle::{Apply, BoxedHandle, EventInbox, ViewEvent, ViewEventKind, ViewEventPayload};
use crate::registry::ViewRegistry;
use crate::sync::{SyncCoordinator, SyncGroup};
use crate::view::{ViewAnchor, ViewId, ViewInstance};

/// Coordination context shared by all views of a host page
pub struct LinkSession {
    config: LinkConfig,
    clock: Rc<dyn Clock>,
    registry: ViewRegistry,
    filters: FilterState,
    /// View whose buffer built each categorical member set
    category_sources: BTreeMap<String, ViewId>,
    sync: SyncCoordinator,
    inbox: EventInbox,
    outbox: VecDeque<HostEvent>,
    generation: Option<usize>,
    primary_view: ViewId,
}

impl LinkSession {
    /// Create a session on the wall clock
    pub fn new(config: LinkConfig) -> LinkResult<Self> {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    /// Create a session on an injected clock
    pub fn with_clock(config: LinkConfig, clock: Rc<dyn Clock>) -> LinkResult<Self> {
        config.validate()?;
        Ok(Self {
            primary_view: ViewId::from(config.filter.primary_view.as_str()),
            sync: SyncCoordinator::new(config.sync.leader_window()),
            config,
            clock,
            registry: ViewRegistry::new(),
            filters: FilterState::new(),
            category_sources: BTreeMap::new(),
            inbox: EventInbox::new(),
            outbox: VecDeque::new(),
            generation: None,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn view(&self, id: &ViewId) -> Option<&ViewInstance> {
        self.registry.get(id)
    }

    /// Point count of the current dataset generation
    pub fn generation(&self) -> Option<usize> {
        self.generation
    }

    /// Number of handle notifications waiting for `dispatch_pending`
    pub fn pending_events(&self) -> usize {
        self.inbox.len()
    }

    /// Decode a descriptor and register the view
    pub fn register_descriptor(
        &mut self,
        id: impl Into<ViewId>,
        descriptor: &DatasetDescriptor,
        handle: BoxedHandle,
        anchor: &Rc<ViewAnchor>,
    ) -> LinkResult<()> {
        let dataset = descriptor.decode()?;
        self.register_view(id, dataset, handle, anchor)
    }

    /// Create or resurrect a view
    ///
    /// The initial camera comes from the master view (live, then saved), else
    /// from this id's own saved camera. Initial camera and selection are
    /// applied silently before any subscription exists, and the view then
    /// spends the warm-up window ignoring its own camera events.
    pub fn register_view(
        &mut self,
        id: impl Into<ViewId>,
        dataset: DecodedDataset,
        mut handle: BoxedHandle,
        anchor: &Rc<ViewAnchor>,
    ) -> LinkResult<()> {
        let id = id.into();
        self.sweep();

        let n_points = dataset.n_points;
        if n_points > self.config.filter.max_points {
            return Err(LinkError::TooLarge {
                size: n_points,
                max: self.config.filter.max_points,
            });
        }
        let x_domain = DataDomain::from_pair("x", dataset.x_domain)?;
        let y_domain = DataDomain::from_pair("y", dataset.y_domain)?;

        if let Some(enabled) = dataset.sync_enabled {
            self.sync.set_enabled(enabled);
        }

        let previous_generation = self.generation.replace(n_points);
        let generation_changed = previous_generation.is_some_and(|previous| previous != n_points);
        if generation_changed {
            tracing::info!(view = %id, ?previous_generation, n_points, "dataset generation changed, clearing filters");
            self.filters.clear();
            self.category_sources.clear();
        }

        let master = dataset.master_id.as_deref().map(ViewId::from);
        let initial_camera = self.initial_camera(&id, master.as_ref());
        if let Some(camera) = initial_camera {
            if let Err(e) = handle.set_camera_view(&camera, Apply::Silent) {
                tracing::warn!(view = %id, "Failed to restore camera: {}", e);
            }
        }

        if let Some(indices) = dataset.init_selected_indices.as_deref().filter(|s| !s.is_empty()) {
            if let Err(e) = handle.select(indices, Apply::Silent) {
                tracing::warn!(view = %id, "Failed to restore selection: {}", e);
            }
        }

        let mut subscriptions = Vec::with_capacity(ViewEventKind::ALL.len());
        for kind in ViewEventKind::ALL {
            match handle.subscribe(kind, self.inbox.sink(id.clone(), kind)) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => tracing::warn!(view = %id, ?kind, "Failed to subscribe: {}", e),
            }
        }

        let previous_group: Option<SyncGroup> = self
            .registry
            .get(&id)
            .and_then(|view| view.sync_group.clone());

        let mut instance = ViewInstance::new(id.clone(), handle, anchor, n_points, x_domain, y_domain);
        instance.subscriptions = subscriptions;
        instance.variables = dataset.variables;
        instance.server_filter = dataset
            .init_server_indices
            .filter(|indices| !indices.is_empty())
            .map(|indices| IndexSet::from_indices(indices, n_points));
        instance.sync_group = self.sync.group_for(&id, previous_group.as_ref());
        instance.warmup_until = Some(self.clock.now() + self.config.sync.warmup());
        if let Some(camera) = initial_camera {
            instance.note_camera(camera);
        }

        self.registry.register(instance);
        tracing::info!(view = %id, n_points, "registered view");

        // Cleared filters and rebuilt member sets change every view, not just this one
        let refreshed = self.refresh_categories_from(&id);
        if generation_changed || refreshed {
            self.recompute_all();
        } else {
            self.recompute(&id)?;
        }
        Ok(())
    }

    /// Replace some of a view's variable buffers and recompute
    ///
    /// Buffers are truncated to the view's point count. Every buffer is
    /// decoded before any is installed, so a bad buffer changes nothing.
    /// Categorical member sets built from this view are rebuilt.
    pub fn update_variables(
        &mut self,
        id: &ViewId,
        buffers: BTreeMap<String, EncodedBuffer>,
    ) -> LinkResult<()> {
        let view = self
            .registry
            .get_mut(id)
            .ok_or_else(|| LinkError::UnknownView(id.clone()))?;
        let n_points = view.n_points;

        let mut decoded = Vec::with_capacity(buffers.len());
        for (name, buffer) in buffers {
            let values = buffer
                .decode_truncated(n_points)
                .map_err(|e| e.for_variable(name.as_str()))?;
            decoded.push((name, values));
        }
        tracing::debug!(view = %id, count = decoded.len(), "variables updated");
        view.variables.extend(decoded);

        if self.refresh_categories_from(id) {
            self.recompute_all();
        } else {
            self.recompute(id)?;
        }
        Ok(())
    }

    /// Rebuild categorical member sets that `id` may now supply
    ///
    /// Covers selections with no member set yet and selections whose member
    /// set came from `id`. Returns whether any selection was rebuilt.
    fn refresh_categories_from(&mut self, id: &ViewId) -> bool {
        let stale: Vec<String> = self
            .filters
            .selected_variables()
            .filter(|variable| {
                self.filters.index_filter(variable).is_none()
                    || self.category_sources.get(*variable) == Some(id)
            })
            .map(str::to_string)
            .collect();

        for variable in &stale {
            self.rebuild_category_members(variable, Some(id));
        }
        !stale.is_empty()
    }

    fn initial_camera(&self, id: &ViewId, master: Option<&ViewId>) -> Option<CameraView> {
        master
            .and_then(|master| self.registry.get(master))
            .and_then(ViewInstance::current_camera)
            .or_else(|| self.registry.get(id).and_then(|view| view.saved_camera))
    }

    /// Update one filter source and recompute the views it affects
    pub fn apply_filter(&mut self, command: FilterCommand) -> LinkResult<()> {
        match command {
            FilterCommand::Range { variable, bounds } => {
                tracing::debug!(%variable, ?bounds, "range filter");
                self.filters.set_range(&variable, bounds);
                self.recompute_all();
            }
            FilterCommand::Categorical {
                variable,
                codes,
                source_view,
            } => {
                self.require_view(source_view.as_ref())?;
                tracing::debug!(%variable, codes = codes.len(), "categorical filter");
                self.filters.set_categories(&variable, codes);
                self.rebuild_category_members(&variable, source_view.as_ref());
                self.recompute_all();
            }
            FilterCommand::Server { view_id, allowed } => {
                let view = self
                    .registry
                    .get_mut(&view_id)
                    .ok_or_else(|| LinkError::UnknownView(view_id.clone()))?;
                view.server_filter = allowed
                    .filter(|indices| !indices.is_empty())
                    .map(|indices| IndexSet::from_indices(indices, view.n_points));
                tracing::debug!(view = %view_id, active = view.server_filter.is_some(), "server filter");
                self.recompute(&view_id)?;
            }
        }
        Ok(())
    }

    /// Apply a legend click to a categorical filter
    ///
    /// Returns the resulting selection; `None` means the filter was removed.
    pub fn toggle_category(
        &mut self,
        variable: &str,
        code: i64,
        mode: ToggleMode,
        source_view: Option<&ViewId>,
    ) -> LinkResult<Option<BTreeSet<i64>>> {
        self.require_view(source_view)?;
        let selection = self.filters.toggle_category(variable, code, mode).cloned();
        self.rebuild_category_members(variable, source_view);
        self.recompute_all();
        Ok(selection)
    }

    fn require_view(&self, id: Option<&ViewId>) -> LinkResult<()> {
        match id {
            Some(id) if !self.registry.contains(id) => Err(LinkError::UnknownView(id.clone())),
            _ => Ok(()),
        }
    }

    /// Rebuild the member set of a categorical selection
    ///
    /// Uses the requesting view's buffer, else the first live view carrying
    /// the variable. Without any buffer the selection contributes nothing.
    fn rebuild_category_members(&mut self, variable: &str, source: Option<&ViewId>) {
        let Some(codes) = self.filters.selection(variable).cloned() else {
            self.filters.set_index_filter(variable, None);
            self.category_sources.remove(variable);
            return;
        };

        let found = source
            .and_then(|id| self.registry.get(id))
            .and_then(|view| category_members(view, variable, &codes))
            .or_else(|| {
                self.registry
                    .iter()
                    .filter(|view| view.is_live())
                    .find_map(|view| category_members(view, variable, &codes))
            });

        match found {
            Some((provider, members)) => {
                self.category_sources.insert(variable.to_string(), provider);
                self.filters.set_index_filter(variable, Some(members));
            }
            None => {
                tracing::debug!(%variable, "no view carries category buffer");
                self.category_sources.remove(variable);
                self.filters.set_index_filter(variable, None);
            }
        }
    }

    /// Create or dissolve a sync group; empty `ids` means every live view
    pub fn set_sync_group(&mut self, enabled: bool, ids: &[ViewId]) {
        self.sync.set_group(enabled, ids, &mut self.registry);
    }

    /// Replace a view's selection and forward it to its group
    pub fn set_selection(&mut self, id: &ViewId, indices: &[u32]) -> LinkResult<()> {
        self.apply_selection(id, Some(indices))
    }

    /// Clear a view's selection and forward the clearing to its group
    pub fn clear_selection(&mut self, id: &ViewId) -> LinkResult<()> {
        self.apply_selection(id, None)
    }

    fn apply_selection(&mut self, id: &ViewId, indices: Option<&[u32]>) -> LinkResult<()> {
        let view = self
            .registry
            .get_mut(id)
            .ok_or_else(|| LinkError::UnknownView(id.clone()))?;
        let Some(handle) = view.handle.as_mut() else {
            tracing::debug!(view = %id, "selection on retired view ignored");
            return Ok(());
        };

        let result = match indices {
            Some(indices) => handle.select(indices, Apply::Silent),
            None => handle.deselect(Apply::Silent),
        };
        if let Err(e) = result {
            tracing::warn!(view = %id, "Failed to apply selection: {}", e);
        }

        self.sync
            .forward_selection(id, indices, &mut self.registry, &self.inbox);
        Ok(())
    }

    /// Silently deselect every live view
    pub fn clear_all_selections(&mut self) {
        self.registry.for_each(|view| {
            if let Some(handle) = view.handle.as_mut() {
                if let Err(e) = handle.deselect(Apply::Silent) {
                    tracing::warn!(view = %view.id, "Failed to clear selection: {}", e);
                }
            }
        });
    }

    /// Retire views whose anchors are gone
    pub fn sweep(&mut self) -> Vec<ViewId> {
        self.registry.sweep()
    }

    /// Process queued handle notifications in arrival order
    ///
    /// Events raised while processing are handled in the same call. Returns
    /// the number of events processed.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.inbox.pop() {
            self.handle_event(event);
            processed += 1;
        }
        processed
    }

    fn handle_event(&mut self, event: ViewEvent) {
        let ViewEvent {
            view_id,
            payload,
            caused_by,
        } = event;

        match payload {
            ViewEventPayload::Camera { camera } => {
                let now = self.clock.now();
                let outcome = self.sync.on_camera_changed(
                    &view_id,
                    camera,
                    caused_by.as_ref(),
                    now,
                    &mut self.registry,
                    &self.inbox,
                );
                tracing::debug!(view = %view_id, ?outcome, "camera event");
            }
            ViewEventPayload::Select { indices } => {
                let outcome = self.sync.on_selection_changed(
                    &view_id,
                    Some(indices.as_slice()),
                    caused_by.as_ref(),
                    &mut self.registry,
                    &self.inbox,
                );
                if outcome.is_reported() {
                    self.outbox
                        .push_back(HostEvent::selection_changed(view_id, indices));
                }
            }
            ViewEventPayload::Deselect => {
                let outcome = self.sync.on_selection_changed(
                    &view_id,
                    None,
                    caused_by.as_ref(),
                    &mut self.registry,
                    &self.inbox,
                );
                if outcome.is_reported() {
                    self.outbox
                        .push_back(HostEvent::selection_changed(view_id, Vec::new()));
                }
            }
        }
    }

    /// Recompute one view's visible subset
    ///
    /// The result is pushed to the view's handle, and for the primary view
    /// the visible count is reported. Retired views are computed but
    /// neither pushed nor reported.
    pub fn recompute(&mut self, id: &ViewId) -> LinkResult<Visibility> {
        let view = self
            .registry
            .get_mut(id)
            .ok_or_else(|| LinkError::UnknownView(id.clone()))?;
        let visibility =
            self.filters
                .recompute(view.n_points, &view.variables, view.server_filter.as_ref());

        let Some(handle) = view.handle.as_mut() else {
            return Ok(visibility);
        };
        let pushed = match &visibility {
            Visibility::Unfiltered => handle.clear_visible_subset(),
            Visibility::Filtered(indices) => handle.set_visible_subset(indices),
        };
        if let Err(e) = pushed {
            tracing::warn!(view = %id, "Failed to push visible subset: {}", e);
        }

        if *id == self.primary_view {
            self.outbox.push_back(HostEvent::FilteredCount {
                view_id: id.clone(),
                count: visibility.count(view.n_points),
            });
        }
        Ok(visibility)
    }

    /// Recompute every live view
    pub fn recompute_all(&mut self) {
        for id in self.registry.live_ids() {
            if let Err(e) = self.recompute(&id) {
                tracing::warn!(view = %id, "Failed to recompute: {}", e);
            }
        }
    }

    /// Take every queued host event
    pub fn drain_host_events(&mut self) -> Vec<HostEvent> {
        self.outbox.drain(..).collect()
    }
}

/// Member set of a categorical selection over `view`, tagged with its id
fn category_members(
    view: &ViewInstance,
    variable: &str,
    codes: &BTreeSet<i64>,
) -> Option<(ViewId, IndexSet)> {
    view.variable(variable).map(|values| {
        (
            view.id.clone(),
            IndexSet::from_categories(values, codes, view.n_points),
        )
    })
}
