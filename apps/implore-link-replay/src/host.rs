//! Headless host page
//!
//! Plays the part of the notebook page: owns the session, one headless
//! renderer per view id and the DOM anchors. Each step is one event-loop
//! turn, so handle notifications are dispatched after every step.

use implore_link::{
    HeadlessHandle, HostEvent, LinkConfig, LinkSession, ManualClock, SyncStats, ViewAnchor,
    ViewId,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

use crate::error::{ReplayError, ReplayResult};
use crate::script::{Script, Step};

/// End-of-run report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub failed_steps: usize,
    pub host_events: usize,
    pub live_views: Vec<ViewId>,
    pub retired_views: Vec<ViewId>,
    pub sync: SyncStats,
}

pub struct ReplayHost {
    session: LinkSession,
    clock: ManualClock,
    handles: BTreeMap<ViewId, HeadlessHandle>,
    anchors: BTreeMap<ViewId, Rc<ViewAnchor>>,
    steps: usize,
    failed_steps: usize,
    host_events: usize,
}

impl ReplayHost {
    pub fn new(config: LinkConfig) -> ReplayResult<Self> {
        let clock = ManualClock::new();
        let session = LinkSession::with_clock(config, Rc::new(clock.clone()))?;
        Ok(Self {
            session,
            clock,
            handles: BTreeMap::new(),
            anchors: BTreeMap::new(),
            steps: 0,
            failed_steps: 0,
            host_events: 0,
        })
    }

    /// Headless renderer currently backing a view
    #[cfg(test)]
    pub fn handle(&self, view: &str) -> Option<&HeadlessHandle> {
        self.handles.get(view)
    }

    /// Replay a whole script, writing host events as JSON lines
    ///
    /// A failing step is logged and skipped. Only output errors abort.
    pub fn run<W: Write>(&mut self, script: &Script, out: &mut W) -> ReplayResult<ReplaySummary> {
        for (index, step) in script.steps.iter().enumerate() {
            let events = match self.step(index, step) {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(step = index, "Step failed: {}", e);
                    self.failed_steps += 1;
                    self.flush()
                }
            };
            for event in events {
                let line = event.to_json()?;
                writeln!(out, "{}", line).map_err(ReplayError::Output)?;
            }
        }
        Ok(self.summary())
    }

    /// Run one step and collect the host events it produced
    pub fn step(&mut self, index: usize, step: &Step) -> ReplayResult<Vec<HostEvent>> {
        self.steps += 1;
        tracing::debug!(step = index, ?step, "replaying");

        match step {
            Step::Register {
                view,
                descriptor,
                leaky,
            } => {
                let handle = if *leaky {
                    HeadlessHandle::new().ignoring_silent()
                } else {
                    HeadlessHandle::new()
                };
                let anchor = ViewAnchor::new();
                self.session.register_descriptor(
                    view.as_str(),
                    descriptor,
                    Box::new(handle.clone()),
                    &anchor,
                )?;
                self.handles.insert(ViewId::from(view.as_str()), handle);
                self.anchors.insert(ViewId::from(view.as_str()), anchor);
            }
            Step::UpdateVariables { view, variables } => {
                self.session
                    .update_variables(&ViewId::from(view.as_str()), variables.clone())?;
            }
            Step::Filter { command } => self.session.apply_filter(command.clone())?,
            Step::ToggleCategory {
                variable,
                code,
                mode,
                source_view,
            } => {
                let source = source_view.as_deref().map(ViewId::from);
                let selection =
                    self.session
                        .toggle_category(variable, *code, *mode, source.as_ref())?;
                tracing::info!(%variable, ?selection, "legend toggled");
            }
            Step::SyncGroup { enabled, views } => {
                let ids: Vec<ViewId> = views.iter().map(|v| ViewId::from(v.as_str())).collect();
                self.session.set_sync_group(*enabled, &ids);
            }
            Step::UserCamera { view, camera } => {
                self.gesture(index, view)?.user_set_camera(*camera)?;
            }
            Step::Pan { view, dx, dy } => {
                let handle = self.gesture(index, view)?;
                let mut camera = handle.camera();
                camera.pan(*dx, *dy);
                handle.user_set_camera(camera)?;
            }
            Step::Zoom { view, factor } => {
                let handle = self.gesture(index, view)?;
                let mut camera = handle.camera();
                camera.zoom_by(*factor);
                handle.user_set_camera(camera)?;
            }
            Step::UserSelect { view, indices } => {
                self.gesture(index, view)?.user_select(indices)?;
            }
            Step::UserDeselect { view } => {
                self.gesture(index, view)?.user_deselect()?;
            }
            Step::SetSelection { view, indices } => {
                self.session
                    .set_selection(&ViewId::from(view.as_str()), indices)?;
            }
            Step::ClearSelection { view } => {
                self.session.clear_selection(&ViewId::from(view.as_str()))?;
            }
            Step::ClearAllSelections => self.session.clear_all_selections(),
            Step::Detach { view } => {
                let anchor = self
                    .anchors
                    .get(view.as_str())
                    .ok_or_else(|| ReplayError::UnknownView {
                        step: index,
                        view: view.clone(),
                    })?;
                anchor.detach();
            }
            Step::Sweep => {
                let retired = self.session.sweep();
                if !retired.is_empty() {
                    tracing::info!(count = retired.len(), "retired detached views");
                }
            }
            Step::Advance { ms } => self.clock.advance_ms(*ms),
        }

        Ok(self.flush())
    }

    /// Headless handle for a user gesture; gestures need a rendered view
    fn gesture(&self, index: usize, view: &str) -> ReplayResult<&HeadlessHandle> {
        self.handles
            .get(view)
            .ok_or_else(|| ReplayError::UnknownView {
                step: index,
                view: view.to_string(),
            })
    }

    /// End the event-loop turn
    fn flush(&mut self) -> Vec<HostEvent> {
        let processed = self.session.dispatch_pending();
        if processed > 0 {
            tracing::debug!(processed, "dispatched handle events");
        }
        let events = self.session.drain_host_events();
        self.host_events += events.len();
        events
    }

    pub fn summary(&self) -> ReplaySummary {
        let registry = self.session.registry();
        let live_views = registry.live_ids();
        let retired_views = registry
            .ids()
            .into_iter()
            .filter(|id| !live_views.contains(id))
            .collect();
        ReplaySummary {
            steps: self.steps,
            failed_steps: self.failed_steps,
            host_events: self.host_events,
            live_views,
            retired_views,
            sync: self.session.sync().stats().clone(),
        }
    }
}
