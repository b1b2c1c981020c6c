//! Shared session harness and synthetic datasets

use std::collections::BTreeMap;
use std::rc::Rc;

use implore_link::{
    DecodedDataset, HeadlessHandle, LinkConfig, LinkSession, ManualClock, ViewAnchor, ViewId,
};

/// A session on a manual clock plus the headless handles behind each view
pub struct Harness {
    pub session: LinkSession,
    pub clock: ManualClock,
    handles: BTreeMap<String, HeadlessHandle>,
    anchors: BTreeMap<String, Rc<ViewAnchor>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let clock = ManualClock::new();
        let session = LinkSession::with_clock(config, Rc::new(clock.clone()))
            .expect("default config is valid");
        Self {
            session,
            clock,
            handles: BTreeMap::new(),
            anchors: BTreeMap::new(),
        }
    }

    /// Register a view on a fresh headless handle
    pub fn register(&mut self, id: &str, dataset: DecodedDataset) -> HeadlessHandle {
        self.register_with(id, dataset, HeadlessHandle::new())
    }

    /// Register a view on a caller-configured handle
    #[allow(dead_code)]
    pub fn register_with(
        &mut self,
        id: &str,
        dataset: DecodedDataset,
        handle: HeadlessHandle,
    ) -> HeadlessHandle {
        let anchor = ViewAnchor::new();
        self.session
            .register_view(id, dataset, Box::new(handle.clone()), &anchor)
            .expect("registration succeeds");
        self.handles.insert(id.to_string(), handle.clone());
        self.anchors.insert(id.to_string(), anchor);
        handle
    }

    pub fn handle(&self, id: &str) -> &HeadlessHandle {
        &self.handles[id]
    }

    /// Remove a view's element from the page
    #[allow(dead_code)]
    pub fn detach(&mut self, id: &str) {
        if let Some(anchor) = self.anchors.get(id) {
            anchor.detach();
        }
    }

    /// Let every warm-up window elapse
    #[allow(dead_code)]
    pub fn settle(&self) {
        let warmup = self.session.config().sync.warmup_ms;
        self.clock.advance_ms(warmup + 1);
    }

    /// Let the leader window elapse
    #[allow(dead_code)]
    pub fn release_leader(&self) {
        let window = self.session.config().sync.leader_window_ms;
        self.clock.advance_ms(window + 1);
    }
}

pub fn id(name: &str) -> ViewId {
    ViewId::from(name)
}

/// Dataset over a unit domain with no variables
pub fn plain(n_points: usize) -> DecodedDataset {
    DecodedDataset::new(n_points, [0.0, 1.0], [0.0, 1.0])
}

/// Quality-control values spread over [0, 1]
#[allow(dead_code)]
pub fn qc_values(n_points: usize) -> Vec<f32> {
    (0..n_points)
        .map(|i| ((i * 37) % 101) as f32 / 100.0)
        .collect()
}

/// Cluster codes 0..5
#[allow(dead_code)]
pub fn cluster_codes(n_points: usize) -> Vec<f32> {
    (0..n_points).map(|i| ((i * 13 + i / 7) % 5) as f32).collect()
}

/// Dataset carrying `qc` and `cluster`
#[allow(dead_code)]
pub fn scatter(n_points: usize) -> DecodedDataset {
    DecodedDataset::new(n_points, [-5.0, 5.0], [0.0, 100.0])
        .with_variable("qc", qc_values(n_points))
        .with_variable("cluster", cluster_codes(n_points))
}
