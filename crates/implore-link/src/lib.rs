//! implore-link - Linked-view coordination for point-cloud visualizations
//!
//! This crate keeps a fleet of independently created and destroyed
//! scatterplot views consistent: shared visibility filters, synchronized
//! camera and synchronized selection. Rendering itself happens elsewhere,
//! behind the `RenderHandle` trait.
//!
//! # Key Components
//!
//! - **LinkSession**: Coordination context shared by every view of a host page
//! - **FilterState**: Range, categorical and per-view server filters, AND'd
//! - **ViewRegistry**: Live and retired views, with a sweep that retires
//!   views whose anchor is gone while keeping their camera
//! - **SyncCoordinator**: Group broadcasts guarded by provenance tags, a
//!   leader token and per-channel in-flight markers
//! - **Mapper**: Affine conversion between normalized camera space and data units
//!
//! # Event flow
//!
//! Host commands (`register_view`, `apply_filter`, `set_sync_group`,
//! `set_selection`) act immediately. Handles report user gestures into the
//! session's inbox; `dispatch_pending` processes them. Outbound events
//! (`HostEvent`) are collected with `drain_host_events`.

pub mod axis;
pub mod camera;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod handle;
pub mod headless;
pub mod mapper;
pub mod registry;
pub mod session;
pub mod sync;
pub mod view;

pub use axis::{AxisDomains, DataDomain};
pub use camera::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FilterConfig, LinkConfig, SyncConfig};
pub use error::{ConfigError, HandleError, HandleResult, LinkError, LinkResult};
pub use events::HostEvent;
pub use filter::{FilterCommand, FilterState, IndexSet, RangeFilter, ToggleMode, Visibility};
pub use handle::{
    Apply, BoxedHandle, EventInbox, EventSink, Provenance, RenderHandle, SubscriptionId,
    SyncChannel, ViewEvent, ViewEventKind, ViewEventPayload,
};
pub use headless::{HeadlessHandle, HeadlessStats};
pub use registry::ViewRegistry;
pub use session::LinkSession;
pub use sync::{CameraOutcome, SelectionOutcome, SyncCoordinator, SyncGroup, SyncStats};
pub use view::{ViewAnchor, ViewId, ViewInstance};

pub use implore_link_io::{DatasetDescriptor, DecodedDataset, EncodedBuffer};
