//! View lifecycle integration tests: registration, retirement, resurrection

mod common;

use std::rc::Rc;

use common::fixtures::{id, plain, scatter, Harness};
use implore_link::mapper::{to_data, to_normalized};
use implore_link::{
    CameraView, DatasetDescriptor, EncodedBuffer, HeadlessHandle, LinkError, ViewAnchor,
    Visibility,
};
use proptest::prelude::*;

// === Garbage Collection ===

#[test]
fn test_gc_round_trip_restores_camera() {
    let mut harness = Harness::new();
    let first = harness.register("p1", plain(50));
    let moved = CameraView::new([0.3, -0.2], 4.0);
    first.user_set_camera(moved).unwrap();

    harness.detach("p1");
    let retired = harness.session.sweep();

    assert_eq!(retired, vec![id("p1")]);
    let view = harness.session.view(&id("p1")).unwrap();
    assert!(view.handle.is_none());
    assert_eq!(view.saved_camera, Some(moved));
    assert!(first.is_destroyed());
    assert_eq!(first.subscription_count(), 0);

    let second = harness.register("p1", plain(50));
    assert_eq!(second.camera(), moved);
    assert!(harness.session.view(&id("p1")).unwrap().is_live());
}

#[test]
fn test_sweep_idempotent() {
    let mut harness = Harness::new();
    let handle = harness.register("p1", plain(5));
    harness.detach("p1");

    assert_eq!(harness.session.sweep().len(), 1);
    assert!(harness.session.sweep().is_empty());
    assert_eq!(handle.stats().teardowns, 1);
}

#[test]
fn test_register_sweeps_zombies_first() {
    let mut harness = Harness::new();
    let zombie = harness.register("p1", plain(5));
    harness.detach("p1");

    harness.register("p2", plain(5));

    assert!(zombie.is_destroyed());
    assert_eq!(harness.session.registry().live_ids(), vec![id("p2")]);
}

#[test]
fn test_dropped_anchor_counts_as_disconnected() {
    let mut harness = Harness::new();
    let handle = HeadlessHandle::new();
    let anchor = ViewAnchor::new();
    harness
        .session
        .register_view("p9", plain(5), Box::new(handle.clone()), &anchor)
        .unwrap();
    drop(anchor);

    assert_eq!(harness.session.sweep(), vec![id("p9")]);
    assert!(handle.is_destroyed());
}

#[test]
fn test_teardown_errors_are_swallowed() {
    let mut harness = Harness::new();
    harness.register_with("p1", plain(5), HeadlessHandle::new().failing_teardown());
    harness.detach("p1");

    assert_eq!(harness.session.sweep().len(), 1);
    assert!(!harness.session.view(&id("p1")).unwrap().is_live());
}

#[test]
fn test_rerender_replaces_live_handle() {
    let mut harness = Harness::new();
    let old = harness.register("p1", plain(5));
    let new = harness.register("p1", plain(5));

    assert!(old.is_destroyed());
    assert_eq!(old.subscription_count(), 0);
    assert!(!new.is_destroyed());
    assert_eq!(new.subscription_count(), 3);
}

#[test]
fn test_retired_view_events_ignored() {
    let mut harness = Harness::new();
    harness.register("a", plain(5));
    harness.register("b", plain(5));
    harness.session.set_sync_group(true, &[]);
    harness.settle();

    harness.detach("b");
    harness.session.sweep();
    harness
        .session
        .set_selection(&id("b"), &[1])
        .expect("retired views accept commands as no-ops");
    harness.session.recompute(&id("b")).unwrap();

    assert!(harness.handle("a").selection().is_empty());
}

// === Camera Seeding ===

#[test]
fn test_master_camera_seeds_new_view() {
    let mut harness = Harness::new();
    let master = harness.register("p1", plain(10));
    master.user_set_camera(CameraView::new([0.1, 0.2], 2.5)).unwrap();

    let mut dataset = plain(10);
    dataset.master_id = Some("p1".to_string());
    let follower = harness.register("p2", dataset);

    assert_eq!(follower.camera(), CameraView::new([0.1, 0.2], 2.5));
}

#[test]
fn test_retired_master_uses_saved_camera() {
    let mut harness = Harness::new();
    let master = harness.register("p1", plain(10));
    master.user_set_camera(CameraView::new([-0.4, 0.0], 1.5)).unwrap();
    harness.detach("p1");
    harness.session.sweep();

    let mut dataset = plain(10);
    dataset.master_id = Some("p1".to_string());
    let follower = harness.register("p2", dataset);

    assert_eq!(follower.camera(), CameraView::new([-0.4, 0.0], 1.5));
}

#[test]
fn test_unknown_master_falls_back_to_own_saved_camera() {
    let mut harness = Harness::new();
    let first = harness.register("p2", plain(10));
    first.user_set_camera(CameraView::new([0.0, 0.5], 3.0)).unwrap();
    harness.detach("p2");
    harness.session.sweep();

    let mut dataset = plain(10);
    dataset.master_id = Some("missing".to_string());
    let second = harness.register("p2", dataset);

    assert_eq!(second.camera(), CameraView::new([0.0, 0.5], 3.0));
}

#[test]
fn test_new_view_starts_at_identity() {
    let mut harness = Harness::new();
    let handle = harness.register("p1", plain(10));
    assert_eq!(handle.camera(), CameraView::default());
    assert_eq!(handle.stats().camera_sets, 0);
}

// === Initial State From Descriptors ===

#[test]
fn test_initial_server_indices_and_selection() {
    let mut harness = Harness::new();
    let mut dataset = plain(10);
    dataset.init_server_indices = Some(vec![8, 2, 4]);
    dataset.init_selected_indices = Some(vec![2]);
    let handle = harness.register("p1", dataset);

    assert_eq!(handle.visible(), Some(vec![8, 2, 4]));
    assert_eq!(handle.selection(), vec![2]);
    assert_eq!(harness.session.pending_events(), 0);
}

#[test]
fn test_register_descriptor_decodes_buffers() {
    let mut harness = Harness::new();
    let descriptor = DatasetDescriptor::new(4, [0.0, 4.0], [0.0, 1.0])
        .with_variable("qc", EncodedBuffer::encode(&[0.1, 0.9, 0.5, 0.6]))
        .with_groups("cluster", vec![1.0f32, 1.0, 2.0, 1.0]);

    let handle = HeadlessHandle::new();
    let anchor = ViewAnchor::new();
    harness
        .session
        .register_descriptor("p1", &descriptor, Box::new(handle.clone()), &anchor)
        .unwrap();

    let view = harness.session.view(&id("p1")).unwrap();
    assert_eq!(view.variable("qc"), Some(&[0.1f32, 0.9, 0.5, 0.6][..]));
    assert_eq!(view.variable("cluster").map(|v| v.len()), Some(4));
}

#[test]
fn test_register_descriptor_rejects_bad_buffer() {
    let mut harness = Harness::new();
    let descriptor = DatasetDescriptor::new(2, [0.0, 1.0], [0.0, 1.0])
        .with_variable("qc", EncodedBuffer::Encoded("base64:!!".to_string()));

    let anchor: Rc<ViewAnchor> = ViewAnchor::new();
    let result = harness.session.register_descriptor(
        "p1",
        &descriptor,
        Box::new(HeadlessHandle::new()),
        &anchor,
    );
    assert!(matches!(result, Err(LinkError::Decode(_))));
    assert!(harness.session.view(&id("p1")).is_none());
}

#[test]
fn test_descriptor_json_round_trip_through_session() {
    let mut harness = Harness::new();
    let json = r#"{
        "n_points": 3,
        "x_min": -1.0, "x_max": 1.0,
        "y_min": 0.0, "y_max": 10.0,
        "filter_data": { "qc": [0.2, 0.4, 0.6] },
        "init_server_indices": [0, 2],
        "sync_enabled": true
    }"#;
    let descriptor = DatasetDescriptor::from_json(json).unwrap();

    let handle = HeadlessHandle::new();
    let anchor = ViewAnchor::new();
    harness
        .session
        .register_descriptor("p1", &descriptor, Box::new(handle.clone()), &anchor)
        .unwrap();

    assert!(harness.session.sync().is_enabled());
    assert_eq!(
        harness.session.recompute(&id("p1")).unwrap(),
        Visibility::Filtered(vec![0, 2])
    );
}

#[test]
fn test_registration_records_axes() {
    let mut harness = Harness::new();
    harness.register("p1", scatter(10));
    let view = harness.session.view(&id("p1")).unwrap();
    assert_eq!(view.axes.x, [-5.0, 5.0]);
    assert_eq!(view.axes.y, [0.0, 100.0]);
}

// === Coordinate Mapping ===

proptest! {
    #[test]
    fn test_mapper_round_trip(
        v in -1.0f64..=1.0,
        min in -1.0e6f64..1.0e6,
        span in 1.0e-3f64..1.0e6,
    ) {
        let max = min + span;
        let back = to_normalized(to_data(v, min, max), min, max);
        prop_assert!((back - v).abs() < 1e-6, "round trip drifted: {} -> {}", v, back);
    }

    #[test]
    fn test_mapper_endpoints(min in -1.0e3f64..1.0e3, span in 1.0e-2f64..1.0e3) {
        let max = min + span;
        prop_assert!((to_data(-1.0, min, max) - min).abs() < 1e-9);
        prop_assert!((to_data(1.0, min, max) - max).abs() < 1e-9);
    }
}
