//! GOP partitioner tests.
//!
//! The partitioner is a pure function of indices, so these tests need no
//! codec.

use gopcache::{BatchPlan, CodecError, FrameType, GroupOfPictures, PredictionDirection};

fn indices(gop: &GroupOfPictures, requested: usize, clip_len: usize) -> Vec<Vec<usize>> {
    gop.plan(requested, clip_len, false)
        .expect("plan failed")
        .ranges
        .iter()
        .map(|range| range.indices().collect())
        .collect()
}

// ── Sequential plans ───────────────────────────────────────────────

#[test]
fn forward_region_is_one_ascending_range_from_the_i_frame() {
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(4, 100, false).unwrap();

    assert_eq!(plan.ranges.len(), 1);
    let range = plan.ranges[0];
    assert_eq!(range.direction, PredictionDirection::Forward);
    assert_eq!(range.indices().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(range.reference, None);
    assert_eq!(plan.max_seen, 4);
    assert_eq!(plan.max_proc, 6);
}

#[test]
fn backward_region_splits_into_backward_then_forward() {
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(8, 100, false).unwrap();

    assert_eq!(plan.ranges.len(), 2);
    assert_eq!(plan.ranges[0].direction, PredictionDirection::Backward);
    assert_eq!(
        plan.ranges[0].indices().collect::<Vec<_>>(),
        vec![13, 12, 11, 10, 9, 8]
    );
    assert_eq!(plan.ranges[0].reference, None);

    assert_eq!(plan.ranges[1].direction, PredictionDirection::Forward);
    assert_eq!(
        plan.ranges[1].indices().collect::<Vec<_>>(),
        vec![14, 15, 16, 17, 18, 19]
    );
    assert_eq!(plan.ranges[1].reference, Some(13));
    assert_eq!(plan.max_seen, 8);
    assert_eq!(plan.max_proc, 19);
}

#[test]
fn clip_end_caps_both_ranges() {
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(8, 15, false).unwrap();

    assert_eq!(
        indices(&gop, 8, 15),
        vec![vec![13, 12, 11, 10, 9, 8], vec![14]]
    );
    assert_eq!(plan.ranges[0].first, 13);
    assert_eq!(plan.max_proc, 14);
}

#[test]
fn clip_ending_on_gop_boundary_skips_forward_range() {
    // The next I-frame (13) is the last frame, so nothing follows it.
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(8, 14, false).unwrap();

    assert_eq!(plan.ranges.len(), 1);
    assert_eq!(
        plan.ranges[0].indices().collect::<Vec<_>>(),
        vec![13, 12, 11, 10, 9, 8]
    );
    assert_eq!(plan.max_proc, 13);
}

#[test]
fn clip_ending_inside_backward_region_starts_chain_at_clip_end() {
    let gop = GroupOfPictures::new(6, 6);
    assert_eq!(indices(&gop, 8, 11), vec![vec![10, 9, 8]]);
}

#[test]
fn forward_region_is_capped_at_clip_end() {
    let gop = GroupOfPictures::new(6, 6);
    assert_eq!(indices(&gop, 2, 4), vec![vec![0, 1, 2, 3]]);
}

#[test]
fn new_clip_makes_requested_frame_intra() {
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(3, 100, true).unwrap();

    assert_eq!(plan.ranges.len(), 1);
    assert_eq!(plan.ranges[0].indices().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
    let steps = plan.steps();
    assert_eq!(steps[0].reference, None);
    assert_eq!(steps[1].reference, Some(3));
}

#[test]
fn steps_chain_each_frame_to_the_previous_one() {
    let gop = GroupOfPictures::new(6, 6);
    let plan = gop.plan(8, 100, false).unwrap();
    let steps = plan.steps();

    assert_eq!(steps.len(), plan.frame_count());
    assert_eq!(steps[0].index, 13);
    assert_eq!(steps[0].reference, None);
    assert_eq!(steps[1].index, 12);
    assert_eq!(steps[1].reference, Some(13));
    assert_eq!(steps[6].index, 14);
    assert_eq!(steps[6].reference, Some(13));
    assert_eq!(steps[7].reference, Some(14));
}

#[test]
fn predictive_context_follows_distance_from_i_frame() {
    let gop = GroupOfPictures::new(6, 6);

    let forward = gop.plan(0, 100, false).unwrap().steps();
    let flags: Vec<bool> = forward.iter().map(|step| step.predictive_context).collect();
    assert_eq!(flags, vec![false, false, true, true, true, true, true]);

    // Backward chains count from their own I-frame, not from the range start.
    let backward = gop.plan(8, 100, false).unwrap().steps();
    let flags: Vec<(usize, bool)> = backward
        .iter()
        .map(|step| (step.index, step.predictive_context))
        .collect();
    assert_eq!(flags[0], (13, false));
    assert_eq!(flags[1], (12, false));
    assert_eq!(flags[2], (11, true));
    assert_eq!(flags[6], (14, false));
    assert_eq!(flags[7], (15, true));
}

#[test]
fn every_plan_covers_the_requested_frame() {
    let gop = GroupOfPictures::new(4, 3);
    for clip_len in 1..40 {
        for requested in 0..clip_len {
            let plan = gop.plan(requested, clip_len, false).unwrap();
            let covered: Vec<usize> = plan.steps().iter().map(|step| step.index).collect();
            assert!(covered.contains(&requested), "{requested} of {clip_len}");
            assert!(plan.max_proc < clip_len);
            assert!(plan.max_proc >= requested);
        }
    }
}

#[test]
fn frame_types_follow_gop_layout() {
    let gop = GroupOfPictures::new(6, 6);
    assert_eq!(gop.size(), 13);
    assert_eq!(gop.frame_type(0), FrameType::Intra);
    assert_eq!(gop.frame_type(13), FrameType::Intra);
    assert_eq!(gop.frame_type(26), FrameType::Intra);
    assert_eq!(gop.frame_type(6), FrameType::ForwardPredicted);
    assert_eq!(gop.frame_type(7), FrameType::BackwardPredicted);
    assert_eq!(gop.frame_type(12), FrameType::BackwardPredicted);
}

#[test]
fn out_of_range_requests_are_rejected() {
    let gop = GroupOfPictures::default();
    assert!(matches!(
        gop.plan(15, 15, false),
        Err(CodecError::FrameOutOfRange {
            frame: 15,
            clip_len: 15
        })
    ));
    assert!(matches!(gop.plan(0, 0, false), Err(CodecError::EmptyClip)));
}

#[test]
fn zero_sized_forward_only_gop_is_rejected() {
    assert!(GroupOfPictures::forward_only(0).is_err());
    let intra_only = GroupOfPictures::forward_only(1).unwrap();
    assert_eq!(intra_only.size(), 1);
    assert_eq!(indices(&intra_only, 5, 10), vec![vec![5]]);
}

// ── Batch plans ────────────────────────────────────────────────────

#[test]
fn batch_gop_boundary_is_a_single_intra_frame() {
    let gop = GroupOfPictures::forward_only(10).unwrap();
    assert_eq!(gop.plan_batch(0, 100, 4, false).unwrap(), BatchPlan::Intra(0));
    assert_eq!(gop.plan_batch(20, 100, 4, false).unwrap(), BatchPlan::Intra(20));
}

#[test]
fn batch_new_clip_forces_intra() {
    let gop = GroupOfPictures::forward_only(10).unwrap();
    assert_eq!(gop.plan_batch(7, 100, 4, true).unwrap(), BatchPlan::Intra(7));
}

#[test]
fn batch_ranges_follow_batch_windows() {
    let gop = GroupOfPictures::forward_only(10).unwrap();

    let first = gop.plan_batch(1, 100, 4, false).unwrap();
    assert_eq!(first, BatchPlan::Range { start: 1, end: 4 });
    assert_eq!(first.reference(), Some(0));
    assert_eq!(first.len(), 4);

    assert_eq!(
        gop.plan_batch(5, 100, 4, false).unwrap(),
        BatchPlan::Range { start: 5, end: 8 }
    );
    // The last window is cut at the GOP boundary.
    assert_eq!(
        gop.plan_batch(9, 100, 4, false).unwrap(),
        BatchPlan::Range { start: 9, end: 9 }
    );
    // A start inside a window runs to that window's end.
    assert_eq!(
        gop.plan_batch(3, 100, 4, false).unwrap(),
        BatchPlan::Range { start: 3, end: 4 }
    );
}

#[test]
fn batch_ranges_are_capped_at_clip_end() {
    let gop = GroupOfPictures::forward_only(10).unwrap();
    let plan = gop.plan_batch(11, 13, 4, false).unwrap();
    assert_eq!(plan, BatchPlan::Range { start: 11, end: 12 });
    assert_eq!(plan.max_proc(), 12);
}

#[test]
fn oversized_layout_saturates_instead_of_wrapping() {
    let gop = GroupOfPictures::new(usize::MAX, 3);
    assert_eq!(gop.checked_size(), None);
    assert_eq!(gop.size(), usize::MAX);
    assert_eq!(GroupOfPictures::new(6, 6).checked_size(), Some(13));

    // Every frame of a finite clip falls in the first forward region.
    assert_eq!(indices(&gop, 5, 10), vec![(0..10).collect::<Vec<_>>()]);
    assert_eq!(
        gop.plan_batch(5, 10, 4, false).unwrap(),
        BatchPlan::Range { start: 5, end: 8 }
    );

    let backward_heavy = GroupOfPictures::new(0, usize::MAX);
    assert_eq!(indices(&backward_heavy, 3, 10), vec![vec![9, 8, 7, 6, 5, 4, 3]]);
}
