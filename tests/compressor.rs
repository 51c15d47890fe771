//! Cache update orchestrator tests with the sequential driver.
//!
//! Frames carry their own index: raw frame `i` is filled with `i / 1000`
//! and the test codec reconstructs it as `1 + i / 1000`, so the codec can
//! tell which slot it was handed and whether that slot was reconstructed.

use std::sync::{Arc, Mutex};

use gopcache::{
    Clip, ClipState, CodecBackend, CodecError, CodecOptions, CodecVariant, Frame,
    FrameCompression, FrameType, HiddenState, RawCodec, SequentialCodec, VideoCompressor,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Call {
    index: usize,
    reference: Option<usize>,
    predictive_context: bool,
    hidden_counter: f32,
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct SentinelCodec {
    journal: Journal,
    fail_at: Option<usize>,
}

fn frame_index(frame: &Frame) -> usize {
    let value = frame.data()[0];
    let raw = if value >= 1.0 { value - 1.0 } else { value };
    (raw * 1000.0).round() as usize
}

fn is_reconstructed(frame: &Frame) -> bool {
    frame.data()[0] >= 1.0
}

impl SequentialCodec for SentinelCodec {
    fn initial_state(&self, _width: usize, _height: usize) -> HiddenState {
        HiddenState::zeroed(&[1])
    }

    fn compress(
        &mut self,
        reference: Option<&Frame>,
        raw: &Frame,
        hidden: HiddenState,
        predictive_context: bool,
    ) -> Result<FrameCompression, CodecError> {
        let index = frame_index(raw);
        assert!(!is_reconstructed(raw), "frame {index} handed over twice");
        let reference = reference.map(|frame| {
            assert!(is_reconstructed(frame), "raw reference for frame {index}");
            frame_index(frame)
        });

        if self.fail_at == Some(index) {
            self.fail_at = None;
            return Err(CodecError::ExternalProcess {
                command: "sentinel".to_string(),
                reason: "injected failure".to_string(),
            });
        }

        self.journal.0.lock().unwrap().push(Call {
            index,
            reference,
            predictive_context,
            hidden_counter: hidden.buffers[0][0],
        });

        let mut next = hidden;
        next.buffers[0][0] += 1.0;
        Ok(FrameCompression {
            reconstructed: Frame::filled(3, 2, 2, raw.data()[0] + 1.0),
            hidden: next,
            bits_estimated: index as f64 * 2.0,
            distortion_loss: 0.01,
            auxiliary_loss: 0.5,
            flow_loss: if reference.is_some() { 0.1 } else { 0.0 },
            bits_actual: index as f64,
            quality: 40.0,
        })
    }
}

fn sentinel_clip(len: usize) -> Clip {
    Clip::new(
        (0..len)
            .map(|index| Frame::filled(3, 2, 2, index as f32 / 1000.0))
            .collect(),
    )
    .unwrap()
}

fn sentinel_compressor(
    forward: usize,
    backward: usize,
    fail_at: Option<usize>,
) -> (VideoCompressor, Journal) {
    let journal = Journal::default();
    let codec = SentinelCodec {
        journal: journal.clone(),
        fail_at,
    };
    let options = CodecOptions::new().with_group_of_pictures(forward, backward);
    let compressor =
        VideoCompressor::new(options, CodecBackend::Sequential(Box::new(codec))).unwrap();
    (compressor, journal)
}

/// Deterministic pseudo-random request sequence.
fn request_sequence(seed: u64, count: usize, clip_len: usize) -> Vec<usize> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) % clip_len as u64) as usize
        })
        .collect()
}

// ── Watermarks ─────────────────────────────────────────────────────

#[test]
fn watermarks_never_decrease() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(60)).unwrap();

    let mut last = (None, None);
    for index in [0, 3, 3, 8, 9, 20, 27, 40, 59] {
        compressor.request(index).unwrap();
        let current = (compressor.max_seen(), compressor.max_proc());
        assert!(current.0 >= last.0, "max_seen went back at {index}");
        assert!(current.1 >= last.1, "max_proc went back at {index}");
        assert!(compressor.max_proc().unwrap() >= index);
        assert!(compressor.max_proc().unwrap() < 60);
        last = current;
    }
    assert_eq!(compressor.max_seen(), Some(59));
}

#[test]
fn first_request_plans_from_the_clip_start() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(100)).unwrap();

    compressor.request(4).unwrap();
    assert_eq!(compressor.max_seen(), Some(4));
    assert_eq!(compressor.max_proc(), Some(6));
    assert_eq!(journal.len(), 7);

    compressor.request(8).unwrap();
    assert_eq!(compressor.max_proc(), Some(19));
    let order: Vec<usize> = journal.calls().iter().map(|call| call.index).collect();
    assert_eq!(
        order,
        vec![0, 1, 2, 3, 4, 5, 6, 13, 12, 11, 10, 9, 8, 7, 14, 15, 16, 17, 18, 19]
    );
}

#[test]
fn decodable_frames_form_a_prefix() {
    let (mut compressor, _) = sentinel_compressor(4, 3, None);
    compressor.start_clip(sentinel_clip(50)).unwrap();

    for index in request_sequence(7, 12, 50) {
        compressor.request(index).unwrap();
        let max_proc = compressor.max_proc().unwrap();
        let snapshot = compressor.snapshot().unwrap();
        assert_eq!(snapshot.entries.len(), max_proc + 1);
        assert!(
            snapshot
                .entries
                .iter()
                .enumerate()
                .all(|(position, entry)| entry.index == position)
        );
        assert!(compressor.metrics(max_proc).is_some());
        assert!(compressor.metrics(max_proc + 1).is_none());
        assert!(compressor.frame(max_proc + 1).is_none());
    }
}

// ── Memoization ────────────────────────────────────────────────────

#[test]
fn repeated_request_does_not_invoke_codec() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(40)).unwrap();

    let first = compressor.request(8).unwrap();
    let calls = journal.len();

    let second = compressor.request(8).unwrap();
    assert_eq!(first, second);
    assert_eq!(journal.len(), calls);

    compressor.request(2).unwrap();
    compressor.request(19).unwrap();
    assert_eq!(journal.len(), calls);
}

#[test]
fn every_frame_is_compressed_exactly_once() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(45)).unwrap();

    for index in request_sequence(42, 30, 45) {
        compressor.request(index).unwrap();
    }
    compressor.request(44).unwrap();

    let mut indices: Vec<usize> = journal.calls().iter().map(|call| call.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..45).collect::<Vec<_>>());
    assert_eq!(compressor.state(), ClipState::Exhausted);
}

// ── Dependencies ───────────────────────────────────────────────────

#[test]
fn references_are_compressed_before_use() {
    for seed in [1, 2, 3, 99, 1234] {
        for (forward, backward) in [(6, 6), (3, 2), (0, 4), (5, 0)] {
            let (mut compressor, journal) = sentinel_compressor(forward, backward, None);
            compressor.start_clip(sentinel_clip(47)).unwrap();

            for index in request_sequence(seed, 20, 47) {
                compressor.request(index).unwrap();
            }

            let calls = journal.calls();
            for (position, call) in calls.iter().enumerate() {
                if let Some(reference) = call.reference {
                    assert!(
                        calls[..position].iter().any(|earlier| earlier.index == reference),
                        "frame {} used {reference} before it was compressed (GOP {forward}+{backward})",
                        call.index
                    );
                    assert_eq!(reference.abs_diff(call.index), 1);
                }
            }
        }
    }
}

#[test]
fn gop_boundaries_are_intra_coded() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(60)).unwrap();
    compressor.request(59).unwrap();

    for call in journal.calls() {
        if call.index % 13 == 0 {
            assert_eq!(call.reference, None, "frame {} was predicted", call.index);
        }
    }
    assert_eq!(compressor.metrics(0).unwrap().frame_type, FrameType::Intra);
    assert_eq!(compressor.metrics(26).unwrap().frame_type, FrameType::Intra);
    assert_eq!(
        compressor.metrics(3).unwrap().frame_type,
        FrameType::ForwardPredicted
    );
    assert_eq!(
        compressor.metrics(10).unwrap().frame_type,
        FrameType::BackwardPredicted
    );
    assert_eq!(compressor.metrics(10).unwrap().reference, Some(11));
}

#[test]
fn hidden_state_restarts_with_each_range() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(40)).unwrap();
    compressor.request(8).unwrap();

    let counter = |index: usize| {
        journal
            .calls()
            .iter()
            .find(|call| call.index == index)
            .map(|call| call.hidden_counter)
            .unwrap()
    };
    assert_eq!(counter(0), 0.0);
    assert_eq!(counter(6), 6.0);
    assert_eq!(counter(13), 0.0);
    assert_eq!(counter(7), 6.0);
    assert_eq!(counter(14), 0.0);
    assert_eq!(counter(19), 5.0);
}

#[test]
fn predictive_context_is_passed_to_codec() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(40)).unwrap();
    compressor.request(3).unwrap();

    let flags: Vec<bool> = journal
        .calls()
        .iter()
        .map(|call| call.predictive_context)
        .collect();
    assert_eq!(flags, vec![false, false, true, true, true, true, true]);
}

// ── Lifecycle ──────────────────────────────────────────────────────

#[test]
fn request_before_start_fails() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    assert_eq!(compressor.state(), ClipState::Uninitialized);
    assert!(matches!(compressor.request(0), Err(CodecError::NoActiveClip)));
}

#[test]
fn out_of_range_request_keeps_clip_usable() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(20)).unwrap();

    let result = compressor.request(20);
    assert!(matches!(
        result,
        Err(CodecError::FrameOutOfRange {
            frame: 20,
            clip_len: 20
        })
    ));
    assert_eq!(compressor.state(), ClipState::Streaming);
    assert!(compressor.request(0).is_ok());
}

#[test]
fn codec_failure_aborts_clip_until_restart() {
    let (mut compressor, _) = sentinel_compressor(6, 6, Some(5));
    compressor.start_clip(sentinel_clip(30)).unwrap();

    let error = compressor.request(8).unwrap_err();
    assert!(matches!(error, CodecError::ExternalProcess { .. }));
    assert_eq!(compressor.state(), ClipState::Aborted);
    assert!(matches!(compressor.request(0), Err(CodecError::ClipAborted)));
    assert!(compressor.metrics(0).is_none());
    assert!(compressor.snapshot().is_none());

    compressor.start_clip(sentinel_clip(30)).unwrap();
    assert_eq!(compressor.state(), ClipState::Streaming);
    assert_eq!(compressor.max_proc(), None);
    assert!(compressor.request(8).is_ok());
}

#[test]
fn start_clip_resets_cache() {
    let (mut compressor, journal) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(30)).unwrap();
    compressor.request(20).unwrap();

    compressor.start_clip(sentinel_clip(30)).unwrap();
    assert_eq!(compressor.max_seen(), None);
    assert_eq!(compressor.max_proc(), None);
    assert!(compressor.metrics(0).is_none());
    assert!(compressor.cache().unwrap().hidden().is_none());

    let before = journal.len();
    compressor.request(0).unwrap();
    assert!(journal.len() > before);
}

#[test]
fn last_frame_exhausts_clip() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(15)).unwrap();
    compressor.request(8).unwrap();
    assert_eq!(compressor.max_proc(), Some(14));
    assert_eq!(compressor.state(), ClipState::Exhausted);
    assert!(compressor.request(14).is_ok());
}

#[test]
fn backend_must_match_variant() {
    let options = CodecOptions::new().with_variant(CodecVariant::Batch);
    let result = VideoCompressor::new(options, CodecBackend::Sequential(Box::new(RawCodec)));
    assert!(matches!(result, Err(CodecError::Configuration(_))));
}

// ── Reconstructions and windows ────────────────────────────────────

#[test]
fn reconstructed_frames_replace_raw_slots() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(20)).unwrap();
    compressor.request(2).unwrap();

    let frame = compressor.frame(2).unwrap();
    assert!(is_reconstructed(frame));
    assert_eq!(frame_index(frame), 2);

    let cache = compressor.cache().unwrap();
    assert!(cache.is_reconstructed(6));
    assert!(!cache.is_reconstructed(7));
}

#[test]
fn window_averages_sampled_frames() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(60)).unwrap();

    let summary = compressor.request_window(20, 4, 3).unwrap();
    assert_eq!(summary.frames, 4);
    // Frames 11, 14, 17 and 20; bits_actual equals the index.
    assert!((summary.bits_actual - 15.5).abs() < 1e-9);
    assert!((summary.bits_estimated - 31.0).abs() < 1e-9);
    assert!((summary.auxiliary_loss - 0.5).abs() < 1e-9);
}

#[test]
fn window_is_clamped_at_clip_start() {
    let (mut compressor, _) = sentinel_compressor(6, 6, None);
    compressor.start_clip(sentinel_clip(60)).unwrap();

    // Frames 0, 0, 0 and 2.
    let summary = compressor.request_window(2, 4, 2).unwrap();
    assert!((summary.bits_actual - 0.5).abs() < 1e-9);
    assert!(compressor.request_window(2, 0, 2).is_err());
}
