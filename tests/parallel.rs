//! Batch-parallel driver tests, run through the orchestrator.

use std::sync::{Arc, Mutex};

use gopcache::{
    BatchCodec, BatchCompression, Clip, ClipState, CodecBackend, CodecError, CodecOptions,
    CodecVariant, Frame, FrameCompression, FrameType, GroupOfPictures, HiddenState, RawCodec,
    VideoCompressor,
};

/// `(first predicted index, batch length, reference index)` per call; intra
/// calls are recorded with no reference.
type BatchLog = Arc<Mutex<Vec<(usize, usize, Option<usize>)>>>;

struct ShiftCodec {
    log: BatchLog,
    aux_per_batch: f64,
    drop_last_output: bool,
}

fn frame_index(frame: &Frame) -> usize {
    let value = frame.data()[0];
    let raw = if value >= 1.0 { value - 1.0 } else { value };
    (raw * 1000.0).round() as usize
}

fn reconstruct(raw: &Frame) -> Frame {
    Frame::filled(3, 2, 2, raw.data()[0] + 1.0)
}

impl BatchCodec for ShiftCodec {
    fn compress_intra(&mut self, raw: &Frame) -> Result<FrameCompression, CodecError> {
        let index = frame_index(raw);
        self.log.lock().unwrap().push((index, 1, None));
        Ok(FrameCompression {
            reconstructed: reconstruct(raw),
            hidden: HiddenState::default(),
            bits_estimated: 1.0,
            distortion_loss: 0.0,
            auxiliary_loss: 0.25,
            flow_loss: 0.0,
            bits_actual: 1.0,
            quality: 50.0,
        })
    }

    fn compress_batch(&mut self, frames: &[Frame]) -> Result<BatchCompression, CodecError> {
        let reference = &frames[0];
        assert!(reference.data()[0] >= 1.0, "batch reference not reconstructed");
        let predicted = &frames[1..];
        assert!(predicted.iter().all(|frame| frame.data()[0] < 1.0));
        self.log.lock().unwrap().push((
            frame_index(&predicted[0]),
            predicted.len(),
            Some(frame_index(reference)),
        ));

        let mut reconstructed: Vec<Frame> = predicted.iter().map(reconstruct).collect();
        if self.drop_last_output {
            reconstructed.pop();
        }
        let n = predicted.len();
        Ok(BatchCompression {
            reconstructed,
            bits_estimated: vec![0.5; n],
            distortion_loss: vec![0.01; n],
            auxiliary_loss: self.aux_per_batch,
            bits_actual: (0..n).map(|offset| offset as f64).collect(),
            quality: vec![35.0; n],
        })
    }
}

fn indexed_clip(len: usize) -> Clip {
    Clip::new(
        (0..len)
            .map(|index| Frame::filled(3, 2, 2, index as f32 / 1000.0))
            .collect(),
    )
    .unwrap()
}

fn batch_compressor(
    gop_size: usize,
    batch_size: usize,
    drop_last_output: bool,
) -> (VideoCompressor, BatchLog) {
    let log = BatchLog::default();
    let codec = ShiftCodec {
        log: log.clone(),
        aux_per_batch: 1.2,
        drop_last_output,
    };
    let options = CodecOptions::new()
        .with_layout(GroupOfPictures::forward_only(gop_size).unwrap())
        .with_batch_size(batch_size)
        .with_variant(CodecVariant::Batch);
    let compressor = VideoCompressor::new(options, CodecBackend::Batch(Box::new(codec))).unwrap();
    (compressor, log)
}

#[test]
fn batches_share_the_previous_batch_end_as_reference() {
    let (mut compressor, log) = batch_compressor(6, 2, false);
    compressor.start_clip(indexed_clip(20)).unwrap();
    compressor.request(19).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (0, 1, None),
            (1, 2, Some(0)),
            (3, 2, Some(2)),
            (5, 1, Some(4)),
            (6, 1, None),
            (7, 2, Some(6)),
            (9, 2, Some(8)),
            (11, 1, Some(10)),
            (12, 1, None),
            (13, 2, Some(12)),
            (15, 2, Some(14)),
            (17, 1, Some(16)),
            (18, 1, None),
            (19, 1, Some(18)),
        ]
    );
    assert_eq!(compressor.state(), ClipState::Exhausted);
}

#[test]
fn last_frame_of_each_batch_is_marked() {
    let (mut compressor, _) = batch_compressor(6, 2, false);
    compressor.start_clip(indexed_clip(20)).unwrap();
    compressor.request(19).unwrap();

    let marked: Vec<usize> = (0..20)
        .filter(|&index| compressor.metrics(index).unwrap().end_of_batch)
        .collect();
    assert_eq!(
        marked,
        vec![0, 2, 4, 5, 6, 8, 10, 11, 12, 14, 16, 17, 18, 19]
    );
}

#[test]
fn batch_auxiliary_loss_is_split_evenly() {
    let (mut compressor, _) = batch_compressor(10, 4, false);
    compressor.start_clip(indexed_clip(10)).unwrap();
    compressor.request(4).unwrap();

    let batch: Vec<f64> = (1..=4)
        .map(|index| compressor.metrics(index).unwrap().auxiliary_loss)
        .collect();
    let total: f64 = batch.iter().sum();
    assert!((total - 1.2).abs() < 1e-12);
    assert!(batch.iter().all(|aux| (aux - 0.3).abs() < 1e-12));

    // Intra frames keep their own scalar loss.
    assert_eq!(compressor.metrics(0).unwrap().auxiliary_loss, 0.25);
}

#[test]
fn per_frame_outputs_are_scattered_in_order() {
    let (mut compressor, _) = batch_compressor(10, 4, false);
    compressor.start_clip(indexed_clip(10)).unwrap();
    compressor.request(3).unwrap();

    assert_eq!(compressor.max_proc(), Some(4));
    for (offset, index) in (1..=4).enumerate() {
        let metrics = compressor.metrics(index).unwrap();
        assert_eq!(metrics.bits_actual, offset as f64);
        assert_eq!(metrics.reference, Some(0));
        assert_eq!(metrics.frame_type, FrameType::ForwardPredicted);
        assert_eq!(frame_index(compressor.frame(index).unwrap()), index);
    }
    assert_eq!(compressor.metrics(0).unwrap().frame_type, FrameType::Intra);
}

#[test]
fn short_batch_output_aborts_clip() {
    let (mut compressor, _) = batch_compressor(10, 4, true);
    compressor.start_clip(indexed_clip(10)).unwrap();

    let error = compressor.request(3).unwrap_err();
    assert!(matches!(
        error,
        CodecError::BatchLengthMismatch {
            field: "reconstructed",
            expected: 4,
            actual: 3
        }
    ));
    assert_eq!(compressor.state(), ClipState::Aborted);
}

#[test]
fn repeated_batch_request_is_memoized() {
    let (mut compressor, log) = batch_compressor(6, 3, false);
    compressor.start_clip(indexed_clip(12)).unwrap();
    compressor.request(5).unwrap();
    let calls = log.lock().unwrap().len();

    compressor.request(5).unwrap();
    compressor.request(1).unwrap();
    assert_eq!(log.lock().unwrap().len(), calls);
}

#[test]
fn raw_codec_passes_batches_through() {
    let options = CodecOptions::new()
        .with_layout(GroupOfPictures::forward_only(5).unwrap())
        .with_batch_size(2)
        .with_variant(CodecVariant::Batch);
    let mut compressor =
        VideoCompressor::new(options, CodecBackend::Batch(Box::new(RawCodec))).unwrap();
    let clip = indexed_clip(8);
    let expected = clip.frames()[7].clone();
    compressor.start_clip(clip).unwrap();

    let metrics = compressor.request(7).unwrap();
    assert_eq!(metrics.bits_actual, 0.0);
    assert!(metrics.quality.is_infinite());
    assert_eq!(compressor.frame(7), Some(&expected));
}
