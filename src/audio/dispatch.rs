use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Downmix multi-channel input to mono while applying the provided converter,
/// so the capture loop sees a single channel regardless of microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame into one mono sample.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Slices the cpal callback stream into fixed-size frames and forwards them to
/// the capture loop over a bounded channel. Runs on the audio callback thread,
/// so overflow is counted rather than blocked on.
pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        frame_samples: usize,
        sender: Sender<Vec<f32>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn downmix_averages_stereo_pairs() {
        let mut buf = Vec::new();
        append_downmixed_samples(&mut buf, &[1.0f32, 0.0, 0.5, 0.5], 2, |s| s);
        assert_eq!(buf, vec![0.5, 0.5]);
    }

    #[test]
    fn downmix_converts_i16_to_unit_range() {
        let mut buf = Vec::new();
        append_downmixed_samples(&mut buf, &[i16::MIN, 0, 16_384], 1, |s| {
            s as f32 / 32_768.0
        });
        assert_eq!(buf, vec![-1.0, 0.0, 0.5]);
        assert!(buf.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn dispatcher_emits_fixed_frames() {
        let (tx, rx) = bounded(8);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = FrameDispatcher::new(4, tx, dropped.clone());

        dispatcher.push(&[0.1f32; 10], 1, |s| s);
        assert_eq!(rx.try_recv().expect("first frame").len(), 4);
        assert_eq!(rx.try_recv().expect("second frame").len(), 4);
        assert!(rx.try_recv().is_err(), "remainder stays pending");
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dispatcher_counts_overflow_instead_of_blocking() {
        let (tx, _rx) = bounded(1);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = FrameDispatcher::new(2, tx, dropped.clone());

        dispatcher.push(&[0.0f32; 8], 1, |s| s);
        assert!(dropped.load(Ordering::Relaxed) > 0);
    }
}
