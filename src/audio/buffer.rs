use crate::expression::AudioAnalysisResult;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;

/// Thread-safe inbox of audio analysis samples
///
/// The audio side pushes at callback rate; the render tick drains once per
/// frame. When full, the oldest sample is overwritten. Clones share the
/// same inbox.
pub struct SampleInbox {
    buffer: Arc<Mutex<HeapRb<AudioAnalysisResult>>>,
}

impl SampleInbox {
    /// Create a new inbox with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity.max(1)))),
        }
    }

    /// Queue a sample, dropping the oldest one if the inbox is full
    pub fn push(&self, sample: AudioAnalysisResult) {
        let mut buffer = self.buffer.lock();
        if let Err(sample) = buffer.try_push(sample) {
            let _ = buffer.try_pop();
            let _ = buffer.try_push(sample);
        }
    }

    /// Empty the inbox and return the sample with the newest timestamp
    pub fn drain_latest(&self) -> Option<AudioAnalysisResult> {
        let mut buffer = self.buffer.lock();
        let mut latest: Option<AudioAnalysisResult> = None;
        while let Some(sample) = buffer.try_pop() {
            match &latest {
                Some(current) if current.timestamp > sample.timestamp => {}
                _ => latest = Some(sample),
            }
        }
        latest
    }

    /// Get the number of queued samples
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }
}

impl Clone for SampleInbox {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(ms: u64, energy: f32) -> AudioAnalysisResult {
        AudioAnalysisResult::new(Duration::from_millis(ms), energy)
    }

    #[test]
    fn test_drain_returns_newest() {
        let inbox = SampleInbox::new(8);
        inbox.push(sample(10, 0.1));
        inbox.push(sample(30, 0.3));
        inbox.push(sample(20, 0.2));

        let latest = inbox.drain_latest().unwrap();
        assert_eq!(latest.energy, 0.3);
        assert!(inbox.is_empty());
        assert!(inbox.drain_latest().is_none());
    }

    #[test]
    fn test_overflow_keeps_recent() {
        let inbox = SampleInbox::new(4);
        for i in 0..10 {
            inbox.push(sample(i, i as f32));
        }

        assert_eq!(inbox.len(), 4);
        assert_eq!(inbox.capacity(), 4);
        assert_eq!(inbox.drain_latest().unwrap().energy, 9.0);
    }

    #[test]
    fn test_clones_share_buffer() {
        let inbox = SampleInbox::new(4);
        let producer = inbox.clone();
        std::thread::spawn(move || producer.push(sample(5, 0.5)))
            .join()
            .unwrap();
        assert_eq!(inbox.len(), 1);
    }
}
