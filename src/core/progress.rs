use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

/// 每个分段一个原子计数器；每个槽位只由对应的下载线程写入
#[derive(Debug)]
pub struct ProgressVector {
    slots: Box<[AtomicU64]>,
}

impl ProgressVector {
    pub fn new(segments: usize) -> Self {
        Self {
            slots: (0..segments).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 所有槽位之和；跨槽位的读取顺序无关紧要
    pub fn total(&self) -> u64 {
        self.slots.iter().map(|slot| slot.load(Ordering::Relaxed)).sum()
    }

    /// 为每个分段发放唯一的写入句柄
    pub fn slots(self: &Arc<Self>) -> Vec<ProgressSlot> {
        (0..self.len())
            .map(|index| ProgressSlot {
                vector: Arc::clone(self),
                index,
            })
            .collect()
    }
}

/// 单个分段的写入句柄，只能增加
#[derive(Debug)]
pub struct ProgressSlot {
    vector: Arc<ProgressVector>,
    index: usize,
}

impl ProgressSlot {
    pub fn advance(&self, bytes: u64) {
        if bytes > 0 {
            self.vector.slots[self.index].fetch_add(bytes, Ordering::Relaxed);
        }
    }
}

/// 一次进度采样结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub percentage: f64,
    /// 字节/秒
    pub throughput: f64,
    pub eta_seconds: Option<f64>,
}

impl ProgressSnapshot {
    pub fn compute(bytes_done: u64, bytes_total: u64, elapsed: Duration) -> Self {
        let bytes_done = bytes_done.min(bytes_total);
        let percentage = if bytes_total > 0 {
            bytes_done as f64 / bytes_total as f64 * 100.0
        } else {
            0.0
        };

        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 { bytes_done as f64 / secs } else { 0.0 };
        let eta_seconds = if throughput > 0.0 {
            Some((bytes_total - bytes_done) as f64 / throughput)
        } else {
            None
        };

        Self {
            bytes_done,
            bytes_total,
            percentage,
            throughput,
            eta_seconds,
        }
    }
}

/// 进度聚合器：只读取计数器，从不修改下载状态
#[derive(Debug, Clone, Copy)]
pub struct ProgressAggregator {
    total_size: u64,
    started: Instant,
}

impl ProgressAggregator {
    pub fn new(total_size: u64, started: Instant) -> Self {
        Self { total_size, started }
    }

    pub fn sample(&self, progress: &ProgressVector) -> ProgressSnapshot {
        self.sample_at(progress, Instant::now())
    }

    pub fn sample_at(&self, progress: &ProgressVector, now: Instant) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started);
        ProgressSnapshot::compute(progress.total(), self.total_size, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_slots_are_independent() {
        let vector = Arc::new(ProgressVector::new(3));
        let slots = vector.slots();
        assert_eq!(slots.len(), 3);
        slots[0].advance(10);
        assert_eq!(vector.total(), 10);
        slots[2].advance(5);
        slots[2].advance(0);
        assert_eq!(vector.total(), 15);
        drop(slots);
        assert_eq!(Arc::strong_count(&vector), 1);
    }

    #[test]
    fn test_concurrent_writers_and_reader() {
        let vector = Arc::new(ProgressVector::new(4));
        let handles: Vec<_> = vector
            .slots()
            .into_iter()
            .map(|slot| {
                thread::spawn(move || {
                    for _ in 0..1000 {
                        slot.advance(3);
                    }
                })
            })
            .collect();

        let reader = {
            let vector = Arc::clone(&vector);
            thread::spawn(move || {
                let mut last = 0u64;
                for _ in 0..1000 {
                    let now = vector.total();
                    assert!(now >= last, "计数器回退");
                    assert!(now <= 12_000);
                    last = now;
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(vector.total(), 12_000);
    }

    #[test]
    fn test_snapshot_math() {
        let snapshot = ProgressSnapshot::compute(2_500, 10_000, Duration::from_secs(5));
        assert_eq!(snapshot.percentage, 25.0);
        assert_eq!(snapshot.throughput, 500.0);
        assert_eq!(snapshot.eta_seconds, Some(15.0));
    }

    #[test]
    fn test_snapshot_without_throughput_has_no_eta() {
        let snapshot = ProgressSnapshot::compute(0, 10_000, Duration::from_secs(3));
        assert_eq!(snapshot.throughput, 0.0);
        assert_eq!(snapshot.eta_seconds, None);

        let stalled_clock = ProgressSnapshot::compute(100, 10_000, Duration::ZERO);
        assert_eq!(stalled_clock.throughput, 0.0);
        assert_eq!(stalled_clock.eta_seconds, None);
    }

    #[test]
    fn test_aggregate_never_exceeds_total() {
        let snapshot = ProgressSnapshot::compute(12_000, 10_000, Duration::from_secs(1));
        assert_eq!(snapshot.bytes_done, 10_000);
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.eta_seconds, Some(0.0));
    }

    #[test]
    fn test_aggregator_samples_vector() {
        let started = Instant::now();
        let vector = Arc::new(ProgressVector::new(4));
        for slot in vector.slots() {
            slot.advance(2_500);
        }
        let aggregator = ProgressAggregator::new(10_000, started);
        let snapshot = aggregator.sample_at(&vector, started + Duration::from_secs(2));
        assert_eq!(snapshot.bytes_done, 10_000);
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.throughput, 5_000.0);

        let before_start = aggregator.sample_at(&vector, started);
        assert_eq!(before_start.throughput, 0.0);
    }
}
