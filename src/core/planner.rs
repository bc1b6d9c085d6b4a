use serde::{Deserialize, Serialize};

/// 下载分段：闭区间 `[start, end]` 及其所属线程编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// 分段字节数
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// 从分段内偏移 `offset` 处开始的 Range 头
    pub fn header_from(&self, offset: u64) -> String {
        format!("bytes={}-{}", self.start + offset, self.end)
    }

    pub fn covers_whole(&self, total_size: u64) -> bool {
        self.start == 0 && self.end + 1 == total_size
    }
}

/// 实际使用的线程数：服务器不支持 Range 时强制为 1，且不超过总字节数
pub fn effective_workers(total_size: u64, requested: usize, supports_ranges: bool) -> usize {
    if !supports_ranges {
        return 1;
    }
    let cap = usize::try_from(total_size).unwrap_or(usize::MAX).max(1);
    requested.clamp(1, cap)
}

/// 把 `[0, total_size)` 切成 `workers` 个连续分段，最后一段吸收整除余数
pub fn plan_ranges(total_size: u64, workers: usize) -> Vec<ByteRange> {
    if total_size == 0 {
        return Vec::new();
    }
    let workers = effective_workers(total_size, workers, true);
    let count = workers as u64;
    let base = total_size / count;

    (0..workers)
        .map(|index| {
            let i = index as u64;
            let start = i * base;
            let end = if index == workers - 1 {
                total_size - 1
            } else {
                (i + 1) * base - 1
            };
            ByteRange { index, start, end }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(total: u64, ranges: &[ByteRange]) {
        assert!(!ranges.is_empty());
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, total - 1);
        for (i, range) in ranges.iter().enumerate() {
            assert_eq!(range.index, i);
            assert!(range.start <= range.end, "空分段: {:?}", range);
            if i > 0 {
                assert_eq!(range.start, ranges[i - 1].end + 1, "分段不连续: {:?}", ranges);
            }
        }
        assert_eq!(ranges.iter().map(ByteRange::size).sum::<u64>(), total);
    }

    #[test]
    fn test_ten_thousand_bytes_four_workers() {
        let ranges = plan_ranges(10_000, 4);
        let bounds: Vec<(u64, u64)> = ranges.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(bounds, vec![(0, 2499), (2500, 4999), (5000, 7499), (7500, 9999)]);
    }

    #[test]
    fn test_last_range_absorbs_remainder() {
        let ranges = plan_ranges(10, 3);
        let bounds: Vec<(u64, u64)> = ranges.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(bounds, vec![(0, 2), (3, 5), (6, 9)]);
    }

    #[test]
    fn test_ranges_partition_exactly() {
        for total in 1..=300u64 {
            for workers in 1..=24usize {
                assert_partition(total, &plan_ranges(total, workers));
            }
        }
        for &total in &[4096u64, 1 << 20, 10_000_019, u64::from(u32::MAX) + 7] {
            for &workers in &[1usize, 3, 7, 16, 32] {
                assert_partition(total, &plan_ranges(total, workers));
            }
        }
    }

    #[test]
    fn test_more_workers_than_bytes_is_clamped() {
        let ranges = plan_ranges(3, 8);
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.size() == 1));
    }

    #[test]
    fn test_no_range_support_means_single_worker() {
        let workers = effective_workers(10_000, 8, false);
        assert_eq!(workers, 1);
        let ranges = plan_ranges(10_000, workers);
        assert_eq!(ranges, vec![ByteRange { index: 0, start: 0, end: 9999 }]);
        assert!(ranges[0].covers_whole(10_000));
    }

    #[test]
    fn test_zero_workers_clamped_to_one() {
        assert_eq!(effective_workers(100, 0, true), 1);
        assert_eq!(plan_ranges(100, 0).len(), 1);
        assert!(plan_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_range_header() {
        let range = ByteRange { index: 1, start: 2500, end: 4999 };
        assert_eq!(range.header_from(0), "bytes=2500-4999");
        assert_eq!(range.header_from(100), "bytes=2600-4999");
        assert_eq!(range.size(), 2500);
        assert!(!range.covers_whole(10_000));
    }
}
