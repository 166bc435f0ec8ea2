//! Pool usage statistics for profiling and diagnostics.
//!
//! Every pool tracks how often an allocation was served from its free list
//! versus fresh memory. The reuse ratio is the number to watch when tuning
//! `retain_cap`.
//!
//! 用于性能分析和诊断的池使用统计。
//! 每个池都跟踪分配请求由空闲列表满足和由新内存满足的次数。
//! 调整 `retain_cap` 时需要关注的指标是复用率。

/// Cumulative snapshot of one pool's activity.
/// 单个池活动的累计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of allocation requests.
    pub allocations: u64,
    /// Allocations served from the free list.
    pub reuse_hits: u64,
    /// Allocations that went to the global allocator.
    pub fresh_misses: u64,
    /// Blocks returned to the pool.
    pub deallocations: u64,
    /// High-water mark of cached free blocks.
    pub peak_cached: usize,
}

impl PoolStats {
    /// Fraction of allocations served from the free list, in `[0.0, 1.0]`.
    /// Returns `0.0` before the first allocation.
    /// 由空闲列表满足的分配占比，范围 `[0.0, 1.0]`。
    /// 第一次分配之前返回 `0.0`。
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.reuse_hits + self.fresh_misses;
        if total == 0 {
            return 0.0;
        }
        self.reuse_hits as f64 / total as f64
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} allocations ({} reused, {} fresh, {:.0}% reuse), {} returns, peak {} cached",
            self.allocations,
            self.reuse_hits,
            self.fresh_misses,
            self.reuse_ratio() * 100.0,
            self.deallocations,
            self.peak_cached,
        )
    }
}
