//! Pooled reference-counted handles with lazily materialized control blocks.
//!
//! Three handle families manage a resource described by a [`Payload`]:
//!
//! - [`Strong`] / [`Weak`] — shared ownership across threads, with atomic
//!   counters and a CAS-based weak-to-strong upgrade.
//! - [`LocalStrong`] / [`LocalWeak`] — the same lifecycle confined to one
//!   thread, with plain counters and no synchronization cost.
//! - [`Unique`] — sole ownership, no counters at all, and the only handle
//!   that grants mutable access.
//!
//! Control blocks are not embedded next to the resource and not allocated up
//! front: a handle that is never shared never pays for one. When sharing does
//! happen, the block comes from a pooled arena (process-wide for the atomic
//! family, per-thread for the local one) and returns there afterwards, so
//! heavy share/drop churn stops hitting the global allocator.
//!
//! On top of the same pools, [`FnPayload`], [`LocalFnPayload`] and the
//! standalone [`InlineFn`] store type-erased closures with a small-buffer
//! optimization: small captures live in fixed pooled slots or an embedded
//! buffer, large ones fall back to the heap.
//!
//! 带惰性物化控制块的池化引用计数句柄。
//!
//! 三个句柄家族管理由 [`Payload`] 描述的资源：
//! [`Strong`]/[`Weak`] 提供跨线程共享所有权，使用原子计数器和基于
//! CAS 的弱到强升级；[`LocalStrong`]/[`LocalWeak`] 将同样的生命周期
//! 限制在单个线程内，使用普通计数器、没有同步开销；[`Unique`]
//! 提供独占所有权，完全没有计数器，也是唯一授予可变访问的句柄。
//!
//! 控制块既不内嵌在资源旁，也不预先分配：从未被共享的句柄不为它
//! 付出任何代价。当共享真正发生时，控制块来自池化 arena（原子家族
//! 用进程级池，本地家族用每线程池），用完后归还，因此高频的
//! 共享/释放不再冲击全局分配器。
//!
//! 在同样的池之上，[`FnPayload`]、[`LocalFnPayload`] 与独立的
//! [`InlineFn`] 以小缓冲区优化存储类型擦除的闭包：小捕获存放在
//! 固定大小的池化槽或内嵌缓冲区中，大捕获回退到堆。
//!
//! ```
//! use pooled_handle::{BoxPayload, Strong};
//!
//! let a: Strong<BoxPayload<String>> = Strong::make("shared".to_string());
//! let b = a.clone();
//! let w = a.share_weak();
//!
//! drop(a);
//! assert_eq!(&*w.lock(), "shared"); // `b` still keeps it alive
//!
//! drop(b);
//! assert!(!w.lock().has_value());
//! ```

mod callable;
mod ctrl;
mod error;
mod local;
mod payload;
mod pool;
mod sbo;
mod stats;
mod strong;
mod sync;
mod unique;

pub use callable::{Callable, FnPayload, InlineFn, LocalFnPayload};
pub use error::Error;
pub use local::{LocalStrong, LocalWeak};
pub use payload::{ArrayPayload, BoxPayload, Payload, PayloadRef};
pub use pool::{LocalPool, SharedPool};
pub use sbo::InlineBuf;
pub use stats::PoolStats;
pub use strong::{Strong, Weak};
pub use unique::Unique;

/// Snapshot of the process-wide control-block pool's statistics.
/// 进程级控制块池统计数据的快照。
pub fn ctrl_pool_stats() -> PoolStats {
    pool::shared_ctrl_pool().stats()
}

/// Snapshot of the process-wide callable-slot pool's statistics.
/// 进程级可调用槽池统计数据的快照。
pub fn slot_pool_stats() -> PoolStats {
    pool::shared_slot_pool().stats()
}

// Unit tests run real threads; under the loom feature only the dedicated
// loom_tests integration target is meaningful.
#[cfg(all(test, not(feature = "loom")))]
mod tests;
