use crate::sync::{AtomicUsize, Cell, Ordering, fence};

/// Shared counter pair for the cross-thread handle family.
///
/// Both counters start at 1: the initial strong reference also carries one
/// implicit weak credit. This coupling is load-bearing for the upgrade
/// protocol — every successful upgrade must add a weak credit alongside the
/// strong one, and every strong release must be followed by a weak release,
/// otherwise the block can be freed under a live handle.
///
/// `strong == 0` means the payload has been (or is being) destroyed and no
/// upgrade can succeed anymore. The block itself is returned to its pool on
/// the `weak` 1 -> 0 transition, which can only happen after `strong` reached
/// zero and every derived weak handle was released.
///
/// 跨线程句柄家族的共享计数器对。
/// 两个计数器都从 1 开始：初始强引用同时携带一个隐式弱信用。
/// 这个耦合是升级协议正确性的关键 —— 每次成功升级必须在增加强信用的
/// 同时增加一个弱信用，每次释放强信用之后必须跟随一次弱信用释放，
/// 否则控制块可能在句柄仍然存活时被释放。
///
/// `strong == 0` 表示负载已经（或正在）被销毁，升级不可能再成功。
/// 控制块本身在 `weak` 从 1 到 0 的转换上归还给它的池，这只可能发生在
/// `strong` 归零且每个派生的弱句柄都已释放之后。
#[derive(Debug)]
pub(crate) struct AtomicCtrl {
    strong: AtomicUsize,
    weak: AtomicUsize,
}

impl AtomicCtrl {
    pub(crate) fn new() -> Self {
        AtomicCtrl {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
        }
    }

    /// Adds a strong credit. Only callable while holding one already, so a
    /// relaxed increment cannot race the count to zero.
    /// 增加一个强信用。只有在已持有强信用时才可调用，
    /// 因此宽松的自增不可能与计数归零竞争。
    #[inline]
    pub(crate) fn add_strong(&self) {
        self.strong.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases a strong credit. Returns true iff this was the last one, in
    /// which case the caller must destroy the payload.
    ///
    /// The release ordering on the decrement publishes every write made while
    /// the reference was held; the acquire fence on the last-release path makes
    /// all of them visible to the destroying thread.
    ///
    /// 释放一个强信用。当且仅当这是最后一个时返回 true，
    /// 此时调用者必须销毁负载。
    /// 自减上的 release 语义发布持有引用期间的所有写入；
    /// 最后一次释放路径上的 acquire fence 使它们对销毁线程全部可见。
    #[inline]
    pub(crate) fn release_strong(&self) -> bool {
        if self.strong.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    /// Adds a weak credit.
    #[inline]
    pub(crate) fn add_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases a weak credit. Returns true iff this was the last one, in
    /// which case the caller must return the block to its arena.
    /// 释放一个弱信用。当且仅当这是最后一个时返回 true，
    /// 此时调用者必须将控制块归还给它的 arena。
    #[inline]
    pub(crate) fn release_weak(&self) -> bool {
        if self.weak.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    /// The upgrade protocol: attempts to mint a new strong credit from a weak
    /// one. Returns false without retrying once the strong count is observed
    /// at zero.
    ///
    /// A plain load-then-increment would race a concurrent release dropping
    /// the count to zero and resurrect an object already slated for
    /// destruction; the CAS re-reads on failure and closes that window. The
    /// acquire ordering on success makes every write that happened before the
    /// raced-against release visible to the upgrading thread. On success the
    /// new strong handle also takes its own implicit weak credit.
    ///
    /// 升级协议：尝试从一个弱信用铸造一个新的强信用。
    /// 一旦观察到强计数为零，立即返回 false，不再重试。
    /// 普通的"读取后自增"会与并发的归零释放竞争，使一个已经注定销毁的
    /// 对象复活；CAS 在失败时重新读取，关闭了这个窗口。成功路径上的
    /// acquire 语义使竞争对手释放之前的所有写入对升级线程可见。
    /// 成功时，新的强句柄同时取得它自己的隐式弱信用。
    pub(crate) fn lock_from_weak(&self) -> bool {
        let mut n = self.strong.load(Ordering::Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            match self
                .strong
                .compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.add_weak();
                    return true;
                }
                Err(observed) => n = observed,
            }
        }
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.load(Ordering::Acquire)
    }
}

/// Unsynchronized counter pair for the single-thread handle family.
///
/// The contracts mirror [`AtomicCtrl`] but the bookkeeping is plain
/// check-then-increment: valid only because the single-thread handles are
/// `!Send`/`!Sync`, so no two threads ever touch the same block. Handing a
/// value to another thread requires an explicit deep copy by the caller.
///
/// 单线程句柄家族的非同步计数器对。
/// 契约与 [`AtomicCtrl`] 相同，但记账是普通的"检查后自增"：
/// 仅因为单线程句柄是 `!Send`/`!Sync`、同一控制块绝不会被两个线程
/// 访问才是合法的。将值交给另一个线程需要调用者显式进行深拷贝。
#[derive(Debug)]
pub(crate) struct PlainCtrl {
    strong: Cell<usize>,
    weak: Cell<usize>,
}

impl PlainCtrl {
    pub(crate) fn new() -> Self {
        PlainCtrl {
            strong: Cell::new(1),
            weak: Cell::new(1),
        }
    }

    #[inline]
    pub(crate) fn add_strong(&self) {
        self.strong.set(self.strong.get() + 1);
    }

    #[inline]
    pub(crate) fn release_strong(&self) -> bool {
        let n = self.strong.get();
        debug_assert!(n > 0, "BUG: strong count underflow");
        self.strong.set(n - 1);
        n == 1
    }

    #[inline]
    pub(crate) fn add_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }

    #[inline]
    pub(crate) fn release_weak(&self) -> bool {
        let n = self.weak.get();
        debug_assert!(n > 0, "BUG: weak count underflow");
        self.weak.set(n - 1);
        n == 1
    }

    /// Unsynchronized upgrade: check, then increment both counters.
    /// 非同步升级：先检查，再同时增加两个计数器。
    #[inline]
    pub(crate) fn lock_from_weak(&self) -> bool {
        let n = self.strong.get();
        if n == 0 {
            return false;
        }
        self.strong.set(n + 1);
        self.add_weak();
        true
    }

    #[inline]
    pub(crate) fn strong_count(&self) -> usize {
        self.strong.get()
    }
}
