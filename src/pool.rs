use crate::ctrl::{AtomicCtrl, PlainCtrl};
use crate::error::Error;
use crate::sbo::FnSlot;
use crate::stats::PoolStats;
use crate::sync::{AtomicUsize, Mutex, Ordering};
use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::sync::OnceLock;

/// Default bound on how many free blocks a pool keeps cached. Blocks returned
/// beyond this go straight back to the global allocator.
/// 池缓存空闲块数量的默认上限。超出部分直接归还给全局分配器。
const DEFAULT_RETAIN_CAP: usize = 256;

/// A raw fixed-size block held in a free list. Blocks are uninitialized
/// memory; sending them between threads is safe because no live value is
/// inside.
/// 空闲列表中持有的裸固定大小块。块是未初始化内存；
/// 在线程之间传递它们是安全的，因为其中没有存活的值。
struct Block<T>(NonNull<T>);

unsafe impl<T> Send for Block<T> {}

/// A process-wide synchronized pool of fixed-size blocks, each sized to one
/// `T`. Backs atomic control blocks and shared callable slots.
///
/// Allocation first tries the free list, then falls back to the global
/// allocator. Returned blocks are cached up to `retain_cap` and handed back
/// to the global allocator beyond that. Safe for concurrent allocate and
/// deallocate calls from any thread.
///
/// 进程级的同步固定大小块池，每个块容纳一个 `T`。
/// 为原子控制块和共享可调用槽提供存储。
/// 分配首先尝试空闲列表，然后回退到全局分配器。归还的块最多缓存
/// `retain_cap` 个，超出的交还给全局分配器。任意线程并发调用
/// allocate 和 deallocate 都是安全的。
pub struct SharedPool<T> {
    free: Mutex<Vec<Block<T>>>,
    retain_cap: usize,
    allocations: AtomicUsize,
    reuse_hits: AtomicUsize,
    deallocations: AtomicUsize,
    peak_cached: AtomicUsize,
}

impl<T> SharedPool<T> {
    pub fn new() -> Self {
        Self::with_retain_cap(DEFAULT_RETAIN_CAP)
    }

    pub fn with_retain_cap(retain_cap: usize) -> Self {
        assert!(size_of::<T>() > 0, "pool blocks must not be zero-sized");
        SharedPool {
            free: Mutex::new(Vec::new()),
            retain_cap,
            allocations: AtomicUsize::new(0),
            reuse_hits: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            peak_cached: AtomicUsize::new(0),
        }
    }

    /// Hands out one uninitialized block.
    /// 交出一个未初始化的块。
    pub fn try_allocate(&self) -> Result<NonNull<T>, Error> {
        self.allocations.fetch_add(1, Ordering::Relaxed);

        if let Some(block) = self.free.lock().pop() {
            self.reuse_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block.0);
        }

        let layout = Layout::new::<T>();
        NonNull::new(unsafe { alloc(layout) } as *mut T)
            .ok_or(Error::AllocFailed { size: layout.size() })
    }

    /// Infallible variant: aborts through `handle_alloc_error` on exhaustion,
    /// matching the convention of the standard containers.
    /// 不可失败变体：耗尽时通过 `handle_alloc_error` 中止，
    /// 与标准容器的约定一致。
    pub fn allocate(&self) -> NonNull<T> {
        self.try_allocate()
            .unwrap_or_else(|_| handle_alloc_error(Layout::new::<T>()))
    }

    /// Returns a block to the pool.
    ///
    /// # Safety
    /// `ptr` must come from this pool (or carry an identical layout from the
    /// global allocator) and must not contain a live value.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);

        let mut free = self.free.lock();
        if free.len() < self.retain_cap {
            free.push(Block(ptr));
            let cached = free.len();
            drop(free);
            // Benign race: the high-water mark is diagnostic only.
            if cached > self.peak_cached.load(Ordering::Relaxed) {
                self.peak_cached.store(cached, Ordering::Relaxed);
            }
        } else {
            drop(free);
            unsafe {
                dealloc(ptr.as_ptr().cast(), Layout::new::<T>());
            }
        }
    }

    /// Allocates a block and moves `value` into it. Construction brackets the
    /// raw allocation: a failed allocation leaves no partial state behind.
    /// 分配一个块并将 `value` 移入。构造与裸分配成对出现：
    /// 分配失败不会留下任何部分状态。
    pub fn construct(&self, value: T) -> NonNull<T> {
        let ptr = self.allocate();
        unsafe {
            ptr.as_ptr().write(value);
        }
        ptr
    }

    pub fn try_construct(&self, value: T) -> Result<NonNull<T>, Error> {
        let ptr = self.try_allocate()?;
        unsafe {
            ptr.as_ptr().write(value);
        }
        Ok(ptr)
    }

    /// Drops the value in place, then returns the block.
    ///
    /// # Safety
    /// `ptr` must hold a live `T` previously produced by `construct` on this
    /// pool, and must not be used afterwards.
    pub unsafe fn destroy_and_deallocate(&self, ptr: NonNull<T>) {
        unsafe {
            ptr.as_ptr().drop_in_place();
            self.deallocate(ptr);
        }
    }

    /// Releases every cached free block back to the global allocator.
    /// 将所有缓存的空闲块释放回全局分配器。
    pub fn shrink(&self) {
        let blocks = std::mem::take(&mut *self.free.lock());
        for block in blocks {
            unsafe {
                dealloc(block.0.as_ptr().cast(), Layout::new::<T>());
            }
        }
    }

    /// Number of free blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.free.lock().len()
    }

    /// Snapshot of the pool's cumulative statistics.
    pub fn stats(&self) -> PoolStats {
        let allocations = self.allocations.load(Ordering::Relaxed) as u64;
        let reuse_hits = self.reuse_hits.load(Ordering::Relaxed) as u64;
        PoolStats {
            allocations,
            reuse_hits,
            fresh_misses: allocations.saturating_sub(reuse_hits),
            deallocations: self.deallocations.load(Ordering::Relaxed) as u64,
            peak_cached: self.peak_cached.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SharedPool<T> {
    fn drop(&mut self) {
        self.shrink();
    }
}

impl<T> std::fmt::Debug for SharedPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPool")
            .field("retain_cap", &self.retain_cap)
            .field("cached_blocks", &self.cached_blocks())
            .finish()
    }
}

/// A per-thread unsynchronized pool with the same surface as [`SharedPool`]
/// minus the locking. `!Send` and `!Sync` by construction (it stores raw
/// pointers); it lives for the lifetime of its thread and returns every cached
/// block to the global allocator when the thread exits.
///
/// 每线程的非同步池，表面与 [`SharedPool`] 相同但没有锁。
/// 由构造保证 `!Send`/`!Sync`（它存储裸指针）；它存活于所属线程的
/// 整个生命周期，线程退出时将所有缓存块归还给全局分配器。
pub struct LocalPool<T> {
    free: RefCell<Vec<NonNull<T>>>,
    retain_cap: usize,
    allocations: Cell<u64>,
    reuse_hits: Cell<u64>,
    deallocations: Cell<u64>,
    peak_cached: Cell<usize>,
}

impl<T> LocalPool<T> {
    pub fn new() -> Self {
        Self::with_retain_cap(DEFAULT_RETAIN_CAP)
    }

    pub fn with_retain_cap(retain_cap: usize) -> Self {
        assert!(size_of::<T>() > 0, "pool blocks must not be zero-sized");
        LocalPool {
            free: RefCell::new(Vec::new()),
            retain_cap,
            allocations: Cell::new(0),
            reuse_hits: Cell::new(0),
            deallocations: Cell::new(0),
            peak_cached: Cell::new(0),
        }
    }

    pub fn try_allocate(&self) -> Result<NonNull<T>, Error> {
        self.allocations.set(self.allocations.get() + 1);

        if let Some(ptr) = self.free.borrow_mut().pop() {
            self.reuse_hits.set(self.reuse_hits.get() + 1);
            return Ok(ptr);
        }

        let layout = Layout::new::<T>();
        NonNull::new(unsafe { alloc(layout) } as *mut T)
            .ok_or(Error::AllocFailed { size: layout.size() })
    }

    pub fn allocate(&self) -> NonNull<T> {
        self.try_allocate()
            .unwrap_or_else(|_| handle_alloc_error(Layout::new::<T>()))
    }

    /// # Safety
    /// Same contract as [`SharedPool::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) {
        self.deallocations.set(self.deallocations.get() + 1);

        let mut free = self.free.borrow_mut();
        if free.len() < self.retain_cap {
            free.push(ptr);
            self.peak_cached.set(self.peak_cached.get().max(free.len()));
        } else {
            drop(free);
            unsafe {
                dealloc(ptr.as_ptr().cast(), Layout::new::<T>());
            }
        }
    }

    pub fn construct(&self, value: T) -> NonNull<T> {
        let ptr = self.allocate();
        unsafe {
            ptr.as_ptr().write(value);
        }
        ptr
    }

    /// # Safety
    /// Same contract as [`SharedPool::destroy_and_deallocate`].
    pub unsafe fn destroy_and_deallocate(&self, ptr: NonNull<T>) {
        unsafe {
            ptr.as_ptr().drop_in_place();
            self.deallocate(ptr);
        }
    }

    pub fn shrink(&self) {
        let blocks = std::mem::take(&mut *self.free.borrow_mut());
        for ptr in blocks {
            unsafe {
                dealloc(ptr.as_ptr().cast(), Layout::new::<T>());
            }
        }
    }

    pub fn cached_blocks(&self) -> usize {
        self.free.borrow().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.get(),
            reuse_hits: self.reuse_hits.get(),
            fresh_misses: self.allocations.get() - self.reuse_hits.get(),
            deallocations: self.deallocations.get(),
            peak_cached: self.peak_cached.get(),
        }
    }
}

impl<T> Default for LocalPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LocalPool<T> {
    fn drop(&mut self) {
        self.shrink();
    }
}

impl<T> std::fmt::Debug for LocalPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPool")
            .field("retain_cap", &self.retain_cap)
            .field("cached_blocks", &self.cached_blocks())
            .finish()
    }
}

// --- Process-wide and per-thread pool singletons ---
//
// The shared pools are created lazily on first use and never torn down before
// process exit. The thread-local pools are created on first per-thread use and
// torn down with thread exit (their `Drop` frees the cached blocks).
//
// --- 进程级与每线程的池单例 ---
// 共享池在首次使用时惰性创建，在进程退出前不会被拆除。
// 线程本地池在每个线程首次使用时创建，并随线程退出被拆除
//（它们的 `Drop` 释放缓存的块）。

pub(crate) fn shared_ctrl_pool() -> &'static SharedPool<AtomicCtrl> {
    static POOL: OnceLock<SharedPool<AtomicCtrl>> = OnceLock::new();
    POOL.get_or_init(SharedPool::new)
}

pub(crate) fn shared_slot_pool() -> &'static SharedPool<FnSlot> {
    static POOL: OnceLock<SharedPool<FnSlot>> = OnceLock::new();
    POOL.get_or_init(SharedPool::new)
}

thread_local! {
    static LOCAL_CTRL_POOL: LocalPool<PlainCtrl> = LocalPool::new();
    static LOCAL_SLOT_POOL: LocalPool<FnSlot> = LocalPool::new();
}

#[cfg(not(feature = "loom"))]
pub(crate) fn alloc_atomic_ctrl() -> NonNull<AtomicCtrl> {
    shared_ctrl_pool().construct(AtomicCtrl::new())
}

#[cfg(not(feature = "loom"))]
pub(crate) unsafe fn free_atomic_ctrl(ptr: NonNull<AtomicCtrl>) {
    unsafe {
        shared_ctrl_pool().destroy_and_deallocate(ptr);
    }
}

// Loom cannot model state that survives across model iterations, so the
// static pool is bypassed when model checking; block recycling is orthogonal
// to the ordering protocol under test.
// loom 无法对跨模型迭代存活的状态建模，因此模型检查时绕过静态池；
// 块复用与被检查的内存序协议是正交的。
#[cfg(feature = "loom")]
pub(crate) fn alloc_atomic_ctrl() -> NonNull<AtomicCtrl> {
    NonNull::from(Box::leak(Box::new(AtomicCtrl::new())))
}

#[cfg(feature = "loom")]
pub(crate) unsafe fn free_atomic_ctrl(ptr: NonNull<AtomicCtrl>) {
    unsafe {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

// The `try_with` fallbacks cover handles dropped from other thread-local
// destructors after the pool itself has been torn down.
// `try_with` 回退路径覆盖在池本身已被拆除之后、
// 从其他线程本地析构函数中 drop 句柄的情况。

pub(crate) fn alloc_plain_ctrl() -> NonNull<PlainCtrl> {
    LOCAL_CTRL_POOL
        .try_with(|pool| pool.construct(PlainCtrl::new()))
        .unwrap_or_else(|_| NonNull::from(Box::leak(Box::new(PlainCtrl::new()))))
}

pub(crate) unsafe fn free_plain_ctrl(ptr: NonNull<PlainCtrl>) {
    let freed = LOCAL_CTRL_POOL
        .try_with(|pool| unsafe { pool.destroy_and_deallocate(ptr) })
        .is_ok();
    if !freed {
        unsafe {
            drop(Box::from_raw(ptr.as_ptr()));
        }
    }
}

pub(crate) fn try_alloc_shared_slot() -> Result<NonNull<FnSlot>, Error> {
    shared_slot_pool().try_allocate()
}

pub(crate) unsafe fn free_shared_slot(ptr: NonNull<FnSlot>) {
    unsafe {
        shared_slot_pool().deallocate(ptr);
    }
}

pub(crate) fn try_alloc_local_slot() -> Result<NonNull<FnSlot>, Error> {
    LOCAL_SLOT_POOL
        .try_with(|pool| pool.try_allocate())
        .unwrap_or_else(|_| {
            let layout = Layout::new::<FnSlot>();
            NonNull::new(unsafe { alloc(layout) } as *mut FnSlot)
                .ok_or(Error::AllocFailed { size: layout.size() })
        })
}

pub(crate) unsafe fn free_local_slot(ptr: NonNull<FnSlot>) {
    let freed = LOCAL_SLOT_POOL
        .try_with(|pool| unsafe { pool.deallocate(ptr) })
        .is_ok();
    if !freed {
        unsafe {
            dealloc(ptr.as_ptr().cast(), Layout::new::<FnSlot>());
        }
    }
}
