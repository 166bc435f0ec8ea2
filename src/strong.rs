//! The cross-thread handle family: [`Strong`] and [`Weak`].
//!
//! A freshly constructed `Strong` owns its payload outright and carries no
//! control block at all — sole ownership needs no counters. The block is
//! materialized lazily, on the first `clone` or `share_weak`, through a
//! compare-exchange publication so that concurrent first-shares agree on a
//! single block. From then on the usual pairing holds: the payload is
//! destroyed when the strong count hits zero, and the block returns to its
//! pool when the weak count does.
//!
//! 跨线程句柄家族：[`Strong`] 与 [`Weak`]。
//! 新构造的 `Strong` 完全独占其负载，根本不携带控制块 ——
//! 独占所有权不需要计数器。控制块在第一次 `clone` 或 `share_weak` 时
//! 惰性物化，通过 compare-exchange 发布，使并发的首次共享就同一个块
//! 达成一致。此后遵循通常的配对规则：强计数归零时销毁负载，
//! 弱计数归零时控制块归还给它的池。

use crate::callable::{Callable, FnPayload};
use crate::ctrl::AtomicCtrl;
use crate::error::Error;
use crate::payload::{ArrayPayload, BoxPayload, Payload, PayloadRef};
use crate::pool;
use crate::sync::{AtomicPtr, Ordering};
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// A shared owning handle. Clones share one payload; the last strong handle
/// to go destroys it.
///
/// The handle is meaningful when empty: it dereferences to nothing (a
/// precondition violation that fails fast), compares as having no value, and
/// clones to more empty handles. `reset` and `take` return a populated handle
/// to that state.
///
/// 共享的拥有型句柄。克隆共享同一个负载；最后一个离开的强句柄销毁它。
/// 句柄在空状态下也是有意义的：解引用空句柄属于前置条件违规并快速失败，
/// `has_value` 为假，克隆产生更多空句柄。`reset` 和 `take` 将已填充的
/// 句柄恢复到该状态。
pub struct Strong<P: Payload> {
    payload: P,
    /// Null while this handle has never been shared; the block pointer after
    /// the first share. Written at most once per handle lineage.
    ctrl: AtomicPtr<AtomicCtrl>,
}

impl<P: Payload> Strong<P> {
    /// The empty handle. Allocates nothing.
    pub fn new() -> Self {
        Strong {
            payload: P::empty(),
            ctrl: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Takes sole ownership of a populated descriptor. No control block is
    /// allocated until the handle is first shared.
    /// 取得已填充描述符的独占所有权。首次共享之前不会分配控制块。
    pub fn from_payload(payload: P) -> Self {
        Strong {
            payload,
            ctrl: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        self.payload.has_value()
    }

    /// Number of strong handles sharing the payload: 0 when empty, 1 while
    /// never shared, the live count otherwise. Concurrently racing handles
    /// make the exact value stale the moment it is read.
    /// 共享负载的强句柄数量：空时为 0，从未共享时为 1，否则为当前计数。
    /// 并发竞争会让读到的精确值立即过时。
    pub fn strong_count(&self) -> usize {
        if !self.payload.has_value() {
            return 0;
        }
        match NonNull::new(self.ctrl.load(Ordering::Acquire)) {
            Some(ctrl) => unsafe { ctrl.as_ref() }.strong_count(),
            None => 1,
        }
    }

    /// Creates a weak handle observing the same payload.
    /// 创建一个观察同一负载的弱句柄。
    pub fn share_weak(&self) -> Weak<P> {
        if !self.payload.has_value() {
            return Weak::new();
        }
        let ctrl = self.ensure_ctrl();
        unsafe { ctrl.as_ref() }.add_weak();
        Weak {
            payload: self.payload,
            ctrl: ctrl.as_ptr(),
        }
    }

    /// Releases this handle's ownership, destroying the payload if it was the
    /// last strong one. The handle is empty afterwards.
    /// 释放本句柄的所有权，若它是最后一个强句柄则销毁负载。
    /// 之后句柄为空。
    pub fn reset(&mut self) {
        self.release();
    }

    /// Moves the handle out, leaving an empty one behind.
    /// 将句柄移出，原地留下一个空句柄。
    pub fn take(&mut self) -> Strong<P> {
        mem::replace(self, Strong::new())
    }

    /// Returns the shared control block, materializing it on first use.
    ///
    /// Two handles cloning the same never-shared `Strong` concurrently both
    /// build a fresh block; the compare-exchange picks one winner and the
    /// loser returns its block to the pool and adopts the published one.
    ///
    /// 返回共享控制块，首次使用时将其物化。
    /// 两个线程并发克隆同一个从未共享过的 `Strong` 时会各自构造一个
    /// 新块；compare-exchange 选出唯一的赢家，输家将自己的块归还给池
    /// 并采用已发布的那个。
    fn ensure_ctrl(&self) -> NonNull<AtomicCtrl> {
        let cur = self.ctrl.load(Ordering::Acquire);
        if let Some(ctrl) = NonNull::new(cur) {
            return ctrl;
        }

        let fresh = pool::alloc_atomic_ctrl();
        match self.ctrl.compare_exchange(
            ptr::null_mut(),
            fresh.as_ptr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(winner) => {
                // The fresh {1, 1} block was never visible to anyone else.
                unsafe { pool::free_atomic_ctrl(fresh) };
                unsafe { NonNull::new_unchecked(winner) }
            }
        }
    }

    fn release(&mut self) {
        if !self.payload.has_value() {
            return;
        }
        let ctrl = self.ctrl.swap(ptr::null_mut(), Ordering::AcqRel);
        match NonNull::new(ctrl) {
            // Never shared: this handle is the sole owner.
            None => unsafe { self.payload.destroy() },
            Some(ctrl) => {
                let counters = unsafe { ctrl.as_ref() };
                if counters.release_strong() {
                    unsafe { self.payload.destroy() };
                } else {
                    self.payload = P::empty();
                }
                // The strong credit's implicit weak credit goes with it.
                if counters.release_weak() {
                    unsafe { pool::free_atomic_ctrl(ctrl) };
                }
            }
        }
    }
}

impl<T> Strong<BoxPayload<T>> {
    /// Allocates `value` and wraps it in a handle.
    pub fn make(value: T) -> Self {
        Strong::from_payload(BoxPayload::make(value))
    }
}

impl<T: Clone> Strong<ArrayPayload<T>> {
    /// Allocates an array of `len` copies of `fill` and wraps it in a handle.
    /// `len == 0` yields an empty handle.
    pub fn make_array(len: usize, fill: T) -> Result<Self, Error> {
        Ok(Strong::from_payload(ArrayPayload::make(len, fill)?))
    }
}

impl<A, R> Strong<FnPayload<A, R>> {
    /// Wraps a closure in a shared callable handle.
    pub fn make_fn<F>(f: F) -> Result<Self, Error>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Ok(Strong::from_payload(FnPayload::make(f)?))
    }
}

impl<T> Strong<ArrayPayload<T>> {
    /// Checked element access. Empty handles and out-of-bounds indices both
    /// report [`Error::OutOfRange`].
    /// 带检查的元素访问。空句柄与越界下标都报告 [`Error::OutOfRange`]。
    pub fn at(&self, index: usize) -> Result<&T, Error> {
        // The borrow of self keeps the payload alive.
        unsafe { self.payload.get(index) }
    }
}

impl<P: Payload> Clone for Strong<P> {
    fn clone(&self) -> Self {
        if !self.payload.has_value() {
            return Strong::new();
        }
        let ctrl = self.ensure_ctrl();
        let counters = unsafe { ctrl.as_ref() };
        counters.add_strong();
        // Every strong credit carries its own implicit weak credit; `release`
        // gives both back.
        // 每个强信用都携带自己的隐式弱信用；`release` 会同时归还两者。
        counters.add_weak();
        Strong {
            payload: self.payload,
            ctrl: AtomicPtr::new(ctrl.as_ptr()),
        }
    }
}

impl<P: Payload> Drop for Strong<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: Payload> Default for Strong<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PayloadRef> Deref for Strong<P> {
    type Target = P::Target;

    #[inline]
    fn deref(&self) -> &P::Target {
        assert!(self.payload.has_value(), "dereferenced an empty handle");
        unsafe { self.payload.get() }
    }
}

impl<A, P> Callable<A> for Strong<P>
where
    P: Payload + Callable<A>,
{
    type Output = P::Output;

    fn call(&self, arg: A) -> Result<P::Output, Error> {
        self.payload.call(arg)
    }
}

impl<P: Payload> std::fmt::Debug for Strong<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strong")
            .field("has_value", &self.has_value())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

// Same contract as `Arc`: moving or sharing a handle across threads moves or
// shares the payload with it.
unsafe impl<P: Payload + Send + Sync> Send for Strong<P> {}
unsafe impl<P: Payload + Send + Sync> Sync for Strong<P> {}

/// A non-owning observer of a [`Strong`] family's payload.
///
/// Holding a `Weak` keeps the control block alive but not the payload.
/// [`Weak::lock`] attempts to mint a new strong handle and yields an empty one
/// once the payload is gone.
///
/// [`Strong`] 家族负载的非拥有观察者。
/// 持有 `Weak` 使控制块保持存活，但不保住负载。
/// [`Weak::lock`] 尝试铸造一个新的强句柄，负载消亡后产生空句柄。
pub struct Weak<P: Payload> {
    payload: P,
    /// Null iff the observer is empty. Immutable after construction.
    ctrl: *mut AtomicCtrl,
}

impl<P: Payload> Weak<P> {
    /// The empty observer: `lock` always yields an empty handle.
    pub fn new() -> Self {
        Weak {
            payload: P::empty(),
            ctrl: ptr::null_mut(),
        }
    }

    /// Whether this observer was created from a populated handle. Says
    /// nothing about whether the payload is still alive — only `lock` can
    /// answer that.
    /// 该观察者是否由已填充的句柄创建。它不说明负载是否仍然存活 ——
    /// 只有 `lock` 能回答这个问题。
    #[inline]
    pub fn has_value(&self) -> bool {
        !self.ctrl.is_null()
    }

    /// Whether the payload is already gone. True for empty observers and once
    /// the strong count is observed at zero. A false result is advisory under
    /// concurrency — only `lock` can take a reference.
    /// 负载是否已经消亡。空观察者以及观察到强计数为零时为 true。
    /// 并发下 false 只是参考 —— 只有 `lock` 能真正取得引用。
    pub fn expired(&self) -> bool {
        match NonNull::new(self.ctrl) {
            Some(ctrl) => unsafe { ctrl.as_ref() }.strong_count() == 0,
            None => true,
        }
    }

    /// Attempts to upgrade to a strong handle. Yields an empty handle once
    /// the strong count has reached zero; the payload is never resurrected.
    /// 尝试升级为强句柄。强计数归零之后产生空句柄；负载绝不会复活。
    pub fn lock(&self) -> Strong<P> {
        match NonNull::new(self.ctrl) {
            Some(ctrl) if unsafe { ctrl.as_ref() }.lock_from_weak() => Strong {
                payload: self.payload,
                ctrl: AtomicPtr::new(ctrl.as_ptr()),
            },
            _ => Strong::new(),
        }
    }

    /// Drops this observation, freeing the control block if it was the last
    /// credit. The observer is empty afterwards.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Moves the observer out, leaving an empty one behind.
    pub fn take(&mut self) -> Weak<P> {
        mem::replace(self, Weak::new())
    }

    fn release(&mut self) {
        if let Some(ctrl) = NonNull::new(self.ctrl) {
            self.ctrl = ptr::null_mut();
            self.payload = P::empty();
            if unsafe { ctrl.as_ref() }.release_weak() {
                unsafe { pool::free_atomic_ctrl(ctrl) };
            }
        }
    }
}

impl<P: Payload> Clone for Weak<P> {
    fn clone(&self) -> Self {
        if let Some(ctrl) = NonNull::new(self.ctrl) {
            unsafe { ctrl.as_ref() }.add_weak();
        }
        Weak {
            payload: self.payload,
            ctrl: self.ctrl,
        }
    }
}

impl<P: Payload> Drop for Weak<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: Payload> Default for Weak<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> std::fmt::Debug for Weak<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weak")
            .field("has_value", &self.has_value())
            .finish()
    }
}

unsafe impl<P: Payload + Send + Sync> Send for Weak<P> {}
unsafe impl<P: Payload + Send + Sync> Sync for Weak<P> {}
