//! The single-thread handle family: [`LocalStrong`] and [`LocalWeak`].
//!
//! Same lifecycle as the cross-thread family, with all synchronization
//! removed: counters are plain cells, control blocks come from the
//! thread-local pool, and the lazy block slot is a `Cell` instead of an
//! atomic. Both types are `!Send` and `!Sync` by construction, which is what
//! makes the unsynchronized bookkeeping sound. Handing the underlying value
//! to another thread requires an explicit deep copy.
//!
//! 单线程句柄家族：[`LocalStrong`] 与 [`LocalWeak`]。
//! 生命周期与跨线程家族相同，但移除了所有同步：计数器是普通 cell，
//! 控制块来自线程本地池，惰性块槽位是 `Cell` 而不是原子量。
//! 两个类型由构造保证 `!Send`/`!Sync`，这正是非同步记账合法的前提。
//! 要将底层值交给另一个线程，需要显式的深拷贝。

use crate::callable::{Callable, LocalFnPayload};
use crate::ctrl::PlainCtrl;
use crate::error::Error;
use crate::payload::{ArrayPayload, BoxPayload, Payload, PayloadRef};
use crate::pool;
use std::cell::Cell;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// The single-thread counterpart of [`crate::Strong`].
pub struct LocalStrong<P: Payload> {
    payload: P,
    /// Null while never shared. A `Cell` suffices: no other thread can
    /// observe the slot.
    ctrl: Cell<*mut PlainCtrl>,
}

impl<P: Payload> LocalStrong<P> {
    /// The empty handle. Allocates nothing.
    pub fn new() -> Self {
        LocalStrong {
            payload: P::empty(),
            ctrl: Cell::new(ptr::null_mut()),
        }
    }

    /// Takes sole ownership of a populated descriptor. No control block is
    /// allocated until the handle is first shared.
    pub fn from_payload(payload: P) -> Self {
        LocalStrong {
            payload,
            ctrl: Cell::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        self.payload.has_value()
    }

    /// Number of strong handles sharing the payload: 0 when empty, 1 while
    /// never shared. Exact — nothing races on this thread.
    /// 共享负载的强句柄数量：空时为 0，从未共享时为 1。
    /// 精确值 —— 本线程上没有任何竞争。
    pub fn strong_count(&self) -> usize {
        if !self.payload.has_value() {
            return 0;
        }
        match NonNull::new(self.ctrl.get()) {
            Some(ctrl) => unsafe { ctrl.as_ref() }.strong_count(),
            None => 1,
        }
    }

    /// Creates a weak handle observing the same payload.
    pub fn share_weak(&self) -> LocalWeak<P> {
        if !self.payload.has_value() {
            return LocalWeak::new();
        }
        let ctrl = self.ensure_ctrl();
        unsafe { ctrl.as_ref() }.add_weak();
        LocalWeak {
            payload: self.payload,
            ctrl: ctrl.as_ptr(),
        }
    }

    /// Releases this handle's ownership, destroying the payload if it was the
    /// last strong one. The handle is empty afterwards.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Moves the handle out, leaving an empty one behind.
    pub fn take(&mut self) -> LocalStrong<P> {
        mem::replace(self, LocalStrong::new())
    }

    fn ensure_ctrl(&self) -> NonNull<PlainCtrl> {
        if let Some(ctrl) = NonNull::new(self.ctrl.get()) {
            return ctrl;
        }
        let fresh = pool::alloc_plain_ctrl();
        self.ctrl.set(fresh.as_ptr());
        fresh
    }

    fn release(&mut self) {
        if !self.payload.has_value() {
            return;
        }
        let ctrl = self.ctrl.replace(ptr::null_mut());
        match NonNull::new(ctrl) {
            None => unsafe { self.payload.destroy() },
            Some(ctrl) => {
                let counters = unsafe { ctrl.as_ref() };
                if counters.release_strong() {
                    unsafe { self.payload.destroy() };
                } else {
                    self.payload = P::empty();
                }
                if counters.release_weak() {
                    unsafe { pool::free_plain_ctrl(ctrl) };
                }
            }
        }
    }
}

impl<T> LocalStrong<BoxPayload<T>> {
    /// Allocates `value` and wraps it in a handle.
    pub fn make(value: T) -> Self {
        LocalStrong::from_payload(BoxPayload::make(value))
    }
}

impl<T: Clone> LocalStrong<ArrayPayload<T>> {
    /// Allocates an array of `len` copies of `fill` and wraps it in a handle.
    /// `len == 0` yields an empty handle.
    pub fn make_array(len: usize, fill: T) -> Result<Self, Error> {
        Ok(LocalStrong::from_payload(ArrayPayload::make(len, fill)?))
    }
}

impl<A, R> LocalStrong<LocalFnPayload<A, R>> {
    /// Wraps a closure in a single-thread callable handle. The closure does
    /// not need to be `Send` or `Sync`.
    pub fn make_fn<F>(f: F) -> Result<Self, Error>
    where
        F: Fn(A) -> R + 'static,
    {
        Ok(LocalStrong::from_payload(LocalFnPayload::make(f)?))
    }
}

impl<T> LocalStrong<ArrayPayload<T>> {
    /// Checked element access. Empty handles and out-of-bounds indices both
    /// report [`Error::OutOfRange`].
    pub fn at(&self, index: usize) -> Result<&T, Error> {
        unsafe { self.payload.get(index) }
    }
}

impl<P: Payload> Clone for LocalStrong<P> {
    fn clone(&self) -> Self {
        if !self.payload.has_value() {
            return LocalStrong::new();
        }
        let ctrl = self.ensure_ctrl();
        let counters = unsafe { ctrl.as_ref() };
        counters.add_strong();
        // Every strong credit carries its own implicit weak credit; `release`
        // gives both back.
        // 每个强信用都携带自己的隐式弱信用；`release` 会同时归还两者。
        counters.add_weak();
        LocalStrong {
            payload: self.payload,
            ctrl: Cell::new(ctrl.as_ptr()),
        }
    }
}

impl<P: Payload> Drop for LocalStrong<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: Payload> Default for LocalStrong<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PayloadRef> Deref for LocalStrong<P> {
    type Target = P::Target;

    #[inline]
    fn deref(&self) -> &P::Target {
        assert!(self.payload.has_value(), "dereferenced an empty handle");
        unsafe { self.payload.get() }
    }
}

impl<A, P> Callable<A> for LocalStrong<P>
where
    P: Payload + Callable<A>,
{
    type Output = P::Output;

    fn call(&self, arg: A) -> Result<P::Output, Error> {
        self.payload.call(arg)
    }
}

impl<P: Payload> std::fmt::Debug for LocalStrong<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStrong")
            .field("has_value", &self.has_value())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

/// The single-thread counterpart of [`crate::Weak`].
pub struct LocalWeak<P: Payload> {
    payload: P,
    /// Null iff the observer is empty. Immutable after construction.
    ctrl: *mut PlainCtrl,
}

impl<P: Payload> LocalWeak<P> {
    /// The empty observer: `lock` always yields an empty handle.
    pub fn new() -> Self {
        LocalWeak {
            payload: P::empty(),
            ctrl: ptr::null_mut(),
        }
    }

    /// Whether this observer was created from a populated handle. Says
    /// nothing about whether the payload is still alive.
    #[inline]
    pub fn has_value(&self) -> bool {
        !self.ctrl.is_null()
    }

    /// Whether the payload is already gone: true for empty observers and once
    /// the strong count has reached zero. Exact on this thread.
    /// 负载是否已经消亡：空观察者以及强计数归零后为 true。
    /// 在本线程上是精确的。
    pub fn expired(&self) -> bool {
        match NonNull::new(self.ctrl) {
            Some(ctrl) => unsafe { ctrl.as_ref() }.strong_count() == 0,
            None => true,
        }
    }

    /// Attempts to upgrade to a strong handle. Yields an empty handle once
    /// the strong count has reached zero.
    pub fn lock(&self) -> LocalStrong<P> {
        match NonNull::new(self.ctrl) {
            Some(ctrl) if unsafe { ctrl.as_ref() }.lock_from_weak() => LocalStrong {
                payload: self.payload,
                ctrl: Cell::new(ctrl.as_ptr()),
            },
            _ => LocalStrong::new(),
        }
    }

    /// Drops this observation, freeing the control block if it was the last
    /// credit. The observer is empty afterwards.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Moves the observer out, leaving an empty one behind.
    pub fn take(&mut self) -> LocalWeak<P> {
        mem::replace(self, LocalWeak::new())
    }

    fn release(&mut self) {
        if let Some(ctrl) = NonNull::new(self.ctrl) {
            self.ctrl = ptr::null_mut();
            self.payload = P::empty();
            if unsafe { ctrl.as_ref() }.release_weak() {
                unsafe { pool::free_plain_ctrl(ctrl) };
            }
        }
    }
}

impl<P: Payload> Clone for LocalWeak<P> {
    fn clone(&self) -> Self {
        if let Some(ctrl) = NonNull::new(self.ctrl) {
            unsafe { ctrl.as_ref() }.add_weak();
        }
        LocalWeak {
            payload: self.payload,
            ctrl: self.ctrl,
        }
    }
}

impl<P: Payload> Drop for LocalWeak<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: Payload> Default for LocalWeak<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> std::fmt::Debug for LocalWeak<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWeak")
            .field("has_value", &self.has_value())
            .finish()
    }
}
