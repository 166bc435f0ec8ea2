//! The sole-ownership handle: [`Unique`].
//!
//! `Unique` never shares, so it carries no control block and no counters at
//! all — lifecycle is plain move semantics, and it is the only handle that
//! hands out mutable access to its payload.
//!
//! 独占所有权句柄：[`Unique`]。
//! `Unique` 从不共享，因此完全不携带控制块和计数器 ——
//! 生命周期就是普通的移动语义，它也是唯一提供负载可变访问的句柄。

use crate::callable::Callable;
use crate::error::Error;
use crate::payload::{ArrayPayload, BoxPayload, Payload, PayloadRef};
use std::mem;
use std::ops::{Deref, DerefMut};

/// An exclusively owning handle. Not cloneable; ownership transfers by move.
///
/// 独占拥有的句柄。不可克隆；所有权通过移动转移。
pub struct Unique<P: Payload> {
    payload: P,
}

impl<P: Payload> Unique<P> {
    /// The empty handle. Allocates nothing.
    pub fn new() -> Self {
        Unique {
            payload: P::empty(),
        }
    }

    /// Takes ownership of a populated descriptor.
    pub fn from_payload(payload: P) -> Self {
        Unique { payload }
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        self.payload.has_value()
    }

    /// Destroys the payload, if any. The handle is empty afterwards.
    pub fn reset(&mut self) {
        if self.payload.has_value() {
            unsafe { self.payload.destroy() };
        }
    }

    /// Moves the handle out, leaving an empty one behind.
    pub fn take(&mut self) -> Unique<P> {
        mem::replace(self, Unique::new())
    }

    /// Releases the descriptor without destroying the resource. The caller
    /// becomes responsible for its lifetime.
    /// 交出描述符而不销毁资源。调用者从此负责其生命周期。
    pub fn release(mut self) -> P {
        mem::replace(&mut self.payload, P::empty())
    }
}

impl<T> Unique<BoxPayload<T>> {
    /// Allocates `value` and wraps it in a handle.
    pub fn make(value: T) -> Self {
        Unique::from_payload(BoxPayload::make(value))
    }
}

impl<T: Clone> Unique<ArrayPayload<T>> {
    /// Allocates an array of `len` copies of `fill` and wraps it in a handle.
    /// `len == 0` yields an empty handle.
    pub fn make_array(len: usize, fill: T) -> Result<Self, Error> {
        Ok(Unique::from_payload(ArrayPayload::make(len, fill)?))
    }
}

impl<T> Unique<ArrayPayload<T>> {
    /// Checked element access. Empty handles and out-of-bounds indices both
    /// report [`Error::OutOfRange`].
    pub fn at(&self, index: usize) -> Result<&T, Error> {
        unsafe { self.payload.get(index) }
    }

    /// Checked mutable element access. Only the sole owner can hand this out.
    /// 带检查的可变元素访问。只有独占所有者才能提供。
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        unsafe { self.payload.get_mut(index) }
    }
}

impl<P: Payload> Drop for Unique<P> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<P: Payload> Default for Unique<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PayloadRef> Deref for Unique<P> {
    type Target = P::Target;

    #[inline]
    fn deref(&self) -> &P::Target {
        assert!(self.payload.has_value(), "dereferenced an empty handle");
        unsafe { self.payload.get() }
    }
}

impl<P: PayloadRef> DerefMut for Unique<P> {
    #[inline]
    fn deref_mut(&mut self) -> &mut P::Target {
        assert!(self.payload.has_value(), "dereferenced an empty handle");
        // Sole ownership: the exclusive borrow of self is exclusive access.
        unsafe { self.payload.get_mut() }
    }
}

impl<A, P> Callable<A> for Unique<P>
where
    P: Payload + Callable<A>,
{
    type Output = P::Output;

    fn call(&self, arg: A) -> Result<P::Output, Error> {
        self.payload.call(arg)
    }
}

impl<P: Payload> std::fmt::Debug for Unique<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unique")
            .field("has_value", &self.has_value())
            .finish()
    }
}
