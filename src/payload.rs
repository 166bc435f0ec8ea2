use crate::error::Error;
use std::alloc::{Layout, alloc, dealloc};
use std::mem;
use std::ptr::NonNull;

/// The contract every handle-managed resource satisfies.
///
/// A payload is a plain, shallow descriptor of a resource: copying the
/// descriptor never duplicates the resource, and the descriptor itself has no
/// destructor (enforced by the `Copy` bound — a `Copy` type cannot implement
/// `Drop`). Ownership lives entirely in the wrapping handle, which decides
/// when [`destroy`](Payload::destroy) runs.
///
/// 每个由句柄管理的资源都满足的契约。
/// 负载是资源的一个普通浅描述符：复制描述符绝不会复制资源，
/// 描述符本身也没有析构函数（由 `Copy` 约束强制 —— `Copy` 类型
/// 不能实现 `Drop`）。所有权完全属于包装它的句柄，由句柄决定
/// 何时执行 [`destroy`](Payload::destroy)。
pub trait Payload: Copy {
    /// The descriptor that refers to no resource.
    /// 不引用任何资源的描述符。
    fn empty() -> Self;

    /// Whether this descriptor currently refers to a live resource.
    /// 此描述符当前是否引用一个存活的资源。
    fn has_value(&self) -> bool;

    /// Destroys the resource and resets the descriptor to empty.
    ///
    /// # Safety
    /// The descriptor must be populated, and no other copy of it may destroy
    /// or access the resource afterwards. Each populated descriptor lineage is
    /// destroyed exactly once.
    ///
    /// 销毁资源并将描述符重置为空。
    ///
    /// # Safety
    /// 描述符必须已填充，且之后它的任何副本都不得再销毁或访问该资源。
    /// 每个已填充的描述符世系恰好被销毁一次。
    unsafe fn destroy(&mut self);
}

/// Capability trait for payloads whose resource can be borrowed in place.
///
/// Handles use this to provide `Deref` (and, for [`crate::Unique`] only,
/// `DerefMut`). Both accessors are unsafe at this level because a raw
/// descriptor carries no liveness proof; the handle layer supplies it.
///
/// 资源可以被原地借用的负载的能力 trait。
/// 句柄用它来提供 `Deref`（以及仅对 [`crate::Unique`] 提供的 `DerefMut`）。
/// 两个访问器在此层级都是 unsafe 的，因为裸描述符不携带存活性证明；
/// 存活性由句柄层保证。
pub trait PayloadRef: Payload {
    type Target: ?Sized;

    /// # Safety
    /// The resource must be alive for the duration of the borrow.
    unsafe fn get(&self) -> &Self::Target;

    /// # Safety
    /// The resource must be alive and the caller must be its sole owner.
    unsafe fn get_mut(&mut self) -> &mut Self::Target;
}

/// A single heap-allocated object.
/// 单个堆分配对象。
pub struct BoxPayload<T> {
    ptr: Option<NonNull<T>>,
}

impl<T> BoxPayload<T> {
    /// Allocates storage and moves `value` into it.
    /// 分配存储并将 `value` 移入其中。
    pub fn make(value: T) -> Self {
        BoxPayload {
            ptr: Some(NonNull::from(Box::leak(Box::new(value)))),
        }
    }
}

impl<T> Clone for BoxPayload<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BoxPayload<T> {}

impl<T> Payload for BoxPayload<T> {
    #[inline]
    fn empty() -> Self {
        BoxPayload { ptr: None }
    }

    #[inline]
    fn has_value(&self) -> bool {
        self.ptr.is_some()
    }

    unsafe fn destroy(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // Runs T's own cleanup hook (Drop), then releases the allocation.
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}

impl<T> PayloadRef for BoxPayload<T> {
    type Target = T;

    #[inline]
    unsafe fn get(&self) -> &T {
        unsafe { self.ptr.unwrap_unchecked().as_ref() }
    }

    #[inline]
    unsafe fn get_mut(&mut self) -> &mut T {
        unsafe { self.ptr.unwrap_unchecked().as_mut() }
    }
}

unsafe impl<T: Send + Sync> Send for BoxPayload<T> {}
unsafe impl<T: Send + Sync> Sync for BoxPayload<T> {}

/// A fixed-size contiguous array of objects.
///
/// Checked element access goes through [`ArrayPayload::get`] and returns
/// [`Error::OutOfRange`]; unchecked access is the `[T]` slice exposed through
/// the owning handle's `Deref`, where an out-of-bounds index is a precondition
/// violation, not an error.
///
/// 固定大小的连续对象数组。
/// 带检查的元素访问通过 [`ArrayPayload::get`]，返回 [`Error::OutOfRange`]；
/// 不带检查的访问是拥有它的句柄通过 `Deref` 暴露的 `[T]` 切片，
/// 越界索引属于前置条件违规而不是错误。
pub struct ArrayPayload<T> {
    ptr: Option<NonNull<T>>,
    len: usize,
}

/// Rolls back a partially constructed array: drops the elements built so far
/// in reverse order, then releases the allocation.
/// 回滚部分构造的数组：按逆序 drop 已构造的元素，然后释放分配。
struct BuildGuard<T> {
    base: NonNull<T>,
    built: usize,
    layout: Layout,
}

impl<T> Drop for BuildGuard<T> {
    fn drop(&mut self) {
        unsafe {
            for i in (0..self.built).rev() {
                self.base.as_ptr().add(i).drop_in_place();
            }
            // Zero-size layouts never touched the allocator.
            if self.layout.size() > 0 {
                dealloc(self.base.as_ptr().cast(), self.layout);
            }
        }
    }
}

impl<T> ArrayPayload<T> {
    /// Allocates an array of `len` elements, each cloned from `fill` (the last
    /// element takes `fill` by value).
    ///
    /// If a clone panics partway through, the elements built so far are
    /// destroyed in reverse order and the allocation is released before the
    /// panic propagates — no partial array escapes. `len == 0` yields the
    /// empty descriptor.
    ///
    /// 分配一个 `len` 个元素的数组，每个元素从 `fill` 克隆而来
    /// （最后一个元素按值接收 `fill`）。
    /// 如果中途克隆 panic，已构造的元素按逆序销毁并释放分配，
    /// 然后 panic 继续传播 —— 不会有部分构造的数组逃逸。
    /// `len == 0` 产生空描述符。
    pub fn make(len: usize, fill: T) -> Result<Self, Error>
    where
        T: Clone,
    {
        if len == 0 {
            return Ok(Self::empty());
        }

        let layout = Layout::array::<T>(len).map_err(|_| Error::AllocFailed {
            size: len.saturating_mul(size_of::<T>()),
        })?;
        // Zero-sized elements need no storage; a dangling aligned pointer is
        // valid for every access the descriptor performs.
        // 零大小的元素不需要存储；悬空的对齐指针对描述符执行的
        // 所有访问都是合法的。
        let base = if layout.size() == 0 {
            NonNull::<T>::dangling()
        } else {
            NonNull::new(unsafe { alloc(layout) } as *mut T)
                .ok_or(Error::AllocFailed { size: layout.size() })?
        };

        let mut guard = BuildGuard {
            base,
            built: 0,
            layout,
        };
        for i in 0..len - 1 {
            unsafe {
                base.as_ptr().add(i).write(fill.clone());
            }
            guard.built = i + 1;
        }
        unsafe {
            base.as_ptr().add(len - 1).write(fill);
        }
        mem::forget(guard);

        Ok(ArrayPayload {
            ptr: Some(base),
            len,
        })
    }

    /// Number of elements, zero when empty.
    #[inline]
    pub fn len(&self) -> usize {
        if self.ptr.is_some() { self.len } else { 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checked element access.
    ///
    /// # Safety
    /// The resource must be alive for the duration of the borrow.
    pub unsafe fn get(&self, index: usize) -> Result<&T, Error> {
        let len = self.len();
        match self.ptr {
            Some(base) if index < len => Ok(unsafe { &*base.as_ptr().add(index) }),
            _ => Err(Error::OutOfRange { index, len }),
        }
    }

    /// Checked mutable element access.
    ///
    /// # Safety
    /// The resource must be alive and the caller must be its sole owner.
    pub unsafe fn get_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        let len = self.len();
        match self.ptr {
            Some(base) if index < len => Ok(unsafe { &mut *base.as_ptr().add(index) }),
            _ => Err(Error::OutOfRange { index, len }),
        }
    }
}

impl<T> Clone for ArrayPayload<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArrayPayload<T> {}

impl<T> Payload for ArrayPayload<T> {
    #[inline]
    fn empty() -> Self {
        ArrayPayload { ptr: None, len: 0 }
    }

    #[inline]
    fn has_value(&self) -> bool {
        self.ptr.is_some()
    }

    unsafe fn destroy(&mut self) {
        if let Some(base) = self.ptr.take() {
            unsafe {
                for i in (0..self.len).rev() {
                    base.as_ptr().add(i).drop_in_place();
                }
                // len > 0 here: a zero-length make never populates the descriptor.
                let layout = Layout::array::<T>(self.len).unwrap_unchecked();
                if layout.size() > 0 {
                    dealloc(base.as_ptr().cast(), layout);
                }
            }
            self.len = 0;
        }
    }
}

impl<T> PayloadRef for ArrayPayload<T> {
    type Target = [T];

    #[inline]
    unsafe fn get(&self) -> &[T] {
        match self.ptr {
            Some(base) => unsafe { std::slice::from_raw_parts(base.as_ptr(), self.len) },
            None => &[],
        }
    }

    #[inline]
    unsafe fn get_mut(&mut self) -> &mut [T] {
        match self.ptr {
            Some(base) => unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

unsafe impl<T: Send + Sync> Send for ArrayPayload<T> {}
unsafe impl<T: Send + Sync> Sync for ArrayPayload<T> {}
