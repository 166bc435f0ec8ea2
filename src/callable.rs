//! Type-erased callable payloads.
//!
//! A callable payload stores a closure behind an erased data pointer plus a
//! vtable of function pointers. The vtable's release entry is monomorphized
//! per closure type *and* per allocation source, so the concrete
//! implementation always knows its true size, alignment, and allocator when
//! it destructs and frees itself.
//!
//! 类型擦除的可调用负载。
//! 可调用负载将闭包存放在一个擦除的数据指针后面，并配有一个函数指针
//! 虚表。虚表的释放入口按闭包类型与分配来源分别单态化，因此具体实现
//! 在自我析构和释放时总是知道自己真正的大小、对齐与分配器。

use crate::error::Error;
use crate::payload::Payload;
use crate::pool;
use crate::sbo::{self, FnSlot, InlineBuf};
use std::alloc::{Layout, alloc, dealloc};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// Capability trait for anything that can be invoked with an argument of type
/// `A`. Implemented by the callable payloads and delegated by the handle
/// types; invoking an empty value yields [`Error::NotCallable`] rather than a
/// panic, because calling after a move or reset is a normal runtime path.
///
/// 任何能以 `A` 类型参数调用的东西的能力 trait。由可调用负载实现并由
/// 句柄类型转发；调用空值产生 [`Error::NotCallable`] 而不是 panic，
/// 因为在移动或重置之后调用属于正常的运行时路径。
pub trait Callable<A> {
    type Output;

    fn call(&self, arg: A) -> Result<Self::Output, Error>;
}

/// Erased entry points for one concrete closure type.
/// 单个具体闭包类型的擦除入口点。
struct ErasedVTable<A, R> {
    invoke: unsafe fn(*const u8, A) -> R,
    /// Destructs the closure and frees its storage through the allocator that
    /// produced it.
    drop_free: unsafe fn(*mut u8),
}

impl<A, R> Clone for ErasedVTable<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for ErasedVTable<A, R> {}

unsafe fn invoke_raw<F: Fn(A) -> R, A, R>(data: *const u8, arg: A) -> R {
    unsafe { (*(data as *const F))(arg) }
}

unsafe fn drop_raw<F>(data: *mut u8) {
    unsafe {
        (data as *mut F).drop_in_place();
    }
}

unsafe fn drop_free_shared_slot<F>(data: *mut u8) {
    unsafe {
        (data as *mut F).drop_in_place();
        pool::free_shared_slot(NonNull::new_unchecked(data as *mut FnSlot));
    }
}

unsafe fn drop_free_local_slot<F>(data: *mut u8) {
    unsafe {
        (data as *mut F).drop_in_place();
        pool::free_local_slot(NonNull::new_unchecked(data as *mut FnSlot));
    }
}

unsafe fn drop_free_heap<F>(data: *mut u8) {
    unsafe {
        (data as *mut F).drop_in_place();
        dealloc(data, Layout::new::<F>());
    }
}

/// Which pool family serves the fixed-size slot.
#[derive(Clone, Copy)]
enum SlotSource {
    Shared,
    Local,
}

/// A populated erased closure: data pointer plus vtable.
struct ErasedObj<A, R> {
    data: NonNull<u8>,
    vtable: ErasedVTable<A, R>,
}

impl<A, R> Clone for ErasedObj<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for ErasedObj<A, R> {}

/// Allocates storage for `f` — a pooled slot when it fits, the global
/// allocator otherwise — and constructs it in place.
/// 为 `f` 分配存储 —— 合适时用池化槽，否则用全局分配器 ——
/// 并原地构造。
fn erect<F, A, R>(f: F, source: SlotSource) -> Result<ErasedObj<A, R>, Error>
where
    F: Fn(A) -> R + 'static,
{
    let layout = Layout::new::<F>();

    let (data, drop_free) = if sbo::fits_slot(layout) {
        let slot = match source {
            SlotSource::Shared => pool::try_alloc_shared_slot()?,
            SlotSource::Local => pool::try_alloc_local_slot()?,
        };
        let drop_free = match source {
            SlotSource::Shared => drop_free_shared_slot::<F> as unsafe fn(*mut u8),
            SlotSource::Local => drop_free_local_slot::<F> as unsafe fn(*mut u8),
        };
        (slot.cast::<u8>(), drop_free)
    } else {
        let data = NonNull::new(unsafe { alloc(layout) })
            .ok_or(Error::AllocFailed { size: layout.size() })?;
        (data, drop_free_heap::<F> as unsafe fn(*mut u8))
    };

    unsafe {
        (data.as_ptr() as *mut F).write(f);
    }

    Ok(ErasedObj {
        data,
        vtable: ErasedVTable {
            invoke: invoke_raw::<F, A, R>,
            drop_free,
        },
    })
}

/// A cross-thread callable payload.
///
/// Small captures live in a block from the shared slot pool; oversized ones
/// fall back to the global allocator. Both behave identically from the
/// caller's perspective. The closure must be `Send + Sync` because the
/// wrapping handle may be cloned to, invoked from, and dropped on any thread.
///
/// 跨线程的可调用负载。
/// 小捕获存放在共享槽池的块中；过大的捕获回退到全局分配器。
/// 从调用者的角度看两者行为完全一致。闭包必须是 `Send + Sync`，
/// 因为包装它的句柄可能在任意线程上被克隆、调用和 drop。
pub struct FnPayload<A, R> {
    obj: Option<ErasedObj<A, R>>,
}

impl<A, R> FnPayload<A, R> {
    pub fn make<F>(f: F) -> Result<Self, Error>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Ok(FnPayload {
            obj: Some(erect(f, SlotSource::Shared)?),
        })
    }
}

impl<A, R> Clone for FnPayload<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for FnPayload<A, R> {}

impl<A, R> Payload for FnPayload<A, R> {
    #[inline]
    fn empty() -> Self {
        FnPayload { obj: None }
    }

    #[inline]
    fn has_value(&self) -> bool {
        self.obj.is_some()
    }

    unsafe fn destroy(&mut self) {
        if let Some(obj) = self.obj.take() {
            unsafe {
                (obj.vtable.drop_free)(obj.data.as_ptr());
            }
        }
    }
}

impl<A, R> Callable<A> for FnPayload<A, R> {
    type Output = R;

    fn call(&self, arg: A) -> Result<R, Error> {
        let obj = self.obj.as_ref().ok_or(Error::NotCallable)?;
        Ok(unsafe { (obj.vtable.invoke)(obj.data.as_ptr(), arg) })
    }
}

// Construction requires `F: Send + Sync`, so the erased object may move
// between and be invoked from any thread.
unsafe impl<A, R> Send for FnPayload<A, R> {}
unsafe impl<A, R> Sync for FnPayload<A, R> {}

/// The single-thread counterpart of [`FnPayload`]: no `Send + Sync` bound on
/// the closure, slots come from the thread-local pool, and the payload itself
/// is `!Send` so it can never leave its allocating thread.
///
/// [`FnPayload`] 的单线程对应物：闭包没有 `Send + Sync` 约束，
/// 槽来自线程本地池，负载本身是 `!Send` 的，
/// 因此它永远不会离开分配它的线程。
pub struct LocalFnPayload<A, R> {
    obj: Option<ErasedObj<A, R>>,
    _not_send: PhantomData<*mut ()>,
}

impl<A, R> LocalFnPayload<A, R> {
    pub fn make<F>(f: F) -> Result<Self, Error>
    where
        F: Fn(A) -> R + 'static,
    {
        Ok(LocalFnPayload {
            obj: Some(erect(f, SlotSource::Local)?),
            _not_send: PhantomData,
        })
    }
}

impl<A, R> Clone for LocalFnPayload<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for LocalFnPayload<A, R> {}

impl<A, R> Payload for LocalFnPayload<A, R> {
    #[inline]
    fn empty() -> Self {
        LocalFnPayload {
            obj: None,
            _not_send: PhantomData,
        }
    }

    #[inline]
    fn has_value(&self) -> bool {
        self.obj.is_some()
    }

    unsafe fn destroy(&mut self) {
        if let Some(obj) = self.obj.take() {
            unsafe {
                (obj.vtable.drop_free)(obj.data.as_ptr());
            }
        }
    }
}

impl<A, R> Callable<A> for LocalFnPayload<A, R> {
    type Output = R;

    fn call(&self, arg: A) -> Result<R, Error> {
        let obj = self.obj.as_ref().ok_or(Error::NotCallable)?;
        Ok(unsafe { (obj.vtable.invoke)(obj.data.as_ptr(), arg) })
    }
}

enum InlineState {
    Empty,
    Inline { layout: Layout },
    Spilled { ptr: NonNull<u8>, layout: Layout },
}

/// A standalone movable callable with an embedded inline buffer.
///
/// Captures whose layout fits the `N`-byte buffer are stored inline — no
/// allocation at all. Larger captures spill to the global allocator. Because
/// the value is movable, the inline case stores only a discriminant and
/// recomputes the data pointer from the buffer base on every use.
///
/// 带内嵌内联缓冲区的独立可移动可调用对象。
/// 布局适合 `N` 字节缓冲区的捕获被内联存储 —— 完全不分配。
/// 更大的捕获溢出到全局分配器。因为该值是可移动的，内联情况只存储
/// 一个判别值，并在每次使用时从缓冲区基址重新计算数据指针。
pub struct InlineFn<A, R, const N: usize = 32> {
    buf: InlineBuf<N>,
    state: InlineState,
    vtable: Option<ErasedVTable<A, R>>,
}

impl<A, R, const N: usize> InlineFn<A, R, N> {
    pub fn make<F>(f: F) -> Result<Self, Error>
    where
        F: Fn(A) -> R + 'static,
    {
        let layout = Layout::new::<F>();
        let buf = InlineBuf::<N>::new();
        let ptr = buf.allocate(layout)?;
        unsafe {
            (ptr.as_ptr() as *mut F).write(f);
        }
        let state = if buf.contains(ptr.as_ptr()) {
            InlineState::Inline { layout }
        } else {
            InlineState::Spilled { ptr, layout }
        };
        Ok(InlineFn {
            buf,
            state,
            vtable: Some(ErasedVTable {
                invoke: invoke_raw::<F, A, R>,
                drop_free: drop_raw::<F>,
            }),
        })
    }

    /// The empty, not-callable value.
    pub fn empty() -> Self {
        InlineFn {
            buf: InlineBuf::new(),
            state: InlineState::Empty,
            vtable: None,
        }
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        self.vtable.is_some()
    }

    /// Whether the capture lives in the embedded buffer (as opposed to the
    /// fallback allocation).
    /// 捕获是否存放在内嵌缓冲区中（而不是回退分配中）。
    #[inline]
    pub fn is_inline(&self) -> bool {
        matches!(self.state, InlineState::Inline { .. })
    }

    /// Destroys the capture and empties the value.
    pub fn reset(&mut self) {
        let Some(vtable) = self.vtable.take() else {
            return;
        };
        match mem::replace(&mut self.state, InlineState::Empty) {
            InlineState::Inline { layout } => unsafe {
                let ptr = NonNull::new_unchecked(self.buf.base());
                (vtable.drop_free)(ptr.as_ptr());
                // Inline pointer: the range test makes this a no-op.
                self.buf.deallocate(ptr, layout);
            },
            InlineState::Spilled { ptr, layout } => unsafe {
                (vtable.drop_free)(ptr.as_ptr());
                self.buf.deallocate(ptr, layout);
            },
            InlineState::Empty => {}
        }
    }
}

impl<A, R, const N: usize> Callable<A> for InlineFn<A, R, N> {
    type Output = R;

    fn call(&self, arg: A) -> Result<R, Error> {
        let vtable = self.vtable.as_ref().ok_or(Error::NotCallable)?;
        let data = match &self.state {
            InlineState::Inline { .. } => self.buf.base() as *const u8,
            InlineState::Spilled { ptr, .. } => ptr.as_ptr() as *const u8,
            InlineState::Empty => return Err(Error::NotCallable),
        };
        Ok(unsafe { (vtable.invoke)(data, arg) })
    }
}

impl<A, R, const N: usize> Drop for InlineFn<A, R, N> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<A, R, const N: usize> Default for InlineFn<A, R, N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A, R, const N: usize> std::fmt::Debug for InlineFn<A, R, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineFn")
            .field("has_value", &self.has_value())
            .field("is_inline", &self.is_inline())
            .finish()
    }
}
