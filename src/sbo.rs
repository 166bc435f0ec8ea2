//! Small-buffer-optimized storage for type-erased callables.
//!
//! Two strategies coexist. [`InlineBuf`] embeds a fixed byte buffer directly
//! in its owner and only falls back to the global allocator when the value is
//! too large or over-aligned. [`FnSlot`] is a fixed-size block served by the
//! shared or thread-local pools, so small captured closures behind shared
//! handles avoid a heap round-trip while large ones still work through the
//! fallback.
//!
//! 为类型擦除可调用对象提供的小缓冲区优化存储。
//! 两种策略并存。[`InlineBuf`] 将固定字节缓冲区直接嵌入其所有者，
//! 仅当值过大或对齐要求过高时才回退到全局分配器。[`FnSlot`] 是由
//! 共享池或线程本地池提供的固定大小块，使共享句柄背后的小闭包避免
//! 一次堆分配往返，而大闭包仍然通过回退路径正常工作。

use crate::error::Error;
use std::alloc::{Layout, alloc, dealloc};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Size of one pooled callable slot in bytes.
/// 单个池化可调用槽的字节大小。
pub(crate) const FN_SLOT_SIZE: usize = 64;

/// Alignment of slots and inline buffers.
/// 槽与内联缓冲区的对齐。
pub(crate) const FN_SLOT_ALIGN: usize = 16;

/// One pooled block sized to hold a small erased closure.
/// 大小足以容纳一个小型擦除闭包的池化块。
#[repr(C, align(16))]
pub(crate) struct FnSlot {
    _bytes: [MaybeUninit<u8>; FN_SLOT_SIZE],
}

/// Whether a value with this layout fits a pooled slot.
#[inline]
pub(crate) fn fits_slot(layout: Layout) -> bool {
    layout.size() <= FN_SLOT_SIZE && layout.align() <= FN_SLOT_ALIGN
}

/// A fixed inline byte buffer with global-allocator fallback.
///
/// `allocate` hands out a pointer into the embedded buffer when the layout
/// fits (size and alignment), otherwise it delegates to the global allocator.
/// `deallocate` is a no-op for inline pointers — detected by a range
/// membership test against the buffer bounds — and frees fallback pointers.
///
/// The buffer serves at most one live allocation at a time; the owner is
/// responsible for not requesting a second inline allocation while the first
/// is outstanding.
///
/// 带全局分配器回退的固定内联字节缓冲区。
/// 当布局（大小与对齐）合适时 `allocate` 交出指向内嵌缓冲区的指针，
/// 否则委托给全局分配器。`deallocate` 对内联指针是空操作 ——
/// 通过对缓冲区边界的范围成员测试检测 —— 对回退指针则执行释放。
/// 缓冲区同一时刻最多服务一个存活的分配；所有者负责在前一个分配
/// 仍然存在时不再请求第二个内联分配。
#[repr(align(16))]
pub struct InlineBuf<const N: usize> {
    bytes: UnsafeCell<[MaybeUninit<u8>; N]>,
}

impl<const N: usize> InlineBuf<N> {
    pub const fn new() -> Self {
        InlineBuf {
            bytes: UnsafeCell::new([MaybeUninit::uninit(); N]),
        }
    }

    /// Whether a value with this layout can live inline.
    #[inline]
    pub fn fits(layout: Layout) -> bool {
        layout.size() <= N && layout.align() <= FN_SLOT_ALIGN
    }

    /// Base address of the embedded buffer.
    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.bytes.get().cast()
    }

    /// Hands out storage for `layout`: inline when it fits, global allocator
    /// otherwise.
    /// 为 `layout` 交出存储：合适时用内联缓冲区，否则用全局分配器。
    pub fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, Error> {
        if Self::fits(layout) {
            // The buffer itself is 16-byte aligned and `fits` bounds the
            // requested alignment, so the base pointer is always compatible.
            return Ok(unsafe { NonNull::new_unchecked(self.base()) });
        }
        NonNull::new(unsafe { alloc(layout) })
            .ok_or(Error::AllocFailed { size: layout.size() })
    }

    /// Range membership test: does `ptr` point into the embedded buffer?
    /// 范围成员测试：`ptr` 是否指向内嵌缓冲区？
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + N.max(1)
    }

    /// No-op for inline pointers, frees fallback pointers.
    ///
    /// # Safety
    /// `ptr` must have been produced by `allocate` on this buffer with the
    /// same `layout`, and its content must already be dropped.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if self.contains(ptr.as_ptr()) {
            return;
        }
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

impl<const N: usize> Default for InlineBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for InlineBuf<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineBuf").field("capacity", &N).finish()
    }
}
