//! Recoverable error types surfaced at the library boundary.
//!
//! Only conditions a caller can reasonably react to live here: checked array
//! indexing, allocator exhaustion, and invoking a callable handle that has been
//! moved out of or reset. Precondition violations (dereferencing an empty
//! handle) are asserted, not returned.
//!
//! 在库边界上暴露的可恢复错误类型。
//! 只有调用者能够合理应对的情况才放在这里：带检查的数组索引、
//! 分配器耗尽、以及调用一个已被移走或重置的可调用句柄。
//! 前置条件违规（解引用空句柄）使用断言而不是返回错误。

/// Errors that can occur while constructing or accessing handle payloads.
/// 构造或访问句柄负载时可能出现的错误。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Checked element access past the end of an array payload.
    /// 带检查的元素访问越过了数组负载的末尾。
    #[error("index {index} out of range for array of length {len}")]
    OutOfRange { index: usize, len: usize },

    /// The underlying allocator returned null.
    /// 底层分配器返回了空指针。
    #[error("allocation of {size} bytes failed")]
    AllocFailed { size: usize },

    /// The callable handle holds no invocable (empty, moved-from, or reset).
    /// 可调用句柄不持有任何可调用对象（空、已被移走或已重置）。
    #[error("callable handle is empty")]
    NotCallable,
}
