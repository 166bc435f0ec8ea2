/// 边界情况测试模块
/// 测试空句柄、越界访问、构造中途 panic 的回滚、以及两级回退分配路径
use crate::{
    ArrayPayload, BoxPayload, Callable, Error, FnPayload, InlineFn, LocalPool, SharedPool, Strong,
    Unique,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试1: 解引用空句柄快速失败
#[test]
#[should_panic(expected = "dereferenced an empty handle")]
fn test_deref_empty_strong_panics() {
    let s: Strong<BoxPayload<i32>> = Strong::new();
    let _ = *s;
}

/// 测试2: 可变解引用空 Unique 同样快速失败
#[test]
#[should_panic(expected = "dereferenced an empty handle")]
fn test_deref_mut_empty_unique_panics() {
    let mut u: Unique<BoxPayload<i32>> = Unique::new();
    *u = 1;
}

/// 测试3: 带检查的数组访问报告越界
#[test]
fn test_array_out_of_range() {
    let s: Strong<ArrayPayload<i32>> = Strong::make_array(3, 0).unwrap();

    assert!(s.at(2).is_ok());
    match s.at(3) {
        Err(Error::OutOfRange { index, len }) => {
            assert_eq!(index, 3);
            assert_eq!(len, 3);
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

/// 测试4: 长度为零的数组产生空句柄
#[test]
fn test_zero_length_array() {
    let s: Strong<ArrayPayload<i32>> = Strong::make_array(0, 7).unwrap();

    assert!(!s.has_value());
    match s.at(0) {
        Err(Error::OutOfRange { index: 0, len: 0 }) => {}
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}

/// 克隆到第三次时 panic 的元素类型
#[derive(Debug)]
struct PanicOnThirdClone {
    clones: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl Clone for PanicOnThirdClone {
    fn clone(&self) -> Self {
        if self.clones.fetch_add(1, Ordering::SeqCst) == 2 {
            panic!("clone failed");
        }
        PanicOnThirdClone {
            clones: self.clones.clone(),
            drops: self.drops.clone(),
        }
    }
}

impl Drop for PanicOnThirdClone {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// 测试5: 构造中途 panic 时回滚已构造的元素
#[test]
fn test_array_make_rolls_back_on_panic() {
    let clones = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let fill = PanicOnThirdClone {
        clones: clones.clone(),
        drops: drops.clone(),
    };

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = Strong::<ArrayPayload<PanicOnThirdClone>>::make_array(10, fill);
    }));
    assert!(result.is_err());

    // 两个成功构造的元素被回滚，fill 本体随展开被 drop
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

/// 测试6: 空的可调用句柄返回 NotCallable
#[test]
fn test_not_callable() {
    let f: Strong<FnPayload<i32, i32>> = Strong::new();
    assert!(matches!(f.call(1), Err(Error::NotCallable)));

    let mut g: InlineFn<i32, i32> = InlineFn::make(|x| x).unwrap();
    assert_eq!(g.call(3).unwrap(), 3);
    g.reset();
    assert!(matches!(g.call(3), Err(Error::NotCallable)));
}

/// 测试7: InlineFn 的内联与溢出路径
#[test]
fn test_inline_fn_spill() {
    // 小捕获：内联
    let small: InlineFn<(), usize> = InlineFn::make(|()| 1).unwrap();
    assert!(small.is_inline());

    // 大捕获：溢出到全局分配器，行为不变
    let big_capture = [7u8; 64];
    let big: InlineFn<(), usize, 32> =
        InlineFn::make(move |()| big_capture.iter().map(|&b| b as usize).sum()).unwrap();
    assert!(!big.is_inline());
    assert_eq!(big.call(()).unwrap(), 7 * 64);
}

/// 测试8: InlineFn 溢出路径销毁捕获的环境
#[test]
fn test_inline_fn_spill_destroys_capture() {
    let drops = Arc::new(AtomicUsize::new(0));

    struct NoisyDrop(Arc<AtomicUsize>);
    impl Drop for NoisyDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let noisy = NoisyDrop(drops.clone());
    let padding = [0u8; 64];
    let f: InlineFn<(), u8, 32> = InlineFn::make(move |()| {
        let _keep = &noisy;
        padding[0]
    })
    .unwrap();
    assert!(!f.is_inline());

    drop(f);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// 测试9: 超过槽大小的共享闭包走堆回退
#[test]
fn test_fn_payload_heap_fallback() {
    let big_capture = [3u64; 16]; // 128 字节，超过 64 字节的槽
    let f = Strong::make_fn(move |i: usize| big_capture[i]).unwrap();

    assert_eq!(f.call(0).unwrap(), 3);
    let g = f.clone();
    drop(f);
    assert_eq!(g.call(15).unwrap(), 3);
}

/// 测试10: 池的 retain_cap 限制缓存数量
#[test]
fn test_pool_retain_cap() {
    let pool: SharedPool<u64> = SharedPool::with_retain_cap(2);

    let blocks: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
    assert_eq!(pool.cached_blocks(), 0);

    for b in blocks {
        unsafe { pool.deallocate(b) };
    }
    // 只缓存 2 个，其余直接归还全局分配器
    assert_eq!(pool.cached_blocks(), 2);

    let stats = pool.stats();
    assert_eq!(stats.allocations, 4);
    assert_eq!(stats.deallocations, 4);
    assert_eq!(stats.fresh_misses, 4);
    assert_eq!(stats.peak_cached, 2);

    pool.shrink();
    assert_eq!(pool.cached_blocks(), 0);
}

/// 测试11: 池的复用统计
#[test]
fn test_pool_reuse_stats() {
    let pool: LocalPool<u64> = LocalPool::new();

    let a = pool.allocate();
    unsafe { pool.deallocate(a) };
    let b = pool.allocate();
    unsafe { pool.deallocate(b) };

    let stats = pool.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.reuse_hits, 1);
    assert_eq!(stats.fresh_misses, 1);
    assert_eq!(stats.reuse_ratio(), 0.5);
    assert!(stats.summary().contains("reuse"));
}

/// 测试12: 空句柄上的全部操作都是无害的
#[test]
fn test_empty_handle_operations() {
    let mut s: Strong<BoxPayload<i32>> = Strong::new();

    assert!(!s.has_value());
    assert_eq!(s.strong_count(), 0);
    assert!(!s.clone().has_value());
    assert!(!s.share_weak().has_value());
    s.reset();
    assert!(!s.take().has_value());
}

/// 测试13: reset 后重新赋值句柄
#[test]
fn test_reuse_handle_after_reset() {
    let mut s: Strong<BoxPayload<i32>> = Strong::make(1);
    s.reset();

    s = Strong::make(2);
    assert_eq!(*s, 2);
}

/// 测试14: 零大小参数与返回值的可调用句柄
#[test]
fn test_unit_callable() {
    let f = Strong::make_fn(|(): ()| {}).unwrap();
    f.call(()).unwrap();

    let g: InlineFn<(), ()> = InlineFn::make(|()| {}).unwrap();
    g.call(()).unwrap();
}

/// 测试15: 零大小元素的数组不经过全局分配器
#[test]
fn test_zst_array() {
    static ZST_DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Flag;
    impl Clone for Flag {
        fn clone(&self) -> Self {
            Flag
        }
    }
    impl Drop for Flag {
        fn drop(&mut self) {
            ZST_DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    let u: Unique<ArrayPayload<Flag>> = Unique::make_array(4, Flag).unwrap();
    assert!(u.has_value());
    assert_eq!(u.len(), 4);
    assert!(u.at(3).is_ok());
    assert!(u.at(4).is_err());

    drop(u);
    // 3 个克隆加上按值移入的 fill 本体
    assert_eq!(ZST_DROPS.load(Ordering::SeqCst), 4);

    // 无 Drop 的零大小元素同样完整地走一遍生命周期
    let s: Strong<ArrayPayload<()>> = Strong::make_array(3, ()).unwrap();
    let t = s.clone();
    assert_eq!(s.len(), 3);
    drop(s);
    assert_eq!(t.len(), 3);
}

/// 测试16: 数组布局溢出报告为分配失败
#[test]
fn test_array_layout_overflow() {
    match Strong::<ArrayPayload<u64>>::make_array(usize::MAX, 0) {
        Err(Error::AllocFailed { size }) => assert_eq!(size, usize::MAX),
        other => panic!("expected AllocFailed, got {other:?}"),
    }
}
