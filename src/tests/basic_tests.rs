/// 基础测试模块
/// 测试三个句柄家族核心功能的正确性
use crate::{
    ArrayPayload, BoxPayload, Callable, FnPayload, InlineFn, LocalStrong, Strong, Unique, Weak,
};

/// 测试1: 创建并解引用 Strong
#[test]
fn test_strong_make_and_deref() {
    let s: Strong<BoxPayload<i32>> = Strong::make(42);

    assert!(s.has_value());
    assert_eq!(*s, 42);
    assert_eq!(s.strong_count(), 1);
}

/// 测试2: 克隆共享同一个负载
#[test]
fn test_strong_clone_shares_payload() {
    let a: Strong<BoxPayload<String>> = Strong::make(String::from("hello"));
    let b = a.clone();

    assert_eq!(*a, "hello");
    assert_eq!(*b, "hello");
    assert_eq!(a.strong_count(), 2);
    assert_eq!(b.strong_count(), 2);

    // 指向同一个资源
    assert!(std::ptr::eq(&*a, &*b));
}

/// 测试3: 弱句柄升级
#[test]
fn test_weak_lock_while_alive() {
    let s: Strong<BoxPayload<i32>> = Strong::make(7);
    let w = s.share_weak();

    assert!(w.has_value());
    assert!(!w.expired());

    let locked = w.lock();
    assert!(locked.has_value());
    assert_eq!(*locked, 7);
    assert_eq!(s.strong_count(), 2);
}

/// 测试4: 负载销毁后升级失败
#[test]
fn test_weak_lock_after_death() {
    let s: Strong<BoxPayload<i32>> = Strong::make(7);
    let w = s.share_weak();

    drop(s);

    assert!(w.expired());
    let locked = w.lock();
    assert!(!locked.has_value());
}

/// 测试5: reset 清空句柄
#[test]
fn test_strong_reset() {
    let mut s: Strong<BoxPayload<i32>> = Strong::make(1);
    s.reset();

    assert!(!s.has_value());
    assert_eq!(s.strong_count(), 0);

    // reset 空句柄是无害的
    s.reset();
    assert!(!s.has_value());
}

/// 测试6: take 移出句柄
#[test]
fn test_strong_take() {
    let mut a: Strong<BoxPayload<i32>> = Strong::make(9);
    let b = a.take();

    assert!(!a.has_value());
    assert!(b.has_value());
    assert_eq!(*b, 9);
}

/// 测试7: 空句柄的克隆与共享
#[test]
fn test_empty_strong_clone_and_share() {
    let s: Strong<BoxPayload<i32>> = Strong::new();
    let c = s.clone();
    let w = s.share_weak();

    assert!(!c.has_value());
    assert!(!w.has_value());
    assert!(w.expired());
    assert!(!w.lock().has_value());
}

/// 测试8: 数组句柄与切片访问
#[test]
fn test_array_handle() {
    let s: Strong<ArrayPayload<u32>> = Strong::make_array(4, 5).unwrap();

    assert!(s.has_value());
    assert_eq!(s.len(), 4);
    assert_eq!(&*s, &[5, 5, 5, 5]);
    assert_eq!(*s.at(3).unwrap(), 5);
}

/// 测试9: Unique 的独占所有权与可变访问
#[test]
fn test_unique_mutable_access() {
    let mut u: Unique<BoxPayload<Vec<i32>>> = Unique::make(vec![1, 2]);

    u.push(3);
    assert_eq!(&*u, &[1, 2, 3]);

    let moved = u.take();
    assert!(!u.has_value());
    assert_eq!(&*moved, &[1, 2, 3]);
}

/// 测试10: Unique 数组的带检查可变访问
#[test]
fn test_unique_array_at_mut() {
    let mut u: Unique<ArrayPayload<i32>> = Unique::make_array(3, 0).unwrap();

    *u.at_mut(1).unwrap() = 42;
    assert_eq!(&*u, &[0, 42, 0]);
}

/// 测试10b: 数组的填充、逐元素修改与迭代求和
#[test]
fn test_array_fill_mutate_sum() {
    let mut u: Unique<ArrayPayload<u64>> = Unique::make_array(5, 1).unwrap();

    for (i, elem) in u.iter_mut().enumerate() {
        *elem += i as u64;
    }

    // 1+2+3+4+5
    assert_eq!(u.iter().sum::<u64>(), 15);
    assert!(u.at(4).is_ok());
    assert!(u.at(5).is_err());
}

/// 测试11: 单线程句柄家族
#[test]
fn test_local_strong_and_weak() {
    let s: LocalStrong<BoxPayload<i32>> = LocalStrong::make(11);
    let c = s.clone();
    let w = s.share_weak();

    assert_eq!(*s, 11);
    assert_eq!(s.strong_count(), 2);
    assert!(w.lock().has_value());

    drop(s);
    drop(c);
    assert!(!w.lock().has_value());
}

/// 测试12: 可调用句柄
#[test]
fn test_callable_handle() {
    let f: Strong<FnPayload<i32, i32>> = Strong::make_fn(|x| x * 2).unwrap();

    assert_eq!(f.call(21).unwrap(), 42);

    // 克隆共享同一个闭包
    let g = f.clone();
    assert_eq!(g.call(5).unwrap(), 10);
}

/// 测试13: 单线程可调用句柄接受 !Send 闭包
#[test]
fn test_local_callable_handle() {
    use std::rc::Rc;

    let captured = Rc::new(10);
    let f = LocalStrong::make_fn(move |x: i32| x + *captured).unwrap();

    assert_eq!(f.call(5).unwrap(), 15);
}

/// 测试14: InlineFn 内联存储
#[test]
fn test_inline_fn() {
    let offset = 8i64;
    let f: InlineFn<i64, i64> = InlineFn::make(move |x| x + offset).unwrap();

    assert!(f.has_value());
    assert!(f.is_inline());
    assert_eq!(f.call(34).unwrap(), 42);
}

/// 测试15: Weak 的克隆与 take
#[test]
fn test_weak_clone_and_take() {
    let s: Strong<BoxPayload<i32>> = Strong::make(1);
    let mut w: Weak<BoxPayload<i32>> = s.share_weak();
    let w2 = w.clone();

    let taken = w.take();
    assert!(!w.has_value());
    assert!(taken.has_value());
    assert!(w2.lock().has_value());
}

/// 测试16: Default 产生空句柄
#[test]
fn test_default_is_empty() {
    assert!(!Strong::<BoxPayload<i32>>::default().has_value());
    assert!(!Weak::<BoxPayload<i32>>::default().has_value());
    assert!(!LocalStrong::<BoxPayload<i32>>::default().has_value());
    assert!(!Unique::<BoxPayload<i32>>::default().has_value());
    assert!(!InlineFn::<i32, i32>::default().has_value());
}
