//! # Reentrant Bank Guard
//!
//! 银行状态的可重入互斥访问。
//!
//! 所有读写银行的操作都经过同一把可重入锁：被记忆化的函数在
//! 计算过程中递归调用自身（或另一个被记忆化的函数）时，同一
//! 执行上下文再次进入银行不会自锁；不同线程之间照常串行。
//!
//! `RefCell` 的可变借用被限制在 [`GuardedState::with`] 的闭包
//! 内部。闭包内不得再调用同一实例的 `with`——包装器把被包装
//! 函数的计算放在锁外执行，正是为了维持这一点。

use std::cell::RefCell;

use parking_lot::ReentrantMutex;

/// 可重入锁保护的共享状态
pub(crate) struct GuardedState<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> GuardedState<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// 持锁执行一段状态操作
    ///
    /// 同一线程可在未持有借用时重入获取锁；闭包返回后立即释放
    /// 借用与锁。
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }
}
