//! # Memoization Wrapper
//!
//! 把调用点与缓存银行粘合起来的拦截组合子。
//!
//! ## 调用流程
//!
//! 1. 派生调用键，锁下查找；命中立即返回缓存值
//! 2. 未命中时在锁外调用底层函数（两个线程可能重复计算同一键）
//! 3. 重新持锁写入结果；写入失败被吞掉并以 WARN 记录，
//!    已算出的值照常返回——缓存故障不得改变被包装调用的契约
//!
//! ## 递归
//!
//! 底层函数收到 `&Memoized` 自身的引用，递归的记忆化调用
//! （例如斐波那契）经由它重新进入银行；银行锁可重入，同一
//! 执行上下文不会自锁。
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use membank_core::{BankConfig, CacheBank, CallArgs, Value};
//!
//! # fn main() -> membank_core::Result<()> {
//! let bank = Arc::new(CacheBank::new(BankConfig::default())?);
//! let double = bank.wrap("double", |_, call| {
//!     let n = call.args[0].as_int().unwrap_or(0);
//!     Ok(Value::Int(n * 2))
//! });
//! assert_eq!(double.call(&CallArgs::positional([21i64]))?, Value::Int(42));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::cache::bank::CacheBank;
use crate::error::Result;
use crate::key;
use crate::types::{CallArgs, FuncId, Value};

/// 被包装的底层函数
///
/// 第一个参数是包装器自身，用于递归的记忆化调用。
pub type MemoFn = dyn Fn(&Memoized, &CallArgs) -> Result<Value> + Send + Sync;

/// 绑定到一个函数的记忆化组合子
#[derive(Clone)]
pub struct Memoized {
    bank: Arc<CacheBank>,
    id: FuncId,
    func: Arc<MemoFn>,
}

impl Memoized {
    /// 函数标识
    pub fn id(&self) -> &FuncId {
        &self.id
    }

    /// 所属银行
    pub fn bank(&self) -> &Arc<CacheBank> {
        &self.bank
    }

    /// 经由缓存调用底层函数
    ///
    /// # 返回
    /// - `Result<Value>`: 底层函数的失败原样向上传播；键派生失败
    ///   时调用中止，无缓存效果。命中时底层函数不被调用。
    pub fn call(&self, call: &CallArgs) -> Result<Value> {
        let key = key::derive(call)?;

        if let Some(hit) = self.bank.get_keyed(&self.id, &key) {
            return Ok(hit);
        }

        // 计算在锁外进行
        let value = (self.func)(self, call)?;

        if let Err(err) = self.bank.set_keyed(&self.id, key, value.clone()) {
            tracing::warn!("Result of {} was computed but not cached: {}", self.id, err);
        }

        Ok(value)
    }
}

impl std::fmt::Debug for Memoized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoized").field("id", &self.id).finish()
    }
}

impl CacheBank {
    /// 包装一个函数，使用银行默认的单函数预算
    pub fn wrap<F>(self: &Arc<Self>, name: impl Into<String>, func: F) -> Memoized
    where
        F: Fn(&Memoized, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let id = self.register(name, None);
        Memoized {
            bank: Arc::clone(self),
            id,
            func: Arc::new(func),
        }
    }

    /// 包装一个函数并覆盖其内存预算
    ///
    /// # 参数
    /// - `max_memory`: 仅对该函数生效的字节预算
    pub fn wrap_with_limit<F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        max_memory: u64,
        func: F,
    ) -> Memoized
    where
        F: Fn(&Memoized, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let id = self.register(name, Some(max_memory));
        Memoized {
            bank: Arc::clone(self),
            id,
            func: Arc::new(func),
        }
    }
}
