//! # Cache Module
//!
//! 记忆化缓存银行的核心实现。
//!
//! ## 模块结构
//!
//! - `bank`: 两级缓存银行与全行级淘汰
//! - `func`: 单函数有界缓存与条目级淘汰
//! - `wrapper`: 调用拦截组合子
//! - `stats`: 命中/未命中统计快照
//!
//! ## 特性
//!
//! - 两级 LRU 淘汰（条目级 + 函数级），各自独立的字节预算
//! - 编码尺寸核算：值的足迹即其在所选编解码器下的字节长度
//! - 可重入银行锁，递归的记忆化调用不自锁
//! - 缓存统计与只读快照遍历
//!
//! ## 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use membank_core::{BankConfig, CacheBank, CallArgs, Value};
//!
//! # fn main() -> membank_core::Result<()> {
//! let bank = Arc::new(CacheBank::new(BankConfig::default())?);
//!
//! let add = bank.wrap("add", |_, call| {
//!     let a = call.args[0].as_int().unwrap_or(0);
//!     let b = call.args[1].as_int().unwrap_or(0);
//!     Ok(Value::Int(a + b))
//! });
//!
//! add.call(&CallArgs::positional([2i64, 3]))?;
//!
//! let stats = bank.stats();
//! println!("Hit rate: {:.2}%", stats.hit_rate * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod bank;
pub mod func;
pub mod stats;
pub mod wrapper;

pub use bank::CacheBank;
pub use stats::{BankStats, FuncStats};
pub use wrapper::{MemoFn, Memoized};
