//! # MemBank Core Library
//!
//! Core library for MemBank, an in-process memoization engine.
//!
//! This library associates pure functions with bounded caches of their
//! previously computed results, keyed by call arguments, and evicts
//! entries under memory and count pressure.
//!
//! ## Architecture
//!
//! - **Types**: the closed value universe, call arguments, function identity
//! - **Key**: canonical call-key derivation (kwarg order independent)
//! - **Codec**: five interchangeable snapshot encodings (bincode, zlib,
//!   gzip, json, yaml), shared by size accounting and persistence
//! - **Cache**: two-level bank (per-function and bank-wide) with
//!   independent byte budgets and LRU eviction
//! - **Persist**: atomic whole-bank save/load with a file size ceiling
//! - **Config**: bank construction options with TOML loading
//!
//! ## Philosophy
//!
//! - No implicit singleton: the bank is an explicit value owned by
//!   application code, shared through `Arc`
//! - One reentrant lock serializes all bank operations; recursive
//!   memoized calls never deadlock
//! - The wrapped function's contract is sacred: a caching failure never
//!   changes what the caller gets back
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use membank_core::{BankConfig, CacheBank, CallArgs, Value};
//!
//! # fn main() -> membank_core::Result<()> {
//! let bank = Arc::new(CacheBank::new(BankConfig::default())?);
//!
//! let fib = bank.wrap("fib", |me, call| {
//!     let n = call.args[0].as_int().unwrap_or(0);
//!     if n < 2 {
//!         return Ok(Value::Int(n));
//!     }
//!     let a = me.call(&CallArgs::positional([n - 1]))?;
//!     let b = me.call(&CallArgs::positional([n - 2]))?;
//!     Ok(Value::Int(a.as_int().unwrap_or(0) + b.as_int().unwrap_or(0)))
//! });
//!
//! assert_eq!(fib.call(&CallArgs::positional([30i64]))?, Value::Int(832040));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod persist;
pub mod types;

mod guard;

pub use cache::{BankStats, CacheBank, FuncStats, MemoFn, Memoized};
pub use codec::{CacheFormat, Codec};
pub use config::BankConfig;
pub use error::{BankError, Result};
pub use key::{CallKey, KeyPart};
pub use persist::{BankSnapshot, EntrySnapshot, FuncSnapshot};
pub use types::{CallArgs, FuncId, Value};
