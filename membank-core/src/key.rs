//! # Call Key Derivation
//!
//! 调用参数的规范化键派生模块。
//!
//! ## 规则
//!
//! - 位置参数按调用顺序参与派生，顺序敏感
//! - 关键字参数按名称排序后参与派生，与调用方提供顺序无关
//! - 浮点数按位模式规范化，`-0.0` 折叠为 `0.0`
//! - NaN 在键相等语义下不可比较，派生失败
//! - 嵌套 Map 按键名排序，重复键名派生失败
//!
//! ## 示例
//!
//! ```rust
//! use membank_core::key;
//! use membank_core::types::CallArgs;
//!
//! let a = CallArgs::new().kwarg("a", 1i64).kwarg("b", 2i64);
//! let b = CallArgs::new().kwarg("b", 2i64).kwarg("a", 1i64);
//! assert_eq!(key::derive(&a).unwrap(), key::derive(&b).unwrap());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::types::{CallArgs, Value};

/// 规范化后的键原子
///
/// 与 [`Value`] 一一对应，但浮点数以位模式存储从而满足 `Eq + Hash`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    /// IEEE-754 bit pattern; NaN never appears here
    FloatBits(u64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<KeyPart>),
    /// Sorted by key name, names unique
    Map(Vec<(String, KeyPart)>),
}

/// 一次调用的规范化键
///
/// 相等的参数多重集合产生相等的键：位置参数顺序敏感，
/// 关键字参数已按名称排序。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallKey {
    args: Vec<KeyPart>,
    kwargs: Vec<(String, KeyPart)>,
}

impl CallKey {
    /// 位置参数部分
    pub fn args(&self) -> &[KeyPart] {
        &self.args
    }

    /// 关键字参数部分（已排序）
    pub fn kwargs(&self) -> &[(String, KeyPart)] {
        &self.kwargs
    }
}

/// 从调用参数派生规范化键
///
/// # 参数
/// - `call`: 位置参数与关键字参数
///
/// # 返回
/// - `Result<CallKey>`: 成功返回规范化键；任一参数不可规范化时
///   返回 [`BankError::KeyDerivation`]，不产生任何缓存效果
pub fn derive(call: &CallArgs) -> Result<CallKey> {
    let args = call
        .args
        .iter()
        .map(canonicalize)
        .collect::<Result<Vec<_>>>()?;

    let mut kwargs = call
        .kwargs
        .iter()
        .map(|(name, value)| Ok((name.clone(), canonicalize(value)?)))
        .collect::<Result<Vec<_>>>()?;
    kwargs.sort_by(|a, b| a.0.cmp(&b.0));

    for pair in kwargs.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(BankError::KeyDerivation(format!(
                "duplicate keyword argument '{}'",
                pair[0].0
            )));
        }
    }

    Ok(CallKey { args, kwargs })
}

/// 将单个值规范化为键原子
fn canonicalize(value: &Value) -> Result<KeyPart> {
    match value {
        Value::Null => Ok(KeyPart::Null),
        Value::Bool(b) => Ok(KeyPart::Bool(*b)),
        Value::Int(n) => Ok(KeyPart::Int(*n)),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(BankError::KeyDerivation(
                    "NaN is not comparable under key equality".into(),
                ));
            }
            // -0.0 == 0.0 must yield one key
            let bits = if *f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() };
            Ok(KeyPart::FloatBits(bits))
        }
        Value::Str(s) => Ok(KeyPart::Str(s.clone())),
        Value::Bytes(b) => Ok(KeyPart::Bytes(b.clone())),
        Value::List(items) => Ok(KeyPart::List(
            items.iter().map(canonicalize).collect::<Result<Vec<_>>>()?,
        )),
        Value::Map(entries) => {
            let mut canon = entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), canonicalize(v)?)))
                .collect::<Result<Vec<_>>>()?;
            canon.sort_by(|a, b| a.0.cmp(&b.0));
            for pair in canon.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(BankError::KeyDerivation(format!(
                        "duplicate map key '{}'",
                        pair[0].0
                    )));
                }
            }
            Ok(KeyPart::Map(canon))
        }
    }
}
