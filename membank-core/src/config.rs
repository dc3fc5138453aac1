//! # Bank Configuration
//!
//! 缓存银行配置管理模块。
//!
//! ## 配置选项
//!
//! - `max_bank_size`: 银行内函数缓存的最大数量
//! - `max_total_memory`: 全行字节预算
//! - `max_func_memory`: 单函数默认字节预算
//! - `lru`: 是否按访问顺序重排（关闭时按插入顺序淘汰）
//! - `max_file_size`: 持久化文件字节上限
//! - `format`: 快照编码格式
//! - `compression_level`: 压缩级别 (0-9)，仅压缩格式使用
//! - `filename`: 默认持久化目标路径
//!
//! ## 示例
//!
//! ```rust
//! use membank_core::config::{BankConfig, size};
//! use membank_core::codec::CacheFormat;
//!
//! // 使用默认配置
//! let config = BankConfig::default();
//!
//! // 自定义配置
//! let config = BankConfig {
//!     max_bank_size: 10,
//!     max_total_memory: 4 * size::MIB,
//!     max_func_memory: 64 * size::KIB,
//!     format: CacheFormat::Json,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::CacheFormat;
use crate::error::{BankError, Result};

/// 常用字节尺寸常量
pub mod size {
    /// 1 KiB
    pub const KIB: u64 = 1024;
    /// 1 MiB
    pub const MIB: u64 = 1024 * 1024;
}

/// 缓存银行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// 银行内函数缓存的最大数量
    ///
    /// 超过此数量时，按 LRU 淘汰整个函数缓存。
    pub max_bank_size: usize,

    /// 全行字节预算
    ///
    /// 所有函数缓存编码后尺寸之和的上限。超出时按 LRU
    /// 整体淘汰函数缓存，直到不变式恢复。
    pub max_total_memory: u64,

    /// 单函数默认字节预算
    ///
    /// 包装时可为单个函数覆盖。必须不大于 `max_total_memory`。
    pub max_func_memory: u64,

    /// 是否按访问顺序重排
    ///
    /// 关闭时溢出淘汰仍然发生，但顺序是插入顺序而非访问顺序。
    pub lru: bool,

    /// 持久化文件字节上限
    ///
    /// 快照编码后超过此尺寸时保存失败，目标文件不被触碰。
    pub max_file_size: u64,

    /// 快照编码格式
    pub format: CacheFormat,

    /// 压缩级别 (0-9)
    ///
    /// 仅 `Zlib` / `Gzip` 格式使用。
    pub compression_level: u32,

    /// 默认持久化目标路径
    ///
    /// 未设置时按格式扩展名派生 (`membank.<ext>`)。
    pub filename: Option<PathBuf>,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            max_bank_size: 100,
            max_total_memory: 10 * size::MIB,
            max_func_memory: 16 * size::KIB,
            lru: true,
            max_file_size: 10 * size::MIB,
            format: CacheFormat::Gzip,
            compression_level: 1,
            filename: None,
        }
    }
}

impl BankConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验配置
    ///
    /// # 返回
    /// - `Result<()>`: 任一约束不满足时返回 [`BankError::Configuration`]
    pub fn validate(&self) -> Result<()> {
        if self.max_bank_size == 0 {
            return Err(BankError::configuration(
                "max_bank_size must be greater than 0",
            ));
        }
        if self.max_total_memory == 0 {
            return Err(BankError::configuration(
                "max_total_memory must be greater than 0",
            ));
        }
        if self.max_func_memory == 0 {
            return Err(BankError::configuration(
                "max_func_memory must be greater than 0",
            ));
        }
        if self.max_func_memory > self.max_total_memory {
            return Err(BankError::configuration(format!(
                "max_func_memory ({}) must not exceed max_total_memory ({})",
                self.max_func_memory, self.max_total_memory
            )));
        }
        if self.max_file_size == 0 {
            return Err(BankError::configuration(
                "max_file_size must be greater than 0",
            ));
        }
        if self.compression_level > 9 {
            return Err(BankError::configuration(format!(
                "compression_level must be in 0..=9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// 从 TOML 文本解析并校验配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BankError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验配置
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 有效的持久化目标路径
    ///
    /// 显式 `filename` 优先；否则按格式扩展名派生默认名。
    pub fn effective_filename(&self) -> PathBuf {
        match &self.filename {
            Some(path) => path.clone(),
            None => PathBuf::from(format!("membank.{}", self.format.extension())),
        }
    }
}
