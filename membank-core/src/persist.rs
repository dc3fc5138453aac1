//! # Bank Persistence
//!
//! 整库快照的文件保存与加载。
//!
//! ## 保证
//!
//! - 保存先在内存中完整构建字节缓冲；超过 `max_file_size` 时
//!   失败且不触碰目标文件
//! - 写入经由同目录临时文件加改名，整体原子
//! - 加载把解码出的快照一步替换进银行；解码失败时原状态原封不动
//! - 文件扩展名与配置格式矛盾时提前拒绝，不读内容

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::cache::bank::CacheBank;
use crate::codec::CacheFormat;
use crate::error::{BankError, Result};
use crate::key::CallKey;
use crate::types::Value;

/// 一条缓存记录的持久化形态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: CallKey,
    pub value: Value,
    pub size_bytes: u64,
}

/// 单函数缓存的持久化形态
///
/// 条目按访问顺序排列（最久未用在前），计数器一并保存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncSnapshot {
    pub name: String,
    pub max_memory: u64,
    pub hits: u64,
    pub misses: u64,
    pub entries: Vec<EntrySnapshot>,
}

/// 整库的持久化形态
///
/// 内嵌产生它的编码格式，跨策略加载据此干净地失败。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankSnapshot {
    pub format: CacheFormat,
    pub functions: Vec<FuncSnapshot>,
}

impl CacheBank {
    /// 保存整库到文件
    ///
    /// 路径扩展名与配置格式不符时，按格式规范化扩展名后写入。
    ///
    /// # 参数
    /// - `path`: 目标路径
    ///
    /// # 返回
    /// - `Result<PathBuf>`: 实际写入的路径
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = normalize_extension(path.as_ref(), self.config().format);

        let snapshot = self.snapshot();
        let bytes = self.codec().encode_snapshot(&snapshot)?;

        let limit = self.config().max_file_size;
        if bytes.len() as u64 > limit {
            return Err(BankError::FileSizeExceeded {
                size: bytes.len() as u64,
                limit,
            });
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| BankError::Io(e.error))?;

        tracing::debug!("Bank saved to {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// 保存到配置的默认路径
    pub fn save_default(&self) -> Result<PathBuf> {
        self.save(self.config().effective_filename())
    }

    /// 从文件加载并整体替换银行状态
    ///
    /// # 返回
    /// - `Result<()>`: 文件缺失、超限、解码失败或跨策略时返回
    ///   错误，银行维持加载前的状态
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(format) = CacheFormat::from_path(path) {
            if format != self.config().format {
                return Err(BankError::LoadDecode(format!(
                    "file {} looks like {} data, bank is configured for {}",
                    path.display(),
                    format,
                    self.config().format
                )));
            }
        }

        let metadata = std::fs::metadata(path)?;
        let limit = self.config().max_file_size;
        if metadata.len() > limit {
            return Err(BankError::FileSizeExceeded {
                size: metadata.len(),
                limit,
            });
        }

        let bytes = std::fs::read(path)?;
        // 解码在锁外完成；失败在替换之前，原状态不受影响
        let snapshot = self.codec().decode_snapshot(&bytes)?;
        self.install_snapshot(snapshot);

        tracing::debug!("Bank loaded from {}", path.display());
        Ok(())
    }

    /// 从配置的默认路径加载
    pub fn load_default(&self) -> Result<()> {
        self.load(self.config().effective_filename())
    }

    /// 在阻塞线程池上保存
    ///
    /// # 参数
    /// - `path`: 目标路径
    pub async fn save_async(self: &Arc<Self>, path: impl Into<PathBuf>) -> Result<PathBuf> {
        let bank = Arc::clone(self);
        let path = path.into();
        tokio::task::spawn_blocking(move || bank.save(path))
            .await
            .map_err(|e| BankError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    /// 在阻塞线程池上加载
    pub async fn load_async(self: &Arc<Self>, path: impl Into<PathBuf>) -> Result<()> {
        let bank = Arc::clone(self);
        let path = path.into();
        tokio::task::spawn_blocking(move || bank.load(path))
            .await
            .map_err(|e| BankError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

/// 扩展名与格式不符时替换为格式的规范扩展名
fn normalize_extension(path: &Path, format: CacheFormat) -> PathBuf {
    match CacheFormat::from_path(path) {
        Some(existing) if existing == format => path.to_path_buf(),
        _ => path.with_extension(format.extension()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{size, BankConfig};
    use crate::types::{CallArgs, FuncId, Value};
    use tempfile::TempDir;

    fn bank_with(format: CacheFormat) -> Arc<CacheBank> {
        Arc::new(
            CacheBank::new(BankConfig {
                max_bank_size: 8,
                max_total_memory: size::MIB,
                max_func_memory: 64 * size::KIB,
                format,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn populate(bank: &CacheBank, funcs: usize, entries: i64) -> Vec<FuncId> {
        let mut ids = Vec::new();
        for f in 0..funcs {
            let id = bank.register(format!("func{f}"), None);
            for n in 0..entries {
                bank.set(&id, &CallArgs::positional([n]), Value::Int(n * 10))
                    .unwrap();
            }
            // 留下一些命中/未命中计数
            bank.get(&id, &CallArgs::positional([0i64])).unwrap();
            bank.get(&id, &CallArgs::positional([entries])).unwrap();
            ids.push(id);
        }
        ids
    }

    #[test]
    fn test_save_load_round_trip_all_formats() {
        for format in [
            CacheFormat::Bincode,
            CacheFormat::Zlib,
            CacheFormat::Gzip,
            CacheFormat::Json,
            CacheFormat::Yaml,
        ] {
            let dir = TempDir::new().unwrap();
            let source = bank_with(format);
            let ids = populate(&source, 3, 4);
            let path = source.save(dir.path().join("bank")).unwrap();

            let target = bank_with(format);
            target.load(&path).unwrap();

            assert_eq!(target.len(), 3, "format {format}");
            for id in &ids {
                for n in 0..4i64 {
                    assert_eq!(
                        target.get(id, &CallArgs::positional([n])).unwrap(),
                        Some(Value::Int(n * 10))
                    );
                }
            }
            // 计数器随快照恢复（上面的读取又各加了 4 次命中）
            let stats = target.func_stats(&ids[0]).unwrap();
            assert_eq!(stats.hits, 1 + 4);
            assert_eq!(stats.misses, 1);
        }
    }

    #[test]
    fn test_save_normalizes_extension() {
        let dir = TempDir::new().unwrap();
        let bank = bank_with(CacheFormat::Json);
        populate(&bank, 1, 1);

        let path = bank.save(dir.path().join("state")).unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        assert!(path.exists());
    }

    #[test]
    fn test_file_size_ceiling_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let bank = Arc::new(
            CacheBank::new(BankConfig {
                max_file_size: 16,
                format: CacheFormat::Bincode,
                ..Default::default()
            })
            .unwrap(),
        );
        populate(&bank, 2, 3);

        let path = dir.path().join("bank.bin");
        let err = bank.save(&path).unwrap_err();
        assert!(matches!(err, BankError::FileSizeExceeded { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_failure_preserves_state() {
        let dir = TempDir::new().unwrap();
        let bank = bank_with(CacheFormat::Bincode);
        let ids = populate(&bank, 2, 2);

        let path = dir.path().join("bank.bin");
        std::fs::write(&path, b"definitely not a snapshot").unwrap();

        assert!(matches!(bank.load(&path), Err(BankError::LoadDecode(_))));
        // 原状态原封不动
        assert_eq!(bank.len(), 2);
        assert_eq!(
            bank.get(&ids[0], &CallArgs::positional([0i64])).unwrap(),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn test_load_replaces_not_merges() {
        let dir = TempDir::new().unwrap();
        let saved = bank_with(CacheFormat::Gzip);
        populate(&saved, 1, 2);
        let path = saved.save(dir.path().join("bank.gz")).unwrap();

        let target = bank_with(CacheFormat::Gzip);
        let doomed = target.register("doomed", None);
        target
            .set(&doomed, &CallArgs::positional([1i64]), Value::Int(1))
            .unwrap();

        target.load(&path).unwrap();
        // 替换而非合并：加载前的函数全部消失
        assert_eq!(target.len(), 1);
        assert_eq!(target.get(&doomed, &CallArgs::positional([1i64])).unwrap(), None);
    }

    #[test]
    fn test_extension_mismatch_rejected_before_read() {
        let dir = TempDir::new().unwrap();
        let json_bank = bank_with(CacheFormat::Json);
        populate(&json_bank, 1, 1);
        let path = json_bank.save(dir.path().join("bank.json")).unwrap();

        let gzip_bank = bank_with(CacheFormat::Gzip);
        assert!(matches!(
            gzip_bank.load(&path),
            Err(BankError::LoadDecode(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let bank = bank_with(CacheFormat::Bincode);
        let err = bank.load("/nonexistent/bank.bin").unwrap_err();
        assert!(matches!(err, BankError::Io(_)));
    }

    #[test]
    fn test_load_enforces_current_budgets() {
        let dir = TempDir::new().unwrap();
        let generous = bank_with(CacheFormat::Bincode);
        populate(&generous, 4, 8);
        let path = generous.save(dir.path().join("bank.bin")).unwrap();

        // 收紧后的银行：最多 2 个函数
        let strict = Arc::new(
            CacheBank::new(BankConfig {
                max_bank_size: 2,
                max_total_memory: size::MIB,
                max_func_memory: 64 * size::KIB,
                format: CacheFormat::Bincode,
                ..Default::default()
            })
            .unwrap(),
        );
        strict.load(&path).unwrap();
        assert_eq!(strict.len(), 2);
        assert!(strict.stats().total_memory_bytes <= size::MIB);
    }

    #[test]
    fn test_save_default_uses_configured_filename() {
        let dir = TempDir::new().unwrap();
        let bank = Arc::new(
            CacheBank::new(BankConfig {
                filename: Some(dir.path().join("custom.gz")),
                ..Default::default()
            })
            .unwrap(),
        );
        populate(&bank, 1, 1);

        let path = bank.save_default().unwrap();
        assert_eq!(path, dir.path().join("custom.gz"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_async_save_load() {
        let dir = TempDir::new().unwrap();
        let bank = bank_with(CacheFormat::Gzip);
        let ids = populate(&bank, 2, 3);

        let path = bank.save_async(dir.path().join("bank.gz")).await.unwrap();

        let target = bank_with(CacheFormat::Gzip);
        target.load_async(path).await.unwrap();
        assert_eq!(target.len(), 2);
        assert_eq!(
            target.get(&ids[1], &CallArgs::positional([2i64])).unwrap(),
            Some(Value::Int(20))
        );
    }
}
