//! # Per-Function Cache
//!
//! 单个函数的有界结果缓存。
//!
//! ## 不变式
//!
//! - `current_memory` 恒等于存活条目编码尺寸之和
//! - `current_memory` 永不超过 `max_memory`
//! - 访问顺序队列从最久未用到最近使用；淘汰始终弹出队首

use std::collections::{HashMap, VecDeque};

use crate::cache::stats::{hit_rate, FuncStats};
use crate::error::{BankError, Result};
use crate::key::CallKey;
use crate::persist::{EntrySnapshot, FuncSnapshot};
use crate::types::{FuncId, Value};

/// 一条缓存记录：值与其编码字节尺寸
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    size_bytes: u64,
}

/// 单函数缓存
///
/// 由银行独占持有，外部只能通过快照读取。
#[derive(Debug)]
pub(crate) struct FuncCache {
    /// 函数标识
    name: FuncId,
    /// 主存储
    entries: HashMap<CallKey, StoredEntry>,
    /// 访问顺序队列 (最久未访问 -> 最近访问)
    access_order: VecDeque<CallKey>,
    /// 字节预算
    max_memory: u64,
    /// 当前编码字节占用
    current_memory: u64,
    /// 命中次数
    hits: u64,
    /// 未命中次数
    misses: u64,
}

impl FuncCache {
    /// 创建空缓存
    pub fn new(name: FuncId, max_memory: u64) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            access_order: VecDeque::new(),
            max_memory,
            current_memory: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// 查找条目
    ///
    /// 命中时返回值副本并记一次命中；`lru` 开启时条目移动到
    /// 最近使用端。缺失是正常返回而非错误，记一次未命中。
    pub fn get(&mut self, key: &CallKey, lru: bool) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                if lru {
                    self.touch(key);
                }
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// 插入或更新条目
    ///
    /// 尺寸超过预算的值永远放不下，直接拒绝且不做任何淘汰。
    /// 更新已有键时先扣除旧尺寸再做预算检查。
    ///
    /// # 参数
    /// - `size`: 值在当前编解码器下的编码长度
    pub fn insert(&mut self, key: CallKey, value: Value, size: u64, lru: bool) -> Result<()> {
        if size > self.max_memory {
            return Err(BankError::EntryTooLarge {
                size,
                limit: self.max_memory,
            });
        }

        let existed = match self.entries.remove(&key) {
            Some(old) => {
                self.current_memory -= old.size_bytes;
                true
            }
            None => false,
        };

        while self.current_memory + size > self.max_memory && !self.entries.is_empty() {
            self.evict_lru();
        }

        self.entries.insert(key.clone(), StoredEntry { value, size_bytes: size });
        self.current_memory += size;

        // 更新保持原队列位置（除非 LRU 开启或位置已被淘汰掉）
        let queued = existed && self.access_order.contains(&key);
        if !queued {
            self.access_order.push_back(key);
        } else if lru {
            self.touch(&key);
        }

        Ok(())
    }

    /// 删除一个条目，返回释放的字节数
    pub fn remove(&mut self, key: &CallKey) -> Option<u64> {
        let entry = self.entries.remove(key)?;
        self.current_memory -= entry.size_bytes;
        self.access_order.retain(|k| k != key);
        Some(entry.size_bytes)
    }

    /// 清空全部条目
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.current_memory = 0;
    }

    /// 收紧字节预算并淘汰到合规
    pub fn set_max_memory(&mut self, max_memory: u64) {
        self.max_memory = max_memory;
        self.trim_to_budget();
    }

    /// 淘汰直到占用回到预算之内
    pub fn trim_to_budget(&mut self) {
        while self.current_memory > self.max_memory && !self.entries.is_empty() {
            self.evict_lru();
        }
    }

    /// 淘汰最久未访问的条目
    fn evict_lru(&mut self) -> Option<CallKey> {
        while let Some(key) = self.access_order.pop_front() {
            if let Some(entry) = self.entries.remove(&key) {
                self.current_memory -= entry.size_bytes;
                tracing::debug!(
                    "Cache evicted entry of {} bytes from {}",
                    entry.size_bytes,
                    self.name
                );
                return Some(key);
            }
            // 队列中的残留槽位（键正在被更新），继续弹出
        }
        None
    }

    /// 移动到最近使用端
    fn touch(&mut self, key: &CallKey) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(key.clone());
    }

    /// 函数标识
    pub fn id(&self) -> &FuncId {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory(&self) -> u64 {
        self.current_memory
    }

    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    /// 统计快照
    pub fn stats(&self) -> FuncStats {
        FuncStats {
            name: self.name.name().to_string(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: hit_rate(self.hits, self.misses),
            entries: self.entries.len(),
            memory_bytes: self.current_memory,
            max_memory_bytes: self.max_memory,
        }
    }

    /// 条目快照，按访问顺序（最久未用在前）
    pub fn snapshot(&self) -> FuncSnapshot {
        let entries = self
            .access_order
            .iter()
            .filter_map(|key| {
                self.entries.get(key).map(|entry| EntrySnapshot {
                    key: key.clone(),
                    value: entry.value.clone(),
                    size_bytes: entry.size_bytes,
                })
            })
            .collect();
        FuncSnapshot {
            name: self.name.name().to_string(),
            max_memory: self.max_memory,
            hits: self.hits,
            misses: self.misses,
            entries,
        }
    }

    /// 从快照重建
    ///
    /// 条目按快照顺序恢复为访问顺序；占用由各条目尺寸求和得出。
    pub fn from_snapshot(snapshot: FuncSnapshot) -> Self {
        let name = FuncId::new(snapshot.name);
        let mut cache = Self::new(name, snapshot.max_memory);
        cache.hits = snapshot.hits;
        cache.misses = snapshot.misses;
        for entry in snapshot.entries {
            cache.current_memory += entry.size_bytes;
            cache.access_order.push_back(entry.key.clone());
            cache.entries.insert(
                entry.key,
                StoredEntry {
                    value: entry.value,
                    size_bytes: entry.size_bytes,
                },
            );
        }
        cache
    }
}
