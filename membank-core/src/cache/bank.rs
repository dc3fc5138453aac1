//! # Cache Bank
//!
//! 两级缓存银行：函数标识到函数缓存的访问有序映射。
//!
//! ## 不变式
//!
//! - 函数缓存数量不超过 `max_bank_size`
//! - 各函数缓存占用之和不超过 `max_total_memory`
//! - 全行级淘汰以整个函数缓存为粒度，从不拆散单个缓存
//!
//! ## 并发
//!
//! 所有操作都在一把可重入锁下执行；未命中后的函数体计算在锁外
//! 进行（见包装器模块），两个线程可能对同一键重复计算，但最终
//! 的写入仍在锁下完成，条目表不会损坏。

use std::collections::{HashMap, VecDeque};

use crate::cache::func::FuncCache;
use crate::cache::stats::{hit_rate, BankStats, FuncStats};
use crate::codec::Codec;
use crate::config::BankConfig;
use crate::error::Result;
use crate::guard::GuardedState;
use crate::key::{self, CallKey};
use crate::persist::{BankSnapshot, FuncSnapshot};
use crate::types::{CallArgs, FuncId, Value};

/// 银行内部状态，仅在守卫闭包内可见
pub(crate) struct BankState {
    /// 函数标识 -> 函数缓存
    functions: HashMap<FuncId, FuncCache>,
    /// 访问顺序队列 (最久未访问 -> 最近访问)
    order: VecDeque<FuncId>,
    /// 包装时登记的单函数预算覆盖
    limits: HashMap<FuncId, u64>,
}

impl BankState {
    fn new() -> Self {
        Self {
            functions: HashMap::new(),
            order: VecDeque::new(),
            limits: HashMap::new(),
        }
    }

    /// 全行当前占用
    fn total_memory(&self) -> u64 {
        self.functions.values().map(FuncCache::memory).sum()
    }

    /// 移动函数到最近使用端
    fn touch(&mut self, id: &FuncId) {
        self.order.retain(|k| k != id);
        self.order.push_back(id.clone());
    }

    /// 整体淘汰最久未访问的函数缓存
    fn evict_function(&mut self) -> Option<FuncId> {
        while let Some(id) = self.order.pop_front() {
            if let Some(cache) = self.functions.remove(&id) {
                tracing::debug!(
                    "Bank evicted function cache {} ({} entries, {} bytes)",
                    id,
                    cache.len(),
                    cache.memory()
                );
                return Some(id);
            }
        }
        None
    }
}

/// 缓存银行
///
/// 应用代码显式持有的实例，没有隐式单例。克隆语义通过
/// `Arc<CacheBank>` 获得。
pub struct CacheBank {
    config: BankConfig,
    codec: Codec,
    state: GuardedState<BankState>,
}

impl CacheBank {
    /// 按配置构建银行
    ///
    /// # 返回
    /// - `Result<CacheBank>`: 配置不合法时返回
    ///   [`crate::error::BankError::Configuration`]
    pub fn new(config: BankConfig) -> Result<Self> {
        config.validate()?;
        let codec = Codec::new(config.format, config.compression_level);
        Ok(Self {
            config,
            codec,
            state: GuardedState::new(BankState::new()),
        })
    }

    /// 银行配置
    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub(crate) fn codec(&self) -> &Codec {
        &self.codec
    }

    /// 登记函数标识，并记录可选的单函数预算覆盖
    ///
    /// 同名缓存已存在且覆盖值变化时，即时收紧其预算。
    pub fn register(&self, name: impl Into<String>, max_memory: Option<u64>) -> FuncId {
        let id = FuncId::new(name);
        if let Some(limit) = max_memory {
            self.state.with(|s| {
                s.limits.insert(id.clone(), limit);
                if let Some(cache) = s.functions.get_mut(&id) {
                    cache.set_max_memory(limit);
                }
            });
        }
        id
    }

    /// 查询缓存结果
    ///
    /// # 参数
    /// - `id`: 函数标识
    /// - `call`: 调用参数
    ///
    /// # 返回
    /// - `Result<Option<Value>>`: 缺失是正常的 `Ok(None)`；参数无法
    ///   派生键时返回错误，无任何缓存效果
    pub fn get(&self, id: &FuncId, call: &CallArgs) -> Result<Option<Value>> {
        let key = key::derive(call)?;
        Ok(self.get_keyed(id, &key))
    }

    /// 写入缓存结果
    ///
    /// 编码失败与超出单函数预算的值原子化地拒绝：要么完整入账，
    /// 要么毫无痕迹。
    pub fn set(&self, id: &FuncId, call: &CallArgs, value: Value) -> Result<()> {
        let key = key::derive(call)?;
        self.set_keyed(id, key, value)
    }

    /// 按已派生的键查询
    pub(crate) fn get_keyed(&self, id: &FuncId, key: &CallKey) -> Option<Value> {
        let lru = self.config.lru;
        self.state.with(|s| {
            let hit = s.functions.get_mut(id)?.get(key, lru);
            if hit.is_some() && lru {
                s.touch(id);
            }
            hit
        })
    }

    /// 按已派生的键写入
    pub(crate) fn set_keyed(&self, id: &FuncId, key: CallKey, value: Value) -> Result<()> {
        // 先编码：失败时不触碰任何状态
        let size = self.codec.value_size(&value)?;
        let lru = self.config.lru;

        self.state.with(|s| {
            let limit = s
                .functions
                .get(id)
                .map(FuncCache::max_memory)
                .or_else(|| s.limits.get(id).copied())
                .unwrap_or(self.config.max_func_memory);

            if size > limit {
                return Err(crate::error::BankError::EntryTooLarge { size, limit });
            }

            // 函数缓存在首次成功写入时才创建；新标识遇上满银行
            // 时，先整体淘汰最久未访问的函数缓存
            if !s.functions.contains_key(id) {
                if s.functions.len() >= self.config.max_bank_size {
                    s.evict_function();
                }
                s.functions
                    .insert(id.clone(), FuncCache::new(id.clone(), limit));
                s.order.push_back(id.clone());
            }

            if let Some(cache) = s.functions.get_mut(id) {
                cache.insert(key, value, size, lru)?;
            }
            if lru {
                s.touch(id);
            }

            // 全行预算：整体淘汰，至少保留一个函数缓存
            while s.total_memory() > self.config.max_total_memory && s.functions.len() > 1 {
                s.evict_function();
            }

            Ok(())
        })
    }

    /// 移除单个条目
    ///
    /// # 返回
    /// - `Result<bool>`: 条目此前是否存在；参数无法派生键时返回错误
    pub fn remove_entry(&self, id: &FuncId, call: &CallArgs) -> Result<bool> {
        let key = key::derive(call)?;
        Ok(self.state.with(|s| {
            s.functions
                .get_mut(id)
                .map(|cache| cache.remove(&key).is_some())
                .unwrap_or(false)
        }))
    }

    /// 清空一个函数缓存的全部条目
    ///
    /// 缓存本体与其计数器保留。
    ///
    /// # 返回
    /// - `bool`: 该标识是否存在
    pub fn clear_function(&self, id: &FuncId) -> bool {
        self.state.with(|s| match s.functions.get_mut(id) {
            Some(cache) => {
                cache.clear();
                true
            }
            None => false,
        })
    }

    /// 移除一个函数缓存
    ///
    /// # 返回
    /// - `bool`: 该标识此前是否存在
    pub fn remove(&self, id: &FuncId) -> bool {
        self.state.with(|s| {
            let existed = s.functions.remove(id).is_some();
            if existed {
                s.order.retain(|k| k != id);
            }
            existed
        })
    }

    /// 清空银行
    ///
    /// 包装时登记的预算覆盖保留。
    pub fn clear(&self) {
        self.state.with(|s| {
            s.functions.clear();
            s.order.clear();
        });
    }

    /// 存活的函数缓存数量
    pub fn len(&self) -> usize {
        self.state.with(|s| s.functions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.config.max_bank_size
    }

    /// 函数标识，按访问顺序（最久未用在前）
    pub fn keys(&self) -> Vec<FuncId> {
        self.state.with(|s| {
            s.order
                .iter()
                .filter(|id| s.functions.contains_key(*id))
                .cloned()
                .collect()
        })
    }

    /// 函数缓存快照，按访问顺序
    pub fn values(&self) -> Vec<FuncSnapshot> {
        self.state.with(|s| {
            s.order
                .iter()
                .filter_map(|id| s.functions.get(id))
                .map(FuncCache::snapshot)
                .collect()
        })
    }

    /// (标识, 快照) 对，按访问顺序
    pub fn items(&self) -> Vec<(FuncId, FuncSnapshot)> {
        self.state.with(|s| {
            s.order
                .iter()
                .filter_map(|id| s.functions.get(id).map(|c| (id.clone(), c.snapshot())))
                .collect()
        })
    }

    /// 单函数统计快照
    pub fn func_stats(&self, id: &FuncId) -> Option<FuncStats> {
        self.state.with(|s| s.functions.get(id).map(FuncCache::stats))
    }

    /// 整库统计快照：查询时刻对存活计数器求和
    pub fn stats(&self) -> BankStats {
        self.state.with(|s| {
            let per_function: Vec<FuncStats> = s
                .order
                .iter()
                .filter_map(|id| s.functions.get(id))
                .map(FuncCache::stats)
                .collect();
            let total_hits = per_function.iter().map(|f| f.hits).sum();
            let total_misses = per_function.iter().map(|f| f.misses).sum();
            BankStats {
                functions: per_function.len(),
                total_hits,
                total_misses,
                hit_rate: hit_rate(total_hits, total_misses),
                total_memory_bytes: s.total_memory(),
                per_function,
            }
        })
    }

    /// 整库快照（持久化与只读遍历共用）
    pub fn snapshot(&self) -> BankSnapshot {
        self.state.with(|s| BankSnapshot {
            format: self.codec.format(),
            functions: s
                .order
                .iter()
                .filter_map(|id| s.functions.get(id))
                .map(FuncCache::snapshot)
                .collect(),
        })
    }

    /// 以快照整体替换银行状态
    ///
    /// 替换在守卫内一步完成，并发读者不会观察到半加载的银行。
    /// 随后按当前配置重新执行预算约束。
    pub(crate) fn install_snapshot(&self, snapshot: BankSnapshot) {
        self.state.with(|s| {
            let mut functions = HashMap::new();
            let mut order = VecDeque::new();
            for func in snapshot.functions {
                let cache = FuncCache::from_snapshot(func);
                let id = cache.id().clone();
                order.push_back(id.clone());
                functions.insert(id, cache);
            }
            s.functions = functions;
            s.order = order;

            // 加载来源的配置未必与当前一致，恢复全部不变式
            for cache in s.functions.values_mut() {
                cache.trim_to_budget();
            }
            while s.functions.len() > self.config.max_bank_size {
                s.evict_function();
            }
            while s.total_memory() > self.config.max_total_memory && s.functions.len() > 1 {
                s.evict_function();
            }
        });
    }
}
