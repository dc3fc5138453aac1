//! # Cache Statistics
//!
//! 命中/未命中计数的只读投影。
//!
//! 计数器本体存放在每个函数缓存上，随 `get` 的结果同步递增；
//! 这里只定义查询时刻汇总出来的快照结构，绝不回写状态。

use serde::Serialize;

/// 单个函数缓存的统计快照
#[derive(Debug, Clone, Serialize)]
pub struct FuncStats {
    /// 函数标识名
    pub name: String,
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 命中率 (0.0 - 1.0)，无请求时为 0
    pub hit_rate: f64,
    /// 存活条目数
    pub entries: usize,
    /// 当前编码字节占用
    pub memory_bytes: u64,
    /// 该函数的字节预算
    pub max_memory_bytes: u64,
}

/// 整库统计快照
#[derive(Debug, Clone, Serialize)]
pub struct BankStats {
    /// 存活的函数缓存数量
    pub functions: usize,
    /// 全行命中次数之和
    pub total_hits: u64,
    /// 全行未命中次数之和
    pub total_misses: u64,
    /// 全行命中率 (0.0 - 1.0)，无请求时为 0
    pub hit_rate: f64,
    /// 全行当前编码字节占用
    pub total_memory_bytes: u64,
    /// 每函数统计
    pub per_function: Vec<FuncStats>,
}

/// 命中率，分母为零时定义为 0
pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    (hits as f64) / (total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(1, 0), 1.0);
        assert_eq!(hit_rate(0, 5), 0.0);
        assert!((hit_rate(2, 1) - 0.666).abs() < 0.01);
    }
}
