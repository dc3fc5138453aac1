//! # Snapshot Codecs
//!
//! 缓存值与整库快照的编码/解码策略。
//!
//! ## 策略
//!
//! - `Bincode`: 结构化二进制编码
//! - `Zlib` / `Gzip`: bincode 流外包两种压缩容器格式
//! - `Json` / `Yaml`: 两种文本编码
//!
//! ## 约定
//!
//! - 策略在构建银行时选定一次，整个生命周期内不变
//! - `value_size(v) == encode_value(v).len()`，尺寸核算与持久化共用同一路径
//! - JSON 是受限文本模型：非有限浮点数在编码期失败，而不是解码期
//! - 快照内嵌产生它的格式标签，跨策略加载必须干净地失败

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::persist::BankSnapshot;
use crate::types::Value;

/// 快照编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    /// Plain structural binary encoding
    Bincode,
    /// Bincode stream in a zlib container
    Zlib,
    /// Bincode stream in a gzip container
    Gzip,
    /// Text encoding, restricted value model
    Json,
    /// Text encoding, full value model
    Yaml,
}

impl CacheFormat {
    /// 该格式的规范文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bincode => "bin",
            Self::Zlib => "zlib",
            Self::Gzip => "gz",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// 根据文件扩展名识别格式
    ///
    /// # 返回
    /// - `Option<CacheFormat>`: 扩展名不认识时返回 None
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "bin" => Some(Self::Bincode),
            "zlib" => Some(Self::Zlib),
            "gz" => Some(Self::Gzip),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bincode => "bincode",
            Self::Zlib => "zlib",
            Self::Gzip => "gzip",
            Self::Json => "json",
            Self::Yaml => "yaml",
        };
        f.write_str(name)
    }
}

/// 绑定了格式与压缩级别的编解码器
///
/// 在银行构建时创建一次，生命周期内共享。
#[derive(Debug, Clone)]
pub struct Codec {
    format: CacheFormat,
    compression: Compression,
}

impl Codec {
    /// 创建编解码器
    ///
    /// # 参数
    /// - `format`: 编码格式
    /// - `compression_level`: 压缩级别 (0-9)，仅压缩格式使用
    pub fn new(format: CacheFormat, compression_level: u32) -> Self {
        Self {
            format,
            compression: Compression::new(compression_level),
        }
    }

    /// 当前格式
    pub fn format(&self) -> CacheFormat {
        self.format
    }

    /// 编码单个缓存值
    ///
    /// # 返回
    /// - `Result<Vec<u8>>`: 值无法在当前格式下表示时返回
    ///   [`BankError::Encoding`]
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        if self.format == CacheFormat::Json {
            ensure_json_representable(value)?;
        }
        self.encode(value)
    }

    /// 解码单个缓存值
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        self.decode(bytes)
    }

    /// 值的字节足迹，即编码后的长度
    pub fn value_size(&self, value: &Value) -> Result<u64> {
        Ok(self.encode_value(value)?.len() as u64)
    }

    /// 编码整库快照
    pub fn encode_snapshot(&self, snapshot: &BankSnapshot) -> Result<Vec<u8>> {
        if self.format == CacheFormat::Json {
            for func in &snapshot.functions {
                for entry in &func.entries {
                    ensure_json_representable(&entry.value)?;
                }
            }
        }
        self.encode(snapshot)
    }

    /// 解码整库快照
    ///
    /// 快照内嵌的格式标签必须与当前编解码器一致，否则视为
    /// 跨策略加载并返回 [`BankError::LoadDecode`]。
    pub fn decode_snapshot(&self, bytes: &[u8]) -> Result<BankSnapshot> {
        let snapshot: BankSnapshot = self.decode(bytes)?;
        if snapshot.format != self.format {
            return Err(BankError::LoadDecode(format!(
                "snapshot was written by the {} codec, bank is configured for {}",
                snapshot.format, self.format
            )));
        }
        Ok(snapshot)
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.format {
            CacheFormat::Bincode => {
                bincode::serialize(value).map_err(|e| BankError::Encoding(e.to_string()))
            }
            CacheFormat::Zlib => {
                let raw =
                    bincode::serialize(value).map_err(|e| BankError::Encoding(e.to_string()))?;
                let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
                encoder
                    .write_all(&raw)
                    .map_err(|e| BankError::Encoding(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| BankError::Encoding(e.to_string()))
            }
            CacheFormat::Gzip => {
                let raw =
                    bincode::serialize(value).map_err(|e| BankError::Encoding(e.to_string()))?;
                let mut encoder = GzEncoder::new(Vec::new(), self.compression);
                encoder
                    .write_all(&raw)
                    .map_err(|e| BankError::Encoding(e.to_string()))?;
                encoder
                    .finish()
                    .map_err(|e| BankError::Encoding(e.to_string()))
            }
            CacheFormat::Json => {
                serde_json::to_vec(value).map_err(|e| BankError::Encoding(e.to_string()))
            }
            CacheFormat::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| BankError::Encoding(e.to_string())),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            CacheFormat::Bincode => {
                bincode::deserialize(bytes).map_err(|e| BankError::LoadDecode(e.to_string()))
            }
            CacheFormat::Zlib => {
                let mut raw = Vec::new();
                ZlibDecoder::new(bytes)
                    .read_to_end(&mut raw)
                    .map_err(|e| BankError::LoadDecode(e.to_string()))?;
                bincode::deserialize(&raw).map_err(|e| BankError::LoadDecode(e.to_string()))
            }
            CacheFormat::Gzip => {
                let mut raw = Vec::new();
                GzDecoder::new(bytes)
                    .read_to_end(&mut raw)
                    .map_err(|e| BankError::LoadDecode(e.to_string()))?;
                bincode::deserialize(&raw).map_err(|e| BankError::LoadDecode(e.to_string()))
            }
            CacheFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| BankError::LoadDecode(e.to_string()))
            }
            CacheFormat::Yaml => {
                serde_yaml::from_slice(bytes).map_err(|e| BankError::LoadDecode(e.to_string()))
            }
        }
    }
}

/// JSON 文本模型可表示性检查
///
/// 非有限浮点数 serde_json 会静默写成 null，往返保真被破坏，
/// 因此在编码前显式拒绝。
fn ensure_json_representable(value: &Value) -> Result<()> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(BankError::Encoding(format!(
            "float {f} is not representable in the json text model"
        ))),
        Value::List(items) => items.iter().try_for_each(ensure_json_representable),
        Value::Map(entries) => entries
            .iter()
            .try_for_each(|(_, v)| ensure_json_representable(v)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{BankSnapshot, EntrySnapshot, FuncSnapshot};
    use crate::{key, types::CallArgs};

    const ALL_FORMATS: [CacheFormat; 5] = [
        CacheFormat::Bincode,
        CacheFormat::Zlib,
        CacheFormat::Gzip,
        CacheFormat::Json,
        CacheFormat::Yaml,
    ];

    fn sample_value() -> Value {
        Value::Map(vec![
            ("n".into(), Value::Int(-7)),
            ("f".into(), Value::Float(2.5)),
            ("s".into(), Value::Str("héllo".into())),
            ("b".into(), Value::Bytes(vec![0, 1, 255])),
            (
                "l".into(),
                Value::List(vec![Value::Bool(true), Value::Null]),
            ),
        ])
    }

    fn sample_snapshot(format: CacheFormat) -> BankSnapshot {
        let key = key::derive(&CallArgs::positional([1i64])).unwrap();
        BankSnapshot {
            format,
            functions: vec![FuncSnapshot {
                name: "f".into(),
                max_memory: 1024,
                hits: 3,
                misses: 1,
                entries: vec![EntrySnapshot {
                    key,
                    value: Value::Int(42),
                    size_bytes: 9,
                }],
            }],
        }
    }

    #[test]
    fn test_value_round_trip_all_formats() {
        let value = sample_value();
        for format in ALL_FORMATS {
            let codec = Codec::new(format, 1);
            let bytes = codec.encode_value(&value).unwrap();
            let back = codec.decode_value(&bytes).unwrap();
            assert_eq!(back, value, "round trip failed for {format}");
        }
    }

    #[test]
    fn test_value_size_matches_encoding() {
        let value = sample_value();
        for format in ALL_FORMATS {
            let codec = Codec::new(format, 1);
            let bytes = codec.encode_value(&value).unwrap();
            assert_eq!(codec.value_size(&value).unwrap(), bytes.len() as u64);
        }
    }

    #[test]
    fn test_compressed_formats_differ_from_plain() {
        let value = Value::Str("x".repeat(4096));
        let plain = Codec::new(CacheFormat::Bincode, 1)
            .encode_value(&value)
            .unwrap();
        let zlib = Codec::new(CacheFormat::Zlib, 6).encode_value(&value).unwrap();
        let gzip = Codec::new(CacheFormat::Gzip, 6).encode_value(&value).unwrap();
        assert!(zlib.len() < plain.len());
        assert!(gzip.len() < plain.len());
        // 两种容器格式字节流互不相同
        assert_ne!(zlib, gzip);
    }

    #[test]
    fn test_json_rejects_non_finite_at_encode() {
        let codec = Codec::new(CacheFormat::Json, 1);
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = codec.encode_value(&Value::Float(f)).unwrap_err();
            assert!(matches!(err, BankError::Encoding(_)));
        }
        // 嵌套位置同样在编码期失败
        let nested = Value::List(vec![Value::Map(vec![("x".into(), Value::Float(f64::NAN))])]);
        assert!(codec.encode_value(&nested).is_err());
    }

    #[test]
    fn test_yaml_accepts_non_finite() {
        let codec = Codec::new(CacheFormat::Yaml, 1);
        let bytes = codec.encode_value(&Value::Float(f64::INFINITY)).unwrap();
        let back = codec.decode_value(&bytes).unwrap();
        assert_eq!(back, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_snapshot_round_trip_all_formats() {
        for format in ALL_FORMATS {
            let codec = Codec::new(format, 1);
            let snapshot = sample_snapshot(format);
            let bytes = codec.encode_snapshot(&snapshot).unwrap();
            let back = codec.decode_snapshot(&bytes).unwrap();
            assert_eq!(back.functions.len(), 1);
            assert_eq!(back.functions[0].hits, 3);
            assert_eq!(back.functions[0].entries[0].value, Value::Int(42));
        }
    }

    #[test]
    fn test_cross_container_decode_fails() {
        let gzip = Codec::new(CacheFormat::Gzip, 1);
        let zlib = Codec::new(CacheFormat::Zlib, 1);
        let bytes = gzip.encode_snapshot(&sample_snapshot(CacheFormat::Gzip)).unwrap();
        assert!(matches!(
            zlib.decode_snapshot(&bytes),
            Err(BankError::LoadDecode(_))
        ));
    }

    #[test]
    fn test_format_tag_rejects_lenient_cross_parse() {
        // JSON 是 YAML 的子集，字节流能解析，但格式标签必须拦下它
        let json = Codec::new(CacheFormat::Json, 1);
        let yaml = Codec::new(CacheFormat::Yaml, 1);
        let bytes = json.encode_snapshot(&sample_snapshot(CacheFormat::Json)).unwrap();
        assert!(matches!(
            yaml.decode_snapshot(&bytes),
            Err(BankError::LoadDecode(_))
        ));
    }

    #[test]
    fn test_garbage_decode_fails() {
        for format in ALL_FORMATS {
            let codec = Codec::new(format, 1);
            assert!(codec.decode_snapshot(b"\x00\x01garbage\xff").is_err());
        }
    }

    #[test]
    fn test_extension_round_trip() {
        for format in ALL_FORMATS {
            let path = Path::new("bank").with_extension(format.extension());
            assert_eq!(CacheFormat::from_path(&path), Some(format));
        }
        assert_eq!(CacheFormat::from_path(Path::new("bank.txt")), None);
        assert_eq!(CacheFormat::from_path(Path::new("bank")), None);
    }
}
