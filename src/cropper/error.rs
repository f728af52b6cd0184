//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 裁剪链路中真正会失败的只有“加载 → 解码 → 编码”以及配置校验，
//! 统一收敛到 `CropError` 一个枚举里，调用侧可按分支匹配。
//!
//! 交互类操作（拖拽、缩放、视口切换）不返回错误：几何前置条件不满足时直接退化为空操作。

/// 裁剪链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

impl CropError {
    /// 稳定的错误码，供宿主层做分支展示。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Encode(_) => "E_ENCODE",
            Self::InvalidConfig(_) => "E_INVALID_CONFIG",
        }
    }

    /// 出错所处阶段：`load` / `decode` / `encode` / `config`。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::FileSystem(_) | Self::Timeout(_) => "load",
            Self::Decode(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "decode",
            Self::Encode(_) => "encode",
            Self::InvalidConfig(_) => "config",
        }
    }
}

impl From<CropError> for String {
    /// 兼容仍以字符串传递错误的宿主层。
    fn from(error: CropError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_stages_are_stable() {
        let err = CropError::Timeout("下载首包超时".to_string());
        assert_eq!(err.code(), "E_TIMEOUT");
        assert_eq!(err.stage(), "load");

        let err = CropError::Encode("jpeg".to_string());
        assert_eq!(err.code(), "E_ENCODE");
        assert_eq!(err.stage(), "encode");
    }

    #[test]
    fn error_converts_into_display_string() {
        let message: String = CropError::InvalidConfig("diameter 为 0".to_string()).into();
        assert_eq!(message, "配置错误：diameter 为 0");
    }
}
