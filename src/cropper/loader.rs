//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（URL / Base64 / 本地文件 / 内存字节）的原始字节加载，
//! 并在“尽可能早”的阶段执行输入校验，尽快失败，减少不必要的内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - URL：协议校验 + 内容类型 + `Content-Length` + 流式下载体积/分块超时。
//! - Base64：先估算解码体积，再解码。
//! - 文件：metadata 体积限制 + 读取。
//! - 所有来源最终都用 `infer` 校验字节签名。
//!
//! 不做重试与退避，失败直接交给宿主处理。

use std::path::Path;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

use super::config::LoaderConfig;
use super::source::{ImageSource, RawImageData};
use super::CropError;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const MAX_REDIRECTS: usize = 5;

/// 源图加载器，持有可复用的 HTTP 客户端。
#[derive(Debug, Clone)]
pub struct SourceLoader {
    config: LoaderConfig,
    http_client: reqwest::Client,
}

impl SourceLoader {
    /// # 示例
    /// ```rust,no_run
    /// use avatar_cropper::cropper::{LoaderConfig, SourceLoader};
    ///
    /// let loader = SourceLoader::new(LoaderConfig::default())?;
    /// # Ok::<(), avatar_cropper::cropper::CropError>(())
    /// ```
    pub fn new(config: LoaderConfig) -> Result<Self, CropError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| CropError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// 按来源类型加载原始字节。
    pub(crate) async fn load_raw(&self, source: ImageSource) -> Result<RawImageData, CropError> {
        match source {
            ImageSource::Url(url) => self.load_from_url(&url).await,
            ImageSource::Base64(data) => self.load_from_base64(&data),
            ImageSource::FilePath(path) => self.load_from_file(&path),
            ImageSource::Bytes(bytes) => self.load_from_bytes(bytes),
        }
    }

    async fn load_from_url(&self, url: &str) -> Result<RawImageData, CropError> {
        log::info!("🌐 开始下载源图 - URL: {}", redact_url_for_log(url));

        let parsed = validate_url(url)?;
        let bytes = self.download_with_validation(parsed).await?;
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }

    fn load_from_base64(&self, data: &str) -> Result<RawImageData, CropError> {
        log::info!("📝 开始处理 base64 源图");

        let bytes = parse_base64_with_limit(data, self.config.max_file_size)?;
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(oversized("Base64 解码后体积过大", bytes.len() as u64, self.config.max_file_size));
        }
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "base64",
        })
    }

    fn load_from_file(&self, path: &str) -> Result<RawImageData, CropError> {
        log::info!("📁 开始读取本地源图 - 路径: {}", path);

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(CropError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| CropError::FileSystem(format!("无法读取文件信息：{}", e)))?;
        if metadata.len() > self.config.max_file_size {
            return Err(oversized("文件过大", metadata.len(), self.config.max_file_size));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| CropError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
        })
    }

    fn load_from_bytes(&self, bytes: Vec<u8>) -> Result<RawImageData, CropError> {
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(oversized("源图字节过大", bytes.len() as u64, self.config.max_file_size));
        }
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "bytes",
        })
    }

    /// 流式下载，边读边校验体积，避免一次性读入导致内存峰值过高。
    async fn download_with_validation(&self, url: reqwest::Url) -> Result<Vec<u8>, CropError> {
        let raw_url = url.to_string();
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, &raw_url))?;

        if !response.status().is_success() {
            return Err(CropError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                status_message(response.status().as_u16())
            )));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !is_image_content_type(ct_str) {
                    return Err(CropError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = total_len {
            if size > self.config.max_file_size {
                return Err(oversized("文件过大", size, self.config.max_file_size));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(self.config.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut response = response;
        let chunk_timeout = Duration::from_millis(self.config.stream_chunk_timeout_ms);

        loop {
            let next_chunk = tokio::time::timeout(chunk_timeout, response.chunk())
                .await
                .map_err(|_| CropError::Timeout("下载数据流读取超时".to_string()))?;

            let Some(chunk) = next_chunk.map_err(|e| self.map_reqwest_error(e, &raw_url))? else {
                break;
            };

            let downloaded = (buffer.len() + chunk.len()) as u64;
            if downloaded > self.config.max_file_size {
                return Err(oversized("下载体积超过限制", downloaded, self.config.max_file_size));
            }
            buffer.extend_from_slice(&chunk);
        }

        log::debug!(
            "📦 下载完成 - URL: {} 大小: {}KB",
            redact_url_for_log(&raw_url),
            buffer.len() / 1024
        );

        Ok(buffer)
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> CropError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            CropError::Timeout(format!("下载超时（{}秒）", self.config.download_timeout))
        } else if e.is_connect() {
            CropError::Network(format!("无法连接：{}", err_msg))
        } else {
            CropError::Network(format!("请求失败：{}", err_msg))
        }
    }
}

fn oversized(what: &str, size: u64, limit: u64) -> CropError {
    CropError::ResourceLimit(format!(
        "{}：{:.2} MB（限制：{:.2} MB）",
        what,
        size as f64 / 1024.0 / 1024.0,
        limit as f64 / 1024.0 / 1024.0
    ))
}

fn validate_url(url: &str) -> Result<reqwest::Url, CropError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| CropError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CropError::InvalidFormat(format!("不支持的协议：{}", other))),
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 去掉 query 与 fragment，避免签名参数进入日志。
fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, CropError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| CropError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| CropError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, CropError> {
    let normalized = data.trim();

    let payload = if normalized.starts_with("data:image/") {
        let base64_start = normalized
            .find(";base64,")
            .ok_or_else(|| CropError::InvalidFormat("缺少 base64 标记".to_string()))?;
        &normalized[base64_start + 8..]
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
    if estimated_len > max_file_size {
        return Err(oversized("Base64 预计解码体积过大", estimated_len, max_file_size));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| CropError::Decode(format!("Base64 解码失败：{}", e)))
}

fn validate_image_signature(bytes: &[u8]) -> Result<(), CropError> {
    if bytes.is_empty() {
        return Err(CropError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| CropError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(CropError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cropper::fixtures::create_png_bytes;

    fn loader() -> SourceLoader {
        SourceLoader::new(LoaderConfig::default()).expect("loader init failed")
    }

    #[test]
    fn load_from_base64_rejects_non_image_payload() {
        let result = loader().load_from_base64("SGVsbG8=");
        assert!(matches!(result, Err(CropError::InvalidFormat(_))));
    }

    #[test]
    fn load_from_base64_accepts_data_url() {
        let png = create_png_bytes(8, 4);
        let data_url = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&png));

        let raw = loader().load_from_base64(&data_url).expect("data url should load");
        assert_eq!(raw.bytes, png);
        assert_eq!(raw.source_hint, "base64");
    }

    #[test]
    fn data_url_without_base64_marker_is_rejected() {
        let result = parse_base64_with_limit("data:image/png,abcd", 1024);
        assert!(matches!(result, Err(CropError::InvalidFormat(_))));
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = parse_base64_with_limit(&huge, 32);
        assert!(matches!(result, Err(CropError::ResourceLimit(_))));
    }

    #[test]
    fn load_from_file_reports_missing_file() {
        let result = loader().load_from_file("/definitely/not/here/avatar.png");
        assert!(matches!(result, Err(CropError::FileSystem(_))));
    }

    #[test]
    fn load_from_bytes_checks_signature_and_size() {
        let empty = loader().load_from_bytes(Vec::new());
        assert!(matches!(empty, Err(CropError::InvalidFormat(_))));

        let mut config = LoaderConfig::default();
        config.max_file_size = 16;
        let small = SourceLoader::new(config).expect("loader init failed");
        let result = small.load_from_bytes(create_png_bytes(32, 32));
        assert!(matches!(result, Err(CropError::ResourceLimit(_))));
    }

    #[test]
    fn url_validation_rejects_non_http_schemes() {
        assert!(matches!(validate_url("ftp://example.com/a.png"), Err(CropError::InvalidFormat(_))));
        assert!(matches!(validate_url("not a url"), Err(CropError::InvalidFormat(_))));
        assert!(validate_url("https://example.com/a.png").is_ok());
    }

    #[test]
    fn content_type_parser_accepts_image_with_params() {
        assert!(is_image_content_type("image/png; charset=utf-8"));
        assert!(is_image_content_type("IMAGE/JPEG"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted =
            redact_url_for_log("https://cdn.example.com:8443/avatars/u1.png?token=abc123#hash");
        assert_eq!(redacted, "https://cdn.example.com:8443/avatars/u1.png");
    }
}
