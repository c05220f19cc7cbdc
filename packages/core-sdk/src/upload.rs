use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::config::SiteConfig;
use crate::error::RelayError;
use crate::llm::read_json;
use crate::telemetry;

/**
 * \brief 待上传的文件内容。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime: mime.into(),
        }
    }

    /**
     * \brief 从磁盘读取文件，按扩展名推断 MIME。
     */
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = guess_mime(&file_name);
        Ok(Self::new(file_name, bytes, mime))
    }

    fn into_part(self) -> Result<Part, RelayError> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)
            .map_err(|e| RelayError::Validation(format!("invalid mime type: {}", e)))
    }
}

pub fn guess_mime(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/**
 * \brief 角色站点后端客户端：图片墙上传、书架 TXT 上传与分页列表。
 */
#[derive(Debug, Clone)]
pub struct SiteClient {
    config: SiteConfig,
    client: reqwest::Client,
}

impl SiteClient {
    pub fn new(config: SiteConfig) -> Result<Self, RelayError> {
        if config.base_url.trim().is_empty() {
            return Err(RelayError::Config("site.base_url 不能为空".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RelayError::Config(format!("build http client failed: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /**
     * \brief 批量上传图片。nickname 为必填项，校验失败时不发请求。
     */
    pub async fn upload_images(
        &self,
        files: Vec<UploadFile>,
        nickname: &str,
    ) -> Result<Value, RelayError> {
        if nickname.trim().is_empty() {
            return Err(RelayError::Validation("nickname 为必填项".to_string()));
        }
        if files.is_empty() {
            return Err(RelayError::Validation("至少需要一张图片".to_string()));
        }

        let count = files.len();
        let mut form = Form::new().text("nickname", nickname.to_string());
        for file in files {
            form = form.part("images", file.into_part()?);
        }

        telemetry::log_event(
            "site.images",
            &format!("upload nickname={} count={}", nickname, count),
        );
        self.send_form("/api/images", form).await
    }

    /**
     * \brief 上传单个 TXT 文件到书架。
     * \param role_name 所属角色，缺省为配置中的 default_role
     */
    pub async fn upload_txt_file(
        &self,
        file: UploadFile,
        uploader: &str,
        role_name: Option<&str>,
    ) -> Result<Value, RelayError> {
        let role_name = role_name
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(self.config.default_role.as_str())
            .to_string();
        let file_name = file.file_name.clone();
        let form = Form::new()
            .part("file", file.into_part()?)
            .text("uploader", uploader.to_string())
            .text("role_name", role_name.clone());

        telemetry::log_event(
            "site.book",
            &format!("upload file={} role={}", file_name, role_name),
        );
        self.send_form("/api/book", form).await
    }

    pub async fn list_images(&self, page: u32, limit: u32) -> Result<Value, RelayError> {
        self.get_page("/api/getAllImages", page, limit).await
    }

    pub async fn list_txt_files(&self, page: u32, limit: u32) -> Result<Value, RelayError> {
        self.get_page("/api/book", page, limit).await
    }

    async fn send_form(&self, path: &str, form: Form) -> Result<Value, RelayError> {
        let resp = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, self.config.timeout_secs))?;
        let result = read_json(resp, self.config.timeout_secs).await;
        if let Err(e) = &result {
            telemetry::log_error("site.upload", &format!("{} {}", path, e));
        }
        result
    }

    async fn get_page(&self, path: &str, page: u32, limit: u32) -> Result<Value, RelayError> {
        if page == 0 || limit == 0 {
            return Err(RelayError::Validation(format!(
                "page 与 limit 必须大于 0 (page={} limit={})",
                page, limit
            )));
        }
        let resp = self
            .client
            .get(self.url(path))
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(e, self.config.timeout_secs))?;
        read_json(resp, self.config.timeout_secs).await
    }
}
