use thiserror::Error;

/**
 * \brief 中继与站点请求的统一错误类型，调用方据此区分“没有回复”与“空回复”。
 */
#[derive(Debug, Error)]
pub enum RelayError {
    /** \brief 网络不可达、连接中断等传输层错误。 */
    #[error("transport error: {0}")]
    Transport(String),

    /** \brief 超过配置的请求超时。 */
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /** \brief 远端返回非 2xx 状态码。 */
    #[error("request failed: {status} -> {body}")]
    Status { status: u16, body: String },

    /** \brief 响应体缺少 choices[0].message.content 等预期结构。 */
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /** \brief 必填字段缺失，未发出任何网络请求。 */
    #[error("validation failed: {0}")]
    Validation(String),

    /** \brief 配置不完整或取值越界。 */
    #[error("invalid config: {0}")]
    Config(String),
}

impl RelayError {
    /**
     * \brief 将 reqwest 错误归类，超时单独区分。
     */
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            RelayError::Timeout(timeout_secs)
        } else if err.is_decode() {
            RelayError::MalformedResponse(err.to_string())
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}

pub type ReplyResult = Result<String, RelayError>;
