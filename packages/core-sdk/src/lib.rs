pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod persona;
pub mod server;
pub mod telemetry;
pub mod upload;

/**
 * \brief SDK 预导入集合，方便外部引用常用类型。
 */
pub mod prelude {
    pub use crate::config::{AppConfig, RelayConfig, SiteConfig};
    pub use crate::error::{RelayError, ReplyResult};
    pub use crate::llm::ChatRelay;
    pub use crate::models::{Message, Role};
    pub use crate::persona::PersonaProfile;
    pub use crate::upload::{SiteClient, UploadFile};
}
