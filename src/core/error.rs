use thiserror::Error;
use std::io;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("无法识别的链接（既不是磁力链接也不是种子）: {0}")]
    UnresolvableLink(String),

    #[error("引擎致命错误 [{link}]: {message}")]
    EngineFatal {
        link: String,
        message: String,
    },

    #[error("存储迁移失败: {path}: {message}")]
    StorageMoveFailure {
        path: String,
        message: String,
    },

    #[error("无法创建目录 {path}: {source}")]
    Mkdir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("恢复数据解码失败: {0}")]
    ResumeDataDecode(String),

    #[error("任务ID不存在: {0}")]
    UnknownTask(Uuid),

    #[error("引擎调用失败: {0}")]
    Engine(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("Actor 邮箱不可用: {0}")]
    Mailbox(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    IoError(#[from] io::Error),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl DownloadError {
    /// 会中止任务启动或迫使任务进入 `ErrorPaused` 的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloadError::UnresolvableLink(_)
                | DownloadError::EngineFatal { .. }
                | DownloadError::Mkdir { .. }
                | DownloadError::UnknownTask(_)
        )
    }
}

impl From<String> for DownloadError {
    fn from(error: String) -> Self {
        DownloadError::Unknown(error)
    }
}

impl From<&str> for DownloadError {
    fn from(error: &str) -> Self {
        DownloadError::Unknown(error.to_string())
    }
}

impl From<actix::MailboxError> for DownloadError {
    fn from(error: actix::MailboxError) -> Self {
        DownloadError::Mailbox(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
