use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "必須の環境変数が設定されていません: {}\n\
        環境変数、./.env または ~/.config/vmflow/.env で設定してください",
        .0.join(", ")
    )]
    MissingVariables(Vec<String>),

    #[error("{name} の値が不正です: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("{path} の読み込みに失敗しました: {message}")]
    EnvFile { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
