use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory could not be determined")]
    ConfigDirNotFound,

    #[error(
        "no revflow config file found. Looked for:\n\
        - REVFLOW_CONFIG_PATH\n\
        - ./revflow.local.yaml, ./revflow.yaml\n\
        - <config dir>/revflow/config.yaml"
    )]
    ConfigFileNotFound,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
