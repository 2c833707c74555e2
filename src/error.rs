use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsIndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("malformed section: {0}")]
    MalformedSection(String),

    #[error("PCR not found (pid {pid:?})")]
    PcrNotFound { pid: Option<u16> },

    #[error("first and last PCR of pid 0x{pid:04x} span zero time")]
    DegeneratePcrSpan { pid: u16 },

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("scan task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, TsIndexError>;
