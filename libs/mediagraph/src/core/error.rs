use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("output config not resolved yet: {0}")]
    ConfigUnresolved(String),

    #[error("connection closed: {0}")]
    ClosedConnection(String),

    #[error("resource initialization failed: {0}")]
    ResourceInit(String),

    #[error("lifecycle violation: {0}")]
    LifecycleViolation(String),

    #[error("incompatible configs: {0}")]
    IncompatibleConfig(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("port not found: {0}")]
    PortNotFound(String),

    #[error("link not found: {0}")]
    LinkNotFound(String),

    #[error("link already exists: {0}")]
    LinkAlreadyExists(String),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("GPU operation failed: {0}")]
    Gpu(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
