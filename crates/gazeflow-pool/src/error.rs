use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker runtime error: {0}")]
    Runtime(String),
}
