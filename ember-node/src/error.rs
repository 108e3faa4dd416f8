use thiserror::Error;

/// Node-level failures.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Kiln(#[from] ember_kiln::KilnError),

    #[error("vm error: {0}")]
    Forge(#[from] ember_forge::ForgeError),
}
