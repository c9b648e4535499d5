use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfxError {
    #[error("{binary} binary not found")]
    BinaryNotFound { binary: String },
    #[error("ffmpeg process failed (exit_code={exit_code:?}): {stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },
    #[error("probe failed: {message}")]
    Probe { message: String },
    #[error("config error: {message}")]
    Config { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FfxError {
    pub(crate) fn spawn_failed(binary: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FfxError::BinaryNotFound {
                binary: binary.to_string(),
            }
        } else {
            FfxError::ProcessFailed {
                exit_code: None,
                stderr: err.to_string(),
            }
        }
    }
}
