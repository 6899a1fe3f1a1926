// State-layer errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("I/O error on page file {path}: {source}")]
    PageIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] raida_core::CoreError),
}
