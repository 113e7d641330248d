//! Error types for the frame scheduler and pipelining harness.

use relay_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] relay_core::Error),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
