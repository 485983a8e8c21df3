use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChipError>;

/// Errors raised while talking to an initialised controller.
///
/// None of these are fatal: the caller logs them and carries on with the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChipError {
    #[error("link is down")]
    LinkDown,

    #[error("frame of {len} bytes exceeds the {max}-byte transmit buffer")]
    MessageTooLarge { len: usize, max: usize },

    #[error("receive failed (status {status:#06x})")]
    UnspecifiedReceive { status: u16 },

    #[error("PHY still busy after {polls} polls")]
    PhyBusyTimeout { polls: u32 },
}

impl ChipError {
    /// Negative length code reported by the C-style driver API this replaces. Useful when
    /// logging next to firmware traces.
    pub fn code(&self) -> i32 {
        match self {
            ChipError::MessageTooLarge { .. } => -1,
            ChipError::UnspecifiedReceive { .. } => -1,
            ChipError::LinkDown => -2,
            ChipError::PhyBusyTimeout { .. } => -3,
        }
    }
}

/// Why a driver could not be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("no ENC28J60 answered on the SPI bus (revision register read {revision:#04x})")]
    ChipNotDetected { revision: u8 },

    #[error(transparent)]
    Chip(#[from] ChipError),
}
