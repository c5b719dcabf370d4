use thiserror::Error;

use crate::timer::TimerKind;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Timer {0} is already armed, adjust it instead")]
    TimerActive(TimerKind),

    #[error("Timer registry has been shut down")]
    TimersEnded,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RaftError>;
