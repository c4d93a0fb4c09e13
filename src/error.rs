use std::fmt;

/// Errors that can arise while loading a story, parsing its side-car
/// descriptor, or accepting a snapshot. Runtime misbehaviour once a game is
/// running (illegal opcode, stack overflow, bad goto) is reported through
/// `RunSignal` instead, since it is an expected terminal state of a running
/// game rather than a failure of the call that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AMachineError {
    UnsupportedVersion(u8),
    CorruptHeader { offset: u16 },
    StoryTooLarge(usize),
    StoryTooSmall(usize),
    SnapshotTruncated { expected: usize, actual: usize },
    SnapshotBadId(u32),
    SnapshotChecksumMismatch { expected: u16, actual: u16 },
    SnapshotNameMismatch { saved: String, current: String },
}

impl fmt::Display for AMachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => write!(f, "unsupported game version '{}'", *v as char),
            Self::CorruptHeader { offset } => write!(f, "corrupt header at offset {:#06x}", offset),
            Self::StoryTooLarge(n) => write!(f, "story file too large: {} bytes", n),
            Self::StoryTooSmall(n) => write!(f, "story file too small: {} bytes", n),
            Self::SnapshotTruncated { expected, actual } => {
                write!(f, "snapshot truncated: expected {} bytes, got {}", expected, actual)
            }
            Self::SnapshotBadId(id) => write!(f, "snapshot has wrong id {:#010x}", id),
            Self::SnapshotChecksumMismatch { expected, actual } => {
                write!(f, "snapshot checksum mismatch: expected {:#06x}, got {:#06x}", expected, actual)
            }
            Self::SnapshotNameMismatch { saved, current } => {
                write!(f, "snapshot was saved from '{}', current game is '{}'", saved, current)
            }
        }
    }
}

impl std::error::Error for AMachineError {}

pub type Result<T> = std::result::Result<T, AMachineError>;
