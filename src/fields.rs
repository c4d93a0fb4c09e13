// Here reside the definitions of values shared by several modules: game
// version, the header pointer table, and the per-tick run signal. Rather
// than have magic numbers and bare u16s everywhere, we opt for small named
// types wherever it is not too ridiculous.

use crate::error::{AMachineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameVersion {
    V2,
    V3,
    V4,
}

impl GameVersion {
    /// Parses the one-byte ASCII side-car game descriptor.
    pub fn from_descriptor_byte(b: u8) -> Result<GameVersion> {
        match b {
            b'2' => Ok(GameVersion::V2),
            b'3' => Ok(GameVersion::V3),
            b'4' => Ok(GameVersion::V4),
            other => Err(AMachineError::UnsupportedVersion(other)),
        }
    }

    pub fn is_v2(self) -> bool {
        matches!(self, GameVersion::V2)
    }
}

/// The result of driving one opcode: either execution continues, or the
/// game has reached a terminal state (player `#quit`, a fatal runtime
/// error, or an explicit `stop_game`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSignal {
    Continue,
    Stopped { diagnostic: String },
}

impl RunSignal {
    pub fn is_running(&self) -> bool {
        matches!(self, RunSignal::Continue)
    }
}

/// The twelve 16-bit header pointers common to every game version. Index 11 (the code base) is never workspace-relative; all others
/// are rebased into the workspace's list area when they fall in
/// `[0x8000, 0x9000]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderPointers {
    pub values: [u16; 12],
    pub in_workspace: [bool; 12],
}

impl HeaderPointers {
    pub fn resolve(raw: [u16; 12]) -> HeaderPointers {
        let mut values = [0u16; 12];
        let mut in_workspace = [false; 12];
        for i in 0..12 {
            let d0 = raw[i];
            let ws = i != 11 && (0x8000..=0x9000).contains(&d0);
            values[i] = if ws { d0 - 0x8000 } else { d0 };
            in_workspace[i] = ws;
        }
        HeaderPointers { values, in_workspace }
    }

    pub fn abs_data_block(&self) -> u16 {
        self.values[0]
    }

    pub fn dict_data(&self) -> u16 {
        self.values[1]
    }

    pub fn list2_base(&self) -> u16 {
        self.values[3]
    }

    pub fn list3_base(&self) -> u16 {
        self.values[4]
    }

    pub fn list9_base(&self) -> u16 {
        self.values[10]
    }

    pub fn acode_ptr(&self) -> u16 {
        self.values[11]
    }

    /// Resolves list-handler header index `idx` to a list-area/story offset
    /// plus whether that offset lives in the workspace.
    pub fn list_pointer(&self, idx: usize) -> (u16, bool) {
        (self.values[idx], self.in_workspace[idx])
    }
}

/// Fixed 16-entry direction reversal table used by the `exit` opcode.
/// `0xff` at indices 13 and 14 marks directions with no reverse.
pub const EXIT_REVERSAL_TABLE: [u8; 16] =
    [0x00, 0x04, 0x06, 0x07, 0x01, 0x08, 0x02, 0x03, 0x05, 0x0a, 0x09, 0x0c, 0x0b, 0xff, 0xff, 0x0f];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_rejects_v1_and_garbage() {
        assert_eq!(GameVersion::from_descriptor_byte(b'1'), Err(AMachineError::UnsupportedVersion(b'1')));
        assert_eq!(GameVersion::from_descriptor_byte(b'9'), Err(AMachineError::UnsupportedVersion(b'9')));
        assert_eq!(GameVersion::from_descriptor_byte(b'3'), Ok(GameVersion::V3));
    }

    #[test]
    fn header_pointer_rebasing() {
        let mut raw = [0u16; 12];
        raw[3] = 0x8010;
        raw[11] = 0x8010;
        let hp = HeaderPointers::resolve(raw);
        assert_eq!(hp.list2_base(), 0x10);
        assert!(hp.in_workspace[3]);
        assert_eq!(hp.acode_ptr(), 0x8010);
        assert!(!hp.in_workspace[11]);
    }

    #[test]
    fn reversal_table_self_consistent_except_sentinels() {
        for d in 0u8..16 {
            if d == 13 || d == 14 {
                continue;
            }
            let once = EXIT_REVERSAL_TABLE[d as usize];
            let twice = EXIT_REVERSAL_TABLE[once as usize];
            assert_eq!(twice, d, "reversal table not self-consistent for {}", d);
        }
    }
}
