// The interpreter's mutable game state and its on-disk snapshot format.

use crate::error::{AMachineError, Result};
use std::convert::TryInto;

pub const VAR_TABLE_SIZE: usize = 256;
pub const LIST_AREA_SIZE: usize = 2048;
pub const STACK_SIZE: usize = 128;
pub const MAX_PATH: usize = 16;
pub const RAM_SAVE_SLOTS: usize = 10;

const SNAPSHOT_ID: u32 = 0x4C39_3031;
pub const SNAPSHOT_SIZE: usize = 2848;

const OFF_ID: usize = 0;
const OFF_CODE_PTR: usize = 4;
const OFF_STACK_PTR: usize = 6;
const OFF_LIST_AREA_SIZE: usize = 8;
const OFF_STACK_SIZE: usize = 10;
const OFF_FILENAME_SIZE: usize = 12;
const OFF_CHECKSUM: usize = 14;
const OFF_VAR_TABLE: usize = 16;
const OFF_LIST_AREA: usize = 528;
const OFF_STACK: usize = 2576;
const OFF_FILENAME: usize = 2832;

/// The full mutable game state: variables, the small "list area" scratch
/// region, the gosub/return stack, and the current instruction pointer.
pub struct Workspace {
    pub code_ptr: u16,
    pub stack_ptr: usize,
    pub var_table: [u16; VAR_TABLE_SIZE],
    pub list_area: [u8; LIST_AREA_SIZE],
    pub stack: [u16; STACK_SIZE],
    ram_slots: Vec<([u16; VAR_TABLE_SIZE], [u8; LIST_AREA_SIZE])>,
}

impl Workspace {
    pub fn new() -> Workspace {
        Workspace {
            code_ptr: 0,
            stack_ptr: 0,
            var_table: [0; VAR_TABLE_SIZE],
            list_area: [0; LIST_AREA_SIZE],
            stack: [0; STACK_SIZE],
            ram_slots: vec![([0; VAR_TABLE_SIZE], [0; LIST_AREA_SIZE]); RAM_SAVE_SLOTS],
        }
    }

    pub fn clear_variables(&mut self) {
        self.var_table = [0; VAR_TABLE_SIZE];
    }

    pub fn clear_stack(&mut self) {
        self.stack_ptr = 0;
    }

    pub fn clear_lists(&mut self) {
        self.list_area = [0; LIST_AREA_SIZE];
    }

    pub fn push_return(&mut self, addr: u16) -> bool {
        if self.stack_ptr == STACK_SIZE {
            return false;
        }
        self.stack[self.stack_ptr] = addr;
        self.stack_ptr += 1;
        true
    }

    pub fn pop_return(&mut self) -> Option<u16> {
        if self.stack_ptr == 0 {
            return None;
        }
        self.stack_ptr -= 1;
        Some(self.stack[self.stack_ptr])
    }

    /// Copies var_table+list_area into RAM-save slot `slot`.
    pub fn ram_save(&mut self, slot: usize) {
        self.ram_slots[slot] = (self.var_table, self.list_area);
    }

    /// Restores var_table+list_area from RAM-save slot `slot`.
    pub fn ram_load(&mut self, slot: usize) {
        let (vars, lists) = self.ram_slots[slot];
        self.var_table = vars;
        self.list_area = lists;
    }

    /// Serializes the workspace to the 2848-byte snapshot record, stamping
    /// the id, size fields, filename and checksum.
    pub fn to_snapshot_bytes(&self, filename: &str) -> Vec<u8> {
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        buf[OFF_ID..OFF_ID + 4].copy_from_slice(&SNAPSHOT_ID.to_le_bytes());
        buf[OFF_CODE_PTR..OFF_CODE_PTR + 2].copy_from_slice(&self.code_ptr.to_le_bytes());
        buf[OFF_STACK_PTR..OFF_STACK_PTR + 2].copy_from_slice(&(self.stack_ptr as u16).to_le_bytes());
        buf[OFF_LIST_AREA_SIZE..OFF_LIST_AREA_SIZE + 2].copy_from_slice(&(LIST_AREA_SIZE as u16).to_le_bytes());
        buf[OFF_STACK_SIZE..OFF_STACK_SIZE + 2].copy_from_slice(&(STACK_SIZE as u16).to_le_bytes());
        buf[OFF_FILENAME_SIZE..OFF_FILENAME_SIZE + 2].copy_from_slice(&(MAX_PATH as u16).to_le_bytes());
        // checksum field left zero for the summation pass below.

        for (i, v) in self.var_table.iter().enumerate() {
            let off = OFF_VAR_TABLE + i * 2;
            buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
        }
        buf[OFF_LIST_AREA..OFF_LIST_AREA + LIST_AREA_SIZE].copy_from_slice(&self.list_area);
        for (i, v) in self.stack.iter().enumerate() {
            let off = OFF_STACK + i * 2;
            buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
        }
        let name_bytes = filename.as_bytes();
        let n = name_bytes.len().min(MAX_PATH - 1);
        buf[OFF_FILENAME..OFF_FILENAME + n].copy_from_slice(&name_bytes[..n]);

        let checksum = checksum_of(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Restores only `var_table` and `list_area` from a verified snapshot,
    /// leaving `code_ptr` and `stack` untouched.
    pub fn restore_normal(&mut self, snap: &ParsedSnapshot) {
        self.var_table = snap.var_table;
        self.list_area = snap.list_area;
    }

    /// Restores `var_table`, `list_area` and `code_ptr` from a verified
    /// snapshot.
    pub fn restore_full(&mut self, snap: &ParsedSnapshot) {
        self.restore_normal(snap);
        self.code_ptr = snap.code_ptr;
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace::new()
    }
}

fn checksum_of(buf: &[u8]) -> u16 {
    buf.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

/// A snapshot record that has passed the id and checksum check, but not yet the filename-mismatch confirmation.
pub struct ParsedSnapshot {
    pub code_ptr: u16,
    pub var_table: [u16; VAR_TABLE_SIZE],
    pub list_area: [u8; LIST_AREA_SIZE],
    pub filename: String,
}

/// Validates a snapshot's id and checksum. Does not
/// check the originating filename; callers decide whether a mismatch
/// should be confirmed interactively.
pub fn parse_snapshot(bytes: &[u8]) -> Result<ParsedSnapshot> {
    if bytes.len() != SNAPSHOT_SIZE {
        return Err(AMachineError::SnapshotTruncated { expected: SNAPSHOT_SIZE, actual: bytes.len() });
    }

    let id = u32::from_le_bytes(bytes[OFF_ID..OFF_ID + 4].try_into().unwrap());
    if id != SNAPSHOT_ID {
        return Err(AMachineError::SnapshotBadId(id));
    }

    let stored_checksum = u16::from_le_bytes(bytes[OFF_CHECKSUM..OFF_CHECKSUM + 2].try_into().unwrap());
    let mut rezeroed = bytes.to_vec();
    rezeroed[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0, 0]);
    let actual_checksum = checksum_of(&rezeroed);
    if actual_checksum != stored_checksum {
        return Err(AMachineError::SnapshotChecksumMismatch { expected: stored_checksum, actual: actual_checksum });
    }

    let code_ptr = u16::from_le_bytes(bytes[OFF_CODE_PTR..OFF_CODE_PTR + 2].try_into().unwrap());

    let mut var_table = [0u16; VAR_TABLE_SIZE];
    for (i, slot) in var_table.iter_mut().enumerate() {
        let off = OFF_VAR_TABLE + i * 2;
        *slot = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
    }

    let mut list_area = [0u8; LIST_AREA_SIZE];
    list_area.copy_from_slice(&bytes[OFF_LIST_AREA..OFF_LIST_AREA + LIST_AREA_SIZE]);

    let raw_name = &bytes[OFF_FILENAME..OFF_FILENAME + MAX_PATH];
    let nul = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let filename = String::from_utf8_lossy(&raw_name[..nul]).into_owned();

    Ok(ParsedSnapshot { code_ptr, var_table, list_area, filename })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let mut ws = Workspace::new();
        ws.var_table[3] = 42;
        ws.list_area[10] = 7;
        ws.code_ptr = 0x1234;
        ws.stack_ptr = 2;
        ws.stack[0] = 1;
        ws.stack[1] = 2;

        let bytes = ws.to_snapshot_bytes("game.dat");
        assert_eq!(bytes.len(), SNAPSHOT_SIZE);
        let snap = parse_snapshot(&bytes).unwrap();
        assert_eq!(snap.code_ptr, 0x1234);
        assert_eq!(snap.var_table[3], 42);
        assert_eq!(snap.list_area[10], 7);
        assert_eq!(snap.filename, "game.dat");

        let mut restored = Workspace::new();
        restored.restore_full(&snap);
        assert_eq!(restored.code_ptr, ws.code_ptr);
        assert_eq!(restored.var_table, ws.var_table);
        assert_eq!(restored.list_area, ws.list_area);
    }

    #[test]
    fn single_byte_mutation_fails_checksum() {
        let ws = Workspace::new();
        let mut bytes = ws.to_snapshot_bytes("game.dat");
        bytes[OFF_VAR_TABLE] ^= 0xff;
        assert!(matches!(parse_snapshot(&bytes), Err(AMachineError::SnapshotChecksumMismatch { .. })));
    }

    #[test]
    fn bad_id_is_rejected() {
        let ws = Workspace::new();
        let mut bytes = ws.to_snapshot_bytes("game.dat");
        bytes[0] = 0;
        assert!(matches!(parse_snapshot(&bytes), Err(AMachineError::SnapshotBadId(_))));
    }

    #[test]
    fn normal_restore_preserves_code_ptr() {
        let mut ws = Workspace::new();
        ws.code_ptr = 0x500;
        ws.var_table[0] = 99;
        let bytes = ws.to_snapshot_bytes("game.dat");

        let mut snap_src = Workspace::new();
        snap_src.code_ptr = 0x900;
        snap_src.var_table[0] = 1;
        let other_bytes = snap_src.to_snapshot_bytes("game.dat");
        let snap = parse_snapshot(&other_bytes).unwrap();

        ws.restore_normal(&snap);
        assert_eq!(ws.code_ptr, 0x500, "normal restore must not touch code_ptr");
        assert_eq!(ws.var_table[0], 1);
        let _ = bytes;
    }

    #[test]
    fn ram_save_load_idempotence() {
        let mut ws = Workspace::new();
        ws.var_table[5] = 11;
        ws.list_area[0] = 1;
        ws.ram_save(1);
        ws.var_table[5] = 99;
        ws.ram_load(1);
        assert_eq!(ws.var_table[5], 11);

        ws.ram_load(1);
        ws.ram_save(1);
        assert_eq!(ws.var_table[5], 11);
    }
}
