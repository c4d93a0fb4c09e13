// The opcode fetch-decode-execute loop plus everything it calls
// directly: the addr/con/var operand fetchers, the exit-table walk, the
// driver-call/function dispatch, and the fresh-input-line
// machinery shared by the two tokenizers.
//
// `current_code` is the one piece of state the original kept in a global
// register across an entire instruction: both `addr()` and `con()` pick
// their short/long operand form from bits of the *opcode* byte itself, not
// from a separate mode byte, so whichever opcode is mid-dispatch has to
// stay reachable for the whole of `step()`.

use crate::devices::{bump_seed, call_driver, DriverOutcome, HostAdapter};
use crate::fields::{GameVersion, HeaderPointers, RunSignal, EXIT_REVERSAL_TABLE};
use crate::instructions::{FunctionCode, Opcode};
use crate::memory::StoryMemory;
use crate::message::{MessageDecoder, MessageTables};
use crate::objects::ObjectSearch;
use crate::tokenizer::{detect_meta, is_input_char, MetaCommand, Tokenizer, TokenizerTables};
use crate::workspace::{parse_snapshot, Workspace, LIST_AREA_SIZE, SNAPSHOT_SIZE};

const HEADER_PTR_OFFSET_V2: u16 = 0x04;
const HEADER_PTR_OFFSET_V3V4: u16 = 0x12;

/// Derives the twelve-pointer table and the message/tokenizer field sets
/// from the story's header. V2's message table lives at a fixed
/// offset outside the pointer table; V3/V4 derive several fields as
/// lengths added to an earlier field rather than as absolute addresses.
fn parse_header(version: GameVersion, memory: &StoryMemory) -> (HeaderPointers, MessageTables, TokenizerTables) {
    let hd_offset = if version.is_v2() { HEADER_PTR_OFFSET_V2 } else { HEADER_PTR_OFFSET_V3V4 };
    let mut raw = [0u16; 12];
    for (i, slot) in raw.iter_mut().enumerate() {
        *slot = memory.read_word(hd_offset.wrapping_add((i as u16) * 2));
    }
    let header = HeaderPointers::resolve(raw);

    if version.is_v2() {
        let start_md = memory.read_word(0x00);
        let start_md_v2 = memory.read_word(0x02);
        let tables = MessageTables { start_md, start_md_v2, ..Default::default() };
        (header, tables, TokenizerTables::default())
    } else {
        let start_md = memory.read_word(0x02);
        let end_md = start_md.wrapping_add(memory.read_word(0x04));
        let def_dict = memory.read_word(0x06);
        let end_wdp5 = def_dict.wrapping_add(5).wrapping_add(memory.read_word(0x08));
        let dict_data = memory.read_word(0x0a);
        let dict_data_len = memory.read_word(0x0c);
        let word_table = memory.read_word(0x0e);
        let tables = MessageTables {
            start_md,
            start_md_v2: 0,
            end_md,
            dict_data,
            dict_data_len,
            def_dict,
            word_table,
        };
        let tok = TokenizerTables {
            dict_data,
            dict_data_len,
            def_dict,
            end_wdp5,
            start_md,
            end_md,
            is_v4: version == GameVersion::V4,
        };
        (header, tables, tok)
    }
}

/// What a fresh input-line fetch produced.
enum LineOutcome {
    Line,
    MetaHandled,
    Abandoned,
}

/// Runs one loaded story to completion against a host. Everything that
/// touches the terminal, the filesystem or the next story part goes
/// through `host`; everything else is pure state transitions over
/// `workspace`/`memory`.
pub struct Interpreter<H: HostAdapter> {
    version: GameVersion,
    memory: StoryMemory,
    workspace: Workspace,
    header: HeaderPointers,
    decoder: MessageDecoder,
    tokenizer_tables: TokenizerTables,
    objects: ObjectSearch,
    seed: u32,
    host: H,
    game_file: String,
    running: bool,
    stop_diagnostic: Option<String>,
    current_code: u8,
    pending_line: Vec<u8>,
    resume_at: Option<usize>,
    last_input_word: Vec<u8>,
    script: Option<Box<dyn Iterator<Item = String>>>,
}

impl<H: HostAdapter> Interpreter<H> {
    /// Loads a story and positions execution at its entry point.
    pub fn new(version: GameVersion, memory: StoryMemory, host: H, game_file: String, seed: Option<u32>) -> Interpreter<H> {
        let (header, msg_tables, tok_tables) = parse_header(version, &memory);
        let mut workspace = Workspace::new();
        workspace.code_ptr = header.acode_ptr();
        workspace.clear_variables();
        workspace.clear_stack();
        workspace.clear_lists();

        Interpreter {
            version,
            memory,
            workspace,
            header,
            decoder: MessageDecoder::new(msg_tables),
            tokenizer_tables: tok_tables,
            objects: ObjectSearch::new(),
            // No host in this design exposes a time-based entropy source;
            // a caller that cares about reproducibility passes a seed, and
            // one that doesn't gets a fixed (if predictable) default.
            seed: seed.unwrap_or(1),
            host,
            game_file,
            running: true,
            stop_diagnostic: None,
            current_code: 0,
            pending_line: Vec::new(),
            resume_at: None,
            last_input_word: Vec::new(),
            script: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs opcodes until the game stops, flushing decoded text to the
    /// host after each one.
    pub fn run(&mut self) {
        while self.running {
            self.step();
        }
    }

    /// Fetches and executes one opcode.
    pub fn step(&mut self) -> RunSignal {
        if !self.running {
            return RunSignal::Stopped { diagnostic: self.stop_diagnostic.clone().unwrap_or_default() };
        }

        let code = self.fetch_byte_raw();
        self.current_code = code;
        self.dispatch(code);
        self.flush_output();

        if self.running {
            RunSignal::Continue
        } else {
            RunSignal::Stopped { diagnostic: self.stop_diagnostic.clone().unwrap_or_default() }
        }
    }

    fn stop(&mut self, diagnostic: String) {
        self.running = false;
        self.stop_diagnostic = Some(diagnostic);
    }

    fn flush_output(&mut self) {
        let text = self.decoder.take_output();
        if text.is_empty() {
            return;
        }
        for c in text.chars() {
            self.host.print_char(c as u32 as u8);
        }
        self.host.flush();
    }

    // -- operand fetchers --------------------------------------

    fn fetch_byte_raw(&mut self) -> u8 {
        let b = self.memory.read_byte(self.workspace.code_ptr);
        self.workspace.code_ptr = self.workspace.code_ptr.wrapping_add(1);
        b
    }

    fn fetch_word_raw(&mut self) -> u16 {
        let w = self.memory.read_word(self.workspace.code_ptr);
        self.workspace.code_ptr = self.workspace.code_ptr.wrapping_add(2);
        w
    }

    /// A branch target: short form is a signed byte offset from the
    /// operand's own position, long form is a word relative to the code
    /// base. Which form applies is bit 0x20 of the current opcode byte.
    fn addr(&mut self) -> u16 {
        if self.current_code & 0x20 != 0 {
            let diff = self.fetch_byte_raw() as i8;
            self.workspace.code_ptr.wrapping_add(diff as i16 as u16).wrapping_sub(1)
        } else {
            let w = self.fetch_word_raw();
            self.header.acode_ptr().wrapping_add(w)
        }
    }

    /// A constant value: short form one byte, long form one word.
    /// Selected by bit 0x40 of the current opcode byte.
    fn con(&mut self) -> u16 {
        if self.current_code & 0x40 != 0 {
            self.fetch_byte_raw() as u16
        } else {
            self.fetch_word_raw()
        }
    }

    fn var_index(&mut self) -> usize {
        self.fetch_byte_raw() as usize
    }

    fn var_val(&mut self) -> u16 {
        let idx = self.var_index();
        self.workspace.var_table[idx]
    }

    fn write_var(&mut self, value: u16) {
        let idx = self.var_index();
        self.workspace.var_table[idx] = value;
    }

    // -- dispatch -------------------------------------------------------

    fn dispatch(&mut self, code: u8) {
        match Opcode::decode(code) {
            Opcode::ListAccess { raw } => self.list_handler(raw),
            Opcode::Goto => {
                let target = self.addr();
                self.workspace.code_ptr = target;
            }
            Opcode::Gosub => {
                let target = self.addr();
                let ret = self.workspace.code_ptr;
                if self.workspace.push_return(ret) {
                    self.workspace.code_ptr = target;
                } else {
                    self.stop("stack overflow".to_string());
                }
            }
            Opcode::Return => match self.workspace.pop_return() {
                Some(addr) => self.workspace.code_ptr = addr,
                None => self.stop("stack underflow".to_string()),
            },
            Opcode::PrintNumber => {
                let n = self.var_val();
                self.decoder.print_decimal(n);
            }
            Opcode::MessageVar => {
                let m = self.var_val();
                self.print_message(m);
            }
            Opcode::MessageConst => {
                let m = self.con();
                self.print_message(m);
            }
            Opcode::Function => self.do_function(),
            Opcode::Input => self.op_input(),
            Opcode::VarCon => {
                let v = self.con();
                self.write_var(v);
            }
            Opcode::VarVar => {
                let v = self.var_val();
                self.write_var(v);
            }
            Opcode::Add => {
                let v = self.var_val();
                let idx = self.var_index();
                self.workspace.var_table[idx] = self.workspace.var_table[idx].wrapping_add(v);
            }
            Opcode::Sub => {
                let v = self.var_val();
                let idx = self.var_index();
                self.workspace.var_table[idx] = self.workspace.var_table[idx].wrapping_sub(v);
            }
            Opcode::Jump => {
                let d0 = self.fetch_word_raw();
                let index_val = self.var_val();
                let a0 = self.header.acode_ptr().wrapping_add(d0.wrapping_add(index_val.wrapping_mul(2)));
                let dest = self.memory.read_word(a0);
                self.workspace.code_ptr = self.header.acode_ptr().wrapping_add(dest);
            }
            Opcode::Exit => {
                let room = self.var_val() as u8;
                let dir = self.var_val() as u8;
                let (d4, d5) = self.do_exit(dir, room);
                let flags = ((d4 & 0x70) >> 4) as u16;
                self.write_var(flags);
                self.write_var(d5 as u16);
            }
            Opcode::IfEqVar => self.if_vt(|a, b| a == b),
            Opcode::IfNeVar => self.if_vt(|a, b| a != b),
            Opcode::IfLtVar => self.if_vt(|a, b| a < b),
            Opcode::IfGtVar => self.if_vt(|a, b| a > b),
            Opcode::Screen => {
                let on = self.fetch_byte_raw() != 0;
                self.host.graphics(on);
                if on {
                    self.fetch_byte_raw();
                }
            }
            Opcode::ClearGraphics => {
                let d0 = self.fetch_byte_raw();
                if d0 != 0 {
                    self.host.clear_graphics();
                }
            }
            Opcode::Picture => {
                let pic = self.var_val();
                self.host.show_bitmap(pic);
            }
            Opcode::GetNextObject => self.get_next_object(),
            Opcode::IfEqConst => self.if_ct(|a, b| a == b),
            Opcode::IfNeConst => self.if_ct(|a, b| a != b),
            Opcode::IfLtConst => self.if_ct(|a, b| a < b),
            Opcode::IfGtConst => self.if_ct(|a, b| a > b),
            Opcode::PrintInput => {
                let word = std::mem::take(&mut self.last_input_word);
                let end = word.iter().position(|&b| b == 0x20).unwrap_or(word.len());
                self.decoder.print_literal(&word[..end]);
                self.last_input_word = word;
            }
            Opcode::Illegal(n) => self.stop(format!("illegal instruction: {}", n)),
        }
    }

    fn print_message(&mut self, msg: u16) {
        if self.version.is_v2() {
            self.decoder.print_message_v2(&self.memory, msg);
        } else {
            self.decoder.print_message(&self.memory, msg);
        }
    }

    fn if_vt(&mut self, cmp: impl Fn(u16, u16) -> bool) {
        let d0 = self.var_val();
        let d1 = self.var_val();
        let a0 = self.addr();
        if cmp(d0, d1) {
            self.workspace.code_ptr = a0;
        }
    }

    fn if_ct(&mut self, cmp: impl Fn(u16, u16) -> bool) {
        let d0 = self.var_val();
        let d1 = self.con();
        let a0 = self.addr();
        if cmp(d0, d1) {
            self.workspace.code_ptr = a0;
        }
    }

    // -- exits -------------------------------

    /// Walks the per-room exit table. Rooms list their exits as `(flags,
    /// byte)` pairs, the low nibble of `flags` giving the direction and the
    /// high bit marking the last entry of the room's group; V4
    /// additionally terminates a group early on a `00 00` sentinel and
    /// falls back to scanning for the reverse direction ("notfn4").
    fn do_exit(&self, dir: u8, room: u8) -> (u8, u8) {
        let mut a0 = self.header.abs_data_block();
        let mut remaining = room.wrapping_sub(1);

        if remaining != 0 {
            loop {
                let d0 = self.memory.read_byte(a0);
                if self.version == GameVersion::V4 && d0 == 0 && self.memory.read_byte(a0.wrapping_add(1)) == 0 {
                    return self.do_exit_reverse(dir, room);
                }
                a0 = a0.wrapping_add(2);
                if d0 & 0x80 == 0 {
                    continue;
                }
                remaining = remaining.wrapping_sub(1);
                if remaining == 0 {
                    break;
                }
            }
        }

        loop {
            let d4 = self.memory.read_byte(a0);
            a0 = a0.wrapping_add(1);
            if d4 & 0xf == dir {
                let d5 = self.memory.read_byte(a0);
                return (d4, d5);
            }
            a0 = a0.wrapping_add(1);
            if d4 & 0x80 != 0 {
                return self.do_exit_reverse(dir, room);
            }
        }
    }

    fn do_exit_reverse(&self, dir: u8, room: u8) -> (u8, u8) {
        let target = EXIT_REVERSAL_TABLE[dir as usize];
        let mut a0 = self.header.abs_data_block();
        let mut count: u8 = 1;

        loop {
            let d4 = self.memory.read_byte(a0);
            a0 = a0.wrapping_add(1);
            if d4 & 0x10 != 0 && d4 & 0xf == target {
                let dest = self.memory.read_byte(a0);
                a0 = a0.wrapping_add(1);
                if dest == room {
                    return (d4, count);
                }
            } else {
                a0 = a0.wrapping_add(1);
            }
            if d4 & 0x80 != 0 {
                count = count.wrapping_add(1);
            }
            if d4 == 0 {
                break;
            }
        }
        (0, 0)
    }

    fn get_next_object(&mut self) {
        let d2 = self.var_val();
        let hi_idx = self.var_index();
        let pos_idx = self.var_index();
        let hi = self.workspace.var_table[hi_idx];
        let pos = self.workspace.var_table[pos_idx];

        let list2_base = (self.header.list2_base() as usize).min(LIST_AREA_SIZE);
        let list3_base = (self.header.list3_base() as usize).min(LIST_AREA_SIZE);
        let list2 = self.workspace.list_area[list2_base..].to_vec();
        let list3 = self.workspace.list_area[list3_base..].to_vec();

        let result = self.objects.search(d2, hi, pos, &list2, &list3);
        self.workspace.var_table[hi_idx] = result.hi_search_pos;
        self.workspace.var_table[pos_idx] = result.search_pos;
        self.write_var(result.object);
        self.write_var(result.found_count);
        self.write_var(result.search_depth);
    }

    // -- list_handler -------------------

    /// The ten addressing modes packed into the high-bit opcode space.
    /// `a4_index` ranges over the full five opcode bits, but only twelve
    /// header pointers actually exist; the original walks past the table
    /// into whatever static data follows it (guarded only by a debug-only
    /// assertion). Ported as a hard stop instead of an out-of-bounds read.
    fn list_handler(&mut self, raw: u8) {
        let a4_index = (raw.wrapping_add(1) & 0x1f) as usize;
        if a4_index >= 12 {
            self.stop(format!("illegal list access {}", raw & 0x1f));
            return;
        }
        let (base, in_ws) = self.header.list_pointer(a4_index);
        let max_access: u16 = if in_ws { LIST_AREA_SIZE as u16 } else { self.memory.len() as u16 };

        if raw >= 0xe0 {
            let offset = self.var_val();
            let a4 = base.wrapping_add(offset);
            let val = self.var_val();
            if a4 < max_access {
                self.write_list_byte(a4, in_ws, val as u8);
            }
        } else if raw >= 0xc0 {
            let offset = self.fetch_byte_raw() as u16;
            let a4 = base.wrapping_add(offset);
            let idx = self.var_index();
            self.workspace.var_table[idx] = if a4 < max_access { self.read_list_byte(a4, in_ws) as u16 } else { 0 };
        } else if raw >= 0xa0 {
            let offset = self.var_val();
            let a4 = base.wrapping_add(offset);
            let idx = self.var_index();
            self.workspace.var_table[idx] = if a4 < max_access { self.read_list_byte(a4, in_ws) as u16 } else { 0 };
        } else {
            let offset = self.fetch_byte_raw() as u16;
            let a4 = base.wrapping_add(offset);
            let val = self.var_val();
            if a4 < max_access {
                self.write_list_byte(a4, in_ws, val as u8);
            }
        }
    }

    fn read_list_byte(&self, a4: u16, in_ws: bool) -> u8 {
        if in_ws {
            self.workspace.list_area[a4 as usize]
        } else {
            self.memory.read_byte(a4)
        }
    }

    fn write_list_byte(&mut self, a4: u16, in_ws: bool, value: u8) {
        if in_ws {
            self.workspace.list_area[a4 as usize] = value;
        } else {
            self.memory.write_byte(a4, value);
        }
    }

    // -- function opcode ------------------------------------------

    fn do_function(&mut self) {
        let code = self.fetch_byte_raw();
        match FunctionCode::decode(code) {
            FunctionCode::CallDriver => self.do_call_driver(),
            FunctionCode::Random => {
                bump_seed(&mut self.seed);
                let seed = self.seed;
                let idx = self.var_index();
                self.workspace.var_table[idx] = (seed & 0xff) as u16;
            }
            FunctionCode::Save => self.op_save(),
            FunctionCode::NormalRestore => self.do_restore(false),
            FunctionCode::ClearWorkspace => self.workspace.clear_variables(),
            FunctionCode::ClearStack => self.workspace.clear_stack(),
            FunctionCode::PrintStringAndAdvance => self.print_story_literal_and_advance(),
            FunctionCode::Illegal(n) => self.stop(format!("illegal instruction: {}", n)),
        }
    }

    fn do_call_driver(&mut self) {
        let base = self.header.list9_base() as usize;
        let outcome = call_driver(&mut self.host, &mut self.workspace, base, &mut self.seed);
        if outcome == DriverOutcome::LoadNextPart {
            // Loading another part swaps the whole story file under the
            // interpreter's feet; no host in this crate exposes that, so
            // the run ends here rather than pretending to continue.
            self.stop("next game part requested, but multi-part loading is not supported".to_string());
        }
    }

    fn print_story_literal_and_advance(&mut self) {
        let start = self.workspace.code_ptr;
        let mut end = start;
        while self.memory.read_byte(end) != 0 {
            end = end.wrapping_add(1);
        }
        let len = (end.wrapping_sub(start)) as usize;
        let text = self.memory.slice(start, len).to_vec();
        self.decoder.print_literal(&text);
        self.workspace.code_ptr = end.wrapping_add(1);
    }

    // -- save/restore/playback ----------------

    fn op_save(&mut self) {
        let bytes = self.workspace.to_snapshot_bytes(&self.game_file);
        if self.host.save_file(&bytes) {
            self.decoder.print_literal(b"\rGame saved.\r");
        } else {
            self.decoder.print_literal(b"\rUnable to save game.\r");
        }
    }

    /// `full` selects between the `#restore` meta-command's full restore
    /// (also repositions `code_ptr`) and the `function 4` normal restore
    /// used mid-script (variables and lists only).
    fn do_restore(&mut self, full: bool) {
        let bytes = match self.host.load_file(SNAPSHOT_SIZE) {
            Some(b) => b,
            None => {
                self.decoder.print_literal(b"\rUnable to restore game.\r");
                return;
            }
        };
        let snap = match parse_snapshot(&bytes) {
            Ok(s) => s,
            Err(_) => {
                self.decoder.print_literal(b"\rSorry, unrecognised format. Unable to restore.\r");
                return;
            }
        };

        if !snap.filename.eq_ignore_ascii_case(&self.game_file) {
            self.decoder.print_literal(
                b"\rWarning: Game path name does not match, you may be about to load this position file into the wrong story file.\r",
            );
            self.decoder.print_literal(b"Are you sure you want to restore? (Y/N)");
            self.flush_output();
            loop {
                match self.host.read_char(20) {
                    b'y' | b'Y' => break,
                    b'n' | b'N' => {
                        self.decoder.print_literal(b"\rSorry, unrecognised format. Unable to restore.\r");
                        return;
                    }
                    _ => continue,
                }
            }
        }

        if full {
            self.workspace.restore_full(&snap);
        } else {
            self.workspace.restore_normal(&snap);
        }
        self.decoder.print_literal(b"\rGame restored.\r");
    }

    fn op_playback(&mut self) {
        match self.host.open_script_file() {
            Some(it) => {
                self.script = Some(it);
                self.decoder.print_literal(b"\rPlaying back input from script file.\r");
            }
            None => {
                self.script = None;
                self.decoder.print_literal(b"\rUnable to play back script file.\r");
            }
        }
    }

    fn execute_meta(&mut self, meta: MetaCommand) {
        match meta {
            MetaCommand::Save => {
                self.decoder.print_literal(b"\n");
                self.op_save();
            }
            MetaCommand::Restore => {
                self.decoder.print_literal(b"\n");
                self.do_restore(true);
            }
            MetaCommand::Quit => {
                self.stop_diagnostic = None;
                self.running = false;
                self.decoder.print_literal(b"\rGame Terminated\r");
            }
            MetaCommand::Play => self.op_playback(),
            MetaCommand::ShowPicture(n) => {
                self.host.show_bitmap(n);
                self.decoder.print_guaranteed_cr();
            }
            MetaCommand::SetSeed(n) => {
                self.seed = n as u32;
                self.decoder.print_guaranteed_cr();
            }
            MetaCommand::Noop => {}
        }
    }

    // -- input --------------------------------------

    /// Pulls and sanitizes one fresh line, either from an active `#play`
    /// script or from the host, handling a leading `#` meta-command before
    /// the game ever sees the line.
    fn fetch_line(&mut self) -> LineOutcome {
        self.host.flush();
        self.decoder.reset_line_state();

        let raw = match self.pull_script_line() {
            Some(line) => line,
            None => {
                let mut buf = String::new();
                if !self.host.input_line(&mut buf) {
                    return LineOutcome::Abandoned;
                }
                buf
            }
        };

        if let Some(meta) = detect_meta(&raw) {
            self.execute_meta(meta);
            return LineOutcome::MetaHandled;
        }

        let is_v3_plus = !self.version.is_v2();
        let mut sanitized: Vec<u8> =
            raw.bytes().map(|b| if is_input_char(b, is_v3_plus) || b == b' ' { b } else { b' ' }).collect();

        self.decoder.print_forced_cr();

        if self.version.is_v2() {
            sanitized.push(0x20);
        }
        sanitized.push(0);

        self.pending_line = sanitized;
        self.resume_at = Some(0);
        LineOutcome::Line
    }

    fn pull_script_line(&mut self) -> Option<String> {
        loop {
            let script = self.script.as_mut()?;
            let raw = match script.next() {
                Some(line) => line,
                None => {
                    self.script = None;
                    return None;
                }
            };

            let lower = raw.to_ascii_lowercase();
            let keep_hash = lower.starts_with("#seed ");
            let mut out = String::new();
            for (i, c) in raw.chars().enumerate() {
                match c {
                    '\n' | '\r' | '[' | ';' => break,
                    '#' if i == 0 && !keep_hash => break,
                    _ => out.push(c),
                }
            }
            if !out.is_empty() {
                return Some(out);
            }
        }
    }

    fn op_input(&mut self) {
        let opcode_pos = self.workspace.code_ptr.wrapping_sub(1);
        let is_v2 = self.version.is_v2();
        let success = if is_v2 { self.do_input_v2() } else { self.do_input_v3v4() };

        if !success {
            self.workspace.code_ptr = opcode_pos;
        } else if !is_v2 {
            self.workspace.code_ptr = opcode_pos.wrapping_add(5);
        }
        // V2 success already advanced code_ptr by 4 via write_var's own
        // var_index() reads, landing exactly on opcode_pos + 5.
    }

    fn do_input_v2(&mut self) -> bool {
        if self.resume_at.is_none() {
            match self.fetch_line() {
                LineOutcome::Abandoned | LineOutcome::MetaHandled => return false,
                LineOutcome::Line => {}
            }
        }
        self.resume_at = None;
        let line = std::mem::take(&mut self.pending_line);
        let dict_data = self.header.dict_data();
        let (out_buffer, word_count) = Tokenizer::tokenize_v2(&self.memory, dict_data, &line);

        let w0 = out_buffer.first().copied().unwrap_or(0) as u16;
        let w1 = out_buffer.get(1).copied().unwrap_or(0) as u16;
        let w2 = out_buffer.get(2).copied().unwrap_or(0) as u16;
        self.write_var(w0);
        self.write_var(w1);
        self.write_var(w2);
        self.write_var(word_count);
        true
    }

    fn do_input_v3v4(&mut self) -> bool {
        if self.resume_at.is_none() {
            match self.fetch_line() {
                LineOutcome::Abandoned | LineOutcome::MetaHandled => return false,
                LineOutcome::Line => {}
            }
        }
        let resume = self.resume_at.unwrap_or(0);
        let line = self.pending_line.clone();
        let (list9, next_resume, echo) = Tokenizer::tokenize_v3v4(&self.memory, &self.tokenizer_tables, &line, resume);
        self.write_list9(&list9);
        if let Some(word) = echo {
            self.last_input_word = word;
        }
        self.resume_at = next_resume;
        true
    }

    fn write_list9(&mut self, bytes: &[u8]) {
        let base = self.header.list9_base() as usize;
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(slot) = self.workspace.list_area.get_mut(base + i) {
                *slot = b;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHost {
        output: Vec<u8>,
        lines: Vec<String>,
    }

    impl RecordingHost {
        fn new(lines: Vec<&str>) -> RecordingHost {
            RecordingHost { output: Vec::new(), lines: lines.into_iter().map(|s| s.to_string()).rev().collect() }
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl HostAdapter for RecordingHost {
        fn print_char(&mut self, byte: u8) {
            self.output.push(byte);
        }
        fn flush(&mut self) {}
        fn input_line(&mut self, buf: &mut String) -> bool {
            match self.lines.pop() {
                Some(line) => {
                    buf.push_str(&line);
                    true
                }
                None => false,
            }
        }
        fn read_char(&mut self, _millis: u32) -> u8 {
            0
        }
        fn save_file(&mut self, _bytes: &[u8]) -> bool {
            false
        }
        fn load_file(&mut self, _max: usize) -> Option<Vec<u8>> {
            None
        }
        fn get_next_game_file(&mut self) -> Option<String> {
            None
        }
        fn set_file_number(&mut self, base_name: &str, _n: u16) -> String {
            base_name.to_string()
        }
        fn graphics(&mut self, _on: bool) {}
        fn clear_graphics(&mut self) {}
        fn show_bitmap(&mut self, _picture: u16) {}
        fn open_script_file(&mut self) -> Option<Box<dyn Iterator<Item = String>>> {
            None
        }
        fn fatal_error(&mut self, message: &str) -> ! {
            panic!("{}", message);
        }
    }

    fn minimal_v3_story() -> StoryMemory {
        let mut bytes = vec![0u8; crate::memory::MIN_STORY_SIZE];
        // Header pointer table at 0x12: twelve words, all zero except the
        // code base (index 11), which points just past the header so the
        // opcode stream starts on a clean, zeroed page.
        let acode = 0x40u16;
        bytes[0x12 + 11 * 2..0x12 + 11 * 2 + 2].copy_from_slice(&acode.to_le_bytes());
        StoryMemory::new(bytes).unwrap()
    }

    fn interpreter_with_code(code: &[u8]) -> Interpreter<RecordingHost> {
        let mut memory = minimal_v3_story();
        for (i, &b) in code.iter().enumerate() {
            memory.write_byte(0x40 + i as u16, b);
        }
        Interpreter::new(GameVersion::V3, memory, RecordingHost::new(vec![]), "game.dat".to_string(), Some(1))
    }

    fn v2_interpreter_with_code(code: &[u8], lines: Vec<&str>) -> Interpreter<RecordingHost> {
        let mut bytes = vec![0u8; crate::memory::MIN_STORY_SIZE];
        // V2's header pointer table starts at 0x04; code base is index 11.
        let acode = 0x40u16;
        bytes[0x04 + 11 * 2..0x04 + 11 * 2 + 2].copy_from_slice(&acode.to_le_bytes());
        for (i, &b) in code.iter().enumerate() {
            bytes[0x40 + i] = b;
        }
        let memory = StoryMemory::new(bytes).unwrap();
        Interpreter::new(GameVersion::V2, memory, RecordingHost::new(lines), "game.dat".to_string(), Some(1))
    }

    #[test]
    fn var_con_then_print_number() {
        // var_con (long form, code&0x40==0): opcode 8, var index 0, con word 42.
        // print_number: opcode 3, var index 0.
        let mut interp = interpreter_with_code(&[8, 0, 42, 0, 3, 0]);
        interp.step();
        assert_eq!(interp.workspace.var_table[0], 42);
        interp.step();
        assert_eq!(interp.host.text(), "42");
    }

    #[test]
    fn v2_input_advances_code_ptr_past_all_four_var_operands() {
        // input (opcode 7) followed by four var-index operand bytes.
        let mut interp = v2_interpreter_with_code(&[7, 1, 2, 3, 4], vec!["go"]);
        interp.step();
        assert_eq!(interp.workspace.code_ptr, 0x45);
    }

    #[test]
    fn goto_short_form_jumps_by_signed_offset() {
        // opcode 0 with bit 0x20 set (0x20) selects the short addr form:
        // one signed byte, target = code_ptr_after_operand + diff - 1.
        // diff=4 from code_ptr=0x42 (after the operand byte) lands at 0x45.
        let mut interp = interpreter_with_code(&[0x20, 4]);
        interp.step();
        assert_eq!(interp.workspace.code_ptr, 0x45);
    }

    #[test]
    fn gosub_then_return_round_trips_code_ptr() {
        // gosub (opcode 1, long addr) to 0x50; that byte is `return` (opcode 2).
        let mut interp = interpreter_with_code(&[1, 0x10, 0, 0]);
        interp.memory.write_byte(0x50, 2);
        interp.step();
        assert_eq!(interp.workspace.code_ptr, 0x50);
        interp.step();
        assert_eq!(interp.workspace.code_ptr, 0x44);
    }

    #[test]
    fn illegal_opcode_stops_the_run() {
        let mut interp = interpreter_with_code(&[12]);
        let signal = interp.step();
        assert!(!signal.is_running());
        assert!(!interp.is_running());
    }

    #[test]
    fn function_random_uses_seed_lcg() {
        let mut interp = interpreter_with_code(&[6, 2, 0]);
        let mut seed = 1u32;
        bump_seed(&mut seed);
        interp.step();
        assert_eq!(interp.workspace.var_table[0], (seed & 0xff) as u16);
    }

    #[test]
    fn out_of_range_list_access_index_stops_cleanly() {
        // a4_index = (0xff+1)&0x1f = 0, which is a valid header slot; 0xfe
        // instead wraps to an index well past the twelve real pointers.
        let mut interp = interpreter_with_code(&[0xfe]);
        let signal = interp.step();
        assert!(matches!(signal, RunSignal::Stopped { .. }));
    }

    #[test]
    fn quit_meta_command_stops_the_game() {
        let mut interp = interpreter_with_code(&[7, 0, 0, 0, 0]);
        interp.host.lines.push("#quit".to_string());
        interp.step();
        assert!(!interp.is_running());
        assert!(interp.host.text().contains("Game Terminated"));
    }
}
