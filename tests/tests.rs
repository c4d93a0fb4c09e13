use amachine::{Configuration, GameVersion, HostAdapter};

/// A host that feeds scripted input lines and records everything printed,
/// standing in for a real terminal in end-to-end tests.
struct FakeHost {
    output: Vec<u8>,
    lines: Vec<String>,
    saved: Option<Vec<u8>>,
}

impl FakeHost {
    fn new(lines: Vec<&str>) -> FakeHost {
        FakeHost { output: Vec::new(), lines: lines.into_iter().map(|s| s.to_string()).rev().collect(), saved: None }
    }
}

impl HostAdapter for FakeHost {
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

    fn save_file(&mut self, bytes: &[u8]) -> bool {
        self.saved = Some(bytes.to_vec());
        true
    }

    fn load_file(&mut self, max: usize) -> Option<Vec<u8>> {
        self.saved.clone().filter(|b| b.len() == max)
    }

    fn get_next_game_file(&mut self) -> Option<String> {
        None
    }

    fn set_file_number(&mut self, base_name: &str, n: u16) -> String {
        format!("{}.{}", base_name, n)
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

/// Builds a minimal V3 story: a zeroed story page with the header's code
/// base (pointer table index 11, offset 0x12 + 11*2) pointing at 0x40,
/// followed by the opcode stream supplied by the caller.
fn story_with_code(code: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 256];
    let acode: u16 = 0x40;
    bytes[0x12 + 11 * 2..0x12 + 11 * 2 + 2].copy_from_slice(&acode.to_le_bytes());
    for (i, &b) in code.iter().enumerate() {
        bytes[0x40 + i] = b;
    }
    bytes
}

#[test]
fn runs_a_var_con_print_number_goto_illegal_sequence_to_completion() {
    // var_con (opcode 8, long form): var 0 = 7.
    // print_number (opcode 3): var 0.
    // goto (opcode 0, short form, code&0x20 set -> 0x20): diff 2 skips the
    // illegal byte that follows it, landing on a second illegal opcode
    // that actually stops the run.
    let code = [8, 0, 7, 0, 3, 0, 0x20, 2, 12, 12];
    let story = story_with_code(&code);
    let host = FakeHost::new(vec![]);
    let config = Configuration::new(GameVersion::V3, "game.dat");
    let mut interpreter = config.build(story, host).expect("story loads");

    interpreter.run();
    assert!(!interpreter.is_running());
}

#[test]
fn quit_meta_command_ends_a_running_game() {
    // input (opcode 7) waits on a line; the host hands it "#quit".
    let code = [7, 0, 0, 0, 0];
    let story = story_with_code(&code);
    let host = FakeHost::new(vec!["#quit"]);
    let config = Configuration::new(GameVersion::V3, "game.dat");
    let mut interpreter = config.build(story, host).expect("story loads");

    interpreter.run();
    assert!(!interpreter.is_running());
}

#[test]
fn rejects_story_files_outside_the_supported_size_range() {
    let host = FakeHost::new(vec![]);
    let config = Configuration::new(GameVersion::V3, "game.dat");
    let result = config.build(vec![0u8; 4], host);
    assert!(result.is_err());
}

#[test]
fn unsupported_version_descriptor_is_rejected_before_loading() {
    assert!(GameVersion::from_descriptor_byte(b'7').is_err());
    assert!(GameVersion::from_descriptor_byte(b'3').is_ok());
}
