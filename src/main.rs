use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use termion::color;

use amachine::{Configuration, GameVersion, HostAdapter};

/// Host adapter for a plain terminal session. Everything retro-display or
/// file-layout specific (bitmaps, persistent story paging) is explicitly
/// out of scope; this just has to get text, input and save slots in and
/// out through whatever terminal the binary is run in.
struct TerminalHost {
    save_path: PathBuf,
    stdout: io::Stdout,
}

impl TerminalHost {
    fn new(save_path: PathBuf) -> TerminalHost {
        TerminalHost { save_path, stdout: io::stdout() }
    }
}

impl HostAdapter for TerminalHost {
    fn print_char(&mut self, byte: u8) {
        let _ = self.stdout.write_all(&[byte]);
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn input_line(&mut self, buf: &mut String) -> bool {
        print!("{}> {}", color::Fg(color::Cyan), color::Fg(color::Reset));
        let _ = self.stdout.flush();
        match io::stdin().lock().read_line(buf) {
            Ok(0) => false,
            Ok(_) => {
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Polls stdin for a single byte within `millis`; returns 0 if nothing
    /// arrives in time. A terminal running without raw mode (e.g. piped
    /// input in tests) just returns whatever is immediately available.
    fn read_char(&mut self, millis: u32) -> u8 {
        let deadline = Instant::now() + Duration::from_millis(millis as u64);
        loop {
            let mut one = [0u8; 1];
            match io::stdin().read(&mut one) {
                Ok(1) => return one[0],
                _ => {
                    if Instant::now() >= deadline {
                        return 0;
                    }
                }
            }
        }
    }

    fn save_file(&mut self, bytes: &[u8]) -> bool {
        fs::write(&self.save_path, bytes).is_ok()
    }

    fn load_file(&mut self, max: usize) -> Option<Vec<u8>> {
        let bytes = fs::read(&self.save_path).ok()?;
        if bytes.len() != max {
            return None;
        }
        Some(bytes)
    }

    fn get_next_game_file(&mut self) -> Option<String> {
        None
    }

    fn set_file_number(&mut self, base_name: &str, n: u16) -> String {
        format!("{}.{}", base_name, n)
    }

    fn graphics(&mut self, _on: bool) {}

    fn clear_graphics(&mut self) {
        print!("{}", termion::clear::All);
        let _ = self.stdout.flush();
    }

    fn show_bitmap(&mut self, picture: u16) {
        print!("{}[picture {}]{}", color::Fg(color::Yellow), picture, color::Fg(color::Reset));
        let _ = self.stdout.flush();
    }

    fn open_script_file(&mut self) -> Option<Box<dyn Iterator<Item = String>>> {
        let path = self.save_path.with_extension("script");
        let file = fs::File::open(path).ok()?;
        let lines = io::BufReader::new(file).lines().filter_map(|l| l.ok());
        Some(Box::new(lines))
    }

    fn fatal_error(&mut self, message: &str) -> ! {
        eprintln!("{}fatal: {}{}", color::Fg(color::Red), message, color::Fg(color::Reset));
        std::process::exit(1);
    }
}

fn usage(program: &str) -> ! {
    eprintln!("usage: {} <story-file> <version: 2|3|4> [save-path]", program);
    std::process::exit(2);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
    }

    let story_path = &args[1];
    let version_byte = args[2].as_bytes().first().copied().unwrap_or(0);
    let version = match GameVersion::from_descriptor_byte(version_byte) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let story = match fs::read(story_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read story file '{}': {}", story_path, e);
            std::process::exit(1);
        }
    };

    let game_file = Path::new(story_path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| story_path.clone());
    let save_path = args.get(3).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(story_path).with_extension("sav"));

    let host = TerminalHost::new(save_path);
    let config = Configuration::new(version, game_file);
    match config.build(story, host) {
        Ok(mut interpreter) => interpreter.run(),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
