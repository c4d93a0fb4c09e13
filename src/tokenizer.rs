// Input tokenization. V2 games match a 3-word parser against a flat,
// embedded dictionary with full backtracking; V3/V4 games run a richer
// single-word-per-call scanner with abbreviation matching against a
// first-letter-bucketed dictionary, plus a small set of "#" meta-commands
// intercepted before the game ever sees the line.

use crate::dictionary::DictionaryReader;
use crate::memory::StoryMemory;
use crate::message::get_md_length;

/// A "#"-prefixed line the game never sees; the caller (which alone holds
/// the host adapter) is responsible for acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Save,
    Restore,
    Quit,
    Play,
    ShowPicture(u16),
    SetSeed(u16),
    /// Recognised as a meta-command prefix but the trailing number failed
    /// to parse; swallowed with no side effect, same as the original's
    /// `sscanf` failing while `check_hash` still reports a match.
    Noop,
}

fn to_lower(c: u8) -> u8 {
    c.to_ascii_lowercase()
}

/// True for characters that end a word (whitespace and
/// most punctuation), false for the alphanumeric characters that make one
/// up. Apostrophe and hyphen are treated as word characters so contractions
/// and compound nouns tokenize as a single word.
fn part_word(c: u8) -> bool {
    let c = to_lower(c);
    if c == 0x27 || c == 0x2d {
        false
    } else if c < 0x30 {
        true
    } else if c < 0x3a {
        false
    } else if c < 0x61 {
        true
    } else if c < 0x7b {
        false
    } else {
        true
    }
}

/// Characters accepted verbatim from the raw input line; everything
/// else is replaced with a space before tokenizing. V3/V4 additionally
/// accept '.' and ',' as sentence punctuation.
pub fn is_input_char(c: u8, is_v3_plus: bool) -> bool {
    if c == b'-' || c == b'\'' {
        return true;
    }
    if is_v3_plus && (c == b'.' || c == b',') {
        return true;
    }
    c.is_ascii_alphanumeric()
}

/// Characters recognised inside the V2 flat embedded dictionary.
fn is_dictionary_char(c: u8) -> bool {
    matches!(c, b'?' | b'-' | b'\'' | b'/' | b'!' | b'.' | b',') || c.is_ascii_uppercase() || c.is_ascii_digit()
}

fn byte_at(buf: &[u8], i: usize) -> u8 {
    buf.get(i).copied().unwrap_or(0)
}

/// Detects (without executing) one of the "#" meta-commands recognised
/// ahead of normal tokenization. Matching is case-insensitive,
/// with a trailing-space-tolerant prefix match as in the original.
pub fn detect_meta(line: &str) -> Option<MetaCommand> {
    let trimmed_lower = line.to_ascii_lowercase();

    let matches_command = |cmd: &str| -> bool {
        trimmed_lower == cmd || (trimmed_lower.starts_with(cmd) && trimmed_lower.as_bytes().get(cmd.len()) == Some(&b' '))
    };

    if matches_command("#save") {
        return Some(MetaCommand::Save);
    }
    if matches_command("#restore") {
        return Some(MetaCommand::Restore);
    }
    if matches_command("#quit") {
        return Some(MetaCommand::Quit);
    }
    if matches_command("#play") {
        return Some(MetaCommand::Play);
    }
    if let Some(rest) = trimmed_lower.strip_prefix("#picture ") {
        return Some(match parse_leading_u16(rest) {
            Some(n) => MetaCommand::ShowPicture(n),
            None => MetaCommand::Noop,
        });
    }
    if let Some(rest) = trimmed_lower.strip_prefix("#seed ") {
        return Some(match parse_leading_u16(rest) {
            Some(n) => MetaCommand::SetSeed(n),
            None => MetaCommand::Noop,
        });
    }
    None
}

/// Parses as many leading ASCII digits as `s` has, ignoring anything after
/// them, mirroring `sscanf(..., "%u", ...)` rather than a strict full-string
/// parse. Returns `None` if `s` has no leading digits at all.
fn parse_leading_u16(s: &str) -> Option<u16> {
    let digits: String = s.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse::<u16>().ok()
    }
}

/// Fields the tokenizer needs beyond the generic header pointer table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenizerTables {
    pub dict_data: u16,
    pub dict_data_len: u16,
    pub def_dict: u16,
    pub end_wdp5: u16,
    pub start_md: u16,
    pub end_md: u16,
    pub is_v4: bool,
}

/// Writes an "unknown word"/number record for the current word into the
/// word-slot. `out_word` is the lowercase,
/// null/space-terminated accumulated word.
fn check_number(out_word: &[u8], is_v4: bool, list9: &mut Vec<u8>) {
    let first = byte_at(out_word, 0);
    if (0x30..0x3a).contains(&first) {
        let text: String = out_word.iter().take_while(|&&b| b.is_ascii_digit()).map(|&b| b as char).collect();
        let value: u32 = text.parse().unwrap_or(0);
        if is_v4 {
            list9.push(1);
            list9.extend_from_slice(&(value as u16).to_le_bytes());
            list9.extend_from_slice(&0u16.to_le_bytes());
        } else {
            list9.extend_from_slice(&value.to_le_bytes());
            list9.extend_from_slice(&0u16.to_le_bytes());
        }
    } else {
        list9.extend_from_slice(&0x8000u16.to_le_bytes());
        list9.extend_from_slice(&0u16.to_le_bytes());
    }
}

/// Scans the message table for word references whose low 12 bits equal
/// `target_index`, appending each as a `(ref << 1) & 0xe000 | slot` entry
/// into `list9`.
fn find_msg_equiv(memory: &StoryMemory, start_md: u16, end_md: u16, target_index: u16, list9: &mut Vec<u8>) {
    let mut slot: u16 = 0xffff;
    let mut a2 = start_md;

    loop {
        if a2 > end_md {
            return;
        }
        slot = slot.wrapping_add(1);
        let d0 = memory.read_byte(a2);

        if d0 & 0x80 != 0 {
            a2 = a2.wrapping_add(1);
            slot = slot.wrapping_add((d0 & 0x7f) as u16);
        } else if d0 & 0x40 != 0 {
            let mut d6 = get_md_length(memory, &mut a2);
            loop {
                if d6 == 0 {
                    break;
                }
                let d1 = memory.read_byte(a2);
                a2 = a2.wrapping_add(1);
                d6 = d6.wrapping_sub(1);
                if d1 & 0x80 != 0 {
                    if d1 < 0x90 {
                        a2 = a2.wrapping_add(1);
                        d6 = d6.wrapping_sub(1);
                    } else {
                        let next = memory.read_byte(a2);
                        a2 = a2.wrapping_add(1);
                        d6 = d6.wrapping_sub(1);
                        let word = ((d1 as u16) << 8) | next as u16;
                        if target_index == (word & 0xfff) {
                            let entry = ((word << 1) & 0xe000) | slot;
                            list9.extend_from_slice(&entry.to_be_bytes());
                            if list9.len() >= 0x20 {
                                return;
                            }
                        }
                    }
                }
            }
        } else {
            let len = get_md_length(memory, &mut a2);
            a2 = a2.wrapping_add(len);
        }
    }
}

/// Reader over the 5-bit packed dictionary used to expand one candidate
/// word at a time, with resumable state mirroring `unpack_word`/
/// `init_unpack`.
struct WordUnpacker<'a> {
    reader: DictionaryReader<'a>,
    end_wdp5: u16,
    marker: u8,
    three_chars: [u8; 34],
}

impl<'a> WordUnpacker<'a> {
    fn new(memory: &'a StoryMemory, ptr: u16, end_wdp5: u16) -> WordUnpacker<'a> {
        WordUnpacker { reader: DictionaryReader::new(memory, ptr), end_wdp5, marker: 0x1c, three_chars: [0; 34] }
    }

    /// Unpacks the next candidate word into `three_chars`. Returns true
    /// when the group's candidates are exhausted (either a prior
    /// terminator was already seen, or the dictionary area ran out).
    fn unpack_word(&mut self) -> bool {
        if self.marker == 0x1b {
            return true;
        }
        let mut idx = (self.marker & 3) as usize;
        loop {
            let d0 = self.reader.get_dictionary_code();
            if self.reader.position() >= self.end_wdp5 {
                return true;
            }
            if d0 >= 0x1b {
                self.three_chars[idx] = 0;
                self.marker = d0;
                return false;
            }
            self.three_chars[idx] = self.reader.get_dictionary(d0);
            idx += 1;
        }
    }
}

pub struct Tokenizer;

impl Tokenizer {
    /// Runs the V3/V4 single-word tokenizer.
    /// `line` is the already-sanitized, space-padded raw input line;
    /// `resume_at` is `0` to start a fresh line or the offset a previous
    /// call returned to continue mid-line after a token. Returns `(list9
    /// bytes written, next resume offset or None when the line is
    /// exhausted, the word just echoed to `out_buffer` if this call
    /// updated it — `print_input` re-reads whatever was written last)`.
    pub fn tokenize_v3v4(memory: &StoryMemory, tables: &TokenizerTables, line: &[u8], resume_at: usize) -> (Vec<u8>, Option<usize>, Option<Vec<u8>>) {
        let mut list9: Vec<u8> = Vec::new();
        let mut a6 = resume_at;

        loop {
            let d0 = byte_at(line, a6);
            a6 += 1;
            if d0 == 0 {
                list9.extend_from_slice(&0u16.to_le_bytes());
                return (list9, None, None);
            }
            if !part_word(d0) {
                break;
            }
            if d0 != 0x20 {
                list9.extend_from_slice(&0u16.to_le_bytes());
                list9.extend_from_slice(&0u16.to_le_bytes());
                list9[1] = d0;
                return (list9, Some(a6), Some(vec![0x20]));
            }
        }

        a6 -= 1;
        let mut out_word: Vec<u8> = Vec::new();
        loop {
            let d0 = byte_at(line, a6);
            a6 += 1;
            if part_word(d0) {
                break;
            }
            out_word.push(to_lower(d0));
            if out_word.len() >= 0x1f {
                break;
            }
        }
        out_word.push(0x20);
        a6 -= 1;
        let resume = a6;
        let echo = Some(out_word.clone());

        let first = byte_at(&out_word, 0);
        let mut d1: u16;
        let dict_addr: u16;
        if !(0x61..=0x7a).contains(&first) {
            dict_addr = tables.def_dict;
            d1 = 0;
        } else {
            let mut group = ((first - 0x61) as u16) << 2;
            let second = byte_at(&out_word, 1);
            if second != 0x20 {
                group += (((second.wrapping_sub(0x61)) >> 3) & 3) as u16;
            }
            if group >= tables.dict_data_len {
                check_number(&out_word, tables.is_v4, &mut list9);
                return (list9, Some(resume), echo);
            }
            let entry = tables.dict_data.wrapping_add(group.wrapping_mul(4));
            dict_addr = memory.read_word(entry);
            d1 = memory.read_word(entry.wrapping_add(2));
        }

        let mut unpacker = WordUnpacker::new(memory, dict_addr, tables.end_wdp5);
        unpacker.unpack_word();
        d1 = d1.wrapping_sub(1);

        let mut abrev_word: Option<u16> = None;

        loop {
            d1 = d1.wrapping_add(1);
            let exhausted = unpacker.unpack_word();
            let matched = if exhausted {
                match abrev_word {
                    None => {
                        check_number(&out_word, tables.is_v4, &mut list9);
                        return (list9, Some(resume), echo);
                    }
                    Some(_) => true,
                }
            } else {
                let mut d6: i32 = -1;
                let mut cand_idx = 0usize;
                let mut typed_idx = 0usize;
                let (mut cand, mut typed);
                loop {
                    d6 += 1;
                    cand = to_lower(unpacker.three_chars[cand_idx] & 0x7f);
                    cand_idx += 1;
                    typed = byte_at(&out_word, typed_idx);
                    typed_idx += 1;
                    if cand != typed {
                        break;
                    }
                }

                if typed != 0x20 {
                    match abrev_word {
                        None => {
                            continue;
                        }
                        Some(_) => false,
                    }
                } else if cand == 0 {
                    true
                } else if abrev_word.is_some() {
                    check_number(&out_word, tables.is_v4, &mut list9);
                    return (list9, Some(resume), echo);
                } else if d6 >= 4 {
                    true
                } else {
                    abrev_word = Some(d1);
                    continue;
                }
            };

            let _ = matched;
            find_msg_equiv(memory, tables.start_md, tables.end_md, d1, &mut list9);
            abrev_word = None;
            if !list9.is_empty() {
                list9.extend_from_slice(&0u16.to_le_bytes());
                return (list9, Some(resume), echo);
            }
        }
    }

    /// Runs the V2 three-word-slot tokenizer against a flat embedded
    /// dictionary. Returns the matched word codes
    /// (0-terminated) plus the total number of whitespace-separated words
    /// found in the line.
    pub fn tokenize_v2(memory: &StoryMemory, dict_data: u16, line: &[u8]) -> (Vec<u8>, u16) {
        let mut word_count: u16 = 0;
        let mut cursor = 0usize;
        while byte_at(line, cursor) == 0x20 {
            cursor += 1;
        }
        let mut scan = cursor;
        loop {
            while byte_at(line, scan) == 0x20 {
                scan += 1;
            }
            if byte_at(line, scan) == 0 {
                break;
            }
            word_count += 1;
            loop {
                scan += 1;
                let a = byte_at(line, scan);
                if a == 0x20 || a == 0 {
                    break;
                }
            }
            if byte_at(line, scan) == 0 {
                break;
            }
        }

        let mut out_buffer: Vec<u8> = Vec::new();
        let mut in_buf_ptr = cursor;
        let mut list0: u16 = 0;

        loop {
            let ptr = in_buf_ptr;
            while byte_at(line, in_buf_ptr) == 0x20 {
                in_buf_ptr += 1;
            }

            loop {
                let a = byte_at(line, in_buf_ptr);
                let mut x = memory.read_byte(dict_data.wrapping_add(list0));
                list0 = list0.wrapping_add(1);

                if a == 0x20 {
                    break;
                }
                if a == 0 {
                    out_buffer.push(0);
                    return (out_buffer, word_count);
                }

                in_buf_ptr += 1;
                if !is_dictionary_char(x & 0x7f) {
                    x = 0;
                }

                if to_lower(x & 0x7f) != to_lower(a) {
                    while x > 0 && x < 0x7f {
                        x = memory.read_byte(dict_data.wrapping_add(list0));
                        list0 = list0.wrapping_add(1);
                    }

                    if x == 0 {
                        loop {
                            let a2 = byte_at(line, in_buf_ptr);
                            in_buf_ptr += 1;
                            if a2 == 0 {
                                out_buffer.push(0);
                                return (out_buffer, word_count);
                            }
                            if a2 == 0x20 {
                                break;
                            }
                        }
                        while byte_at(line, in_buf_ptr) == 0x20 {
                            in_buf_ptr += 1;
                        }
                        list0 = 0;
                        break;
                    } else {
                        list0 = list0.wrapping_add(1);
                        in_buf_ptr = ptr;
                    }
                } else if x >= 0x7f {
                    // Found a complete dictionary match for this word.
                    let a_after = byte_at(line, in_buf_ptr);
                    if a_after != 0x20 {
                        in_buf_ptr = ptr;
                        list0 = list0.wrapping_add(2);
                    } else {
                        while byte_at(line, in_buf_ptr) == 0x20 {
                            in_buf_ptr += 1;
                        }
                        list0 = list0.wrapping_sub(1);
                        loop {
                            let v = memory.read_byte(dict_data.wrapping_add(list0));
                            list0 = list0.wrapping_add(1);
                            if v >= 0x7e {
                                break;
                            }
                        }
                        let code = memory.read_byte(dict_data.wrapping_add(list0));
                        out_buffer.push(code);
                        list0 = 0;
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MIN_STORY_SIZE;

    #[test]
    fn part_word_splits_letters_from_punctuation() {
        assert!(!part_word(b'a'));
        assert!(!part_word(b'5'));
        assert!(part_word(b' '));
        assert!(part_word(b'?'));
        assert!(!part_word(b'\''));
        assert!(!part_word(b'-'));
    }

    #[test]
    fn meta_commands_recognise_prefix_and_case() {
        assert_eq!(detect_meta("#SAVE"), Some(MetaCommand::Save));
        assert_eq!(detect_meta("#save now"), None);
        assert_eq!(detect_meta("#quit"), Some(MetaCommand::Quit));
        assert_eq!(detect_meta("#seed 42"), Some(MetaCommand::SetSeed(42)));
        assert_eq!(detect_meta("hello"), None);
    }

    #[test]
    fn malformed_picture_and_seed_numbers_are_still_swallowed() {
        assert_eq!(detect_meta("#picture 3 extra"), Some(MetaCommand::ShowPicture(3)));
        assert_eq!(detect_meta("#picture abc"), Some(MetaCommand::Noop));
        assert_eq!(detect_meta("#seed abc"), Some(MetaCommand::Noop));
    }

    #[test]
    fn check_number_v3_encodes_digits_as_dword() {
        let mut list9 = Vec::new();
        check_number(b"42 ", false, &mut list9);
        assert_eq!(&list9[0..4], &42u32.to_le_bytes());
        assert_eq!(&list9[4..6], &0u16.to_le_bytes());
    }

    #[test]
    fn check_number_unknown_word_writes_marker() {
        let mut list9 = Vec::new();
        check_number(b"xyz ", false, &mut list9);
        assert_eq!(&list9[0..2], &0x8000u16.to_le_bytes());
        assert_eq!(&list9[2..4], &0u16.to_le_bytes());
    }

    fn mem_with(mut bytes: Vec<u8>) -> StoryMemory {
        while bytes.len() < MIN_STORY_SIZE {
            bytes.push(0);
        }
        StoryMemory::new(bytes).unwrap()
    }

    #[test]
    fn v2_unmatched_word_returns_terminator_only() {
        let mem = mem_with(vec![0x7f]);
        let line = b"zzz\0";
        let (out, count) = Tokenizer::tokenize_v2(&mem, 0, line);
        assert_eq!(count, 1);
        assert_eq!(out, vec![0]);
    }
}
