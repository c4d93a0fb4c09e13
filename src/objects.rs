// Depth-first object search, used by the `get_next_object` opcode
// to walk the game's object tree looking for objects of a given class at
// a given nesting depth. The search is resumable: a caller can ask for
// "the next matching object" repeatedly, and the state carries over
// between calls via `num_object_found`/`object`/the backtracking stack.

pub const GNO_STACK_SIZE: usize = 128;
pub const GNO_SCRATCH_SIZE: usize = 32;

pub struct ObjectSearch {
    object: u16,
    gno_stack: [u16; GNO_STACK_SIZE],
    gno_scratch: [u8; GNO_SCRATCH_SIZE],
    gno_sp: usize,
    num_object_found: u16,
    search_depth: u16,
    init_hi_search_pos: u16,
}

/// Result of one `search` call: the object found (0 if the search is
/// exhausted), plus the updated cursor state to feed back into the next
/// call's `hi_search_pos`/`search_pos` variables.
pub struct SearchResult {
    pub object: u16,
    pub hi_search_pos: u16,
    pub search_pos: u16,
    pub found_count: u16,
    pub search_depth: u16,
}

impl ObjectSearch {
    pub fn new() -> ObjectSearch {
        ObjectSearch {
            object: 0,
            gno_stack: [0; GNO_STACK_SIZE],
            gno_scratch: [0; GNO_SCRATCH_SIZE],
            gno_sp: GNO_STACK_SIZE,
            num_object_found: 0,
            search_depth: 0,
            init_hi_search_pos: 0,
        }
    }

    fn init_get_obj(&mut self) {
        self.num_object_found = 0;
        self.object = 0;
        self.gno_scratch = [0; GNO_SCRATCH_SIZE];
    }

    fn list_byte(list: &[u8], idx: u16) -> u16 {
        list.get(idx as usize).copied().unwrap_or(0) as u16
    }

    /// Runs one step of the object search. `d2` bounds the object index
    /// scanned within a level; `hi_search_pos`/`search_pos` are the
    /// caller's persisted cursor (0/0 to start a fresh search); `list2`
    /// gives each object's parent, `list3` its class-and-depth byte.
    pub fn search(&mut self, d2: u16, hi_search_pos: u16, search_pos: u16, list2: &[u8], list3: &[u8]) -> SearchResult {
        let mut d3 = hi_search_pos;
        let mut d4 = search_pos;

        loop {
            if (d3 | d4) == 0 {
                self.gno_sp = GNO_STACK_SIZE;
                self.search_depth = 0;
                self.init_get_obj();
                break;
            }

            if self.num_object_found == 0 {
                self.init_hi_search_pos = d3;
            }

            loop {
                self.object = self.object.wrapping_add(1);
                let parent = Self::list_byte(list2, self.object);
                if d4 == parent {
                    let d6 = Self::list_byte(list3, self.object) & 0x1f;
                    let mut found = d6 == d3;
                    if !found {
                        if d6 == 0 || d3 == 0 {
                            // no match at this depth; keep scanning
                        } else if d3 != 0x1f {
                            self.gno_scratch[d6 as usize] = d6 as u8;
                        } else {
                            d3 = d6;
                            found = true;
                        }
                    }
                    if found {
                        self.num_object_found += 1;
                        self.gno_sp -= 1;
                        self.gno_stack[self.gno_sp] = self.object;
                        self.gno_sp -= 1;
                        self.gno_stack[self.gno_sp] = 0x1f;
                        return SearchResult {
                            object: self.object,
                            hi_search_pos: d3,
                            search_pos: d4,
                            found_count: self.num_object_found,
                            search_depth: self.search_depth,
                        };
                    }
                }
                if self.object > d2 {
                    break;
                }
            }

            if self.init_hi_search_pos == 0x1f {
                self.gno_scratch[d3 as usize] = 0;
                d3 = 0;
                loop {
                    if self.gno_scratch[d3 as usize] != 0 {
                        self.gno_sp -= 1;
                        self.gno_stack[self.gno_sp] = d4;
                        self.gno_sp -= 1;
                        self.gno_stack[self.gno_sp] = d3;
                    }
                    d3 += 1;
                    if d3 >= 0x1f {
                        break;
                    }
                }
            }

            if self.gno_sp != GNO_STACK_SIZE {
                d3 = self.gno_stack[self.gno_sp];
                self.gno_sp += 1;
                d4 = self.gno_stack[self.gno_sp];
                self.gno_sp += 1;
            } else {
                d3 = 0;
                d4 = 0;
            }

            self.num_object_found = 0;
            if d3 == 0x1f {
                self.search_depth += 1;
            }
            self.init_get_obj();

            if d4 == 0 {
                break;
            }
        }

        self.object = 0;
        SearchResult {
            object: 0,
            hi_search_pos: 0,
            search_pos: 0,
            found_count: self.num_object_found,
            search_depth: self.search_depth,
        }
    }
}

impl Default for ObjectSearch {
    fn default() -> Self {
        ObjectSearch::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_direct_child_of_requested_parent() {
        // Objects 0..4 unused (index 0 is never matched: search starts at
        // object 1). Object 1 has parent 5, class 2; object 2 has parent 5,
        // class 3.
        let list2 = vec![0, 5, 5, 0, 0];
        let list3 = vec![0, 2, 3, 0, 0];
        let mut search = ObjectSearch::new();
        let result = search.search(4, 2, 5, &list2, &list3);
        assert_eq!(result.object, 1);
        assert_eq!(result.found_count, 1);
    }

    #[test]
    fn exhausted_search_returns_zero() {
        let list2 = vec![0, 0, 0];
        let list3 = vec![0, 0, 0];
        let mut search = ObjectSearch::new();
        let result = search.search(2, 9, 9, &list2, &list3);
        assert_eq!(result.object, 0);
        assert_eq!(result.hi_search_pos, 0);
        assert_eq!(result.search_pos, 0);
    }

    #[test]
    fn zero_zero_cursor_resets_search_state() {
        let list2 = vec![0, 5, 5];
        let list3 = vec![0, 2, 3];
        let mut search = ObjectSearch::new();
        let _ = search.search(2, 2, 5, &list2, &list3);
        let reset = search.search(2, 0, 0, &list2, &list3);
        assert_eq!(reset.object, 0);
        assert_eq!(reset.found_count, 0);
    }
}
