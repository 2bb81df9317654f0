//! Markdown editor text commands
//!
//! A small text buffer with multiple selections addressed by line and
//! character column, plus the formatting commands bound to the editor
//! toolbar and shortcuts: wrap/unwrap with symbol pairs, links, headers and
//! line prefixes. Columns count characters, not bytes.

/// Symbols that form an unwrappable pair around a selection
pub const WRAP_SYMBOLS: [char; 6] = ['*', '_', '~', '^', '+', '='];

/// Pseudo-symbol that asks [`EditorBuffer::wrap_text_with`] to unwrap
pub const BACKSPACE: &str = "Backspace";

/// Tail appended by [`EditorBuffer::insert_link`]
pub const LINK_END: &str = "](https://)";

/// Line/column position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: usize,
    pub ch: usize,
}

impl Pos {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// Selection from `anchor` (where it started) to `head` (where the cursor is)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Pos,
    pub head: Pos,
}

impl Selection {
    pub fn new(anchor: Pos, head: Pos) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(pos: Pos) -> Self {
        Self { anchor: pos, head: pos }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Order a selection's ends by line, then column
pub fn start_and_end(selection: &Selection) -> (Pos, Pos) {
    if selection.anchor <= selection.head {
        (selection.anchor, selection.head)
    } else {
        (selection.head, selection.anchor)
    }
}

/// Text plus a non-empty list of selections; the first is the primary one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorBuffer {
    text: String,
    selections: Vec<Selection>,
}

impl EditorBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selections: vec![Selection::cursor(Pos::default())],
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    /// Replace all selections; an empty list collapses to a cursor at the start
    pub fn set_selections(&mut self, selections: Vec<Selection>) {
        self.selections = if selections.is_empty() {
            vec![Selection::cursor(Pos::default())]
        } else {
            selections
                .into_iter()
                .map(|s| Selection::new(self.clip_pos(s.anchor), self.clip_pos(s.head)))
                .collect()
        };
    }

    pub fn set_cursor(&mut self, pos: Pos) {
        self.selections = vec![Selection::cursor(self.clip_pos(pos))];
    }

    /// Head of the primary selection
    pub fn cursor(&self) -> Pos {
        self.selections.first().map(|s| s.head).unwrap_or_default()
    }

    /// Selected text of the primary selection
    pub fn selected_text(&self) -> String {
        let Some(sel) = self.selections.first() else {
            return String::new();
        };
        self.get_range(sel.anchor, sel.head)
    }

    pub fn index_from_pos(&self, pos: Pos) -> usize {
        let mut index = 0;
        for (n, line) in self.text.split('\n').enumerate() {
            let len = line.chars().count();
            if n == pos.line {
                return index + pos.ch.min(len);
            }
            index += len + 1;
        }
        self.text.chars().count()
    }

    pub fn pos_from_index(&self, index: usize) -> Pos {
        let mut pos = Pos::default();
        for (i, c) in self.text.chars().enumerate() {
            if i == index {
                break;
            }
            if c == '\n' {
                pos.line += 1;
                pos.ch = 0;
            } else {
                pos.ch += 1;
            }
        }
        pos
    }

    pub fn clip_pos(&self, pos: Pos) -> Pos {
        self.pos_from_index(self.index_from_pos(pos))
    }

    fn byte_offset(&self, index: usize) -> usize {
        self.text
            .char_indices()
            .nth(index)
            .map(|(b, _)| b)
            .unwrap_or(self.text.len())
    }

    pub fn get_range(&self, a: Pos, b: Pos) -> String {
        let (x, y) = ordered(self.index_from_pos(a), self.index_from_pos(b));
        self.text[self.byte_offset(x)..self.byte_offset(y)].to_string()
    }

    /// Replace the text between `a` and `b`, moving every selection with it
    pub fn replace_range(&mut self, text: &str, a: Pos, b: Pos) {
        let (from, to) = ordered(self.index_from_pos(a), self.index_from_pos(b));
        let inserted = text.chars().count();
        let old: Vec<(usize, usize)> = self
            .selections
            .iter()
            .map(|s| (self.index_from_pos(s.anchor), self.index_from_pos(s.head)))
            .collect();

        let (from_b, to_b) = (self.byte_offset(from), self.byte_offset(to));
        self.text.replace_range(from_b..to_b, text);

        let map = |i: usize| {
            if i >= to {
                i - (to - from) + inserted
            } else if i > from {
                from + inserted
            } else {
                i
            }
        };
        self.selections = old
            .into_iter()
            .map(|(anchor, head)| {
                Selection::new(self.pos_from_index(map(anchor)), self.pos_from_index(map(head)))
            })
            .collect();
    }

    /// Wrap each selection in `wrapper`, or strip it when already wrapped
    ///
    /// The selection keeps covering the inner text afterwards.
    pub fn toggle_wrap(&mut self, wrapper: &str) {
        let width = wrapper.chars().count();
        if width == 0 {
            return;
        }
        for i in 0..self.selections.len() {
            let (start, end) = start_and_end(&self.selections[i]);
            let before = Pos::new(start.line, start.ch.saturating_sub(width));
            let after = self.clip_pos(Pos::new(end.line, end.ch + width));
            let wrapped = start.ch >= width
                && self.get_range(before, start) == wrapper
                && self.get_range(end, after) == wrapper;

            let same_line = start.line == end.line;
            let selection = if wrapped {
                let inner = self.get_range(start, end);
                self.replace_range(&inner, before, after);
                let new_end = if same_line {
                    Pos::new(end.line, end.ch - width)
                } else {
                    end
                };
                Selection::new(before, new_end)
            } else {
                let inner = self.get_range(start, end);
                self.replace_range(&format!("{wrapper}{inner}{wrapper}"), start, end);
                let new_end = if same_line {
                    Pos::new(end.line, end.ch + width)
                } else {
                    end
                };
                Selection::new(Pos::new(start.line, start.ch + width), new_end)
            };
            self.selections[i] = selection;
        }
    }

    /// Surround every non-empty selection with `symbol`
    ///
    /// With [`BACKSPACE`] the matching single-character pair from
    /// [`WRAP_SYMBOLS`] around each selection is removed instead. Returns
    /// `false` when nothing is selected, leaving the key to its default action.
    pub fn wrap_text_with(&mut self, symbol: &str) -> bool {
        if self.selections.iter().all(Selection::is_empty) {
            return false;
        }

        for i in 0..self.selections.len() {
            let sel = self.selections[i];
            if sel.is_empty() {
                continue;
            }
            let (from, to) = start_and_end(&sel);

            if symbol == BACKSPACE {
                if from.ch == 0 {
                    continue;
                }
                let before = Pos::new(from.line, from.ch - 1);
                let after = self.clip_pos(Pos::new(to.line, to.ch + 1));
                let pre = self.get_range(before, from);
                let post = self.get_range(to, after);
                let is_pair = pre == post
                    && pre.chars().count() == 1
                    && pre.chars().all(|c| WRAP_SYMBOLS.contains(&c));
                if is_pair {
                    self.replace_range("", to, after);
                    self.replace_range("", before, from);
                }
                continue;
            }

            let selected = self.get_range(from, to);
            self.replace_range(&format!("{symbol}{selected}{symbol}"), from, to);
            let len = symbol.chars().count();
            let new_from = Pos::new(from.line, from.ch + len);
            let new_to = if from.line == to.line {
                Pos::new(to.line, to.ch + len)
            } else {
                to
            };
            self.selections[i] = if sel.anchor > sel.head {
                Selection::new(new_to, new_from)
            } else {
                Selection::new(new_from, new_to)
            };
        }
        true
    }

    /// Replace the primary selection with `text`
    ///
    /// The cursor lands `cursor_end` characters after the insertion point.
    pub fn insert_text(&mut self, text: &str, cursor_end: usize) {
        let Some(primary) = self.selections.first().copied() else {
            return;
        };
        let (from, to) = start_and_end(&primary);
        self.replace_range(text, from, to);
        self.set_cursor(Pos::new(from.line, from.ch + cursor_end));
    }

    /// Turn each selection into a link (or image) label
    ///
    /// Empty selections get an empty `[](https://)` with the cursor after it.
    pub fn insert_link(&mut self, is_image: bool) {
        let symbol = if is_image { "![" } else { "[" };
        let len = symbol.chars().count();

        for i in 0..self.selections.len() {
            let sel = self.selections[i];
            let (from, to) = start_and_end(&sel);
            if sel.is_empty() {
                let link = format!("{symbol}{LINK_END}");
                self.replace_range(&link, from, from);
                self.selections[i] =
                    Selection::cursor(Pos::new(from.line, from.ch + link.chars().count()));
                continue;
            }

            let selected = self.get_range(from, to);
            self.replace_range(&format!("{symbol}{selected}{LINK_END}"), from, to);
            let new_from = Pos::new(from.line, from.ch + len);
            let new_to = if from.line == to.line {
                Pos::new(to.line, to.ch + len)
            } else {
                to
            };
            self.selections[i] = if sel.anchor > sel.head {
                Selection::new(new_to, new_from)
            } else {
                Selection::new(new_from, new_to)
            };
        }
    }

    /// Make the cursor line a heading, or one level deeper if it already is
    pub fn insert_header(&mut self) {
        let line_start = Pos::new(self.cursor().line, 0);
        let first = self.get_range(line_start, Pos::new(line_start.line, 1));
        if first == "#" {
            self.replace_range("#", line_start, line_start);
        } else {
            self.replace_range("# ", line_start, line_start);
        }
    }

    /// Prefix every line touched by a selection with `symbol`
    pub fn insert_on_start_of_lines(&mut self, symbol: &str) {
        let cursor = self.cursor();
        for i in 0..self.selections.len() {
            let sel = self.selections[i];
            let (from, to) = start_and_end(&sel);
            let line_start = Pos::new(from.line, 0);
            if sel.is_empty() {
                self.replace_range(symbol, line_start, line_start);
                continue;
            }
            let block = self.get_range(line_start, to);
            let prefixed = format!("{symbol}{}", block.replace('\n', &format!("\n{symbol}")));
            self.replace_range(&prefixed, line_start, to);
        }
        self.set_cursor(Pos::new(cursor.line, cursor.ch + symbol.chars().count()));
    }
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
