//! Split long replies into platform-sized messages.
//!
//! Lengths are counted in characters, not bytes, so a chunk never ends in
//! the middle of a multi-byte character.

/// Split `text` into ordered fragments of at most `max_len` characters.
///
/// Whole lines are packed together where they fit. A line longer than
/// `max_len` is cut into `max_len`-sized slices; its trailing remainder
/// starts the next fragment. Empty input yields no fragments, and no
/// fragment is ever empty. A `max_len` of zero is treated as one.
#[must_use]
pub fn split(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }

    let mut buf = Buffer::default();
    for line in text.split('\n') {
        let line_len = line.chars().count();

        if buf.len_with(line_len) > max_len {
            buf.flush_into(&mut chunks);
        }

        if line_len > max_len {
            let chars: Vec<char> = line.chars().collect();
            for slice in chars.chunks(max_len) {
                if slice.len() == max_len {
                    chunks.push(slice.iter().collect());
                } else {
                    buf.push_line(&slice.iter().collect::<String>(), slice.len());
                }
            }
        } else {
            buf.push_line(line, line_len);
        }
    }
    buf.flush_into(&mut chunks);

    chunks
}

/// Accumulates whole lines for the fragment being built.
#[derive(Default)]
struct Buffer {
    text: String,
    chars: usize,
    /// At least one line (possibly empty) has been added.
    started: bool,
}

impl Buffer {
    /// Length after appending a line of `line_len` characters.
    fn len_with(&self, line_len: usize) -> usize {
        self.chars + usize::from(self.started) + line_len
    }

    fn push_line(&mut self, line: &str, line_len: usize) {
        if self.started {
            self.text.push('\n');
            self.chars += 1;
        }
        self.text.push_str(line);
        self.chars += line_len;
        self.started = true;
    }

    fn flush_into(&mut self, chunks: &mut Vec<String>) {
        let done = std::mem::take(self);
        if !done.text.is_empty() {
            chunks.push(done.text);
        }
    }
}
