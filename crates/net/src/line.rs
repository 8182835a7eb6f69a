/// Longest accepted input line; bytes past this are discarded until the next
/// newline so a hostile client cannot grow the buffer unboundedly.
const MAX_LINE_LEN: usize = 1024;

/// Accumulates raw socket bytes into complete text lines.
pub struct LineBuffer {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed raw data; returns any complete lines. Oversized lines are
    /// dropped whole rather than truncated.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            match byte {
                b'\n' => {
                    if self.overflowed {
                        self.overflowed = false;
                        self.buf.clear();
                    } else {
                        lines.push(self.take_line());
                    }
                }
                b'\r' => {} // split on LF only
                _ => {
                    if self.buf.len() < MAX_LINE_LEN {
                        self.buf.push(byte);
                    } else {
                        self.overflowed = true;
                    }
                }
            }
        }
        lines
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
