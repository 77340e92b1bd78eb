//! Standard stream handles of the interpreter module.
//!
//! Output is buffered line by line, the way the module's print hooks receive
//! it. The program's exit closes both handles; anything written to a closed
//! handle is dropped, so the host must reopen them before the next run.

/// A line-buffered output handle.
#[derive(Debug)]
pub struct StdStream {
    name: &'static str,
    open: bool,
    lines: Vec<String>,
    /// Text written after the last newline
    partial: String,
}

impl StdStream {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            open: true,
            lines: Vec::new(),
            partial: String::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Append text. Silently dropped if the handle is closed.
    pub fn write(&mut self, text: &str) {
        if !self.open {
            return;
        }

        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            self.partial.push_str(&rest[..pos]);
            self.lines.push(std::mem::take(&mut self.partial));
            rest = &rest[pos + 1..];
        }
        self.partial.push_str(rest);
    }

    /// Write `text` followed by a newline.
    pub fn writeln(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    /// Flush the pending partial line and close the handle.
    pub fn close(&mut self) {
        self.flush();
        self.open = false;
    }

    pub fn reopen(&mut self) {
        self.open = true;
    }

    /// Take all buffered output, lines joined in emission order.
    pub fn drain(&mut self) -> String {
        self.flush();
        let text = self.lines.join("\n");
        self.lines.clear();
        text
    }

    /// Discard buffered output.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.partial.clear();
    }

    fn flush(&mut self) {
        if !self.partial.is_empty() {
            self.lines.push(std::mem::take(&mut self.partial));
        }
    }
}
