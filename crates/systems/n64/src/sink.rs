//! Per-command observation hooks.
//!
//! The interpreter announces every command to a [`CommandSink`]. Handlers
//! describe what they did through [`CommandSink::text`], which takes a closure
//! so that the null sink never pays for formatting.

pub trait CommandSink {
    /// A command is about to execute
    fn begin(&mut self, pc: u32, w0: u32, w1: u32, depth: usize);

    /// Human-readable description of the current command
    fn text(&mut self, describe: &dyn Fn() -> String);

    /// The current command finished
    fn end(&mut self);

    /// When true, triangle commands are not batched
    fn single_step(&self) -> bool {
        false
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CommandSink for NoopSink {
    fn begin(&mut self, _pc: u32, _w0: u32, _w1: u32, _depth: usize) {}

    fn text(&mut self, _describe: &dyn Fn() -> String) {}

    fn end(&mut self) {}
}

/// One disassembled command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyLine {
    pub pc: u32,
    pub w0: u32,
    pub w1: u32,
    pub depth: usize,
    pub text: String,
}

impl std::fmt::Display for DisassemblyLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}: {:08X} {:08X} {:indent$}{}",
            self.pc,
            self.w0,
            self.w1,
            "",
            self.text,
            indent = self.depth * 2
        )
    }
}

/// Records a disassembly listing of the run
#[derive(Debug, Default)]
pub struct DisassemblySink {
    lines: Vec<DisassemblyLine>,
    current: Option<DisassemblyLine>,
    single_step: bool,
}

impl DisassemblySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable triangle batching so every command gets its own line
    pub fn with_single_step(mut self, single_step: bool) -> Self {
        self.single_step = single_step;
        self
    }

    pub fn lines(&self) -> &[DisassemblyLine] {
        &self.lines
    }

    pub fn listing(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{}\n", line))
            .collect()
    }
}

impl CommandSink for DisassemblySink {
    fn begin(&mut self, pc: u32, w0: u32, w1: u32, depth: usize) {
        if let Some(line) = self.current.take() {
            self.lines.push(line);
        }
        self.current = Some(DisassemblyLine {
            pc,
            w0,
            w1,
            depth,
            text: String::new(),
        });
    }

    fn text(&mut self, describe: &dyn Fn() -> String) {
        if let Some(line) = self.current.as_mut() {
            if !line.text.is_empty() {
                line.text.push_str("; ");
            }
            line.text.push_str(&describe());
        }
    }

    fn end(&mut self) {
        if let Some(line) = self.current.take() {
            self.lines.push(line);
        }
    }

    fn single_step(&self) -> bool {
        self.single_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassembly_lines() {
        let mut sink = DisassemblySink::new();
        sink.begin(0x100, 0xDE00_0000, 0x0600_0000, 0);
        sink.text(&|| "gsSPDisplayList(0x06000000)".to_string());
        sink.end();
        sink.begin(0x600_0000, 0xDF00_0000, 0, 1);
        sink.text(&|| "gsSPEndDisplayList()".to_string());
        sink.end();

        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.lines()[1].depth, 1);
        let listing = sink.listing();
        assert!(listing.starts_with("00000100: DE000000 06000000 gsSPDisplayList"));
        assert!(listing.contains("  gsSPEndDisplayList()"));
    }

    #[test]
    fn test_noop_sink_never_formats() {
        let mut sink = NoopSink;
        sink.begin(0, 0, 0, 0);
        sink.text(&|| panic!("formatted"));
        sink.end();
        assert!(!sink.single_step());
    }
}
