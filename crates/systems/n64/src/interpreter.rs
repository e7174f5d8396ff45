//! Display-list interpreter.
//!
//! Runs one graphics task's display list to completion. Each step fetches a
//! 64-bit command at the PC, advances the PC, and calls the handler selected by
//! the top byte of the first word. Triangle handlers may consume several
//! consecutive commands of the same opcode in one call.
//!
//! # Termination
//!
//! | Condition                          | Status                 |
//! |------------------------------------|------------------------|
//! | PC becomes 0 (top-level `EndDL`)   | `Completed`            |
//! | Step budget reached                | `BailedOut`            |
//! | Handler returns an error           | `Halted(diagnostic)`   |
//!
//! Pending triangles are flushed to the backend in every case.

use crate::backend::{RenderBackend, ShadingInputs, TextureBinding, TriangleDraw};
use crate::dispatch::DispatchTable;
use crate::microcode::GbiRevision;
use crate::rdram;
use crate::render_mode::{wrap_mode, RenderMode};
use crate::segment::SegmentTable;
use crate::sink::CommandSink;
use crate::state::GraphicsState;
use crate::stubs::StubLog;
use crate::texture_cache::TextureCache;
use crate::triangles::{TriangleBatch, TriangleList};
use crate::vertex::VertexCache;
use crate::{ErrorClass, HleError, HleResult};
use emu_core::logging::{log, LogCategory, LogLevel};
use std::fmt;

/// Bounds for one display-list run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum number of return addresses on the display-list stack
    pub max_display_list_depth: usize,
    /// Stop after this many commands
    pub bail_after: Option<u64>,
    /// VI size; a fill covering exactly this area becomes a clear
    pub vi_width: u32,
    pub vi_height: u32,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_display_list_depth: 18,
            bail_after: None,
            vi_width: 320,
            vi_height: 240,
        }
    }
}

/// Where and why a run halted
#[derive(Debug)]
pub struct HaltDiagnostic {
    pub error: HleError,
    /// Address of the faulting command
    pub pc: u32,
    pub w0: u32,
    pub w1: u32,
    /// Zero-based index of the faulting command within the run
    pub command_index: u64,
    pub dl_depth: usize,
}

impl fmt::Display for HaltDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:08X} ({:08X} {:08X}), command #{}, depth {}",
            self.error, self.pc, self.w0, self.w1, self.command_index, self.dl_depth
        )
    }
}

#[derive(Debug)]
pub enum RunStatus {
    Completed,
    BailedOut,
    Halted(HaltDiagnostic),
}

#[derive(Debug)]
pub struct RunReport {
    pub revision: GbiRevision,
    pub status: RunStatus,
    pub commands_run: u64,
    pub triangles_drawn: u64,
    /// Number of `draw_triangles` calls
    pub triangle_batches: u64,
}

impl RunReport {
    pub fn halt(&self) -> Option<&HaltDiagnostic> {
        match &self.status {
            RunStatus::Halted(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

/// Derives a triangle list from one command's words
pub(crate) type TriangleDecoder = fn(&Interpreter<'_>, u32, u32) -> TriangleList;

#[derive(Debug, Clone, Copy, Default)]
struct CurrentCommand {
    pc: u32,
    w0: u32,
    w1: u32,
    index: u64,
}

pub struct Interpreter<'a> {
    pub(crate) ram: &'a [u8],
    pub(crate) backend: &'a mut dyn RenderBackend,
    pub(crate) textures: &'a mut TextureCache,
    pub(crate) stubs: &'a mut StubLog,
    pub(crate) sink: &'a mut dyn CommandSink,
    table: &'a DispatchTable,
    pub(crate) limits: RunLimits,

    pub(crate) state: GraphicsState,
    pub(crate) segments: SegmentTable,
    pub(crate) vertices: VertexCache,
    batch: TriangleBatch,

    pub(crate) pc: u32,
    dl_stack: Vec<u32>,
    current: CurrentCommand,
    commands_run: u64,
    triangles_drawn: u64,
    triangle_batches: u64,
}

impl<'a> Interpreter<'a> {
    /// TMEM, tiles, segments, matrices and lights all start from their
    /// power-on values.
    pub fn new(
        ram: &'a [u8],
        table: &'a DispatchTable,
        backend: &'a mut dyn RenderBackend,
        textures: &'a mut TextureCache,
        stubs: &'a mut StubLog,
        sink: &'a mut dyn CommandSink,
        limits: RunLimits,
    ) -> Self {
        Self {
            ram,
            backend,
            textures,
            stubs,
            sink,
            table,
            limits,
            state: GraphicsState::new(table.revision().geometry_layout()),
            segments: SegmentTable::new(),
            vertices: VertexCache::new(),
            batch: TriangleBatch::new(),
            pc: 0,
            dl_stack: Vec::new(),
            current: CurrentCommand::default(),
            commands_run: 0,
            triangles_drawn: 0,
            triangle_batches: 0,
        }
    }

    pub fn revision(&self) -> GbiRevision {
        self.table.revision()
    }

    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    pub fn vertices(&self) -> &VertexCache {
        &self.vertices
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn dl_depth(&self) -> usize {
        self.dl_stack.len()
    }

    pub fn commands_run(&self) -> u64 {
        self.commands_run
    }

    /// Run from `start_pc` until the list ends, the budget runs out, or a
    /// handler fails.
    pub fn run(&mut self, start_pc: u32) -> RunReport {
        self.pc = start_pc;
        let status = loop {
            if self.pc == 0 {
                break RunStatus::Completed;
            }
            if self.budget_exhausted() {
                log(LogCategory::DisplayList, LogLevel::Debug, || {
                    format!("DL: bailing out after {} commands", self.commands_run)
                });
                break RunStatus::BailedOut;
            }
            if let Err(error) = self.step() {
                break RunStatus::Halted(self.halt(error));
            }
        };
        self.flush_triangles();

        RunReport {
            revision: self.revision(),
            status,
            commands_run: self.commands_run,
            triangles_drawn: self.triangles_drawn,
            triangle_batches: self.triangle_batches,
        }
    }

    fn step(&mut self) -> HleResult<()> {
        let pc = self.pc;
        self.current = CurrentCommand {
            pc,
            w0: 0,
            w1: 0,
            index: self.commands_run,
        };
        let (w0, w1) = self
            .read_command(pc)
            .ok_or(HleError::CommandFetchOutOfRange { address: pc })?;

        let opcode = (w0 >> 24) as u8;
        if !self.table.is_triangle(opcode) {
            self.flush_triangles();
        }

        self.begin_command(pc, w0, w1);
        let handler = self.table.handler(opcode);
        let result = handler(self, w0, w1);
        self.sink.end();
        result
    }

    fn begin_command(&mut self, pc: u32, w0: u32, w1: u32) {
        self.current = CurrentCommand {
            pc,
            w0,
            w1,
            index: self.commands_run,
        };
        self.pc = pc.wrapping_add(8);
        self.commands_run += 1;
        self.sink.begin(pc, w0, w1, self.dl_stack.len());
    }

    fn budget_exhausted(&self) -> bool {
        self.limits
            .bail_after
            .is_some_and(|limit| self.commands_run >= limit)
    }

    fn halt(&self, error: HleError) -> HaltDiagnostic {
        let diagnostic = HaltDiagnostic {
            error,
            pc: self.current.pc,
            w0: self.current.w0,
            w1: self.current.w1,
            command_index: self.current.index,
            dl_depth: self.dl_stack.len(),
        };
        log(LogCategory::DisplayList, LogLevel::Error, || {
            format!("{} DL: {}", ErrorClass::Fatal.prefix(), diagnostic)
        });
        diagnostic
    }

    /// The two command words at `address`
    pub(crate) fn read_command(&self, address: u32) -> Option<(u32, u32)> {
        let w0 = rdram::read_u32(self.ram, address)?;
        let w1 = rdram::read_u32(self.ram, address.wrapping_add(4))?;
        Some((w0, w1))
    }

    #[inline]
    pub(crate) fn resolve(&self, address: u32) -> u32 {
        self.segments.resolve(address)
    }

    /// Divisor for packed vertex indices
    #[inline]
    pub(crate) fn stride(&self) -> u32 {
        self.table.revision().stride()
    }

    /// Describe the current command to the sink
    #[inline]
    pub(crate) fn describe(&mut self, describe: &dyn Fn() -> String) {
        self.sink.text(describe);
    }

    /// Report a recognized command that runs as a no-op
    pub(crate) fn unimplemented(&mut self, name: &str) {
        self.stubs.report(name);
        self.sink.text(&|| format!("{} (unimplemented)", name));
    }

    /// Log a recoverable data problem with the current command
    pub(crate) fn anomaly(&self, category: LogCategory, message: impl FnOnce() -> String) {
        let pc = self.current.pc;
        log(category, LogLevel::Warn, || {
            format!("{} {:08X}: {}", ErrorClass::Anomaly.prefix(), pc, message())
        });
    }

    /// Push the return address and jump
    pub(crate) fn call_display_list(&mut self, address: u32) -> HleResult<()> {
        if self.dl_stack.len() >= self.limits.max_display_list_depth {
            return Err(HleError::DisplayListStackOverflow {
                depth: self.dl_stack.len(),
            });
        }
        self.dl_stack.push(self.pc);
        self.pc = address;
        Ok(())
    }

    pub(crate) fn branch_display_list(&mut self, address: u32) {
        self.pc = address;
    }

    /// Return to the caller, or end the run at the top level
    pub(crate) fn end_display_list(&mut self) {
        self.pc = self.dl_stack.pop().unwrap_or(0);
    }

    /// Emit the triangles of this command and of any directly following
    /// commands with the same opcode, while the batch has room.
    pub(crate) fn emit_triangles(
        &mut self,
        name: &'static str,
        w0: u32,
        w1: u32,
        decode: TriangleDecoder,
    ) -> HleResult<()> {
        let opcode = w0 >> 24;
        let mut list = decode(self, w0, w1);
        loop {
            self.sink.text(&|| describe_triangles(name, &list));
            if !self.batch.has_room(list.len()) {
                self.flush_triangles();
            }
            self.batch.push_list(&list, &self.vertices)?;

            if self.sink.single_step() || self.budget_exhausted() {
                break;
            }
            let Some((n0, n1)) = self.read_command(self.pc) else {
                break;
            };
            if n0 >> 24 != opcode {
                break;
            }
            let next = decode(self, n0, n1);
            if !self.batch.has_room(next.len()) {
                break;
            }
            self.sink.end();
            self.begin_command(self.pc, n0, n1);
            list = next;
        }

        if !self.batch.has_room(1) {
            self.flush_triangles();
        }
        Ok(())
    }

    /// Draw the pending triangle batch with the current render state
    pub(crate) fn flush_triangles(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let geometry = *self.state.geometry();
        let mode = RenderMode::derive(
            self.state.other_mode_l,
            self.state.other_mode_h,
            &geometry,
            self.state.blend_color,
        );
        let texture = if geometry.texture {
            let texgen = self.state.texture_gen_active();
            self.bind_texture(self.state.texture.tile, texgen)
        } else {
            None
        };
        let shading = self.shading();

        self.backend.draw_triangles(&TriangleDraw {
            vertices: self.batch.vertices(),
            mode,
            texture,
            shading,
        });
        self.triangles_drawn += self.batch.len() as u64;
        self.triangle_batches += 1;
        self.batch.clear();
    }

    /// Texture and UV mapping for `tile`. Generated UVs span 0..1 over the
    /// logical texture; all others are in texels relative to the tile origin.
    pub(crate) fn bind_texture(&mut self, tile: usize, normalized_uv: bool) -> Option<TextureBinding> {
        let tlut_type = self.state.tlut_type();
        let cached = self.textures.lookup(
            &mut self.state.tmem,
            tile,
            tlut_type,
            &mut *self.backend,
            &mut *self.stubs,
        )?;
        let descriptor = self.state.tmem.tiles[tile];
        let native_w = cached.native_width as f32;
        let native_h = cached.native_height as f32;

        let (uv_scale, uv_offset) = if normalized_uv {
            (
                [cached.width as f32 / native_w, cached.height as f32 / native_h],
                [0.0, 0.0],
            )
        } else {
            ([1.0 / native_w, 1.0 / native_h], [cached.left, cached.top])
        };

        Some(TextureBinding {
            texture: cached.texture,
            wrap_s: wrap_mode(descriptor.cm_s, descriptor.mask_s),
            wrap_t: wrap_mode(descriptor.cm_t, descriptor.mask_t),
            uv_scale,
            uv_offset,
        })
    }

    pub(crate) fn shading(&self) -> ShadingInputs {
        ShadingInputs {
            combiner: self.state.combiner,
            prim_color: self.state.prim_color,
            env_color: self.state.env_color,
            cycle: self.state.cycle_type(),
        }
    }
}

fn describe_triangles(name: &str, list: &TriangleList) -> String {
    let args: Vec<String> = list
        .as_slice()
        .iter()
        .map(|[a, b, c]| format!("{}, {}, {}", a, b, c))
        .collect();
    format!("{}({})", name, args.join(", "))
}

/// Owns everything an [`Interpreter`] borrows, for driving single handlers in
/// unit tests
#[cfg(test)]
pub(crate) struct Harness {
    pub ram: Vec<u8>,
    table: DispatchTable,
    pub backend: crate::backend::RecordingBackend,
    textures: TextureCache,
    pub stubs: StubLog,
}

#[cfg(test)]
impl Harness {
    pub fn new(revision: GbiRevision) -> Self {
        Self {
            ram: vec![0u8; 0x1000],
            table: DispatchTable::build(revision),
            backend: crate::backend::RecordingBackend::new(),
            textures: TextureCache::new(4),
            stubs: StubLog::new(),
        }
    }

    pub fn with<R>(&mut self, f: impl FnOnce(&mut Interpreter<'_>) -> R) -> R {
        let mut sink = crate::sink::NoopSink;
        let mut interpreter = Interpreter::new(
            &self.ram,
            &self.table,
            &mut self.backend,
            &mut self.textures,
            &mut self.stubs,
            &mut sink,
            RunLimits::default(),
        );
        f(&mut interpreter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::sink::{DisassemblySink, NoopSink};

    struct Fixture {
        ram: Vec<u8>,
        table: DispatchTable,
        backend: RecordingBackend,
        textures: TextureCache,
        stubs: StubLog,
    }

    impl Fixture {
        fn new(revision: GbiRevision, commands: &[(u32, u32)]) -> Self {
            let mut ram = vec![0u8; 0x1000];
            for (i, (w0, w1)) in commands.iter().enumerate() {
                let at = (i + 1) * 8;
                ram[at..at + 4].copy_from_slice(&w0.to_be_bytes());
                ram[at + 4..at + 8].copy_from_slice(&w1.to_be_bytes());
            }
            Self {
                ram,
                table: DispatchTable::build(revision),
                backend: RecordingBackend::new(),
                textures: TextureCache::new(8),
                stubs: StubLog::new(),
            }
        }

        fn run(&mut self, sink: &mut dyn CommandSink, limits: RunLimits) -> RunReport {
            let mut interpreter = Interpreter::new(
                &self.ram,
                &self.table,
                &mut self.backend,
                &mut self.textures,
                &mut self.stubs,
                sink,
                limits,
            );
            interpreter.run(0x8)
        }
    }

    const GBI2_END: (u32, u32) = (0xDF00_0000, 0);

    #[test]
    fn test_end_of_list_completes() {
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0, 0), (0, 0), GBI2_END]);
        let report = f.run(&mut NoopSink, RunLimits::default());
        assert!(matches!(report.status, RunStatus::Completed));
        assert_eq!(report.commands_run, 3);
    }

    #[test]
    fn test_bail_after_runs_exactly_n() {
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0, 0), (0, 0), (0, 0), (0, 0), GBI2_END]);
        let limits = RunLimits {
            bail_after: Some(2),
            ..Default::default()
        };
        let report = f.run(&mut NoopSink, limits);
        assert!(matches!(report.status, RunStatus::BailedOut));
        assert_eq!(report.commands_run, 2);
    }

    #[test]
    fn test_unknown_opcode_halts_with_diagnostic() {
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0, 0), (0x0A00_0000, 0x1234), GBI2_END]);
        let report = f.run(&mut NoopSink, RunLimits::default());
        let halt = report.halt().unwrap();
        assert!(matches!(halt.error, HleError::UnknownOpcode { opcode: 0x0A }));
        assert_eq!(halt.pc, 0x10);
        assert_eq!((halt.w0, halt.w1), (0x0A00_0000, 0x1234));
        assert_eq!(halt.command_index, 1);
        assert_eq!(halt.dl_depth, 0);
    }

    #[test]
    fn test_fetch_past_ram_halts() {
        // Branch far outside RDRAM
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0xDE01_0000, 0x00F0_0000)]);
        let report = f.run(&mut NoopSink, RunLimits::default());
        let halt = report.halt().unwrap();
        assert!(matches!(
            halt.error,
            HleError::CommandFetchOutOfRange { address: 0x00F0_0000 }
        ));
        assert_eq!(halt.command_index, 1);
    }

    #[test]
    fn test_call_and_return() {
        // 0x08: call 0x100; 0x10: end. 0x100: noop; 0x108: return
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0xDE00_0000, 0x100), GBI2_END]);
        f.ram[0x100..0x104].copy_from_slice(&0u32.to_be_bytes());
        f.ram[0x108..0x10C].copy_from_slice(&0xDF00_0000u32.to_be_bytes());

        let mut sink = DisassemblySink::new();
        let report = f.run(&mut sink, RunLimits::default());
        assert!(matches!(report.status, RunStatus::Completed));
        let pcs: Vec<(u32, usize)> = sink.lines().iter().map(|l| (l.pc, l.depth)).collect();
        assert_eq!(pcs, vec![(0x8, 0), (0x100, 1), (0x108, 1), (0x10, 0)]);
    }

    #[test]
    fn test_recursion_is_capped() {
        // A list that calls itself forever
        let mut f = Fixture::new(GbiRevision::Gbi2, &[(0xDE00_0000, 0x8)]);
        let limits = RunLimits {
            max_display_list_depth: 4,
            ..Default::default()
        };
        let report = f.run(&mut NoopSink, limits);
        let halt = report.halt().unwrap();
        assert!(matches!(
            halt.error,
            HleError::DisplayListStackOverflow { depth: 4 }
        ));
        assert_eq!(halt.dl_depth, 4);
        assert_eq!(report.commands_run, 5);
    }
}
