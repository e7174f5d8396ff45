//! Graphics-task HLE session.
//!
//! [`GraphicsHle`] is the long-lived object the host talks to. It owns what
//! survives between tasks (dispatch tables, the decoded-texture cache, the
//! unimplemented-command log and a few counters) and builds a fresh
//! [`Interpreter`] for every display list.
//!
//! # Task flow
//!
//! 1. Parse the 64-byte task-control block
//! 2. Graphics tasks: identify the microcode, run the display list, report a
//!    halt to the host, then raise the DP interrupt
//! 3. Every task: halt the SP

use crate::backend::RenderBackend;
use crate::config::HleConfig;
use crate::dispatch::DispatchTables;
use crate::interpreter::{HaltDiagnostic, Interpreter, RunReport, RunStatus};
use crate::microcode::{self, MicrocodeInfo};
use crate::sink::{CommandSink, NoopSink};
use crate::stubs::StubLog;
use crate::task::{TaskDescriptor, TaskType};
use crate::texture_cache::TextureCache;
use crate::{ErrorClass, HleError, HleResult};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::Frame;

/// Width and height of a framebuffer presented straight from RDRAM
pub const FRAMEBUFFER_WIDTH: u32 = 320;
pub const FRAMEBUFFER_HEIGHT: u32 = 240;

/// Side effects the RCP has on the rest of the machine
pub trait RcpHost {
    /// Signal DP completion to the CPU
    fn raise_dp_interrupt(&mut self);

    /// Mark the SP as halted
    fn halt_sp(&mut self);

    /// A display list halted; a debugger may pause the CPU here
    fn break_for_inspection(&mut self, _halt: &HaltDiagnostic) {}
}

/// Host that ignores every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl RcpHost for NullHost {
    fn raise_dp_interrupt(&mut self) {}

    fn halt_sp(&mut self) {}
}

/// What happened to one task
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: TaskDescriptor,
    /// Set for graphics tasks whose microcode was recognized
    pub microcode: Option<MicrocodeInfo>,
    /// Set for graphics tasks whose display list ran
    pub run: Option<RunReport>,
    /// Set when the microcode was not recognized and nothing ran
    pub rejected: Option<HaltDiagnostic>,
}

impl TaskOutcome {
    /// The halt reported to the host, if any
    pub fn halt(&self) -> Option<&HaltDiagnostic> {
        self.rejected
            .as_ref()
            .or_else(|| self.run.as_ref().and_then(RunReport::halt))
    }
}

pub struct GraphicsHle {
    config: HleConfig,
    tables: DispatchTables,
    textures: TextureCache,
    stubs: StubLog,
    graphics_task_count: u64,
    last_version: Option<String>,
    display_lists_since_present: u32,
}

impl GraphicsHle {
    pub fn new(config: HleConfig) -> Self {
        if let Err(err) = config.apply_log_filter() {
            eprintln!("{}", err);
        }
        Self {
            tables: DispatchTables::new(),
            textures: TextureCache::new(config.texture_cache_capacity),
            stubs: StubLog::new(),
            graphics_task_count: 0,
            last_version: None,
            display_lists_since_present: 0,
            config,
        }
    }

    pub fn config(&self) -> &HleConfig {
        &self.config
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn stubs(&self) -> &StubLog {
        &self.stubs
    }

    pub fn graphics_task_count(&self) -> u64 {
        self.graphics_task_count
    }

    pub fn display_lists_since_present(&self) -> u32 {
        self.display_lists_since_present
    }

    /// Execute the task described by `task_block` (the 64-byte OSTask in DMEM).
    ///
    /// Only a block that cannot be parsed is an error. Display-list halts are
    /// reported through the outcome and [`RcpHost::break_for_inspection`].
    pub fn process_task(
        &mut self,
        ram: &[u8],
        task_block: &[u8],
        backend: &mut dyn RenderBackend,
        host: &mut dyn RcpHost,
    ) -> HleResult<TaskOutcome> {
        let task = match TaskDescriptor::parse(task_block) {
            Ok(task) => task,
            Err(e) => {
                log(LogCategory::Task, LogLevel::Error, || {
                    format!("{} Task: {}", ErrorClass::Setup.prefix(), e)
                });
                host.halt_sp();
                return Err(e);
            }
        };

        let mut outcome = TaskOutcome {
            task: task.clone(),
            microcode: None,
            run: None,
            rejected: None,
        };

        match task.task_type {
            TaskType::Graphics => {
                let mut sink = NoopSink;
                match self.run_display_list(ram, &task, backend, &mut sink, None) {
                    Ok((info, report)) => {
                        outcome.microcode = Some(info);
                        outcome.run = Some(report);
                    }
                    Err(error) => {
                        log(LogCategory::Microcode, LogLevel::Error, || {
                            format!("{} Microcode: {}", ErrorClass::Fatal.prefix(), error)
                        });
                        outcome.rejected = Some(HaltDiagnostic {
                            error,
                            pc: task.data_ptr,
                            w0: 0,
                            w1: 0,
                            command_index: 0,
                            dl_depth: 0,
                        });
                    }
                }
                if let Some(halt) = outcome.halt() {
                    host.break_for_inspection(halt);
                }
                host.raise_dp_interrupt();
            }
            other => {
                log(LogCategory::Task, LogLevel::Info, || {
                    format!("Task: {:?} task is not emulated", other)
                });
            }
        }

        host.halt_sp();
        Ok(outcome)
    }

    /// Identify the microcode of `task` and run its display list.
    ///
    /// `budget` overrides the configured step budget. An unrecognized microcode
    /// fails before anything reaches the backend.
    pub fn run_display_list(
        &mut self,
        ram: &[u8],
        task: &TaskDescriptor,
        backend: &mut dyn RenderBackend,
        sink: &mut dyn CommandSink,
        budget: Option<u64>,
    ) -> HleResult<(MicrocodeInfo, RunReport)> {
        self.graphics_task_count += 1;
        self.display_lists_since_present += 1;

        let info = microcode::identify(task.code(ram), task.data(ram))?;
        if self.last_version.as_deref() != Some(info.version.as_str()) {
            log(LogCategory::Microcode, LogLevel::Info, || {
                format!(
                    "GFX: task {} - \"{}\" = {:?}",
                    self.graphics_task_count, info.version, info.revision
                )
            });
            self.last_version = Some(info.version.clone());
        }

        let limits = self.config.run_limits(budget);
        let table = self.tables.get(info.revision);
        let mut interpreter = Interpreter::new(
            ram,
            table,
            backend,
            &mut self.textures,
            &mut self.stubs,
            sink,
            limits,
        );
        let report = interpreter.run(task.data_ptr);

        log(LogCategory::DisplayList, LogLevel::Debug, || {
            let status = match &report.status {
                RunStatus::Completed => "completed",
                RunStatus::BailedOut => "bailed out",
                RunStatus::Halted(_) => "halted",
            };
            format!(
                "DL: {} after {} commands, {} triangles in {} batches",
                status, report.commands_run, report.triangles_drawn, report.triangle_batches
            )
        });
        Ok((info, report))
    }

    /// Show the frame at VI `origin`. When no display list ran since the last
    /// present, the CPU drew the frame itself and it is read from RDRAM.
    pub fn present(&mut self, ram: &[u8], origin: u32, backend: &mut dyn RenderBackend) {
        if self.display_lists_since_present == 0 {
            let frame = decode_framebuffer(ram, origin);
            backend.present_framebuffer(&frame);
        } else {
            backend.present_back_buffer();
        }
        self.display_lists_since_present = 0;
    }

    /// Drop every cached texture and forget reported stubs
    pub fn reset(&mut self, backend: &mut dyn RenderBackend) {
        self.textures.clear(backend);
        self.stubs.clear();
        self.graphics_task_count = 0;
        self.last_version = None;
        self.display_lists_since_present = 0;
    }
}

impl Default for GraphicsHle {
    fn default() -> Self {
        Self::new(HleConfig::default())
    }
}

/// 320x240 RGBA5551 framebuffer at `origin` as `0xAARRGGBB` pixels.
/// Pixels past the end of RDRAM are black.
pub fn decode_framebuffer(ram: &[u8], origin: u32) -> Frame {
    let base = (origin & 0x7FFF_FFFE) as usize;
    let mut frame = Frame::new(FRAMEBUFFER_WIDTH, FRAMEBUFFER_HEIGHT);
    let expand = |c: u16| {
        let c = u32::from(c & 0x1F);
        (c << 3) | (c >> 2)
    };

    for (i, pixel) in frame.pixels.iter_mut().enumerate() {
        let Some(bytes) = ram.get(base + i * 2..base + i * 2 + 2) else {
            *pixel = 0xFF00_0000;
            continue;
        };
        let c = u16::from_be_bytes([bytes[0], bytes[1]]);
        *pixel = 0xFF00_0000 | (expand(c >> 11) << 16) | (expand(c >> 6) << 8) | expand(c >> 1);
    }
    frame
}
