//! Opcode dispatch tables.
//!
//! Each GBI revision maps the 256 possible opcodes to handlers. A table is
//! assembled from the revision's RSP command set, the RDP commands shared by
//! every revision, and a few per-game patches. Opcodes nobody claims halt the
//! run.

use crate::interpreter::Interpreter;
use crate::microcode::GbiRevision;
use crate::{rdp_commands, rsp_commands, HleError, HleResult};

pub type CommandHandler = fn(&mut Interpreter<'_>, u32, u32) -> HleResult<()>;

/// One entry of a command set
#[derive(Clone, Copy)]
pub(crate) struct CommandEntry {
    pub opcode: u8,
    pub name: &'static str,
    pub handler: CommandHandler,
    /// Emits into the triangle batch instead of flushing it
    pub triangles: bool,
}

pub(crate) const fn op(opcode: u8, name: &'static str, handler: CommandHandler) -> CommandEntry {
    CommandEntry {
        opcode,
        name,
        handler,
        triangles: false,
    }
}

pub(crate) const fn tri(opcode: u8, name: &'static str, handler: CommandHandler) -> CommandEntry {
    CommandEntry {
        opcode,
        name,
        handler,
        triangles: true,
    }
}

fn unknown_opcode(_it: &mut Interpreter<'_>, w0: u32, _w1: u32) -> HleResult<()> {
    Err(HleError::UnknownOpcode {
        opcode: (w0 >> 24) as u8,
    })
}

pub struct DispatchTable {
    revision: GbiRevision,
    handlers: [CommandHandler; 256],
    names: [&'static str; 256],
    triangles: [bool; 256],
}

impl DispatchTable {
    pub fn build(revision: GbiRevision) -> Self {
        let mut slots: [Option<CommandEntry>; 256] = [None; 256];

        let base = match revision {
            GbiRevision::Gbi0 | GbiRevision::Gbi0WaveRace | GbiRevision::Gbi0GoldenEye => {
                rsp_commands::GBI0_COMMANDS
            }
            GbiRevision::Gbi1 => rsp_commands::GBI1_COMMANDS,
            GbiRevision::Gbi2 => rsp_commands::GBI2_COMMANDS,
        };
        for entry in base {
            slots[entry.opcode as usize] = Some(*entry);
        }
        for entry in rdp_commands::RDP_COMMANDS {
            slots[entry.opcode as usize].get_or_insert(*entry);
        }
        let patches = match revision {
            GbiRevision::Gbi0WaveRace => rsp_commands::WAVE_RACE_PATCHES,
            GbiRevision::Gbi0GoldenEye => rsp_commands::GOLDENEYE_PATCHES,
            _ => &[],
        };
        for entry in patches {
            slots[entry.opcode as usize] = Some(*entry);
        }

        let mut table = Self {
            revision,
            handlers: [unknown_opcode as CommandHandler; 256],
            names: ["Unknown"; 256],
            triangles: [false; 256],
        };
        for entry in slots.iter().flatten() {
            let i = entry.opcode as usize;
            table.handlers[i] = entry.handler;
            table.names[i] = entry.name;
            table.triangles[i] = entry.triangles;
        }
        table
    }

    pub fn revision(&self) -> GbiRevision {
        self.revision
    }

    #[inline]
    pub fn handler(&self, opcode: u8) -> CommandHandler {
        self.handlers[opcode as usize]
    }

    pub fn name(&self, opcode: u8) -> &'static str {
        self.names[opcode as usize]
    }

    #[inline]
    pub fn is_triangle(&self, opcode: u8) -> bool {
        self.triangles[opcode as usize]
    }

    /// Opcodes with a handler
    pub fn known_opcodes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(|&op| self.names[op as usize] != "Unknown")
    }
}

/// Tables for every revision, built once per session
pub struct DispatchTables {
    tables: Vec<DispatchTable>,
}

impl DispatchTables {
    pub fn new() -> Self {
        Self {
            tables: GbiRevision::ALL
                .iter()
                .map(|&revision| DispatchTable::build(revision))
                .collect(),
        }
    }

    pub fn get(&self, revision: GbiRevision) -> &DispatchTable {
        &self.tables[revision.index()]
    }
}

impl Default for DispatchTables {
    fn default() -> Self {
        Self::new()
    }
}
