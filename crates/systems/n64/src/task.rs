//! RSP task-control block.
//!
//! The CPU writes a 64-byte `OSTask` structure into the top of DMEM before
//! starting the RSP. Every field is a big-endian `u32`:
//!
//! ```text
//! 0x00 type          0x20 dram_stack
//! 0x04 flags         0x24 dram_stack_size
//! 0x08 ucode_boot    0x28 output_buff
//! 0x0C boot_size     0x2C output_buff_size
//! 0x10 ucode         0x30 data_ptr
//! 0x14 ucode_size    0x34 data_size
//! 0x18 ucode_data    0x38 yield_data_ptr
//! 0x1C data_size     0x3C yield_data_size
//! ```

use crate::rdram::be_u32;
use crate::{HleError, HleResult};
use serde::Serialize;

/// Size of the task-control block
pub const TASK_BLOCK_BYTES: usize = 0x40;

/// Physical address mask applied to the microcode pointers
const PHYSICAL_MASK: u32 = 0x1FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskType {
    Graphics,
    Audio,
    Video,
    Jpeg,
    Unknown(u32),
}

impl From<u32> for TaskType {
    fn from(value: u32) -> Self {
        match value {
            1 => TaskType::Graphics,
            2 => TaskType::Audio,
            3 => TaskType::Video,
            4 => TaskType::Jpeg,
            other => TaskType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescriptor {
    pub task_type: TaskType,
    pub flags: u32,
    pub ucode_boot: u32,
    pub ucode_boot_size: u32,
    /// Microcode text, physical address
    pub code_base: u32,
    pub code_size: u32,
    /// Microcode data, physical address
    pub data_base: u32,
    pub data_size: u32,
    pub dram_stack: u32,
    pub dram_stack_size: u32,
    pub output_buff: u32,
    pub output_buff_size: u32,
    /// Start of the display list (for graphics tasks)
    pub data_ptr: u32,
    pub data_ptr_size: u32,
    pub yield_data_ptr: u32,
    pub yield_data_size: u32,
}

impl TaskDescriptor {
    pub fn parse(block: &[u8]) -> HleResult<Self> {
        if block.len() < TASK_BLOCK_BYTES {
            return Err(HleError::TruncatedTask(block.len()));
        }
        let field = |offset: usize| be_u32(block, offset);
        Ok(Self {
            task_type: TaskType::from(field(0x00)),
            flags: field(0x04),
            ucode_boot: field(0x08),
            ucode_boot_size: field(0x0C),
            code_base: field(0x10) & PHYSICAL_MASK,
            code_size: field(0x14),
            data_base: field(0x18) & PHYSICAL_MASK,
            data_size: field(0x1C),
            dram_stack: field(0x20),
            dram_stack_size: field(0x24),
            output_buff: field(0x28),
            output_buff_size: field(0x2C),
            data_ptr: field(0x30),
            data_ptr_size: field(0x34),
            yield_data_ptr: field(0x38),
            yield_data_size: field(0x3C),
        })
    }

    /// Microcode text clamped to RDRAM
    pub fn code<'a>(&self, ram: &'a [u8]) -> &'a [u8] {
        clamped(ram, self.code_base, self.code_size)
    }

    /// Microcode data clamped to RDRAM
    pub fn data<'a>(&self, ram: &'a [u8]) -> &'a [u8] {
        clamped(ram, self.data_base, self.data_size)
    }
}

fn clamped(ram: &[u8], base: u32, size: u32) -> &[u8] {
    let start = (base as usize).min(ram.len());
    let end = start.saturating_add(size as usize).min(ram.len());
    &ram[start..end]
}
