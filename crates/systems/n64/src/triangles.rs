//! Triangle batching.
//!
//! Triangle commands copy their vertices out of the vertex cache into a batch
//! that is flushed to the backend as one draw. The batch is flushed when it is
//! full and whenever a non-triangle command is about to run, so every state
//! change lands between draws exactly as it would without batching.

use crate::backend::DrawVertex;
use crate::vertex::{VertexCache, VERTEX_CACHE_SIZE};
use crate::{HleError, HleResult};

pub const MAX_BATCH_TRIANGLES: usize = 64;

/// Up to four triangles decoded from one command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangleList {
    indices: [[u32; 3]; 4],
    len: usize,
}

impl TriangleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, v0: u32, v1: u32, v2: u32) {
        if self.len < self.indices.len() {
            self.indices[self.len] = [v0, v1, v2];
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[[u32; 3]] {
        &self.indices[..self.len]
    }

    /// Fail on the first index outside the vertex cache
    pub fn validate(&self) -> HleResult<()> {
        for &index in self.as_slice().iter().flatten() {
            if index as usize >= VERTEX_CACHE_SIZE {
                return Err(HleError::VertexIndexOutOfRange { index });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TriangleBatch {
    vertices: Vec<DrawVertex>,
}

impl TriangleBatch {
    pub fn new() -> Self {
        Self {
            vertices: Vec::with_capacity(MAX_BATCH_TRIANGLES * 3),
        }
    }

    /// Number of triangles in the batch
    pub fn len(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Room for `triangles` more without exceeding the batch size
    pub fn has_room(&self, triangles: usize) -> bool {
        self.len() + triangles <= MAX_BATCH_TRIANGLES
    }

    /// Copy every triangle of `list` out of `cache`. All indices are checked
    /// before anything is pushed.
    pub fn push_list(&mut self, list: &TriangleList, cache: &VertexCache) -> HleResult<()> {
        list.validate()?;
        for triangle in list.as_slice() {
            for &index in triangle {
                if let Some(v) = cache.get(index as usize) {
                    self.vertices.push(DrawVertex {
                        position: v.position,
                        color: v.color,
                        uv: v.uv,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn vertices(&self) -> &[DrawVertex] {
        &self.vertices
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }
}
