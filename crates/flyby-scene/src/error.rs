// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("loading {}: {source}", path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("mesh `{mesh}` uses material {index}, but the model has {count}")]
    MaterialOutOfRange {
        mesh: String,
        index: usize,
        count: usize,
    },
    #[error("mesh `{mesh}` spans vertices {start}..{end}, but the model has {available}")]
    VertexRangeOutOfBounds {
        mesh: String,
        start: usize,
        end: usize,
        available: usize,
    },
}
