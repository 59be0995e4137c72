//! Image stack input sources.

use ndarray::Array3;
use std::path::PathBuf;

/// One trial's image stack, either file-backed or already in memory.
///
/// Sources are owned and cloneable so extraction tasks can move them into a
/// worker pool.
#[derive(Clone, Debug)]
pub enum StackSource {
    /// Path to a stack file on disk.
    Path(PathBuf),
    /// Frames already loaded in memory, shape `(frames, height, width)`.
    Frames(Array3<f64>),
}

impl StackSource {
    /// Short description of the source, for parameter echo output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Frames(a) => {
                let s = a.shape();
                format!("<in-memory stack {}x{}x{}>", s[0], s[1], s[2])
            }
        }
    }
}

impl From<PathBuf> for StackSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Array3<f64>> for StackSource {
    fn from(frames: Array3<f64>) -> Self {
        Self::Frames(frames)
    }
}
