//! Image stack file format and frame readers.
//!
//! Stacks are stored in a small binary container: a 17-byte header (magic
//! `FSK1`, frame count, height, width as little-endian u32, and a pixel
//! type code) followed by frame-major pixel data. Readers expose frames
//! through the [`StackHandler`] trait so the pipeline can swap between an
//! eager in-memory load and memory-mapped streaming for large recordings.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use ndarray::{Array2, Array3, ArrayView2, Axis};

use fluorsep_core::StackSource;

use crate::{Error, Result};

/// File magic for the stack container.
pub const STACK_MAGIC: [u8; 4] = *b"FSK1";

const HEADER_LEN: usize = 17;

/// On-disk pixel representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelType {
    U16,
    F32,
    F64,
}

impl PixelType {
    fn code(self) -> u8 {
        match self {
            Self::U16 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::U16),
            2 => Some(Self::F32),
            3 => Some(Self::F64),
            _ => None,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Parsed stack header.
#[derive(Clone, Copy, Debug)]
pub struct StackHeader {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
    pub dtype: PixelType,
}

impl StackHeader {
    fn frame_len(&self) -> usize {
        self.height * self.width * self.dtype.bytes_per_pixel()
    }
}

fn parse_header(bytes: &[u8], path: &Path) -> Result<StackHeader> {
    let load_err = |reason: String| Error::ImageLoad {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.len() < HEADER_LEN {
        return Err(load_err(format!(
            "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if bytes[..4] != STACK_MAGIC {
        return Err(load_err("bad magic, not a stack file".into()));
    }
    let read_u32 = |off: usize| {
        u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]) as usize
    };
    let header = StackHeader {
        frames: read_u32(4),
        height: read_u32(8),
        width: read_u32(12),
        dtype: PixelType::from_code(bytes[16])
            .ok_or_else(|| load_err(format!("unknown pixel type code {}", bytes[16])))?,
    };
    let expected = HEADER_LEN + header.frames * header.frame_len();
    if bytes.len() != expected {
        return Err(load_err(format!(
            "expected {expected} bytes for {} frames of {}x{}, found {}",
            header.frames,
            header.height,
            header.width,
            bytes.len()
        )));
    }
    Ok(header)
}

fn decode_frame(bytes: &[u8], header: &StackHeader, out: &mut Array2<f64>) {
    let out = out
        .as_slice_mut()
        .unwrap_or_else(|| unreachable!("scratch frame is standard layout"));
    match header.dtype {
        PixelType::U16 => {
            for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *dst = f64::from(u16::from_le_bytes([src[0], src[1]]));
            }
        }
        PixelType::F32 => {
            for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                *dst = f64::from(f32::from_le_bytes([src[0], src[1], src[2], src[3]]));
            }
        }
        PixelType::F64 => {
            for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(8)) {
                *dst = f64::from_le_bytes([
                    src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
                ]);
            }
        }
    }
}

/// Writes a stack to `path`, converting pixels to the requested on-disk type.
///
/// # Errors
/// Returns an error if the file cannot be created or written, or if the
/// stack dimensions overflow the header fields.
pub fn write_stack(path: &Path, frames: &Array3<f64>, dtype: PixelType) -> Result<()> {
    let (n, h, w) = frames.dim();
    let as_u32 = |v: usize, name: &str| {
        u32::try_from(v).map_err(|_| Error::InvalidFormat(format!("{name} {v} exceeds u32")))
    };
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&STACK_MAGIC)?;
    out.write_all(&as_u32(n, "frame count")?.to_le_bytes())?;
    out.write_all(&as_u32(h, "height")?.to_le_bytes())?;
    out.write_all(&as_u32(w, "width")?.to_le_bytes())?;
    out.write_all(&[dtype.code()])?;
    for &value in frames.iter() {
        match dtype {
            PixelType::U16 => {
                let clamped = value.round().clamp(0.0, f64::from(u16::MAX)) as u16;
                out.write_all(&clamped.to_le_bytes())?;
            }
            PixelType::F32 => out.write_all(&(value as f32).to_le_bytes())?,
            PixelType::F64 => out.write_all(&value.to_le_bytes())?,
        }
    }
    out.flush()?;
    Ok(())
}

/// Frame access strategy for one source.
///
/// Implementations differ in how much of the stack they hold in memory at
/// once; the extraction stage only ever needs one frame at a time.
pub trait StackHandler: Send + Sync {
    /// `(frames, height, width)` of the source.
    fn shape(&self, source: &StackSource) -> Result<(usize, usize, usize)>;

    /// Visits every frame in order.
    fn for_each_frame(
        &self,
        source: &StackSource,
        visit: &mut dyn FnMut(usize, ArrayView2<'_, f64>),
    ) -> Result<()>;

    /// Temporal mean image, accumulated in f64.
    fn mean_image(&self, source: &StackSource) -> Result<Array2<f64>> {
        let (n, h, w) = self.shape(source)?;
        let mut sum = Array2::<f64>::zeros((h, w));
        self.for_each_frame(source, &mut |_, frame| sum += &frame)?;
        if n > 0 {
            sum /= n as f64;
        }
        Ok(sum)
    }
}

fn map_file(path: &Path) -> Result<(Mmap, StackHeader)> {
    let file = File::open(path).map_err(|e| Error::ImageLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
    // This is the standard safety contract for memory mapping.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::ImageLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let header = parse_header(&mmap, path)?;
    Ok((mmap, header))
}

fn visit_in_memory(
    frames: &Array3<f64>,
    visit: &mut dyn FnMut(usize, ArrayView2<'_, f64>),
) {
    for (i, frame) in frames.axis_iter(Axis(0)).enumerate() {
        visit(i, frame);
    }
}

/// Loads the whole stack into memory up front.
#[derive(Clone, Copy, Debug, Default)]
pub struct EagerReader;

impl EagerReader {
    /// Reads an entire stack file into an `Array3`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid stack.
    pub fn load(path: &Path) -> Result<Array3<f64>> {
        let (mmap, header) = map_file(path)?;
        let mut frames = Array3::zeros((header.frames, header.height, header.width));
        let frame_len = header.frame_len();
        let mut scratch = Array2::zeros((header.height, header.width));
        for (i, chunk) in mmap[HEADER_LEN..].chunks_exact(frame_len).enumerate() {
            decode_frame(chunk, &header, &mut scratch);
            frames.index_axis_mut(Axis(0), i).assign(&scratch);
        }
        Ok(frames)
    }
}

impl StackHandler for EagerReader {
    fn shape(&self, source: &StackSource) -> Result<(usize, usize, usize)> {
        match source {
            StackSource::Frames(frames) => Ok(frames.dim()),
            StackSource::Path(path) => {
                let (_, header) = map_file(path)?;
                Ok((header.frames, header.height, header.width))
            }
        }
    }

    fn for_each_frame(
        &self,
        source: &StackSource,
        visit: &mut dyn FnMut(usize, ArrayView2<'_, f64>),
    ) -> Result<()> {
        match source {
            StackSource::Frames(frames) => visit_in_memory(frames, visit),
            StackSource::Path(path) => visit_in_memory(&Self::load(path)?, visit),
        }
        Ok(())
    }
}

/// Streams frames from a memory-mapped file, one decoded frame at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct MappedReader;

impl StackHandler for MappedReader {
    fn shape(&self, source: &StackSource) -> Result<(usize, usize, usize)> {
        EagerReader.shape(source)
    }

    fn for_each_frame(
        &self,
        source: &StackSource,
        visit: &mut dyn FnMut(usize, ArrayView2<'_, f64>),
    ) -> Result<()> {
        match source {
            StackSource::Frames(frames) => visit_in_memory(frames, visit),
            StackSource::Path(path) => {
                let (mmap, header) = map_file(path)?;
                let frame_len = header.frame_len();
                let mut scratch = Array2::zeros((header.height, header.width));
                for (i, chunk) in mmap[HEADER_LEN..].chunks_exact(frame_len).enumerate() {
                    decode_frame(chunk, &header, &mut scratch);
                    visit(i, scratch.view());
                }
            }
        }
        Ok(())
    }
}

/// Like [`MappedReader`] but accumulates the mean image in f32, trading
/// precision for a smaller footprint on very large recordings.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReducedReader;

impl StackHandler for ReducedReader {
    fn shape(&self, source: &StackSource) -> Result<(usize, usize, usize)> {
        EagerReader.shape(source)
    }

    fn for_each_frame(
        &self,
        source: &StackSource,
        visit: &mut dyn FnMut(usize, ArrayView2<'_, f64>),
    ) -> Result<()> {
        MappedReader.for_each_frame(source, visit)
    }

    fn mean_image(&self, source: &StackSource) -> Result<Array2<f64>> {
        let (n, h, w) = self.shape(source)?;
        let mut sum = Array2::<f32>::zeros((h, w));
        self.for_each_frame(source, &mut |_, frame| {
            ndarray::Zip::from(&mut sum)
                .and(&frame)
                .for_each(|acc, &x| *acc += x as f32);
        })?;
        let scale = if n > 0 { 1.0 / n as f64 } else { 1.0 };
        Ok(sum.mapv(|x| f64::from(x) * scale))
    }
}

/// The handler used when the caller does not supply one.
#[must_use]
pub fn default_handler(low_memory: bool) -> Box<dyn StackHandler> {
    if low_memory {
        Box::new(MappedReader)
    } else {
        Box::new(EagerReader)
    }
}
