//! `.fvecs` / `.ivecs` files.
//!
//! Each row is a little-endian `i32` dimension followed by that many 4-byte
//! little-endian values (`f32` or `i32`). All rows of a file share one
//! dimension.

use crate::{BenchError, BenchResult};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

const WORD: usize = 4;

/// A 4-byte little-endian element type.
pub trait VecsElement: Copy {
    fn from_le(bytes: [u8; 4]) -> Self;
    fn to_le(self) -> [u8; 4];
}

impl VecsElement for f32 {
    fn from_le(bytes: [u8; 4]) -> Self {
        f32::from_le_bytes(bytes)
    }
    fn to_le(self) -> [u8; 4] {
        self.to_le_bytes()
    }
}

impl VecsElement for i32 {
    fn from_le(bytes: [u8; 4]) -> Self {
        i32::from_le_bytes(bytes)
    }
    fn to_le(self) -> [u8; 4] {
        self.to_le_bytes()
    }
}

/// Streaming row reader.
pub struct VecsReader<T> {
    reader: BufReader<File>,
    dim: Option<usize>,
    row: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: VecsElement> VecsReader<T> {
    pub fn open(path: &Path) -> BenchResult<Self> {
        Ok(Self {
            reader: BufReader::with_capacity(1 << 20, File::open(path)?),
            dim: None,
            row: 0,
            _marker: std::marker::PhantomData,
        })
    }

    /// Next row, or `None` at a clean end of file.
    pub fn read_row(&mut self) -> BenchResult<Option<Vec<T>>> {
        let mut header = [0u8; WORD];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let dim = i32::from_le_bytes(header);
        if dim <= 0 {
            return Err(BenchError::Data(format!("row {}: bad dimension {dim}", self.row)));
        }
        let dim = dim as usize;
        match self.dim {
            Some(expected) if expected != dim => {
                return Err(BenchError::Data(format!(
                    "row {}: dimension {dim}, expected {expected}",
                    self.row
                )))
            }
            _ => self.dim = Some(dim),
        }

        let mut bytes = vec![0u8; dim * WORD];
        self.reader.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                BenchError::Data(format!("row {}: truncated", self.row))
            } else {
                e.into()
            }
        })?;
        self.row += 1;
        Ok(Some(
            bytes
                .chunks_exact(WORD)
                .map(|c| T::from_le([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }
}

impl<T: VecsElement> Iterator for VecsReader<T> {
    type Item = BenchResult<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// Fixed-size batches over a [`VecsReader`]; the last batch may be short.
pub struct VecsBatches<T> {
    rows: VecsReader<T>,
    batch_size: usize,
    done: bool,
}

impl<T: VecsElement> VecsBatches<T> {
    pub fn new(rows: VecsReader<T>, batch_size: usize) -> Self {
        Self {
            rows,
            batch_size,
            done: false,
        }
    }
}

impl<T: VecsElement> Iterator for VecsBatches<T> {
    type Item = BenchResult<Vec<Vec<T>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.rows.read_row() {
                Ok(Some(row)) => batch.push(row),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        (!batch.is_empty()).then_some(Ok(batch))
    }
}

/// `(rows, dim)` from the file size and the first header, without reading
/// the payload. An empty file is `(0, 0)`.
pub fn shape(path: &Path) -> BenchResult<(usize, usize)> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len == 0 {
        return Ok((0, 0));
    }
    let mut header = [0u8; WORD];
    file.read_exact(&mut header)?;
    let dim = i32::from_le_bytes(header);
    if dim <= 0 {
        return Err(BenchError::Data(format!("{}: bad dimension {dim}", path.display())));
    }
    let row_bytes = WORD + dim as usize * WORD;
    if len % row_bytes != 0 {
        return Err(BenchError::Data(format!(
            "{}: size {len} is not a multiple of row size {row_bytes}",
            path.display()
        )));
    }
    Ok((len / row_bytes, dim as usize))
}

pub fn read_all<T: VecsElement>(path: &Path) -> BenchResult<Vec<Vec<T>>> {
    VecsReader::<T>::open(path)?.collect()
}

pub fn write_all<T: VecsElement>(path: &Path, rows: &[Vec<T>]) -> BenchResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        out.write_all(&(row.len() as i32).to_le_bytes())?;
        for v in row {
            out.write_all(&v.to_le())?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_every_row_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.fvecs");
        let rows: Vec<Vec<f32>> = (0..7).map(|i| vec![i as f32, -(i as f32)]).collect();
        write_all(&path, &rows).unwrap();

        assert_eq!(shape(&path).unwrap(), (7, 2));
        let sizes: Vec<usize> = VecsBatches::new(VecsReader::<f32>::open(&path).unwrap(), 3)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, [3, 3, 1]);
        assert_eq!(read_all::<f32>(&path).unwrap(), rows);
    }

    #[test]
    fn truncated_file_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neighbors.ivecs");
        write_all::<i32>(&path, &[vec![1, 2, 3]]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read_all::<i32>(&path), Err(BenchError::Data(_))));
        assert!(matches!(shape(&path), Err(BenchError::Data(_))));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fvecs");
        write_all::<f32>(&path, &[vec![1.0, 2.0], vec![3.0]]).unwrap();
        assert!(matches!(read_all::<f32>(&path), Err(BenchError::Data(_))));
    }
}
