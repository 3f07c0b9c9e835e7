//! Reader for the published `test.hdf5` bundles.
//!
//! One file carries three 2-D datasets: `train` (base vectors), `test`
//! (queries) and `neighbors` (ground-truth ids per query).

use super::{Batch, BatchIter};
use crate::{BenchError, BenchResult};
use hdf5::H5Type;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const FILE_NAME: &str = "test.hdf5";
pub const TRAIN: &str = "train";
pub const TEST: &str = "test";
pub const NEIGHBORS: &str = "neighbors";

fn data_err(path: &Path, e: hdf5::Error) -> BenchError {
    BenchError::Data(format!("{}: {e}", path.display()))
}

pub struct Hdf5Bundle {
    path: PathBuf,
    file: hdf5::File,
}

impl Hdf5Bundle {
    pub fn open(path: &Path) -> BenchResult<Self> {
        let file = hdf5::File::open(path).map_err(|e| data_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// `(rows, columns)` of a 2-D dataset.
    pub fn shape(&self, name: &str) -> BenchResult<(usize, usize)> {
        let ds = self.file.dataset(name).map_err(|e| data_err(&self.path, e))?;
        match ds.shape()[..] {
            [rows, cols] => Ok((rows, cols)),
            ref other => Err(BenchError::Data(format!(
                "{}: dataset {name} has shape {other:?}, expected 2-D",
                self.path.display()
            ))),
        }
    }

    pub fn read_rows<T: H5Type + Clone>(
        &self,
        name: &str,
        rows: Range<usize>,
    ) -> BenchResult<Vec<Vec<T>>> {
        let ds = self.file.dataset(name).map_err(|e| data_err(&self.path, e))?;
        let block = ds
            .read_slice_2d::<T, _>((rows, ..))
            .map_err(|e| data_err(&self.path, e))?;
        Ok(block.outer_iter().map(|row| row.to_vec()).collect())
    }

    pub fn read_all<T: H5Type + Clone>(&self, name: &str) -> BenchResult<Vec<Vec<T>>> {
        let (rows, _) = self.shape(name)?;
        self.read_rows(name, 0..rows)
    }

    /// Stream `train` in `batch_size` row slices.
    pub fn train_batches(self, batch_size: usize) -> BenchResult<BatchIter<'static>> {
        let (total, _) = self.shape(TRAIN)?;
        let mut start = 0;
        Ok(Box::new(std::iter::from_fn(move || {
            if start >= total {
                return None;
            }
            let end = (start + batch_size).min(total);
            let batch: BenchResult<Batch> = self.read_rows(TRAIN, start..end);
            start = end;
            Some(batch)
        })))
    }
}

/// Five 2-D train rows `[0,1] .. [8,9]`, one query, one neighbour row.
#[cfg(test)]
pub(crate) fn write_bundle(path: &Path) {
    let file = hdf5::File::create(path).unwrap();
    let train: Vec<f32> = (0..10).map(|i| i as f32).collect();
    file.new_dataset::<f32>()
        .shape((5, 2))
        .create(TRAIN)
        .unwrap()
        .write_raw(&train)
        .unwrap();
    file.new_dataset::<f32>()
        .shape((1, 2))
        .create(TEST)
        .unwrap()
        .write_raw(&[0.5f32, 0.5])
        .unwrap();
    file.new_dataset::<i64>()
        .shape((1, 3))
        .create(NEIGHBORS)
        .unwrap()
        .write_raw(&[4i64, 0, 2])
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_streams_train_and_reads_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        write_bundle(&path);

        let bundle = Hdf5Bundle::open(&path).unwrap();
        assert_eq!(bundle.shape(TRAIN).unwrap(), (5, 2));
        assert_eq!(bundle.read_all::<f32>(TEST).unwrap(), vec![vec![0.5, 0.5]]);
        assert_eq!(bundle.read_all::<i64>(NEIGHBORS).unwrap(), vec![vec![4, 0, 2]]);

        let batches: Vec<Batch> = bundle
            .train_batches(2)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, [2, 2, 1]);
        assert_eq!(batches[2][0], vec![8.0, 9.0]);
    }

    #[test]
    fn missing_file_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Hdf5Bundle::open(&dir.path().join(FILE_NAME)),
            Err(BenchError::Data(_))
        ));
    }
}
