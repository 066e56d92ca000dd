//! Windowed reads from (Cloud Optimized) GeoTIFF files. Only the tiles or
//! strips that intersect the requested window are decoded.
use crate::error::{Error, Result};
use ndarray::Array2;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    /// Window covering the pixels touched by a floating point pixel envelope.
    pub fn from_bounds(col_min: f64, row_min: f64, col_max: f64, row_max: f64) -> Self {
        let col_off = col_min.floor().max(0.0) as usize;
        let row_off = row_min.floor().max(0.0) as usize;
        let col_end = col_max.ceil().max(0.0) as usize;
        let row_end = row_max.ceil().max(0.0) as usize;
        Self {
            col_off,
            row_off,
            width: col_end.saturating_sub(col_off),
            height: row_end.saturating_sub(row_off),
        }
    }

    pub fn clip_to(&self, width: usize, height: usize) -> Self {
        let col_off = self.col_off.min(width);
        let row_off = self.row_off.min(height);
        Self {
            col_off,
            row_off,
            width: (self.col_off + self.width).min(width) - col_off,
            height: (self.row_off + self.height).min(height) - row_off,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col_off
            && col < self.col_off + self.width
            && row >= self.row_off
            && row < self.row_off + self.height
    }
}

/// Read `window` from the first image of a TIFF file as f64. Samples equal to
/// `nodata` become NaN. The window is clipped to the image first, so the
/// returned array can be smaller than requested.
pub fn read_window<P: AsRef<Path>>(
    path: P,
    window: PixelWindow,
    nodata: Option<f64>,
) -> Result<(PixelWindow, Array2<f64>)> {
    let path = path.as_ref();
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;

    let (image_width, image_height) = decoder.dimensions()?;
    let window = window.clip_to(image_width as usize, image_height as usize);
    let mut out = Array2::from_elem((window.height, window.width), f64::NAN);
    if window.is_empty() {
        return Ok((window, out));
    }

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
    let chunks_across = (image_width as usize).div_ceil(chunk_width);

    let first_chunk_col = window.col_off / chunk_width;
    let last_chunk_col = (window.col_off + window.width - 1) / chunk_width;
    let first_chunk_row = window.row_off / chunk_height;
    let last_chunk_row = (window.row_off + window.height - 1) / chunk_height;
    debug!(
        "Reading {:?} from {} ({} chunks)",
        window,
        path.display(),
        (last_chunk_col - first_chunk_col + 1) * (last_chunk_row - first_chunk_row + 1)
    );

    for chunk_row in first_chunk_row..=last_chunk_row {
        for chunk_col in first_chunk_col..=last_chunk_col {
            let index = (chunk_row * chunks_across + chunk_col) as u32;
            let (data_width, data_height) = decoder.chunk_data_dimensions(index);
            let (data_width, data_height) = (data_width as usize, data_height as usize);
            let samples = to_f64(decoder.read_chunk(index)?, path)?;

            // Edge tiles may come back padded to the full tile size
            let stride = if samples.len() == data_width * data_height {
                data_width
            } else {
                chunk_width
            };

            let origin_col = chunk_col * chunk_width;
            let origin_row = chunk_row * chunk_height;
            for local_row in 0..data_height {
                let row = origin_row + local_row;
                if row < window.row_off || row >= window.row_off + window.height {
                    continue;
                }
                for local_col in 0..data_width {
                    let col = origin_col + local_col;
                    if col < window.col_off || col >= window.col_off + window.width {
                        continue;
                    }
                    let Some(&value) = samples.get(local_row * stride + local_col) else {
                        continue;
                    };
                    if nodata.is_some_and(|nd| value == nd) {
                        continue;
                    }
                    out[[row - window.row_off, col - window.col_off]] = value;
                }
            }
        }
    }
    Ok((window, out))
}

fn to_f64(result: DecodingResult, path: &Path) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedSampleFormat(path.display().to_string())),
    };
    Ok(values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    /// Write a single band u16 TIFF whose pixel at (row, col) is `row * 10 + col`.
    pub fn write_gradient_tiff(path: &Path, width: u32, height: u32) {
        let data: Vec<u16> = (0..height)
            .flat_map(|row| (0..width).map(move |col| (row * 10 + col) as u16))
            .collect();
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<colortype::Gray16>(width, height, &data)
            .unwrap();
    }

    /// Same gradient as [`write_gradient_tiff`], stored in strips of
    /// `rows_per_strip` rows.
    fn write_striped_gradient_tiff(path: &Path, width: u32, height: u32, rows_per_strip: u32) {
        let data: Vec<u16> = (0..height)
            .flat_map(|row| (0..width).map(move |col| (row * 10 + col) as u16))
            .collect();
        let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray16>(width, height)
            .unwrap();
        image.rows_per_strip(rows_per_strip).unwrap();
        image.write_data(&data).unwrap();
    }

    /// Uncompressed little endian u16 TIFF cut into `tile` x `tile` tiles,
    /// with pixel (row, col) = `row * 100 + col`. Edge tiles are padded with
    /// zeros as the format requires.
    fn write_tiled_gradient_tiff(path: &Path, width: u32, height: u32, tile: u32) {
        let across = width.div_ceil(tile);
        let down = height.div_ceil(tile);
        let tile_bytes = tile * tile * 2;

        let mut data: Vec<u8> = vec![];
        for tile_row in 0..down {
            for tile_col in 0..across {
                for r in 0..tile {
                    for c in 0..tile {
                        let (row, col) = (tile_row * tile + r, tile_col * tile + c);
                        let value = if row < height && col < width {
                            (row * 100 + col) as u16
                        } else {
                            0
                        };
                        data.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
        }

        let n_tiles = across * down;
        let entries: u32 = 11;
        let ifd_offset = 8 + data.len() as u32;
        let offsets_at = ifd_offset + 2 + entries * 12 + 4;
        let counts_at = offsets_at + 4 * n_tiles;

        let mut out: Vec<u8> = vec![];
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&ifd_offset.to_le_bytes());
        out.extend_from_slice(&data);

        const SHORT: u16 = 3;
        const LONG: u16 = 4;
        let fields: [(u16, u16, u32, u32); 11] = [
            (256, SHORT, 1, width),
            (257, SHORT, 1, height),
            (258, SHORT, 1, 16),
            (259, SHORT, 1, 1),
            (262, SHORT, 1, 1),
            (277, SHORT, 1, 1),
            (322, SHORT, 1, tile),
            (323, SHORT, 1, tile),
            (324, LONG, n_tiles, offsets_at),
            (325, LONG, n_tiles, counts_at),
            (339, SHORT, 1, 1),
        ];
        out.extend_from_slice(&(entries as u16).to_le_bytes());
        for (tag, kind, count, value) in fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        for index in 0..n_tiles {
            out.extend_from_slice(&(8 + index * tile_bytes).to_le_bytes());
        }
        for _ in 0..n_tiles {
            out.extend_from_slice(&tile_bytes.to_le_bytes());
        }
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_window_clip() {
        let window = PixelWindow { col_off: 3, row_off: 1, width: 10, height: 10 };
        let clipped = window.clip_to(5, 4);
        assert_eq!(clipped, PixelWindow { col_off: 3, row_off: 1, width: 2, height: 3 });
        let outside = PixelWindow { col_off: 8, row_off: 0, width: 2, height: 2 }.clip_to(5, 4);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_window_from_bounds() {
        let window = PixelWindow::from_bounds(-2.5, 1.2, 3.1, 4.0);
        assert_eq!(window, PixelWindow { col_off: 0, row_off: 1, width: 4, height: 3 });
    }

    #[test]
    fn test_read_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.tif");
        write_gradient_tiff(&path, 6, 5);

        let window = PixelWindow { col_off: 2, row_off: 1, width: 3, height: 2 };
        let (read, data) = read_window(&path, window, None).unwrap();
        assert_eq!(read, window);
        assert_eq!(data.dim(), (2, 3));
        assert_eq!(data[[0, 0]], 12.0);
        assert_eq!(data[[1, 2]], 24.0);
    }

    #[test]
    fn test_nodata_becomes_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.tif");
        write_gradient_tiff(&path, 4, 4);

        let window = PixelWindow { col_off: 0, row_off: 0, width: 10, height: 10 };
        let (read, data) = read_window(&path, window, Some(0.0)).unwrap();
        assert_eq!(read.width, 4);
        assert!(data[[0, 0]].is_nan());
        assert_eq!(data[[0, 1]], 1.0);
        assert_eq!(data[[3, 3]], 33.0);
    }

    #[test]
    fn test_read_window_across_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("striped.tif");
        write_striped_gradient_tiff(&path, 6, 7, 2);
        let decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.chunk_dimensions(), (6, 2));

        // Rows 1..7 touch all four strips, the last one a single row
        let window = PixelWindow { col_off: 2, row_off: 1, width: 3, height: 6 };
        let (read, data) = read_window(&path, window, None).unwrap();
        assert_eq!(read, window);
        assert_eq!(data[[0, 0]], 12.0);
        assert_eq!(data[[1, 0]], 22.0);
        assert_eq!(data[[2, 1]], 33.0);
        assert_eq!(data[[5, 2]], 64.0);
    }

    #[test]
    fn test_read_window_across_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiled.tif");
        write_tiled_gradient_tiff(&path, 20, 20, 16);
        let decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.chunk_dimensions(), (16, 16));

        // Spans all four tiles, three of them padded edge tiles
        let window = PixelWindow { col_off: 10, row_off: 12, width: 10, height: 8 };
        let (read, data) = read_window(&path, window, None).unwrap();
        assert_eq!(read, window);
        assert_eq!(data[[0, 0]], 1210.0);
        assert_eq!(data[[3, 5]], 1515.0);
        assert_eq!(data[[0, 6]], 1216.0);
        assert_eq!(data[[4, 0]], 1610.0);
        assert_eq!(data[[4, 6]], 1616.0);
        assert_eq!(data[[7, 9]], 1919.0);
        assert!(data.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_read_window_in_edge_tile_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiled.tif");
        write_tiled_gradient_tiff(&path, 20, 20, 16);

        let window = PixelWindow { col_off: 17, row_off: 2, width: 10, height: 2 };
        let (read, data) = read_window(&path, window, None).unwrap();
        assert_eq!(read, PixelWindow { col_off: 17, row_off: 2, width: 3, height: 2 });
        assert_eq!(data[[0, 0]], 217.0);
        assert_eq!(data[[1, 2]], 319.0);
    }
}
