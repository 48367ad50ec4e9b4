use serde::{Deserialize, Serialize};

/// Image-space point with single-precision coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Board-space point with single-precision coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Ordered run of points, e.g. the corners of one marker.
pub type PointSequence = Vec<Point2f>;

/// Outer index = marker/candidate, inner index = corner within it.
pub type NestedPointSequence = Vec<PointSequence>;

/// Dense row-major matrix of `f64` copied out of a native matrix handle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixValue {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatrixValue {
    /// Build from row-major data. Returns `None` if `data.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (rows.checked_mul(cols)? == data.len()).then_some(Self { rows, cols, data })
    }

    /// Build from a slice of equally long rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Option<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Zero-filled `rows x cols` matrix. Returns `None` if the element count
    /// overflows `usize`.
    pub fn zeros(rows: usize, cols: usize) -> Option<Self> {
        let len = rows.checked_mul(cols)?;
        Some(Self {
            rows,
            cols,
            data: vec![0.0; len],
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Rows as nested vectors (the shape a host 2D array takes).
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows)
            .filter_map(|r| self.row(r).map(<[f64]>::to_vec))
            .collect()
    }

}

/// Geometry of a chessboard calibration target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    /// Inner corners along the board width.
    pub corner_count_wide: u32,
    /// Inner corners along the board height.
    pub corner_count_high: u32,
    /// Side length of one board square, in board units.
    pub corner_length: f32,
    /// Distance between neighbouring inner corners, in board units.
    pub corner_separation: f32,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            corner_count_wide: 6,
            corner_count_high: 9,
            corner_length: 0.024,
            corner_separation: 0.024,
        }
    }
}

impl BoardSpec {
    pub fn corner_count(&self) -> usize {
        self.corner_count_wide as usize * self.corner_count_high as usize
    }

    /// Board-space corner positions (z = 0), row by row.
    pub fn object_points(&self) -> Vec<Point3f> {
        let mut out = Vec::with_capacity(self.corner_count());
        for row in 0..self.corner_count_high {
            for col in 0..self.corner_count_wide {
                out.push(Point3f::new(
                    col as f32 * self.corner_separation,
                    row as f32 * self.corner_separation,
                    0.0,
                ));
            }
        }
        out
    }
}
