//! Tile grid geometry.
//!
//! An image of shape `naxis` is cut into a grid of rectangular tiles of shape
//! `tilesize`. Axis 0 varies fastest both in the image and in the tile
//! numbering, so tile `t` of a `[3, 2]` grid sits at grid column `t % 3`,
//! grid row `t / 3`. Tiles on the far edge of an axis are shorter when the
//! axis length is not a multiple of the tile length.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Maximum number of image axes the tile engine supports.
pub const MAX_COMPRESS_DIM: usize = 6;

/// The tile grid of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGeometry {
    naxis: Vec<usize>,
    tilesize: Vec<usize>,
    grid: Vec<usize>,
    strides: Vec<usize>,
}

/// Location and extent of a single tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRegion {
    /// Tile number in `0..ntiles`.
    pub index: usize,
    /// Flattened image offset of the tile's first element.
    pub offset: usize,
    /// Per-axis pixel coordinate of the tile's first element.
    pub start: Vec<usize>,
    /// Per-axis element count; edge tiles may be shorter than the tile size.
    pub shape: Vec<usize>,
}

impl TileRegion {
    /// Number of elements in this tile.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TileGeometry {
    /// Build the grid for an image of shape `naxis` cut into tiles of shape
    /// `tilesize`.
    ///
    /// `tilesize` may be shorter than `naxis`; missing trailing entries are 1.
    pub fn new(naxis: &[usize], tilesize: &[usize]) -> Result<Self> {
        if naxis.is_empty() {
            return Err(Error::InvalidDimension("image has no axes"));
        }
        if naxis.len() > MAX_COMPRESS_DIM {
            return Err(Error::InvalidDimension("more than 6 image axes"));
        }
        if tilesize.len() > naxis.len() {
            return Err(Error::InvalidDimension("tile has more axes than the image"));
        }
        if naxis.contains(&0) {
            return Err(Error::InvalidDimension("axis length must be positive"));
        }
        if tilesize.contains(&0) {
            return Err(Error::InvalidDimension("tile length must be positive"));
        }

        let mut tiles = tilesize.to_vec();
        tiles.resize(naxis.len(), 1);

        let grid = naxis
            .iter()
            .zip(&tiles)
            .map(|(&n, &t)| n.div_ceil(t))
            .collect();

        let mut strides = Vec::with_capacity(naxis.len());
        let mut stride = 1usize;
        for &n in naxis {
            strides.push(stride);
            stride = stride
                .checked_mul(n)
                .ok_or(Error::InvalidDimension("image is too large to address"))?;
        }

        Ok(TileGeometry {
            naxis: naxis.to_vec(),
            tilesize: tiles,
            grid,
            strides,
        })
    }

    /// The default tiling: one image row per tile, `(naxis[0], 1, 1, ...)`.
    pub fn row_tiles(naxis: &[usize]) -> Result<Self> {
        let first = naxis.first().copied().unwrap_or(0);
        Self::new(naxis, &[first])
    }

    pub fn ndim(&self) -> usize {
        self.naxis.len()
    }

    pub fn naxis(&self) -> &[usize] {
        &self.naxis
    }

    /// Tile shape, padded with 1 to the image dimensionality.
    pub fn tilesize(&self) -> &[usize] {
        &self.tilesize
    }

    /// Number of tiles along each axis.
    pub fn grid(&self) -> &[usize] {
        &self.grid
    }

    /// Total number of tiles.
    pub fn ntiles(&self) -> usize {
        self.grid.iter().product()
    }

    /// Upper bound on the element count of any tile.
    pub fn maxtilelen(&self) -> usize {
        self.tilesize.iter().product()
    }

    /// Total number of image elements.
    pub fn total_len(&self) -> usize {
        self.naxis.iter().product()
    }

    /// Location and extent of tile `index`.
    pub fn tile(&self, index: usize) -> Result<TileRegion> {
        if index >= self.ntiles() {
            return Err(Error::InvalidDimension("tile index out of range"));
        }
        let mut rest = index;
        let mut start = Vec::with_capacity(self.ndim());
        let mut shape = Vec::with_capacity(self.ndim());
        let mut offset = 0;
        for axis in 0..self.ndim() {
            let coord = rest % self.grid[axis];
            rest /= self.grid[axis];
            let first = coord * self.tilesize[axis];
            start.push(first);
            shape.push(self.tilesize[axis].min(self.naxis[axis] - first));
            offset += first * self.strides[axis];
        }
        Ok(TileRegion {
            index,
            offset,
            start,
            shape,
        })
    }

    /// All tiles in tile order.
    pub fn tiles(&self) -> impl Iterator<Item = TileRegion> + '_ {
        (0..self.ntiles()).filter_map(move |t| self.tile(t).ok())
    }

    /// Image offsets of the first element of every axis-0 run inside a tile.
    ///
    /// Each run is `region.shape[0]` elements long and contiguous in the
    /// image. Runs are listed in tile element order.
    pub fn row_offsets(&self, region: &TileRegion) -> Vec<usize> {
        let ndim = self.ndim();
        let nrows: usize = region.shape[1..].iter().product();
        let mut offsets = Vec::with_capacity(nrows);
        let mut counter = vec![0usize; ndim];
        for _ in 0..nrows {
            let offset: usize = counter[1..]
                .iter()
                .zip(&self.strides[1..])
                .map(|(&k, &s)| k * s)
                .sum();
            offsets.push(region.offset + offset);
            for axis in 1..ndim {
                counter[axis] += 1;
                if counter[axis] < region.shape[axis] {
                    break;
                }
                counter[axis] = 0;
            }
        }
        offsets
    }

    /// Copy one tile's elements out of the flattened image.
    pub fn gather<T: Copy>(&self, region: &TileRegion, image: &[T]) -> Result<Vec<T>> {
        if image.len() != self.total_len() {
            return Err(Error::InvalidDimension("image length does not match NAXIS"));
        }
        let run = region.shape[0];
        let mut tile = Vec::new();
        tile.try_reserve_exact(region.len())?;
        for start in self.row_offsets(region) {
            tile.extend_from_slice(&image[start..start + run]);
        }
        Ok(tile)
    }

    /// Write one tile's elements into the flattened image.
    pub fn scatter<T: Copy>(&self, region: &TileRegion, tile: &[T], image: &mut [T]) -> Result<()> {
        if image.len() != self.total_len() {
            return Err(Error::InvalidDimension("image length does not match NAXIS"));
        }
        if tile.len() != region.len() {
            return Err(Error::InvalidDimension("tile length does not match its region"));
        }
        let run = region.shape[0];
        for (start, chunk) in self.row_offsets(region).into_iter().zip(tile.chunks_exact(run)) {
            image[start..start + run].copy_from_slice(chunk);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_count_is_product_of_ceilings() {
        let g = TileGeometry::new(&[100, 30, 7], &[32, 8, 7]).unwrap();
        assert_eq!(g.grid(), &[4, 4, 1]);
        assert_eq!(g.ntiles(), 16);
        assert_eq!(g.maxtilelen(), 32 * 8 * 7);
    }

    #[test]
    fn short_tilesize_is_padded_with_ones() {
        let g = TileGeometry::new(&[10, 4], &[5]).unwrap();
        assert_eq!(g.tilesize(), &[5, 1]);
        assert_eq!(g.ntiles(), 8);
    }

    #[test]
    fn row_tiles_is_default_shape() {
        let g = TileGeometry::row_tiles(&[440, 300]).unwrap();
        assert_eq!(g.tilesize(), &[440, 1]);
        assert_eq!(g.ntiles(), 300);
        assert_eq!(g.maxtilelen(), 440);
    }

    #[test]
    fn rejects_bad_dimensions() {
        assert!(matches!(
            TileGeometry::new(&[], &[]),
            Err(Error::InvalidDimension(_))
        ));
        assert!(matches!(
            TileGeometry::new(&[1; 7], &[1]),
            Err(Error::InvalidDimension(_))
        ));
        assert!(matches!(
            TileGeometry::new(&[10, 0], &[10]),
            Err(Error::InvalidDimension(_))
        ));
        assert!(matches!(
            TileGeometry::new(&[10, 10], &[0, 1]),
            Err(Error::InvalidDimension(_))
        ));
        assert!(matches!(
            TileGeometry::new(&[10], &[5, 1]),
            Err(Error::InvalidDimension(_))
        ));
    }

    #[test]
    fn edge_tile_is_remainder() {
        let g = TileGeometry::new(&[100], &[32]).unwrap();
        assert_eq!(g.ntiles(), 4);
        let last = g.tile(3).unwrap();
        assert_eq!(last.offset, 96);
        assert_eq!(last.shape, vec![4]);
        assert_eq!(g.tile(0).unwrap().len(), 32);
        assert!(g.tile(4).is_err());
    }

    #[test]
    fn tile_order_is_axis0_fastest() {
        let g = TileGeometry::new(&[10, 10], &[4, 4]).unwrap();
        assert_eq!(g.grid(), &[3, 3]);
        let t = g.tile(4).unwrap();
        assert_eq!(t.start, vec![4, 4]);
        assert_eq!(t.offset, 44);
        let corner = g.tile(8).unwrap();
        assert_eq!(corner.shape, vec![2, 2]);
        assert_eq!(corner.offset, 88);
    }

    #[test]
    fn row_offsets_walk_higher_axes() {
        let g = TileGeometry::new(&[4, 3, 2], &[2, 2, 2]).unwrap();
        let t = g.tile(1).unwrap();
        assert_eq!(t.start, vec![2, 0, 0]);
        assert_eq!(g.row_offsets(&t), vec![2, 6, 14, 18]);
    }

    #[test]
    fn gather_scatter_reassembles_image() {
        let g = TileGeometry::new(&[5, 3], &[2, 2]).unwrap();
        let image: Vec<i32> = (0..15).collect();
        let mut out = vec![0i32; 15];
        let mut seen = 0;
        for region in g.tiles() {
            let tile = g.gather(&region, &image).unwrap();
            assert_eq!(tile.len(), region.len());
            seen += tile.len();
            g.scatter(&region, &tile, &mut out).unwrap();
        }
        assert_eq!(seen, 15);
        assert_eq!(out, image);
    }

    #[test]
    fn gather_picks_rectangle() {
        let g = TileGeometry::new(&[4, 4], &[2, 2]).unwrap();
        let image: Vec<u8> = (0..16).collect();
        let region = g.tile(3).unwrap();
        assert_eq!(g.gather(&region, &image).unwrap(), vec![10, 11, 14, 15]);
    }

    #[test]
    fn gather_rejects_wrong_image_length() {
        let g = TileGeometry::new(&[4], &[2]).unwrap();
        let region = g.tile(0).unwrap();
        assert!(g.gather(&region, &[1u8, 2, 3]).is_err());
    }
}
