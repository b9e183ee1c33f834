//! Node and cell grid geometry.
//!
//! The box is split into `node_grid` regions, one per worker. Each region is
//! split again into `cell_grid` real cells, surrounded by a frame of ghost
//! cells one cell thick. Frame coordinates run from `0` to `cell_grid + 1`;
//! real cells are `1..=cell_grid`.

use nalgebra::Vector3;

use crate::error::{MdError, Result};

#[derive(Debug, Clone)]
pub struct Grid {
    node_grid: [usize; 3],
    cell_grid: [usize; 3],
    box_l: Vector3<f64>,
    node_size: Vector3<f64>,
    cell_size: Vector3<f64>,
}

impl Grid {
    pub fn new(box_l: Vector3<f64>, node_grid: [usize; 3], cell_grid: [usize; 3]) -> Result<Self> {
        if node_grid.iter().chain(cell_grid.iter()).any(|&n| n == 0) {
            return Err(MdError::Configuration(format!(
                "node grid {:?} and cell grid {:?} must be at least 1 in every dimension",
                node_grid, cell_grid
            )));
        }
        let node_size = Vector3::from_fn(|k, _| box_l[k] / node_grid[k] as f64);
        let cell_size = Vector3::from_fn(|k, _| node_size[k] / cell_grid[k] as f64);
        Ok(Grid {
            node_grid,
            cell_grid,
            box_l,
            node_size,
            cell_size,
        })
    }

    pub fn node_grid(&self) -> [usize; 3] {
        self.node_grid
    }

    pub fn cell_grid(&self) -> [usize; 3] {
        self.cell_grid
    }

    pub fn cell_size(&self) -> Vector3<f64> {
        self.cell_size
    }

    pub fn node_size(&self) -> Vector3<f64> {
        self.node_size
    }

    pub fn box_l(&self) -> Vector3<f64> {
        self.box_l
    }

    pub fn n_nodes(&self) -> usize {
        self.node_grid.iter().product()
    }

    /// Smallest cell edge over all dimensions.
    pub fn min_cell_size(&self) -> f64 {
        self.cell_size.min()
    }

    /// Fails if any cell edge is shorter than `required`.
    pub fn check_cell_size(&self, required: f64) -> Result<()> {
        for dim in 0..3 {
            if self.cell_size[dim] < required {
                return Err(MdError::CellTooSmall {
                    dim,
                    cell_size: self.cell_size[dim],
                    required,
                });
            }
        }
        Ok(())
    }

    pub fn rank_of(&self, node: [usize; 3]) -> usize {
        node[0] + self.node_grid[0] * (node[1] + self.node_grid[1] * node[2])
    }

    pub fn node_of(&self, rank: usize) -> [usize; 3] {
        let nx = self.node_grid[0];
        let ny = self.node_grid[1];
        [rank % nx, (rank / nx) % ny, rank / (nx * ny)]
    }

    /// Lower corner of a node region.
    pub fn node_lo(&self, node: [usize; 3]) -> Vector3<f64> {
        Vector3::from_fn(|k, _| node[k] as f64 * self.node_size[k])
    }

    /// Global cell coordinate of a folded position.
    fn global_cell(&self, pos: &Vector3<f64>) -> [usize; 3] {
        let mut g = [0usize; 3];
        for k in 0..3 {
            let total = self.node_grid[k] * self.cell_grid[k];
            let c = (pos[k] / self.cell_size[k]).floor();
            g[k] = if c < 0.0 { 0 } else { (c as usize).min(total - 1) };
        }
        g
    }

    /// Owning rank and real frame cell of a folded position.
    pub fn locate(&self, pos: &Vector3<f64>) -> (usize, [usize; 3]) {
        let g = self.global_cell(pos);
        let node = [
            g[0] / self.cell_grid[0],
            g[1] / self.cell_grid[1],
            g[2] / self.cell_grid[2],
        ];
        let cell = [
            g[0] % self.cell_grid[0] + 1,
            g[1] % self.cell_grid[1] + 1,
            g[2] % self.cell_grid[2] + 1,
        ];
        (self.rank_of(node), cell)
    }

    /// Dimensions of a node's frame (real cells plus ghost layer).
    pub fn frame_dims(&self) -> [usize; 3] {
        [
            self.cell_grid[0] + 2,
            self.cell_grid[1] + 2,
            self.cell_grid[2] + 2,
        ]
    }

    pub fn frame_len(&self) -> usize {
        self.frame_dims().iter().product()
    }

    pub fn frame_index(&self, cell: [usize; 3]) -> usize {
        let dims = self.frame_dims();
        cell[0] + dims[0] * (cell[1] + dims[1] * cell[2])
    }

    /// Frame cell offset of `pos` along `dim` relative to node coordinate
    /// `node_k`: -1 for the lower ghost layer, `cell_grid` for the upper one.
    /// `None` if the position is outside the frame.
    pub fn frame_offset(&self, dim: usize, node_k: usize, pos: f64) -> Option<i64> {
        let lo = node_k as f64 * self.node_size[dim];
        let t = ((pos - lo) / self.cell_size[dim]).floor();
        if !t.is_finite() {
            return None;
        }
        let t = t as i64;
        if t < -1 || t > self.cell_grid[dim] as i64 {
            None
        } else {
            Some(t)
        }
    }

    /// Iterate over every real cell coordinate of a frame.
    pub fn real_cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [cx, cy, cz] = self.cell_grid;
        (1..=cz).flat_map(move |z| (1..=cy).flat_map(move |y| (1..=cx).map(move |x| [x, y, z])))
    }
}

/// Choose a node grid for `n_workers` workers.
///
/// Among all factorisations `a * b * c = n_workers` whose regions are at least
/// `rc + skin` wide, pick the one with the smallest total region surface.
pub fn node_grid(n_workers: usize, box_l: Vector3<f64>, rc: f64, skin: f64) -> Result<[usize; 3]> {
    if n_workers == 0 {
        return Err(MdError::Configuration("at least one worker is required".into()));
    }
    let min_size = rc + skin;
    let mut best: Option<([usize; 3], f64)> = None;
    for a in 1..=n_workers {
        if n_workers % a != 0 {
            continue;
        }
        let rest = n_workers / a;
        for b in 1..=rest {
            if rest % b != 0 {
                continue;
            }
            let grid = [a, b, rest / b];
            let size = Vector3::from_fn(|k, _| box_l[k] / grid[k] as f64);
            if size.iter().any(|&s| s < min_size) {
                continue;
            }
            let surface = size.x * size.y + size.y * size.z + size.z * size.x;
            if best.map_or(true, |(_, s)| surface < s - 1e-12) {
                best = Some((grid, surface));
            }
        }
    }
    best.map(|(grid, _)| grid).ok_or_else(|| {
        MdError::Configuration(format!(
            "box {:?} cannot be split into {} regions of at least {:.4}",
            box_l.as_slice(),
            n_workers,
            min_size
        ))
    })
}

/// Number of real cells per node so that every cell edge is at least
/// `rc + skin`.
pub fn cell_grid(box_l: Vector3<f64>, node_grid: [usize; 3], rc: f64, skin: f64) -> Result<[usize; 3]> {
    let required = rc + skin;
    if !(required > 0.0) {
        return Err(MdError::Configuration(format!(
            "cutoff + skin must be positive, got {}",
            required
        )));
    }
    let mut cells = [0usize; 3];
    for dim in 0..3 {
        let node_size = box_l[dim] / node_grid[dim] as f64;
        let n = (node_size / required).floor() as usize;
        if n == 0 {
            return Err(MdError::CellTooSmall {
                dim,
                cell_size: node_size,
                required,
            });
        }
        cells[dim] = n;
    }
    Ok(cells)
}
