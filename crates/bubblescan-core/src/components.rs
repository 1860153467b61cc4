//! Connected-component labeling of binary ink masks.
//!
//! Runs of ink pixels are extracted row by row and merged across adjacent
//! rows with a union-find forest (8-connectivity).

use crate::GrayImageView;
use nalgebra::Point2;

/// A disjoint-set forest with path halving and union by rank.
pub struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![0; size],
        }
    }

    #[inline]
    pub fn find(&mut self, i: u32) -> u32 {
        let mut root = i;
        while self.parent[root as usize] != root {
            self.parent[root as usize] = self.parent[self.parent[root as usize] as usize];
            root = self.parent[root as usize];
        }
        root
    }

    #[inline]
    pub fn union(&mut self, i: u32, j: u32) {
        let root_i = self.find(i);
        let root_j = self.find(j);
        if root_i == root_j {
            return;
        }
        match self.rank[root_i as usize].cmp(&self.rank[root_j as usize]) {
            std::cmp::Ordering::Less => self.parent[root_i as usize] = root_j,
            std::cmp::Ordering::Greater => self.parent[root_j as usize] = root_i,
            std::cmp::Ordering::Equal => {
                self.parent[root_i as usize] = root_j;
                self.rank[root_j as usize] += 1;
            }
        }
    }
}

/// Bounding box, centroid and intensity statistics of one component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComponentStats {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub pixel_count: u32,
    sum_x: u64,
    sum_y: u64,
    sum_intensity: u64,
    sum_sq_intensity: u64,
}

impl Default for ComponentStats {
    fn default() -> Self {
        Self {
            min_x: u32::MAX,
            max_x: 0,
            min_y: u32::MAX,
            max_y: 0,
            pixel_count: 0,
            sum_x: 0,
            sum_y: 0,
            sum_intensity: 0,
            sum_sq_intensity: 0,
        }
    }
}

impl ComponentStats {
    #[inline]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Pixel-center centroid.
    pub fn centroid(&self) -> Point2<f32> {
        let n = self.pixel_count.max(1) as f64;
        Point2::new(
            (self.sum_x as f64 / n + 0.5) as f32,
            (self.sum_y as f64 / n + 0.5) as f32,
        )
    }

    /// Center of the bounding box.
    pub fn bbox_center(&self) -> Point2<f32> {
        Point2::new(
            (self.min_x + self.max_x + 1) as f32 * 0.5,
            (self.min_y + self.max_y + 1) as f32 * 0.5,
        )
    }

    /// Short side over long side of the bounding box, in (0, 1].
    pub fn squareness(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        w.min(h) / w.max(h)
    }

    /// Fraction of the bounding box covered by the component.
    pub fn fill_ratio(&self) -> f32 {
        self.pixel_count as f32 / (self.width() * self.height()) as f32
    }

    /// Mean gray level of the component pixels (0 when labeled without an image).
    pub fn mean_intensity(&self) -> f32 {
        self.sum_intensity as f32 / self.pixel_count.max(1) as f32
    }

    pub fn intensity_std(&self) -> f32 {
        let n = self.pixel_count.max(1) as f64;
        let mean = self.sum_intensity as f64 / n;
        let var = (self.sum_sq_intensity as f64 / n - mean * mean).max(0.0);
        var.sqrt() as f32
    }
}

#[derive(Clone, Copy, Debug)]
struct Run {
    y: u32,
    x_start: u32,
    x_end: u32,
    id: u32,
}

/// Label the connected ink regions (`mask != 0`) of a `width x height` mask.
///
/// When `gray` is provided, per-component intensity sums are accumulated from
/// it; it must have the same dimensions as the mask.
pub fn label_components(
    mask: &[u8],
    width: usize,
    height: usize,
    gray: Option<&GrayImageView<'_>>,
) -> Vec<ComponentStats> {
    debug_assert_eq!(mask.len(), width * height);
    let mut runs: Vec<Run> = Vec::new();

    for y in 0..height {
        let row = y * width;
        let mut x = 0;
        while x < width {
            if mask[row + x] != 0 {
                let start = x;
                while x < width && mask[row + x] != 0 {
                    x += 1;
                }
                runs.push(Run {
                    y: y as u32,
                    x_start: start as u32,
                    x_end: (x - 1) as u32,
                    id: runs.len() as u32,
                });
            } else {
                x += 1;
            }
        }
    }

    if runs.is_empty() {
        return Vec::new();
    }

    let mut uf = UnionFind::new(runs.len());
    let mut curr_row = 0..0;
    let mut i = 0;

    while i < runs.len() {
        let y = runs[i].y;
        let start = i;
        while i < runs.len() && runs[i].y == y {
            i += 1;
        }
        let prev_row = curr_row;
        curr_row = start..i;

        if y == 0 || prev_row.is_empty() || runs[prev_row.start].y != y - 1 {
            continue;
        }
        let mut p_idx = prev_row.start;
        for c_idx in curr_row.clone() {
            let curr = runs[c_idx];
            // Diagonal neighbours count: widen the current run by one pixel.
            let lo = curr.x_start.saturating_sub(1);
            let hi = curr.x_end + 1;
            while p_idx < prev_row.end && runs[p_idx].x_end < lo {
                p_idx += 1;
            }
            let mut k = p_idx;
            while k < prev_row.end && runs[k].x_start <= hi {
                uf.union(curr.id, runs[k].id);
                k += 1;
            }
        }
    }

    let mut root_to_label = vec![u32::MAX; runs.len()];
    let mut stats: Vec<ComponentStats> = Vec::new();

    for run in &runs {
        let root = uf.find(run.id) as usize;
        if root_to_label[root] == u32::MAX {
            root_to_label[root] = stats.len() as u32;
            stats.push(ComponentStats::default());
        }
        let s = &mut stats[root_to_label[root] as usize];
        let len = (run.x_end - run.x_start + 1) as u64;
        s.min_x = s.min_x.min(run.x_start);
        s.max_x = s.max_x.max(run.x_end);
        s.min_y = s.min_y.min(run.y);
        s.max_y = s.max_y.max(run.y);
        s.pixel_count += len as u32;
        s.sum_x += (run.x_start as u64 + run.x_end as u64) * len / 2;
        s.sum_y += run.y as u64 * len;
        if let Some(img) = gray {
            for x in run.x_start..=run.x_end {
                let v = img.get(x as usize, run.y as usize) as u64;
                s.sum_intensity += v;
                s.sum_sq_intensity += v * v;
            }
        }
    }

    stats
}
