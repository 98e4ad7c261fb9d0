//! Contour lines and isosurfaces
//!
//! Marching squares over grid elements and marching tetrahedra over volume
//! elements. Each isovalue contributes its segments or triangles to one
//! output element with a matching value per vertex.

/// Extracted geometry
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Surface {
    pub vertices: Vec<f32>,
    pub values: Vec<f32>,
    pub labels: Vec<String>,
}

/// Regular lattice of scalar samples with positions
pub(crate) struct Lattice<'a> {
    pub dims: [usize; 3],
    pub values: &'a [f32],
    pub positions: Vec<[f32; 3]>,
}

impl<'a> Lattice<'a> {
    /// Positions come from per-sample vertices, two bounding corners, or the unit cube
    pub fn new(dims: [usize; 3], values: &'a [f32], vertices: &[f32]) -> Self {
        let [w, h, d] = dims;
        let count = w * h * d;
        let positions = if vertices.len() == count * 3 {
            vertices
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect()
        } else {
            let (lo, hi) = if vertices.len() >= 6 {
                (
                    [vertices[0], vertices[1], vertices[2]],
                    [vertices[3], vertices[4], vertices[5]],
                )
            } else {
                ([0.0; 3], [1.0; 3])
            };
            let frac = |i: usize, n: usize| if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
            let mut out = Vec::with_capacity(count);
            for k in 0..d {
                for j in 0..h {
                    for i in 0..w {
                        let f = [frac(i, w), frac(j, h), frac(k, d)];
                        out.push([
                            lo[0] + (hi[0] - lo[0]) * f[0],
                            lo[1] + (hi[1] - lo[1]) * f[1],
                            lo[2] + (hi[2] - lo[2]) * f[2],
                        ]);
                    }
                }
            }
            out
        };
        Self {
            dims,
            values,
            positions,
        }
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.dims[0] + k * self.dims[0] * self.dims[1]
    }

    fn is_valid(&self) -> bool {
        let count = self.dims.iter().product::<usize>();
        count > 0 && self.values.len() >= count && self.positions.len() >= count
    }
}

fn crossing(pa: [f32; 3], va: f32, pb: [f32; 3], vb: f32, iso: f32) -> [f32; 3] {
    let t = if (vb - va).abs() > f32::EPSILON {
        ((iso - va) / (vb - va)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    [
        pa[0] + (pb[0] - pa[0]) * t,
        pa[1] + (pb[1] - pa[1]) * t,
        pa[2] + (pb[2] - pa[2]) * t,
    ]
}

/// Contour segments for each isovalue over a W×H lattice
pub(crate) fn marching_squares(lattice: &Lattice<'_>, isovalues: &[f32], labels: bool) -> Surface {
    let mut out = Surface::default();
    let [w, h, _] = lattice.dims;
    if !lattice.is_valid() || w < 2 || h < 2 {
        return out;
    }

    for &iso in isovalues {
        let first_vertex = out.values.len();
        for j in 0..h - 1 {
            for i in 0..w - 1 {
                let corners = [
                    lattice.index(i, j, 0),
                    lattice.index(i + 1, j, 0),
                    lattice.index(i + 1, j + 1, 0),
                    lattice.index(i, j + 1, 0),
                ];
                let v = corners.map(|c| lattice.values[c]);
                if v.iter().any(|x| x.is_nan()) {
                    continue;
                }
                let p = corners.map(|c| lattice.positions[c]);

                // Edges: bottom, right, top, left
                let mut points: Vec<Option<[f32; 3]>> = Vec::with_capacity(4);
                for e in 0..4 {
                    let (a, b) = (e, (e + 1) % 4);
                    points.push(if (v[a] < iso) != (v[b] < iso) {
                        Some(crossing(p[a], v[a], p[b], v[b], iso))
                    } else {
                        None
                    });
                }
                let found: Vec<[f32; 3]> = points.iter().flatten().copied().collect();
                let segments: Vec<([f32; 3], [f32; 3])> = match found.len() {
                    2 => vec![(found[0], found[1])],
                    4 => {
                        // Saddle: resolve with the cell centre value
                        let centre = v.iter().sum::<f32>() / 4.0;
                        let [e0, e1, e2, e3] = [found[0], found[1], found[2], found[3]];
                        if (centre < iso) == (v[0] < iso) {
                            vec![(e0, e1), (e2, e3)]
                        } else {
                            vec![(e3, e0), (e1, e2)]
                        }
                    }
                    _ => Vec::new(),
                };
                for (a, b) in segments {
                    out.vertices.extend_from_slice(&a);
                    out.vertices.extend_from_slice(&b);
                    out.values.push(iso);
                    out.values.push(iso);
                }
            }
        }
        if labels {
            let added = out.values.len() - first_vertex;
            for n in 0..added {
                out.labels.push(if n == 0 { format!("{}", iso) } else { String::new() });
            }
        }
    }
    out
}

/// Cube corner offsets
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the 0-6 diagonal
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Isosurface triangles for each isovalue over a W×H×D lattice
pub(crate) fn marching_tetrahedra(lattice: &Lattice<'_>, isovalues: &[f32]) -> Surface {
    let mut out = Surface::default();
    let [w, h, d] = lattice.dims;
    if !lattice.is_valid() || w < 2 || h < 2 || d < 2 {
        return out;
    }

    for &iso in isovalues {
        for k in 0..d - 1 {
            for j in 0..h - 1 {
                for i in 0..w - 1 {
                    let idx = CORNERS.map(|[x, y, z]| lattice.index(i + x, j + y, k + z));
                    let v = idx.map(|c| lattice.values[c]);
                    if v.iter().any(|x| x.is_nan()) {
                        continue;
                    }
                    let p = idx.map(|c| lattice.positions[c]);
                    for tet in TETRAHEDRA {
                        polygonise(&tet.map(|c| (p[c], v[c])), iso, &mut out);
                    }
                }
            }
        }
    }
    out
}

fn polygonise(tet: &[([f32; 3], f32); 4], iso: f32, out: &mut Surface) {
    let inside: Vec<usize> = (0..4).filter(|&n| tet[n].1 < iso).collect();
    let outside: Vec<usize> = (0..4).filter(|&n| tet[n].1 >= iso).collect();
    let cut = |a: usize, b: usize| crossing(tet[a].0, tet[a].1, tet[b].0, tet[b].1, iso);
    let mut emit = |tri: [[f32; 3]; 3]| {
        for p in tri {
            out.vertices.extend_from_slice(&p);
            out.values.push(iso);
        }
    };

    match (inside.len(), outside.len()) {
        (1, 3) | (3, 1) => {
            let (lone, rest) = if inside.len() == 1 {
                (inside[0], outside)
            } else {
                (outside[0], inside)
            };
            emit([cut(lone, rest[0]), cut(lone, rest[1]), cut(lone, rest[2])]);
        }
        (2, 2) => {
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let (ac, ad, bd, bc) = (cut(a, c), cut(a, d), cut(b, d), cut(b, c));
            emit([ac, ad, bd]);
            emit([ac, bd, bc]);
        }
        _ => {}
    }
}
