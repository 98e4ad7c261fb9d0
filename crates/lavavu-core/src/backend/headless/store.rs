//! In-memory object and geometry storage

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::backend::{ElementId, ElementInfo, ObjectId};
use crate::types::{DataLabel, DataRole, Dims, Renderer, StepScope};

/// Storage key for a label: role name or `values:<label>`
pub(crate) fn storage_key(label: &DataLabel) -> String {
    match label {
        DataLabel::Role(role) => role.as_str().to_string(),
        DataLabel::Values(name) => format!("values:{}", name),
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Texture {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
    pub path: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct Element {
    pub id: ElementId,
    pub step: i32,
    pub renderer: Renderer,
    pub dims: Dims,
    pub f32s: BTreeMap<String, Vec<f32>>,
    pub u32s: BTreeMap<String, Vec<u32>>,
    pub u8s: BTreeMap<String, Vec<u8>>,
    pub labels: Vec<String>,
}

impl Element {
    pub fn new(id: ElementId, step: i32, renderer: Renderer) -> Self {
        Self {
            id,
            step,
            renderer,
            dims: Dims::default(),
            f32s: BTreeMap::new(),
            u32s: BTreeMap::new(),
            u8s: BTreeMap::new(),
            labels: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.f32s.values().all(Vec::is_empty)
            && self.u32s.values().all(Vec::is_empty)
            && self.u8s.values().all(Vec::is_empty)
            && self.labels.is_empty()
    }

    pub fn vertices(&self) -> &[f32] {
        self.f32s.get("vertices").map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn values(&self, label: &str) -> Option<&[f32]> {
        self.f32s.get(&format!("values:{}", label)).map(Vec::as_slice)
    }

    pub fn value_labels(&self) -> Vec<String> {
        self.f32s
            .keys()
            .filter_map(|k| k.strip_prefix("values:").map(str::to_string))
            .collect()
    }

    pub fn count(&self) -> usize {
        let verts = self.vertices().len() / 3;
        if verts > 0 {
            return verts;
        }
        self.f32s
            .values()
            .map(Vec::len)
            .chain(self.u32s.values().map(Vec::len))
            .chain(self.u8s.values().map(Vec::len))
            .max()
            .unwrap_or(0)
    }

    pub fn roles(&self) -> Vec<DataRole> {
        DataRole::ALL
            .iter()
            .copied()
            .filter(|role| match role {
                DataRole::Values => !self.value_labels().is_empty(),
                other => {
                    let key = other.as_str();
                    self.f32s.contains_key(key)
                        || self.u32s.contains_key(key)
                        || self.u8s.contains_key(key)
                }
            })
            .collect()
    }

    pub fn info(&self, object: ObjectId) -> ElementInfo {
        ElementInfo {
            id: self.id,
            object,
            renderer: self.renderer,
            step: self.step,
            dims: self.dims,
            count: self.count(),
            roles: self.roles(),
            value_labels: self.value_labels(),
        }
    }

    pub fn remove_label(&mut self, label: &DataLabel) {
        let key = storage_key(label);
        self.f32s.remove(&key);
        self.u32s.remove(&key);
        self.u8s.remove(&key);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ObjectRecord {
    pub id: ObjectId,
    pub props: Map<String, Value>,
    pub elements: Vec<Element>,
    pub texture: Option<Texture>,
    /// Next load starts a new element
    pub append_pending: bool,
}

impl ObjectRecord {
    pub fn new(id: ObjectId, props: Map<String, Value>) -> Self {
        Self {
            id,
            props,
            elements: Vec::new(),
            texture: None,
            append_pending: false,
        }
    }

    pub fn name(&self) -> &str {
        self.props.get("name").and_then(Value::as_str).unwrap_or("")
    }

    pub fn renderer(&self) -> Renderer {
        self.props
            .get("renderer")
            .and_then(Value::as_str)
            .and_then(|r| r.split(':').next())
            .and_then(|r| r.parse().ok())
            .unwrap_or(Renderer::Points)
    }

    pub fn is_visible(&self) -> bool {
        self.props.get("visible").and_then(Value::as_bool).unwrap_or(true)
    }

    pub fn declared_dims(&self) -> Dims {
        self.props
            .get("dims")
            .and_then(Dims::from_json)
            .unwrap_or_default()
    }

    /// Element the next load at `step` writes into
    pub fn target_element(&mut self, step: i32, next_id: &mut u64) -> &mut Element {
        let renderer = self.renderer();
        let existing = self.elements.iter().rposition(|e| e.step == step);
        let index = match existing {
            Some(i) if !self.append_pending => i,
            _ => {
                *next_id += 1;
                self.elements
                    .push(Element::new(ElementId(*next_id), step, renderer));
                self.append_pending = false;
                self.elements.len() - 1
            }
        };
        &mut self.elements[index]
    }

    /// Close the current element; no-op if it holds no data
    pub fn append(&mut self, step: i32) {
        let has_data = self
            .elements
            .iter()
            .rev()
            .find(|e| e.step == step)
            .is_some_and(|e| !e.is_empty());
        if has_data {
            self.append_pending = true;
        }
    }

    pub fn elements_in<'a>(
        &'a self,
        scope: StepScope,
        current: i32,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements
            .iter()
            .filter(move |e| scope.includes(e.step, current))
    }

    pub fn value_range(&self, label: &str, scope: StepScope, current: i32) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for element in self.elements_in(scope, current) {
            for &v in element.values(label).unwrap_or(&[]) {
                if v.is_nan() {
                    continue;
                }
                let v = v as f64;
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                });
            }
        }
        range
    }

    /// Vertex bounds over `scope`, or over every step when `None`
    pub fn bounds(&self, scope: Option<StepScope>, current: i32) -> Option<[[f32; 3]; 2]> {
        let mut bounds: Option<[[f32; 3]; 2]> = None;
        let elements = self
            .elements
            .iter()
            .filter(|e| scope.map_or(true, |s| s.includes(e.step, current)));
        for element in elements {
            for p in element.vertices().chunks_exact(3) {
                if p.iter().any(|v| !v.is_finite()) {
                    continue;
                }
                let b = bounds.get_or_insert([[p[0], p[1], p[2]], [p[0], p[1], p[2]]]);
                for axis in 0..3 {
                    b[0][axis] = b[0][axis].min(p[axis]);
                    b[1][axis] = b[1][axis].max(p[axis]);
                }
            }
        }
        bounds
    }
}

/// Bilinear lattice of `w × h` points from four corners ordered
/// (0,0), (1,0), (0,1), (1,1)
pub(crate) fn expand_grid_corners(corners: &[f32], w: usize, h: usize) -> Vec<f32> {
    let corner = |i: usize| [corners[i * 3], corners[i * 3 + 1], corners[i * 3 + 2]];
    let (c00, c10, c01, c11) = (corner(0), corner(1), corner(2), corner(3));
    let mut out = Vec::with_capacity(w * h * 3);
    for j in 0..h {
        let v = if h > 1 { j as f32 / (h - 1) as f32 } else { 0.0 };
        for i in 0..w {
            let u = if w > 1 { i as f32 / (w - 1) as f32 } else { 0.0 };
            for axis in 0..3 {
                let bottom = c00[axis] + (c10[axis] - c00[axis]) * u;
                let top = c01[axis] + (c11[axis] - c01[axis]) * u;
                out.push(bottom + (top - bottom) * v);
            }
        }
    }
    out
}

/// Split each triangle into `split × split` smaller triangles
pub(crate) fn tessellate(vertices: &[f32], split: u32) -> Vec<f32> {
    let n = split.max(1) as usize;
    if n == 1 {
        return vertices.to_vec();
    }
    let mut out = Vec::with_capacity(vertices.len() * n * n);
    for tri in vertices.chunks_exact(9) {
        let a = [tri[0], tri[1], tri[2]];
        let b = [tri[3], tri[4], tri[5]];
        let c = [tri[6], tri[7], tri[8]];
        // Barycentric lattice point (i along ab, j along ac)
        let point = |i: usize, j: usize| -> [f32; 3] {
            let u = i as f32 / n as f32;
            let v = j as f32 / n as f32;
            let mut p = [0.0f32; 3];
            for axis in 0..3 {
                p[axis] = a[axis] + (b[axis] - a[axis]) * u + (c[axis] - a[axis]) * v;
            }
            p
        };
        for j in 0..n {
            for i in 0..(n - j) {
                for p in [point(i, j), point(i + 1, j), point(i, j + 1)] {
                    out.extend_from_slice(&p);
                }
                if i + j + 1 < n {
                    for p in [point(i + 1, j), point(i + 1, j + 1), point(i, j + 1)] {
                        out.extend_from_slice(&p);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_grid_corners() {
        let corners = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let grid = expand_grid_corners(&corners, 3, 3);
        assert_eq!(grid.len(), 27);
        // Centre point
        assert_eq!(&grid[12..15], &[0.5, 0.5, 0.0]);
        assert_eq!(&grid[24..27], &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_tessellate_counts() {
        let tri = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        assert_eq!(tessellate(&tri, 1).len(), 9);
        assert_eq!(tessellate(&tri, 2).len(), 4 * 9);
        assert_eq!(tessellate(&tri, 3).len(), 9 * 9);
    }

    #[test]
    fn test_append_noop_when_empty() {
        let mut obj = ObjectRecord::new(ObjectId(1), Map::new());
        let mut next = 0;
        obj.append(-1);
        assert!(!obj.append_pending);
        obj.target_element(-1, &mut next)
            .f32s
            .insert("vertices".into(), vec![0.0; 3]);
        obj.append(-1);
        obj.append(-1);
        obj.target_element(-1, &mut next);
        assert_eq!(obj.elements.len(), 2);
    }
}
