//! Geometry data access
//!
//! [`Geometry`] lists the elements of one object. Each [`GeomData`] can
//! view an array in place, copy it out, or write new data back.
//!
//! Views borrow backend memory and only live for the closure passed to
//! [`GeomData::with_view`]; any later backend call may move or free the
//! data, so use [`GeomData::copy`] to keep it.

use ndarray::{ArrayViewD, IxDyn};
use std::fmt;
use std::ops::Deref;
use tracing::debug;

use crate::backend::{Backend, ElementId, ElementInfo, ObjectId};
use crate::convert::{normalize_for, CanonicalArray, NumericArray};
use crate::error::{BackendError, ConvertError, LavaVuResult, ValidationError};
use crate::property::{assignment, PropertyValue};
use crate::session::SessionRef;
use crate::types::{DataLabel, Dims, ElementType, Renderer, StepScope};

/// Shape for a flat array of `len` entries on an element with `dims`
///
/// Axes of size 1 are dropped and up to three entries stay flat. Arrays
/// with several components per vertex end with the role width; the
/// remaining axes are the dims reversed (D, H, W). When the dims do not
/// account for the data the array is `[len / width, width]` or flat.
pub fn view_shape(dims: Dims, width: usize, len: usize) -> Vec<usize> {
    if len == 0 {
        return if width > 1 { vec![0, width] } else { vec![0] };
    }
    if len <= 3 {
        return vec![len];
    }
    let reversed: Vec<usize> = dims
        .0
        .iter()
        .rev()
        .map(|&d| d as usize)
        .filter(|&d| d > 1)
        .collect();
    if width > 1 {
        if reversed.len() >= 2 {
            let mut shape = reversed;
            shape.push(width);
            if shape.iter().product::<usize>() == len {
                return shape;
            }
        }
        return if len % width == 0 {
            vec![len / width, width]
        } else {
            vec![len]
        };
    }
    if !reversed.is_empty() && reversed.iter().product::<usize>() == len {
        return reversed;
    }
    vec![len]
}

/// A borrowed array in its element type
#[derive(Debug)]
pub enum GeometryView<'a> {
    F32(ArrayViewD<'a, f32>),
    U32(ArrayViewD<'a, u32>),
    U8(ArrayViewD<'a, u8>),
}

impl GeometryView<'_> {
    pub fn shape(&self) -> &[usize] {
        match self {
            GeometryView::F32(v) => v.shape(),
            GeometryView::U32(v) => v.shape(),
            GeometryView::U8(v) => v.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_owned(&self) -> CanonicalArray {
        match self {
            GeometryView::F32(v) => CanonicalArray::F32(v.to_owned()),
            GeometryView::U32(v) => CanonicalArray::U32(v.to_owned()),
            GeometryView::U8(v) => CanonicalArray::U8(v.to_owned()),
        }
    }
}

fn shaped<'a, T>(data: &'a [T], dims: Dims, label: &DataLabel) -> LavaVuResult<ArrayViewD<'a, T>> {
    let shape = view_shape(dims, label.width(), data.len());
    ArrayViewD::from_shape(IxDyn(&shape), data).map_err(|_| {
        ConvertError::ShapeMismatch {
            shape,
            role: label.to_string(),
            width: label.width(),
        }
        .into()
    })
}

/// Current info for one element, looked up by handle
fn element_info(
    backend: &dyn Backend,
    object: ObjectId,
    element: ElementId,
    step: i32,
) -> LavaVuResult<ElementInfo> {
    backend
        .geometry(object, StepScope::At(step))?
        .into_iter()
        .find(|e| e.id == element)
        .ok_or_else(|| BackendError::MissingElement { id: element.0 }.into())
}

/// The elements of an object, optionally limited by renderer and time step
#[derive(Debug, Clone)]
pub struct Geometry {
    elements: Vec<GeomData>,
}

impl Geometry {
    pub(crate) fn load(
        session: SessionRef,
        object: &str,
        renderer: Option<Renderer>,
        scope: StepScope,
    ) -> LavaVuResult<Self> {
        let core = session.upgrade(object)?;
        let id = core.object_id(object)?;
        let infos = core.with_backend(|b| b.geometry(id, scope))??;
        let elements = infos
            .into_iter()
            .filter(|info| renderer.map_or(true, |r| info.renderer == r))
            .map(|info| GeomData {
                session: session.clone(),
                object: object.to_string(),
                info,
            })
            .collect();
        Ok(Self { elements })
    }
}

impl Deref for Geometry {
    type Target = [GeomData];

    fn deref(&self) -> &[GeomData] {
        &self.elements
    }
}

impl IntoIterator for Geometry {
    type Item = GeomData;
    type IntoIter = std::vec::IntoIter<GeomData>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a> IntoIterator for &'a Geometry {
    type Item = &'a GeomData;
    type IntoIter = std::slice::Iter<'a, GeomData>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.elements.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// One geometry element
#[derive(Debug, Clone)]
pub struct GeomData {
    session: SessionRef,
    object: String,
    info: ElementInfo,
}

impl GeomData {
    /// Element description as of the [`Geometry`] query
    pub fn info(&self) -> &ElementInfo {
        &self.info
    }

    pub fn renderer(&self) -> Renderer {
        self.info.renderer
    }

    pub fn object_name(&self) -> &str {
        &self.object
    }

    /// Run `f` on an in-place view of one array
    pub fn with_view<R>(
        &self,
        label: impl Into<DataLabel>,
        f: impl FnOnce(GeometryView<'_>) -> R,
    ) -> LavaVuResult<R> {
        let core = self.session.upgrade(&self.object)?;
        let object = core.object_id(&self.object)?;
        let label = label.into();
        let (element, step) = (self.info.id, self.info.step);
        core.with_backend(|b| -> LavaVuResult<R> {
            let backend: &dyn Backend = b;
            let dims = element_info(backend, object, element, step)?.dims;
            let view = match label.element_type() {
                ElementType::F32 => {
                    GeometryView::F32(shaped(backend.view_f32(element, &label)?, dims, &label)?)
                }
                ElementType::U32 => {
                    GeometryView::U32(shaped(backend.view_u32(element, &label)?, dims, &label)?)
                }
                ElementType::U8 => {
                    GeometryView::U8(shaped(backend.view_u8(element, &label)?, dims, &label)?)
                }
            };
            Ok(f(view))
        })?
    }

    /// An owned copy of one array
    pub fn copy(&self, label: impl Into<DataLabel>) -> LavaVuResult<CanonicalArray> {
        self.with_view(label, |view| view.to_owned())
    }

    /// Replace one array
    ///
    /// When the data shape implies dims that differ from the object's
    /// declared `dims`, the object adopts them.
    pub fn set(
        &self,
        label: impl Into<DataLabel>,
        data: impl Into<NumericArray>,
    ) -> LavaVuResult<()> {
        let label = label.into();
        if matches!(&label, DataLabel::Values(name) if name.trim().is_empty()) {
            return Err(ValidationError::UnknownRole { role: String::new() }.into());
        }
        let core = self.session.upgrade(&self.object)?;
        let object = core.object_id(&self.object)?;
        let array = normalize_for(data.into(), &label)?;
        let implied = array.implied_dims();
        let element = self.info.id;

        core.with_backend(|b| -> LavaVuResult<()> {
            match label.element_type() {
                ElementType::F32 => {
                    b.write_f32(element, &label, array.as_f32_slice().unwrap_or_default())?
                }
                ElementType::U32 => {
                    b.write_u32(element, &label, array.as_u32_slice().unwrap_or_default())?
                }
                ElementType::U8 => {
                    b.write_u8(element, &label, array.as_u8_slice().unwrap_or_default())?
                }
            }
            if let Some(dims) = implied {
                b.set_element_dims(element, dims)?;
            }
            Ok(())
        })??;

        if let Some(dims) = implied {
            let props = core.object_props(&self.object)?;
            let declared = props.get("dims").and_then(Dims::from_json);
            if declared != Some(dims) {
                debug!(object = %self.object, ?declared, ?dims, "adopting dims from data shape");
                let line = assignment("dims", &PropertyValue::Json(dims.to_json()));
                core.with_backend(|b| b.parse_property(&line, Some(object)))??;
            }
        }
        core.refresh()
    }
}

impl fmt::Display for GeomData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info.renderer.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_shape_rules() {
        // Unit axes dropped, grid vertices reshaped D,H,W + width
        assert_eq!(view_shape(Dims::new(4, 2, 1), 3, 24), vec![2, 4, 3]);
        assert_eq!(view_shape(Dims::new(2, 2, 2), 3, 24), vec![2, 2, 2, 3]);
        // Scalars follow the reversed dims
        assert_eq!(view_shape(Dims::new(4, 2, 0), 1, 8), vec![2, 4]);
        // Short arrays stay flat
        assert_eq!(view_shape(Dims::new(4, 2, 0), 3, 3), vec![3]);
        // No usable dims
        assert_eq!(view_shape(Dims::default(), 3, 12), vec![4, 3]);
        assert_eq!(view_shape(Dims::default(), 1, 7), vec![7]);
        // Dims that do not fit the data
        assert_eq!(view_shape(Dims::new(5, 5, 0), 3, 12), vec![4, 3]);
        assert_eq!(view_shape(Dims::new(5, 5, 0), 1, 12), vec![12]);
    }

    #[test]
    fn test_empty_shape() {
        assert_eq!(view_shape(Dims::default(), 3, 0), vec![0, 3]);
        assert_eq!(view_shape(Dims::default(), 1, 0), vec![0]);
    }
}
