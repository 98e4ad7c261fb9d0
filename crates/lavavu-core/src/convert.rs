//! Value conversion
//!
//! Coerces caller-supplied numeric data (nested JSON lists, vectors, ndarray
//! arrays) to the canonical element types the backend stores: f32, u32, u8.
//! Shapes are normalised per data role, including recovery of column-major
//! vector input.

use ndarray::{Array, Array2, ArrayD, Axis, Dimension, IxDyn};
use serde_json::Value;

use crate::error::{ConvertError, ConvertResult};
use crate::types::{DataLabel, Dims, ElementType};

/// Caller-supplied numeric data of any supported element type
#[derive(Clone, Debug, PartialEq)]
pub enum NumericArray {
    F64(ArrayD<f64>),
    F32(ArrayD<f32>),
    U32(ArrayD<u32>),
    U8(ArrayD<u8>),
    I64(ArrayD<i64>),
    /// Data with missing entries; `mask` is true where a value is missing
    Masked {
        data: ArrayD<f64>,
        mask: ArrayD<bool>,
    },
}

/// Data in one of the backend element types
#[derive(Clone, Debug, PartialEq)]
pub enum CanonicalArray {
    F32(ArrayD<f32>),
    U32(ArrayD<u32>),
    U8(ArrayD<u8>),
}

impl NumericArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            NumericArray::F64(a) => a.shape(),
            NumericArray::F32(a) => a.shape(),
            NumericArray::U32(a) => a.shape(),
            NumericArray::U8(a) => a.shape(),
            NumericArray::I64(a) => a.shape(),
            NumericArray::Masked { data, .. } => data.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype_name(&self) -> &'static str {
        match self {
            NumericArray::F64(_) => "f64",
            NumericArray::F32(_) => "f32",
            NumericArray::U32(_) => "u32",
            NumericArray::U8(_) => "u8",
            NumericArray::I64(_) => "i64",
            NumericArray::Masked { .. } => "masked",
        }
    }

    /// Build from nested JSON lists; `null` entries become masked values
    pub fn from_json(value: &Value) -> ConvertResult<Self> {
        let mut shape = Vec::new();
        let mut values = Vec::new();
        flatten_json(value, 0, &mut shape, &mut values)?;

        if shape.is_empty() {
            // Scalars are promoted to a single-entry list
            shape.push(values.len());
        }
        let masked = values.iter().any(Option::is_none);
        let all_integral = values
            .iter()
            .all(|v| v.map(|x| x.fract() == 0.0 && x.abs() < 9.0e15).unwrap_or(false));

        if masked {
            let mask: Vec<bool> = values.iter().map(Option::is_none).collect();
            let data: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            return Ok(NumericArray::Masked {
                data: to_array(&shape, data)?,
                mask: to_array(&shape, mask)?,
            });
        }

        let data: Vec<f64> = values.into_iter().flatten().collect();
        if all_integral && !data.is_empty() {
            let ints = data.iter().map(|&v| v as i64).collect();
            Ok(NumericArray::I64(to_array(&shape, ints)?))
        } else {
            Ok(NumericArray::F64(to_array(&shape, data)?))
        }
    }

    /// Parse whitespace or comma separated numbers
    pub fn from_text(text: &str) -> ConvertResult<Self> {
        let values: Result<Vec<f64>, _> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|_| ConvertError::NotNumeric {
                    value: s.to_string(),
                })
            })
            .collect();
        Ok(NumericArray::from(values?))
    }
}

fn to_array<T>(shape: &[usize], data: Vec<T>) -> ConvertResult<ArrayD<T>> {
    let len = data.len();
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| ConvertError::ShapeMismatch {
        shape: shape.to_vec(),
        role: "array".to_string(),
        width: len,
    })
}

fn flatten_json(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    out: &mut Vec<Option<f64>>,
) -> ConvertResult<()> {
    match value {
        Value::Array(items) => {
            if shape.len() == depth {
                shape.push(items.len());
            } else if shape.len() < depth || shape[depth] != items.len() {
                return Err(ConvertError::Ragged {
                    expected: shape.get(depth).copied().unwrap_or(0),
                    actual: items.len(),
                });
            }
            for item in items {
                flatten_json(item, depth + 1, shape, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            if shape.len() > depth {
                return Err(ConvertError::Ragged {
                    expected: shape[depth],
                    actual: 0,
                });
            }
            out.push(n.as_f64());
            Ok(())
        }
        Value::Bool(b) => {
            out.push(Some(if *b { 1.0 } else { 0.0 }));
            Ok(())
        }
        Value::Null => {
            out.push(None);
            Ok(())
        }
        other => Err(ConvertError::NotNumeric {
            value: other.to_string(),
        }),
    }
}

macro_rules! numeric_from {
    ($variant:ident, $ty:ty) => {
        impl From<Vec<$ty>> for NumericArray {
            fn from(v: Vec<$ty>) -> Self {
                NumericArray::$variant(Array::from_vec(v).into_dyn())
            }
        }

        impl From<&[$ty]> for NumericArray {
            fn from(v: &[$ty]) -> Self {
                NumericArray::$variant(Array::from_vec(v.to_vec()).into_dyn())
            }
        }

        impl<const N: usize> From<Vec<[$ty; N]>> for NumericArray {
            fn from(v: Vec<[$ty; N]>) -> Self {
                NumericArray::$variant(Array2::from(v).into_dyn())
            }
        }

        impl<D: Dimension> From<Array<$ty, D>> for NumericArray {
            fn from(a: Array<$ty, D>) -> Self {
                NumericArray::$variant(a.into_dyn())
            }
        }
    };
}

numeric_from!(F64, f64);
numeric_from!(F32, f32);
numeric_from!(U32, u32);
numeric_from!(U8, u8);
numeric_from!(I64, i64);

impl From<Vec<i32>> for NumericArray {
    fn from(v: Vec<i32>) -> Self {
        NumericArray::I64(Array::from_vec(v.into_iter().map(i64::from).collect()).into_dyn())
    }
}

impl TryFrom<&Value> for NumericArray {
    type Error = ConvertError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        NumericArray::from_json(value)
    }
}

impl CanonicalArray {
    pub fn element_type(&self) -> ElementType {
        match self {
            CanonicalArray::F32(_) => ElementType::F32,
            CanonicalArray::U32(_) => ElementType::U32,
            CanonicalArray::U8(_) => ElementType::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            CanonicalArray::F32(a) => a.shape(),
            CanonicalArray::U32(a) => a.shape(),
            CanonicalArray::U8(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            CanonicalArray::F32(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&ArrayD<u32>> {
        match self {
            CanonicalArray::U32(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&ArrayD<u8>> {
        match self {
            CanonicalArray::U8(a) => Some(a),
            _ => None,
        }
    }

    /// Reshape without changing element order
    pub fn into_shape(self, shape: &[usize]) -> ConvertResult<Self> {
        let mismatch = |len: usize| ConvertError::ShapeMismatch {
            shape: shape.to_vec(),
            role: "array".to_string(),
            width: len,
        };
        Ok(match self {
            CanonicalArray::F32(a) => {
                let len = a.len();
                CanonicalArray::F32(
                    standard(a)
                        .into_shape_with_order(IxDyn(shape))
                        .map_err(|_| mismatch(len))?,
                )
            }
            CanonicalArray::U32(a) => {
                let len = a.len();
                CanonicalArray::U32(
                    standard(a)
                        .into_shape_with_order(IxDyn(shape))
                        .map_err(|_| mismatch(len))?,
                )
            }
            CanonicalArray::U8(a) => {
                let len = a.len();
                CanonicalArray::U8(
                    standard(a)
                        .into_shape_with_order(IxDyn(shape))
                        .map_err(|_| mismatch(len))?,
                )
            }
        })
    }
}

fn standard<T: Clone>(a: ArrayD<T>) -> ArrayD<T> {
    if a.is_standard_layout() {
        a
    } else {
        a.as_standard_layout().into_owned()
    }
}

/// Coerce `data` to a canonical element type, preserving its shape
///
/// f64 is always demoted to f32. A u8 target from floating data in [0,1]
/// is scaled by 255 first. Masked entries become NaN with one warning per
/// call.
pub fn normalize(data: NumericArray, target: Option<ElementType>) -> ConvertResult<CanonicalArray> {
    let incompatible = |from: &str, to: ElementType| ConvertError::IncompatibleDtype {
        from: from.to_string(),
        to: to.to_string(),
    };

    let data = match data {
        NumericArray::Masked { data, mask } => {
            let (data, missing) = unmask(data, &mask, target)?;
            if missing > 0 {
                tracing::warn!("{} masked values replaced with NaN", missing);
            }
            data
        }
        other => other,
    };

    let dtype = data.dtype_name();
    match (data, target) {
        (NumericArray::F64(a), None | Some(ElementType::F32)) => {
            Ok(CanonicalArray::F32(a.mapv(|v| v as f32)))
        }
        (NumericArray::F32(a), None | Some(ElementType::F32)) => Ok(CanonicalArray::F32(a)),
        (NumericArray::U32(a), None | Some(ElementType::U32)) => Ok(CanonicalArray::U32(a)),
        (NumericArray::U8(a), None | Some(ElementType::U8)) => Ok(CanonicalArray::U8(a)),
        (NumericArray::I64(a), None | Some(ElementType::F32)) => {
            Ok(CanonicalArray::F32(a.mapv(|v| v as f32)))
        }
        (NumericArray::U32(a), Some(ElementType::F32)) => {
            Ok(CanonicalArray::F32(a.mapv(|v| v as f32)))
        }
        (NumericArray::U8(a), Some(ElementType::F32)) => {
            Ok(CanonicalArray::F32(a.mapv(|v| v as f32)))
        }
        (NumericArray::I64(a), Some(ElementType::U32)) => {
            if a.iter().any(|&v| v < 0 || v > u32::MAX as i64) {
                return Err(incompatible(dtype, ElementType::U32));
            }
            Ok(CanonicalArray::U32(a.mapv(|v| v as u32)))
        }
        (NumericArray::I64(a), Some(ElementType::U8)) => {
            if a.iter().any(|&v| !(0..=255).contains(&v)) {
                return Err(incompatible(dtype, ElementType::U8));
            }
            Ok(CanonicalArray::U8(a.mapv(|v| v as u8)))
        }
        (NumericArray::F64(a), Some(ElementType::U32)) => float_to_u32(a.mapv(|v| v as f32), dtype),
        (NumericArray::F32(a), Some(ElementType::U32)) => float_to_u32(a, dtype),
        (NumericArray::F64(a), Some(ElementType::U8)) => Ok(float_to_u8(a.mapv(|v| v as f32))),
        (NumericArray::F32(a), Some(ElementType::U8)) => Ok(float_to_u8(a)),
        (NumericArray::U8(a), Some(ElementType::U32)) => {
            Ok(CanonicalArray::U32(a.mapv(u32::from)))
        }
        (NumericArray::U32(a), Some(ElementType::U8)) => {
            if a.iter().any(|&v| v > 255) {
                return Err(incompatible(dtype, ElementType::U8));
            }
            Ok(CanonicalArray::U8(a.mapv(|v| v as u8)))
        }
        (NumericArray::Masked { .. }, _) => unreachable!("masked input is unwrapped above"),
    }
}

/// Plain f64 data from a masked array, with the number of missing entries
///
/// Missing entries already hold NaN; integer targets cannot carry them.
fn unmask(
    data: ArrayD<f64>,
    mask: &ArrayD<bool>,
    target: Option<ElementType>,
) -> ConvertResult<(NumericArray, usize)> {
    let missing = mask.iter().filter(|&&m| m).count();
    match target {
        Some(t @ (ElementType::U32 | ElementType::U8)) if missing > 0 => {
            Err(ConvertError::IncompatibleDtype {
                from: "masked".to_string(),
                to: t.to_string(),
            })
        }
        _ => Ok((NumericArray::F64(data), missing)),
    }
}

fn float_to_u32(a: ArrayD<f32>, dtype: &str) -> ConvertResult<CanonicalArray> {
    if a.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ConvertError::IncompatibleDtype {
            from: dtype.to_string(),
            to: ElementType::U32.to_string(),
        });
    }
    Ok(CanonicalArray::U32(a.mapv(|v| v as u32)))
}

fn float_to_u8(a: ArrayD<f32>) -> CanonicalArray {
    let unit = a.iter().all(|v| (0.0..=1.0).contains(v));
    if unit {
        CanonicalArray::U8(a.mapv(|v| (v * 255.0) as u8))
    } else {
        CanonicalArray::U8(a.mapv(|v| v.clamp(0.0, 255.0) as u8))
    }
}

/// Normalised data for one role: flat values plus the logical shape
#[derive(Clone, Debug, PartialEq)]
pub struct RoleArray {
    /// Flat data in the role's element type
    pub data: CanonicalArray,
    /// Logical shape, ending with the role width when it is above 1
    pub shape: Vec<usize>,
    /// Number of components per vertex
    pub width: usize,
}

impl RoleArray {
    /// Dims implied by a shape with at least two logical axes, ordered W, H, D
    pub fn implied_dims(&self) -> Option<Dims> {
        let axes: Vec<usize> = if self.width > 1 {
            self.shape[..self.shape.len().saturating_sub(1)].to_vec()
        } else {
            self.shape.clone()
        };
        let axes: Vec<usize> = axes.into_iter().filter(|&d| d > 1).collect();
        if axes.len() < 2 || axes.len() > 3 {
            return None;
        }
        let reversed: Vec<usize> = axes.iter().rev().copied().collect();
        Some(Dims::from_axes(&reversed))
    }

    /// Number of vertices described
    pub fn count(&self) -> usize {
        self.data.len() / self.width.max(1)
    }

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        self.data.as_f32().and_then(|a| a.as_slice())
    }

    pub fn as_u32_slice(&self) -> Option<&[u32]> {
        self.data.as_u32().and_then(|a| a.as_slice())
    }

    pub fn as_u8_slice(&self) -> Option<&[u8]> {
        self.data.as_u8().and_then(|a| a.as_slice())
    }
}

/// Normalise `data` for the array addressed by `label`
pub fn normalize_for(data: NumericArray, label: &DataLabel) -> ConvertResult<RoleArray> {
    let width = label.width();
    let target = label.element_type();
    if width > 1 && target == ElementType::F32 {
        return vectors(data, width, &label.to_string());
    }

    let canonical = normalize(data, Some(target))?;
    let shape = canonical.shape().to_vec();
    let len = canonical.len();
    if width > 1 {
        if len % width != 0 {
            return Err(ConvertError::ShapeMismatch {
                shape,
                role: label.to_string(),
                width,
            });
        }
        let shape = if shape.last() == Some(&width) && shape.len() > 1 {
            shape
        } else {
            vec![len / width, width]
        };
        let flat = canonical.into_shape(&[len])?;
        return Ok(RoleArray {
            data: flat,
            shape,
            width,
        });
    }
    let flat = canonical.into_shape(&[len])?;
    Ok(RoleArray {
        data: flat,
        shape,
        width,
    })
}

/// Normalise vector data to rows of `width` components
///
/// - last dim equal to `width` is used as is
/// - last dim 2 with a 3D target gains a zero third component
/// - last dim above 3 with first dim equal to 3 (or 2) is column-major input
///   and is re-stacked
pub fn vectors(data: NumericArray, width: usize, role: &str) -> ConvertResult<RoleArray> {
    let array = match normalize(data, Some(ElementType::F32))? {
        CanonicalArray::F32(a) => a,
        other => {
            return Err(ConvertError::IncompatibleDtype {
                from: other.element_type().to_string(),
                to: "f32".to_string(),
            })
        }
    };
    let mismatch = |shape: &[usize]| ConvertError::ShapeMismatch {
        shape: shape.to_vec(),
        role: role.to_string(),
        width,
    };

    let shape = array.shape().to_vec();
    if array.is_empty() {
        return Ok(RoleArray {
            data: CanonicalArray::F32(ArrayD::zeros(IxDyn(&[0]))),
            shape: vec![0, width],
            width,
        });
    }

    let (rows, logical): (Array2<f32>, Vec<usize>) = match shape.as_slice() {
        [len] => {
            if len % width != 0 {
                return Err(mismatch(&shape));
            }
            let rows: Array2<f32> = array
                .into_shape_with_order(IxDyn(&[len / width, width]))
                .map_err(|_| mismatch(&shape))?
                .into_dimensionality()
                .map_err(|_| mismatch(&shape))?;
            (rows, vec![len / width, width])
        }
        [.., last] if *last == width => {
            let count = array.len() / width;
            let rows: Array2<f32> = standard(array)
                .into_shape_with_order(IxDyn(&[count, width]))
                .map_err(|_| mismatch(&shape))?
                .into_dimensionality()
                .map_err(|_| mismatch(&shape))?;
            (rows, shape.clone())
        }
        [.., 2] if width == 3 => {
            let count = array.len() / 2;
            let pairs: Array2<f32> = standard(array)
                .into_shape_with_order(IxDyn(&[count, 2]))
                .map_err(|_| mismatch(&shape))?
                .into_dimensionality()
                .map_err(|_| mismatch(&shape))?;
            let mut logical = shape.clone();
            if let Some(last) = logical.last_mut() {
                *last = 3;
            }
            (pad_to_three(&pairs), logical)
        }
        [first, rest @ ..]
            if rest.last().is_some_and(|&l| l > 3)
                && (*first == width || (width == 3 && *first == 2)) =>
        {
            // Column-major: components along the first axis
            let comps = *first;
            let count = array.len() / comps;
            let moved = standard(array)
                .into_shape_with_order(IxDyn(&[comps, count]))
                .map_err(|_| mismatch(&shape))?;
            let stacked: Array2<f32> = moved
                .into_dimensionality::<ndarray::Ix2>()
                .map_err(|_| mismatch(&shape))?
                .reversed_axes()
                .as_standard_layout()
                .into_owned();
            let rows = if comps == width {
                stacked
            } else {
                pad_to_three(&stacked)
            };
            let mut logical: Vec<usize> = rest.to_vec();
            logical.push(width);
            (rows, logical)
        }
        _ => return Err(mismatch(&shape)),
    };

    let count = rows.len_of(Axis(0));
    let flat = rows
        .into_shape_with_order(IxDyn(&[count * width]))
        .map_err(|_| mismatch(&shape))?;
    Ok(RoleArray {
        data: CanonicalArray::F32(flat),
        shape: logical,
        width,
    })
}

fn pad_to_three(pairs: &Array2<f32>) -> Array2<f32> {
    let count = pairs.len_of(Axis(0));
    let mut out = Array2::<f32>::zeros((count, 3));
    for (mut row, pair) in out.rows_mut().into_iter().zip(pairs.rows()) {
        row[0] = pair[0];
        row[1] = pair[1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataRole;
    use serde_json::json;

    #[test]
    fn test_f64_demoted() {
        let out = normalize(NumericArray::from(vec![1.5f64, 2.5]), None).unwrap();
        assert_eq!(out.element_type(), ElementType::F32);
        assert_eq!(out.as_f32().unwrap().as_slice().unwrap(), &[1.5f32, 2.5]);
    }

    #[test]
    fn test_u8_scaling() {
        let out =
            normalize(NumericArray::from(vec![0.0f32, 0.5, 1.0]), Some(ElementType::U8)).unwrap();
        assert_eq!(out.as_u8().unwrap().as_slice().unwrap(), &[0u8, 127, 255]);

        let out = normalize(
            NumericArray::from(vec![0.0f32, 12.0, 300.0]),
            Some(ElementType::U8),
        )
        .unwrap();
        assert_eq!(out.as_u8().unwrap().as_slice().unwrap(), &[0u8, 12, 255]);
    }

    #[test]
    fn test_masked_values() {
        let data = NumericArray::from_json(&json!([1.0, null, 3.0])).unwrap();
        assert!(matches!(data, NumericArray::Masked { .. }));
        let out = normalize(data, None).unwrap();
        let values = out.as_f32().unwrap();
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.0);

        let data = NumericArray::from_json(&json!([1, null])).unwrap();
        assert!(normalize(data, Some(ElementType::U32)).is_err());
    }

    #[test]
    fn test_unmask_counts_missing() {
        let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0]).unwrap();
        let clear = ArrayD::from_elem(IxDyn(&[3]), false);
        let (plain, missing) = unmask(data.clone(), &clear, Some(ElementType::U32)).unwrap();
        assert_eq!(missing, 0);
        assert_eq!(plain, NumericArray::F64(data.clone()));

        let mut mask = clear;
        mask[[1]] = true;
        assert_eq!(unmask(data.clone(), &mask, None).unwrap().1, 1);
        assert!(unmask(data, &mask, Some(ElementType::U8)).is_err());

        // A mask with nothing set converts like plain data
        let masked = NumericArray::Masked {
            data: ArrayD::from_shape_vec(IxDyn(&[2]), vec![4.0, 5.0]).unwrap(),
            mask: ArrayD::from_elem(IxDyn(&[2]), false),
        };
        let out = normalize(masked, Some(ElementType::U32)).unwrap();
        assert_eq!(out.as_u32().unwrap().as_slice().unwrap(), &[4, 5]);
    }

    #[test]
    fn test_from_json_nested() {
        let data = NumericArray::from_json(&json!([[0, 1], [1, 0]])).unwrap();
        assert_eq!(data.shape(), &[2, 2]);
        assert!(matches!(data, NumericArray::I64(_)));

        let err = NumericArray::from_json(&json!([[0, 1], [1]])).unwrap_err();
        assert!(matches!(err, ConvertError::Ragged { .. }));

        let err = NumericArray::from_json(&json!(["a"])).unwrap_err();
        assert!(matches!(err, ConvertError::NotNumeric { .. }));
    }

    #[test]
    fn test_vectors_pairs_padded() {
        let out =
            vectors(NumericArray::from(vec![[0.0f64, 1.0], [1.0, 0.0]]), 3, "vertices").unwrap();
        assert_eq!(out.shape, vec![2, 3]);
        assert_eq!(out.as_f32_slice().unwrap(), &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vectors_column_major() {
        // xs, ys, zs along the first axis
        let cols = vec![
            [0.0f32, 1.0, 2.0, 3.0],
            [10.0, 11.0, 12.0, 13.0],
            [20.0, 21.0, 22.0, 23.0],
        ];
        let out = vectors(NumericArray::from(cols), 3, "vertices").unwrap();
        assert_eq!(out.shape, vec![4, 3]);
        assert_eq!(&out.as_f32_slice().unwrap()[..6], &[0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
    }

    #[test]
    fn test_vectors_flat_and_mismatch() {
        let out = vectors(NumericArray::from(vec![1.0f32; 6]), 3, "vertices").unwrap();
        assert_eq!(out.count(), 2);
        assert!(vectors(NumericArray::from(vec![1.0f32; 5]), 3, "vertices").is_err());
    }

    #[test]
    fn test_vectors_empty() {
        let out = vectors(NumericArray::from(Vec::<f32>::new()), 3, "vertices").unwrap();
        assert_eq!(out.count(), 0);
        assert_eq!(out.shape, vec![0, 3]);
    }

    #[test]
    fn test_implied_dims() {
        let values = NumericArray::from(ndarray::Array2::<f32>::zeros((4, 3)));
        let out = normalize_for(values, &DataLabel::values("v")).unwrap();
        assert_eq!(out.implied_dims(), Some(Dims::new(3, 4, 0)));

        let verts = NumericArray::from(ndarray::Array3::<f32>::zeros((2, 5, 3)));
        let out = normalize_for(verts, &DataLabel::Role(DataRole::Vertices)).unwrap();
        assert_eq!(out.implied_dims(), Some(Dims::new(5, 2, 0)));

        let flat =
            normalize_for(NumericArray::from(vec![1.0f32; 9]), &DataLabel::values("v")).unwrap();
        assert_eq!(flat.implied_dims(), None);
    }

    #[test]
    fn test_indices_to_u32() {
        let indices = DataLabel::Role(DataRole::Indices);
        let out = normalize_for(NumericArray::from(vec![0i32, 1, 2]), &indices).unwrap();
        assert_eq!(out.as_u32_slice().unwrap(), &[0, 1, 2]);
        assert!(normalize_for(NumericArray::from(vec![-1i32]), &indices).is_err());
    }
}
