//! Shared vocabulary types: renderers, data roles, dims and time-step scopes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Geometry types an object can render as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    Labels,
    Points,
    Grid,
    Triangles,
    Vectors,
    Tracers,
    Lines,
    Shapes,
    Volume,
    Screen,
}

impl Renderer {
    pub const ALL: [Renderer; 10] = [
        Renderer::Labels,
        Renderer::Points,
        Renderer::Grid,
        Renderer::Triangles,
        Renderer::Vectors,
        Renderer::Tracers,
        Renderer::Lines,
        Renderer::Shapes,
        Renderer::Volume,
        Renderer::Screen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Renderer::Labels => "labels",
            Renderer::Points => "points",
            Renderer::Grid => "grid",
            Renderer::Triangles => "triangles",
            Renderer::Vectors => "vectors",
            Renderer::Tracers => "tracers",
            Renderer::Lines => "lines",
            Renderer::Shapes => "shapes",
            Renderer::Volume => "volume",
            Renderer::Screen => "screen",
        }
    }
}

impl fmt::Display for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Renderer {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Renderer::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ValidationError::InvalidRenderer {
                name: s.to_string(),
            })
    }
}

/// A renderer with an optional subtype, written `type` or `type:subtype`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RendererType {
    pub base: Renderer,
    pub subtype: Option<String>,
}

impl RendererType {
    pub fn new(base: Renderer) -> Self {
        Self {
            base,
            subtype: None,
        }
    }
}

impl From<Renderer> for RendererType {
    fn from(base: Renderer) -> Self {
        Self::new(base)
    }
}

impl FromStr for RendererType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((base, sub)) if !sub.trim().is_empty() => Ok(Self {
                base: base.parse().map_err(|_| ValidationError::InvalidRenderer {
                    name: s.to_string(),
                })?,
                subtype: Some(sub.trim().to_string()),
            }),
            Some(_) => Err(ValidationError::InvalidRenderer {
                name: s.to_string(),
            }),
            None => Ok(Self::new(s.parse()?)),
        }
    }
}

impl fmt::Display for RendererType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtype {
            Some(sub) => write!(f, "{}:{}", self.base, sub),
            None => write!(f, "{}", self.base),
        }
    }
}

/// Canonical element types stored by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    F32,
    U32,
    U8,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementType::F32 => "f32",
            ElementType::U32 => "u32",
            ElementType::U8 => "u8",
        })
    }
}

/// Known kinds of per-vertex data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataRole {
    Vertices,
    Normals,
    Vectors,
    TexCoords,
    Indices,
    Colours,
    Rgb,
    Luminance,
    Values,
}

impl DataRole {
    pub const ALL: [DataRole; 9] = [
        DataRole::Vertices,
        DataRole::Normals,
        DataRole::Vectors,
        DataRole::TexCoords,
        DataRole::Indices,
        DataRole::Colours,
        DataRole::Rgb,
        DataRole::Luminance,
        DataRole::Values,
    ];

    /// Element type the backend stores for this role
    pub fn element_type(&self) -> ElementType {
        match self {
            DataRole::Vertices
            | DataRole::Normals
            | DataRole::Vectors
            | DataRole::TexCoords
            | DataRole::Values => ElementType::F32,
            DataRole::Indices | DataRole::Colours => ElementType::U32,
            DataRole::Rgb | DataRole::Luminance => ElementType::U8,
        }
    }

    /// Number of components per vertex
    pub fn width(&self) -> usize {
        match self {
            DataRole::Vertices | DataRole::Normals | DataRole::Vectors | DataRole::Rgb => 3,
            DataRole::TexCoords => 2,
            DataRole::Indices | DataRole::Colours | DataRole::Luminance | DataRole::Values => 1,
        }
    }

    /// Roles that hold spatial vectors and take part in axis swaps
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            DataRole::Vertices | DataRole::Normals | DataRole::Vectors
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataRole::Vertices => "vertices",
            DataRole::Normals => "normals",
            DataRole::Vectors => "vectors",
            DataRole::TexCoords => "texcoords",
            DataRole::Indices => "indices",
            DataRole::Colours => "colours",
            DataRole::Rgb => "rgb",
            DataRole::Luminance => "luminance",
            DataRole::Values => "values",
        }
    }
}

impl fmt::Display for DataRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let role = match key.as_str() {
            "vertices" | "vertex" | "verts" => DataRole::Vertices,
            "normals" | "normal" => DataRole::Normals,
            "vectors" | "vector" => DataRole::Vectors,
            "texcoords" | "texcoord" => DataRole::TexCoords,
            "indices" | "index" => DataRole::Indices,
            "colours" | "colour" | "colors" | "color" => DataRole::Colours,
            "rgb" => DataRole::Rgb,
            "luminance" => DataRole::Luminance,
            "values" | "value" => DataRole::Values,
            _ => {
                return Err(ValidationError::UnknownRole {
                    role: s.to_string(),
                })
            }
        };
        Ok(role)
    }
}

/// Addresses an array on an element: a known role or a labelled value array
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataLabel {
    Role(DataRole),
    Values(String),
}

impl DataLabel {
    pub const DEFAULT_VALUES: &'static str = "default";

    pub fn values(label: impl Into<String>) -> Self {
        DataLabel::Values(label.into())
    }

    /// The role this label is stored under
    pub fn role(&self) -> DataRole {
        match self {
            DataLabel::Role(role) => *role,
            DataLabel::Values(_) => DataRole::Values,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.role().element_type()
    }

    pub fn width(&self) -> usize {
        self.role().width()
    }

    /// Parse a role name, `values`, `values:<label>` or a bare value label
    pub fn parse(s: &str) -> Self {
        if let Some(label) = s.strip_prefix("values:") {
            return DataLabel::Values(label.to_string());
        }
        match s.parse::<DataRole>() {
            Ok(DataRole::Values) => DataLabel::Values(Self::DEFAULT_VALUES.to_string()),
            Ok(role) => DataLabel::Role(role),
            Err(_) => DataLabel::Values(s.to_string()),
        }
    }
}

impl From<DataRole> for DataLabel {
    fn from(role: DataRole) -> Self {
        match role {
            DataRole::Values => DataLabel::Values(Self::DEFAULT_VALUES.to_string()),
            other => DataLabel::Role(other),
        }
    }
}

impl From<&str> for DataLabel {
    fn from(s: &str) -> Self {
        DataLabel::parse(s)
    }
}

impl fmt::Display for DataLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLabel::Role(role) => write!(f, "{}", role),
            DataLabel::Values(label) => f.write_str(label),
        }
    }
}

/// Logical W×H×D of an element; zero means unset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims(pub [u32; 3]);

impl Dims {
    pub fn new(w: u32, h: u32, d: u32) -> Self {
        Self([w, h, d])
    }

    pub fn width(&self) -> u32 {
        self.0[0]
    }

    pub fn height(&self) -> u32 {
        self.0[1]
    }

    pub fn depth(&self) -> u32 {
        self.0[2]
    }

    pub fn is_set(&self) -> bool {
        self.0.iter().any(|&d| d > 0)
    }

    /// Product of the set dimensions
    pub fn product(&self) -> usize {
        self.0
            .iter()
            .filter(|&&d| d > 0)
            .map(|&d| d as usize)
            .product()
    }

    /// Build from logical axes ordered W, H, D
    pub fn from_axes(axes: &[usize]) -> Self {
        let mut dims = [0u32; 3];
        for (slot, &axis) in dims.iter_mut().zip(axes) {
            *slot = axis as u32;
        }
        Self(dims)
    }

    /// Accepts a scalar, `[w,h]` or `[w,h,d]`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(|w| Self::new(w as u32, 0, 0)),
            Value::Array(items) if items.len() <= 3 => {
                let mut dims = [0u32; 3];
                for (slot, item) in dims.iter_mut().zip(items) {
                    *slot = item.as_f64()?.max(0.0) as u32;
                }
                Some(Self(dims))
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.0.to_vec())
    }
}

impl From<(u32, u32)> for Dims {
    fn from((w, h): (u32, u32)) -> Self {
        Self::new(w, h, 0)
    }
}

impl From<(u32, u32, u32)> for Dims {
    fn from((w, h, d): (u32, u32, u32)) -> Self {
        Self::new(w, h, d)
    }
}

/// Which time steps a geometry query covers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepScope {
    /// Only the current step
    Current,
    /// The current step plus fixed data
    #[default]
    CurrentWithFixed,
    /// Only fixed data (step -1)
    Fixed,
    /// A specific step
    At(i32),
    /// Every step, fixed data included
    All,
}

impl StepScope {
    /// `""` is current plus fixed, `"-1"` is fixed, `"all"` is every step,
    /// a number is that step
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        match s {
            "" => Ok(StepScope::CurrentWithFixed),
            "current" => Ok(StepScope::Current),
            "-1" | "fixed" => Ok(StepScope::Fixed),
            "all" => Ok(StepScope::All),
            _ => s
                .parse::<i32>()
                .map(StepScope::At)
                .map_err(|_| ValidationError::InvalidArgument {
                    message: format!("invalid timestep '{}'", s),
                }),
        }
    }

    /// Whether data stored at `step` is visible given the session's current step
    pub fn includes(&self, step: i32, current: i32) -> bool {
        match self {
            StepScope::Current => step == current,
            StepScope::CurrentWithFixed => step == current || step == -1,
            StepScope::Fixed => step == -1,
            StepScope::At(n) => step == *n,
            StepScope::All => true,
        }
    }
}
