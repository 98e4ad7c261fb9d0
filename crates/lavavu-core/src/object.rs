//! Drawing objects
//!
//! An [`Object`] is a named handle to one backend drawing object. Property
//! reads pull fresh state, writes go through the backend property parser.
//! Data loaders normalise caller arrays to the role's element type and load
//! them into the object's current element; a shape with two or three
//! logical axes sets the object's `dims` unless they are already declared.

use ndarray::{Array2, Array3};
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{ObjectId, TextureFilter, TextureSpec};
use crate::bridge::RenderMethod;
use crate::colour::Colour;
use crate::colourmap::{ColourMap, ColourMapExport, MapOptions};
use crate::convert::{self, normalize, normalize_for, CanonicalArray, NumericArray, RoleArray};
use crate::error::{LavaVuResult, ValidationError};
use crate::filter::{filters_from_json, Filter, FilterRange};
use crate::geometry::Geometry;
use crate::palette::{ColourMapData, ColourStop, Palette};
use crate::property::{assignment, PropertyBag, PropertyValue};
use crate::session::{into_map, SessionCore, SessionRef};
use crate::types::{DataLabel, DataRole, Dims, ElementType, Renderer, StepScope};

/// Colour data accepted by [`Object::colours`]
#[derive(Clone, Debug, PartialEq)]
pub enum ColourInput {
    /// Packed `r | g<<8 | b<<16 | a<<24`
    Packed(Vec<u32>),
    /// Colour strings, parsed by the backend
    Strings(Vec<String>),
    /// Four bytes per vertex
    Bytes(Vec<u8>),
    /// RGB triples, bytes or fractions in [0,1]; alpha is opaque
    Rgb(NumericArray),
    Json(Value),
}

impl From<&str> for ColourInput {
    fn from(text: &str) -> Self {
        ColourInput::Strings(text.split_whitespace().map(str::to_string).collect())
    }
}

impl From<Vec<&str>> for ColourInput {
    fn from(v: Vec<&str>) -> Self {
        ColourInput::Strings(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ColourInput {
    fn from(v: Vec<String>) -> Self {
        ColourInput::Strings(v)
    }
}

impl From<Vec<u32>> for ColourInput {
    fn from(v: Vec<u32>) -> Self {
        ColourInput::Packed(v)
    }
}

impl From<Vec<u8>> for ColourInput {
    fn from(v: Vec<u8>) -> Self {
        ColourInput::Bytes(v)
    }
}

impl From<Vec<[u8; 3]>> for ColourInput {
    fn from(v: Vec<[u8; 3]>) -> Self {
        ColourInput::Rgb(v.into())
    }
}

impl From<Vec<[f32; 3]>> for ColourInput {
    fn from(v: Vec<[f32; 3]>) -> Self {
        ColourInput::Rgb(v.into())
    }
}

impl From<Value> for ColourInput {
    fn from(v: Value) -> Self {
        ColourInput::Json(v)
    }
}

/// Texture data for [`Object::texture`]
#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    /// Remove the texture
    Clear,
    /// Image file loaded by the backend
    Path(PathBuf),
    /// Pixels shaped `(height, width, channels)`
    Bytes(Array3<u8>),
    /// Packed RGBA pixels shaped `(height, width)`
    Packed(Array2<u32>),
}

impl From<&str> for TextureSource {
    fn from(path: &str) -> Self {
        TextureSource::Path(PathBuf::from(path))
    }
}

impl From<&Path> for TextureSource {
    fn from(path: &Path) -> Self {
        TextureSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for TextureSource {
    fn from(path: PathBuf) -> Self {
        TextureSource::Path(path)
    }
}

impl From<Array3<u8>> for TextureSource {
    fn from(pixels: Array3<u8>) -> Self {
        TextureSource::Bytes(pixels)
    }
}

impl From<Array2<u32>> for TextureSource {
    fn from(pixels: Array2<u32>) -> Self {
        TextureSource::Packed(pixels)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureOptions {
    pub flip: bool,
    pub filter: TextureFilter,
    /// Pixels are BGR(A) ordered
    pub bgr: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            flip: true,
            filter: TextureFilter::Mipmap,
            bgr: false,
        }
    }
}

/// Opacity ramp for [`Object::opacitymap`]
#[derive(Clone, Debug, PartialEq)]
pub enum OpacityData {
    /// Evenly spaced opacities
    Values(Vec<f64>),
    /// `(position, opacity)` pairs
    Stops(Vec<(f64, f64)>),
}

impl From<Vec<f64>> for OpacityData {
    fn from(v: Vec<f64>) -> Self {
        OpacityData::Values(v)
    }
}

impl From<&[f64]> for OpacityData {
    fn from(v: &[f64]) -> Self {
        OpacityData::Values(v.to_vec())
    }
}

impl From<Vec<(f64, f64)>> for OpacityData {
    fn from(v: Vec<(f64, f64)>) -> Self {
        OpacityData::Stops(v)
    }
}

impl OpacityData {
    /// Black stops with alpha from each opacity, ends pinned to 0 and 1
    pub fn palette(&self) -> Palette {
        let black =
            |alpha: f64| Colour::from_fractions(0.0, 0.0, 0.0, alpha.clamp(0.0, 1.0) as f32);
        let stops: Vec<ColourStop> = match self {
            OpacityData::Values(values) => {
                let last = values.len().saturating_sub(1).max(1) as f64;
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &a)| ColourStop::new(i as f64 / last, black(a)))
                    .collect()
            }
            OpacityData::Stops(stops) => stops
                .iter()
                .map(|&(p, a)| ColourStop::new(p, black(a)))
                .collect(),
        };
        let mut palette = Palette::new(stops);
        palette.clamp_endpoints();
        palette
    }
}

/// A labelled value array on an object
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub label: String,
    /// `(minimum, maximum)` over the current step
    pub range: Option<(f64, f64)>,
}

/// Handle to a drawing object
#[derive(Clone, Debug)]
pub struct Object {
    session: SessionRef,
    name: String,
}

impl Object {
    pub(crate) fn new(session: SessionRef, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> LavaVuResult<Arc<SessionCore>> {
        self.session.upgrade(&self.name)
    }

    fn target(&self) -> LavaVuResult<(Arc<SessionCore>, ObjectId)> {
        let core = self.core()?;
        let id = core.object_id(&self.name)?;
        Ok((core, id))
    }

    pub fn id(&self) -> LavaVuResult<ObjectId> {
        Ok(self.target()?.1)
    }

    // Properties

    pub fn get(&self, name: &str) -> LavaVuResult<PropertyValue> {
        let core = self.core()?;
        let props = core.object_props(&self.name)?;
        Ok(core.schema().resolve(name, &[Some(&props)])?)
    }

    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        core.schema().check(name)?;
        let line = assignment(name, &value.into());
        core.with_backend(|b| b.parse_property(&line, Some(id)))??;
        core.refresh()
    }

    /// Apply several properties; data keys are loaded as in `Session::add`
    pub fn update(&self, props: Value) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        core.setup_object(Some(id), into_map(props)?)?;
        Ok(())
    }

    pub fn properties(&self) -> LavaVuResult<PropertyBag> {
        let core = self.core()?;
        let props = core.object_props(&self.name)?;
        Ok(PropertyBag::from_map(core.schema().clone(), &props))
    }

    // Data loading

    fn load(&self, data: NumericArray, label: DataLabel) -> LavaVuResult<()> {
        let array = normalize_for(data, &label)?;
        self.load_role(&array, &label)
    }

    fn load_role(&self, array: &RoleArray, label: &DataLabel) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        let props = core.object_props(&self.name)?;
        let declared = props.get("dims").and_then(Dims::from_json).filter(Dims::is_set);
        let implied = array.implied_dims();
        let dims = match (declared, implied) {
            (Some(declared), Some(implied)) if declared != implied => {
                warn!(
                    object = %self.name,
                    ?declared,
                    ?implied,
                    "data shape does not match declared dims"
                );
                declared
            }
            (Some(declared), _) => declared,
            (None, Some(implied)) => {
                let line = assignment("dims", &PropertyValue::Json(implied.to_json()));
                core.with_backend(|b| b.parse_property(&line, Some(id)))??;
                implied
            }
            (None, None) => Dims::default(),
        };
        core.with_backend(|b| match label.element_type() {
            ElementType::F32 => {
                b.array_f32(id, array.as_f32_slice().unwrap_or_default(), label, dims)
            }
            ElementType::U32 => {
                b.array_u32(id, array.as_u32_slice().unwrap_or_default(), label, dims)
            }
            ElementType::U8 => b.array_u8(id, array.as_u8_slice().unwrap_or_default(), label, dims),
        })??;
        debug!(object = %self.name, %label, count = array.count(), "loaded");
        core.refresh()
    }

    /// Load one data key given as JSON, as used by `Session::add`
    pub(crate) fn load_json(&self, key: &str, value: &Value) -> LavaVuResult<()> {
        match key {
            "colours" => self.colours(value.clone()),
            "labels" => {
                let labels: Vec<String> = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    other => vec![other.to_string()],
                };
                self.labels(&labels)
            }
            "indices" => self.indices(NumericArray::from_json(value)?, 0),
            "values" => self.values(NumericArray::from_json(value)?, None),
            "vectors" => self.vectors(NumericArray::from_json(value)?, None),
            "normals" => self.normals(NumericArray::from_json(value)?),
            _ => self.vertices(NumericArray::from_json(value)?),
        }
    }

    pub fn vertices(&self, data: impl Into<NumericArray>) -> LavaVuResult<()> {
        self.load(data.into(), DataRole::Vertices.into())
    }

    pub fn normals(&self, data: impl Into<NumericArray>) -> LavaVuResult<()> {
        self.load(data.into(), DataRole::Normals.into())
    }

    /// Load vectors, optionally storing their lengths as a value array
    ///
    /// `magnitude` names the value label; an empty name means `"magnitude"`.
    pub fn vectors(
        &self,
        data: impl Into<NumericArray>,
        magnitude: Option<&str>,
    ) -> LavaVuResult<()> {
        let label = DataLabel::from(DataRole::Vectors);
        let array = convert::vectors(data.into(), 3, "vectors")?;
        self.load_role(&array, &label)?;
        if let Some(name) = magnitude {
            let name = if name.is_empty() { "magnitude" } else { name };
            let lengths: Vec<f32> = array
                .as_f32_slice()
                .unwrap_or_default()
                .chunks_exact(3)
                .map(|v| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt())
                .collect();
            self.values(lengths, Some(name))?;
        }
        Ok(())
    }

    pub fn texcoords(&self, data: impl Into<NumericArray>) -> LavaVuResult<()> {
        self.load(data.into(), DataRole::TexCoords.into())
    }

    /// Load a scalar field under `label`, `"default"` when `None`
    pub fn values(&self, data: impl Into<NumericArray>, label: Option<&str>) -> LavaVuResult<()> {
        let label = DataLabel::values(
            label
                .filter(|l| !l.is_empty())
                .unwrap_or(DataLabel::DEFAULT_VALUES),
        );
        self.load(data.into(), label)
    }

    pub fn colours(&self, data: impl Into<ColourInput>) -> LavaVuResult<()> {
        let label = DataLabel::from(DataRole::Colours);
        let packed: Vec<u32> = match data.into() {
            ColourInput::Packed(packed) => packed,
            ColourInput::Strings(colours) => {
                let (core, id) = self.target()?;
                core.with_backend(|b| b.load_colours(id, &colours))??;
                return core.refresh();
            }
            ColourInput::Bytes(bytes) => {
                if bytes.len() % 4 != 0 {
                    return Err(ValidationError::InvalidArgument {
                        message: format!("{} colour bytes is not a multiple of 4", bytes.len()),
                    }
                    .into());
                }
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            }
            ColourInput::Rgb(data) => match normalize(data, Some(ElementType::U8))? {
                CanonicalArray::U8(bytes) => bytes
                    .iter()
                    .copied()
                    .collect::<Vec<u8>>()
                    .chunks_exact(3)
                    .map(|c| Colour::new(c[0], c[1], c[2], 255).to_u32())
                    .collect(),
                other => {
                    return Err(ValidationError::InvalidArgument {
                        message: format!("rgb colours must be bytes, got {}", other.element_type()),
                    }
                    .into())
                }
            },
            ColourInput::Json(value) => {
                return match &value {
                    Value::String(text) => self.colours(text.as_str()),
                    Value::Array(items) if items.iter().all(Value::is_string) => self.colours(
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect::<Vec<String>>(),
                    ),
                    _ => {
                        let array = NumericArray::from_json(&value)?;
                        match array.shape().last() {
                            Some(3) if array.shape().len() > 1 => {
                                self.colours(ColourInput::Rgb(array))
                            }
                            Some(4) if array.shape().len() > 1 => {
                                let bytes = normalize(array, Some(ElementType::U8))?;
                                let bytes: Vec<u8> = bytes
                                    .as_u8()
                                    .map(|b| b.iter().copied().collect())
                                    .unwrap_or_default();
                                self.colours(bytes)
                            }
                            _ => self.load(array, label),
                        }
                    }
                };
            }
        };
        self.load(packed.into(), label)
    }

    /// Load indices, subtracting `offset` (1 for one-based input)
    pub fn indices(&self, data: impl Into<NumericArray>, offset: u32) -> LavaVuResult<()> {
        let label = DataLabel::from(DataRole::Indices);
        let array = normalize_for(data.into(), &label)?;
        let mut indices = array.as_u32_slice().unwrap_or_default().to_vec();
        if offset > 0 {
            for index in &mut indices {
                *index = index.checked_sub(offset).ok_or_else(|| ValidationError::InvalidArgument {
                    message: format!("index {} is below offset {}", index, offset),
                })?;
            }
        }
        self.load(indices.into(), label)
    }

    pub fn rgb(&self, data: impl Into<NumericArray>) -> LavaVuResult<()> {
        self.load(data.into(), DataRole::Rgb.into())
    }

    pub fn luminance(&self, data: impl Into<NumericArray>) -> LavaVuResult<()> {
        self.load(data.into(), DataRole::Luminance.into())
    }

    /// One text label per vertex
    pub fn labels<S: AsRef<str>>(&self, labels: &[S]) -> LavaVuResult<()> {
        let labels: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
        let (core, id) = self.target()?;
        core.with_backend(|b| b.load_labels(id, &labels))??;
        core.refresh()
    }

    pub fn texture(
        &self,
        source: impl Into<TextureSource>,
        options: TextureOptions,
    ) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        let spec = |width: usize, height: usize, channels: usize| TextureSpec {
            width: width as u32,
            height: height as u32,
            channels: channels as u32,
            flip: options.flip,
            filter: options.filter,
            bgr: options.bgr,
        };
        match source.into() {
            TextureSource::Clear => {
                core.routed(RenderMethod::ClearTexture, move |b| b.clear_texture(id))??;
            }
            TextureSource::Path(path) => core.with_backend(|b| b.set_texture(id, &path))??,
            TextureSource::Bytes(pixels) => {
                let (height, width, channels) = pixels.dim();
                let spec = spec(width, height, channels);
                let pixels = pixels.as_standard_layout();
                core.with_backend(|b| {
                    b.texture_u8(id, pixels.as_slice().unwrap_or_default(), &spec)
                })??;
            }
            TextureSource::Packed(pixels) => {
                let (height, width) = pixels.dim();
                let spec = spec(width, height, 4);
                let pixels = pixels.as_standard_layout();
                core.with_backend(|b| {
                    b.texture_u32(id, pixels.as_slice().unwrap_or_default(), &spec)
                })??;
            }
        }
        core.refresh()
    }

    /// Close the current element so the next load starts a new one
    pub fn append(&self) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        core.with_backend(|b| b.append_to_object(id))??;
        Ok(())
    }

    /// Load triangle vertices, subdividing each triangle `split` times when above 1
    pub fn triangles(&self, data: impl Into<NumericArray>, split: u32) -> LavaVuResult<()> {
        if split <= 1 {
            return self.vertices(data);
        }
        let label = DataLabel::from(DataRole::Vertices);
        let array = normalize_for(data.into(), &label)?;
        let (core, id) = self.target()?;
        core.with_backend(|b| {
            b.load_triangles(id, array.as_f32_slice().unwrap_or_default(), split)
        })??;
        core.refresh()
    }

    // Filters

    pub fn filters(&self) -> LavaVuResult<Vec<Filter>> {
        let props = self.core()?.object_props(&self.name)?;
        Ok(props.get("filters").map(filters_from_json).unwrap_or_default())
    }

    fn store_filters(&self, filters: &[Filter]) -> LavaVuResult<()> {
        let list = Value::Array(filters.iter().map(Filter::to_json).collect());
        self.set("filters", PropertyValue::Json(list))
    }

    fn data_range(&self, label: &str) -> LavaVuResult<(f64, f64)> {
        let (core, id) = self.target()?;
        Ok(core.with_backend(|b| b.value_range(id, label))?.unwrap_or((0.0, 0.0)))
    }

    /// Add a filter on value label `label`; returns its index
    ///
    /// A tuple range excludes its endpoints, an array range or single value
    /// includes them, and `FilterRange::Full` spans the data. `map` gives
    /// the range as fractions of the data range.
    pub fn filter(
        &self,
        label: &str,
        range: impl Into<FilterRange>,
        out: bool,
        map: bool,
    ) -> LavaVuResult<usize> {
        let range = range.into();
        let full = if range == FilterRange::Full && !map {
            self.data_range(label)?
        } else {
            (0.0, 1.0)
        };
        let mut filters = self.filters()?;
        filters.push(Filter::new(label, range, out, map, full));
        self.store_filters(&filters)?;
        Ok(filters.len() - 1)
    }

    pub fn include(&self, label: &str, range: impl Into<FilterRange>) -> LavaVuResult<usize> {
        self.filter(label, range, false, false)
    }

    pub fn exclude(&self, label: &str, range: impl Into<FilterRange>) -> LavaVuResult<usize> {
        self.filter(label, range, true, false)
    }

    pub fn includemap(&self, label: &str, range: impl Into<FilterRange>) -> LavaVuResult<usize> {
        self.filter(label, range, false, true)
    }

    pub fn excludemap(&self, label: &str, range: impl Into<FilterRange>) -> LavaVuResult<usize> {
        self.filter(label, range, true, true)
    }

    /// Change the range of an existing filter, keeping its flags
    pub fn update_filter(&self, index: usize, range: impl Into<FilterRange>) -> LavaVuResult<()> {
        let mut filters = self.filters()?;
        let count = filters.len();
        let existing = filters
            .get(index)
            .cloned()
            .ok_or(ValidationError::InvalidFilterIndex { index, count })?;
        let full = if existing.map { (0.0, 1.0) } else { self.data_range(&existing.by)? };
        filters[index] = Filter::new(existing.by, range.into(), existing.out, existing.map, full);
        self.store_filters(&filters)
    }

    pub fn remove_filter(&self, index: usize) -> LavaVuResult<()> {
        let mut filters = self.filters()?;
        if index >= filters.len() {
            return Err(ValidationError::InvalidFilterIndex {
                index,
                count: filters.len(),
            }
            .into());
        }
        filters.remove(index);
        self.store_filters(&filters)
    }

    // Colour and opacity maps

    /// Create or update this object's own colour map from `data`
    ///
    /// Text naming a map that already exists in the session attaches that
    /// map instead.
    pub fn colourmap(&self, data: impl Into<ColourMapData>) -> LavaVuResult<ColourMap> {
        self.colourmap_with(Some(data.into()), MapOptions::default())
    }

    /// As [`Object::colourmap`]; with no data, return the attached map or
    /// create a default one
    pub fn colourmap_with(
        &self,
        data: Option<ColourMapData>,
        options: MapOptions,
    ) -> LavaVuResult<ColourMap> {
        let core = self.core()?;
        let existing = core.colourmap_names()?;
        if let Some(ColourMapData::Text(text)) = &data {
            let name = text.trim();
            if existing.iter().any(|n| n == name) {
                let map = core.colourmap_handle(name);
                self.set_colourmap(&map)?;
                return Ok(map);
            }
        }
        let map = match data {
            Some(data) => {
                core.colourmap_with(&format!("{}_colourmap", self.name), data, options)?
            }
            None => {
                let current = self.get("colourmap")?;
                match current.as_str().filter(|n| existing.iter().any(|e| e == n)) {
                    Some(name) => return Ok(core.colourmap_handle(name)),
                    None => core.colourmap_with(
                        &format!("{}_colourmap", self.name),
                        "cubehelix",
                        options,
                    )?,
                }
            }
        };
        self.set("colourmap", map.name())?;
        Ok(map)
    }

    /// Attach a map; a handle from another session is copied over by name
    pub fn set_colourmap(&self, map: &ColourMap) -> LavaVuResult<()> {
        let core = self.core()?;
        if !map.belongs_to(&core) {
            if core.colourmap_names()?.iter().any(|n| n == map.name()) {
                return Err(ValidationError::ColourMapConflict {
                    name: map.name().to_string(),
                }
                .into());
            }
            core.colourmap(map.name(), map.palette()?)?;
        }
        self.set("colourmap", map.name())
    }

    /// Build `<name>_opacitymap` from opacities and attach it
    pub fn opacitymap(&self, data: impl Into<OpacityData>) -> LavaVuResult<ColourMap> {
        let core = self.core()?;
        let map = core.colourmap(&format!("{}_opacitymap", self.name), data.into().palette())?;
        self.set("opacitymap", map.name())?;
        Ok(map)
    }

    /// Stops of the attached colour map, if any
    pub fn getcolourmap(&self, as_string: bool) -> LavaVuResult<Option<ColourMapExport>> {
        let core = self.core()?;
        match self.get("colourmap")?.as_str() {
            Some(name) if !name.is_empty() => Ok(Some(core.getcolourmap(name, as_string)?)),
            _ => Ok(None),
        }
    }

    // Surfaces

    fn surface_target(
        &self,
        suffix: &str,
        renderer: Renderer,
        isovalues: &[f64],
        convert: bool,
    ) -> LavaVuResult<(Arc<SessionCore>, ObjectId, ObjectId, Value, Object)> {
        let (core, src) = self.target()?;
        if !isovalues.is_empty() {
            self.set("isovalues", PropertyValue::Vector(isovalues.to_vec()))?;
        }
        let props = Value::Object(core.object_props(&self.name)?);
        let dst = if convert {
            self.clone()
        } else {
            core.add(&format!("{}{}", self.name, suffix), json!({"renderer": renderer.as_str()}))?
        };
        let dst_id = core.object_id(dst.name())?;
        Ok((core, src, dst_id, props, dst))
    }

    /// Contour lines over grid values; `convert` replaces this object's geometry
    pub fn contours(&self, isovalues: &[f64], labels: bool, convert: bool) -> LavaVuResult<Object> {
        let (core, src, dst, props, object) =
            self.surface_target("_contours", Renderer::Lines, isovalues, convert)?;
        core.routed(RenderMethod::Contour, move |b| b.contour(dst, src, &props, labels, convert))??;
        core.refresh()?;
        Ok(object)
    }

    /// Isosurface triangles over volume values; `convert` replaces this object's geometry
    pub fn isosurface(&self, isovalues: &[f64], convert: bool) -> LavaVuResult<Object> {
        let (core, src, dst, props, object) =
            self.surface_target("_surface", Renderer::Triangles, isovalues, convert)?;
        core.routed(RenderMethod::IsoSurface, move |b| b.iso_surface(dst, src, &props, convert))??;
        core.refresh()?;
        Ok(object)
    }

    // Axis swaps

    fn swap_axes(&self, a: usize, b: usize) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        core.with_backend(|backend| -> LavaVuResult<()> {
            for element in backend.geometry(id, StepScope::CurrentWithFixed)? {
                for role in DataRole::ALL.iter().filter(|r| r.is_spatial()) {
                    let label = DataLabel::from(*role);
                    let mut data = backend.view_f32(element.id, &label)?.to_vec();
                    if data.is_empty() {
                        continue;
                    }
                    for v in data.chunks_exact_mut(3) {
                        v.swap(a, b);
                    }
                    backend.write_f32(element.id, &label, &data)?;
                }
            }
            backend.update_bounding_box();
            Ok(())
        })??;
        core.refresh()
    }

    pub fn swapxy(&self) -> LavaVuResult<()> {
        self.swap_axes(0, 1)
    }

    pub fn swapyz(&self) -> LavaVuResult<()> {
        self.swap_axes(1, 2)
    }

    pub fn swapxz(&self) -> LavaVuResult<()> {
        self.swap_axes(0, 2)
    }

    // Housekeeping

    /// Remove one role or value label; an empty name removes all data
    pub fn cleardata(&self, name: &str) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        if name.is_empty() {
            core.with_backend(|b| b.clear_object(id))??;
        } else {
            match name.parse::<DataRole>() {
                Ok(role) => core.with_backend(|b| b.clear_data(id, role))??,
                Err(_) => core.with_backend(|b| b.clear_values(id, name))??,
            }
        }
        core.refresh()
    }

    /// Remove all geometry
    pub fn clear(&self) -> LavaVuResult<()> {
        self.cleardata("")
    }

    pub fn reload(&self) -> LavaVuResult<()> {
        let (core, id) = self.target()?;
        core.with_backend(|b| b.reload_object(id))??;
        core.refresh()
    }

    /// Make this the backend's selected object for script commands
    pub fn select(&self) -> LavaVuResult<()> {
        let core = self.core()?;
        let line = format!("select {}", self.name);
        core.routed(RenderMethod::Commands, move |b| b.parse_commands(&line))??;
        Ok(())
    }

    /// A colour bar for this object's colour map
    pub fn colourbar(&self, props: Value) -> LavaVuResult<Object> {
        self.core()?.colourbar(Some(self), props)
    }

    /// Load a file into this object
    pub fn file(&self, path: &Path) -> LavaVuResult<()> {
        self.core()?.file(path, Some(self), Value::Null)?;
        Ok(())
    }

    /// Value labels with their ranges
    pub fn datasets(&self) -> LavaVuResult<Vec<Dataset>> {
        let (core, id) = self.target()?;
        core.with_backend(|b| -> LavaVuResult<Vec<Dataset>> {
            Ok(b.object_data_labels(id)?
                .into_iter()
                .map(|label| Dataset {
                    range: b.value_range(id, &label),
                    label,
                })
                .collect())
        })?
    }

    /// Elements at the current step plus fixed data
    pub fn data(&self) -> LavaVuResult<Geometry> {
        Geometry::load(self.session.clone(), &self.name, None, StepScope::CurrentWithFixed)
    }

    /// Elements of one renderer type and/or step; `""` is current plus fixed,
    /// `"-1"` fixed only, `"all"` every step
    pub fn data_of(&self, renderer: Option<&str>, timestep: &str) -> LavaVuResult<Geometry> {
        let renderer = renderer.map(str::parse::<Renderer>).transpose()?;
        let scope = StepScope::parse(timestep)?;
        Geometry::load(self.session.clone(), &self.name, renderer, scope)
    }

    pub fn delete(&self) -> LavaVuResult<()> {
        self.core()?.delete(&self.name)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
