//! Native rendering backend interface
//!
//! Everything the scripting layer needs from a renderer goes through the
//! [`Backend`] trait: lifecycle, objects, typed data loads and zero-copy
//! reads, colour maps, scripting, state, surface extraction and image
//! output. Methods that touch the graphics context are routed by the
//! render bridge onto the render thread; see [`crate::bridge::RenderMethod`].
//!
//! Geometry views borrow the backend, so a view cannot be held across a
//! mutating call.

pub mod headless;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BackendError, BackendResult};
use crate::types::{DataLabel, DataRole, Dims, Renderer, StepScope};

pub use headless::{CommandJournal, HeadlessBackend};

/// Backend handle for a drawing object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Backend handle for one geometry element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Object lookup key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKey<'a> {
    /// Zero-based position in creation order
    Index(usize),
    Name(&'a str),
}

/// Description of one geometry element
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    pub id: ElementId,
    pub object: ObjectId,
    pub renderer: Renderer,
    pub step: i32,
    pub dims: Dims,
    /// Vertex count
    pub count: usize,
    /// Roles holding data
    pub roles: Vec<DataRole>,
    /// Labels of value arrays
    pub value_labels: Vec<String>,
}

/// Texture minification filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFilter {
    Nearest,
    Linear,
    #[default]
    Mipmap,
}

/// Raw texture upload parameters
#[derive(Clone, Debug, PartialEq)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub flip: bool,
    pub filter: TextureFilter,
    pub bgr: bool,
}

/// Encoded frame format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    /// Pick from a file name, defaulting to PNG
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            _ => ImageFormat::Png,
        }
    }
}

/// Frame render request; zero width or height means the session default
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// JPEG quality 1..=100
    pub quality: u8,
    pub transparent: bool,
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: ImageFormat::Png,
            quality: 95,
            transparent: false,
        }
    }
}

/// Video encode request
#[derive(Clone, Debug, PartialEq)]
pub struct VideoRequest {
    pub path: PathBuf,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub start: i32,
    pub end: i32,
    pub quality: u32,
}

/// Decoded raw frame
#[derive(Clone, Debug, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
}

/// The renderer surface consumed by the scripting layer
pub trait Backend: Send {
    // Lifecycle

    /// Start up with a canonical argument vector
    fn run(&mut self, argv: &[String]) -> BackendResult<()>;
    /// Stop interactive processing
    fn close(&mut self);
    /// Release graphics resources; only called on the render thread
    fn destroy(&mut self);
    /// Render the scene once
    fn render(&mut self) -> BackendResult<()>;
    /// Redisplay if anything changed
    fn display(&mut self) -> BackendResult<()>;
    /// Process pending input events; false once a quit has been requested
    fn events(&mut self) -> bool;
    /// Run queued script commands; true if any ran
    fn execute(&mut self) -> BackendResult<bool>;
    fn show(&mut self) {}
    fn hide(&mut self) {}
    fn resize(&mut self, _width: u32, _height: u32) {}

    // Objects

    fn create_object(&mut self, props: &serde_json::Value) -> BackendResult<ObjectId>;
    fn set_object(&mut self, id: ObjectId, props: &serde_json::Value) -> BackendResult<()>;
    fn get_object(&self, key: ObjectKey<'_>) -> Option<ObjectId>;
    fn object_name(&self, id: ObjectId) -> Option<String>;
    fn delete_object(&mut self, id: ObjectId) -> BackendResult<()>;
    /// Add a colour bar object showing the colour map of `target`, or of the
    /// selected object when there is none
    fn colour_bar(&mut self, target: Option<ObjectId>) -> BackendResult<ObjectId>;
    /// Remove all geometry from an object
    fn clear_object(&mut self, id: ObjectId) -> BackendResult<()>;
    /// Delete every object (or only empty them when `objects` is false) and
    /// optionally every colour map
    fn clear_all(&mut self, objects: bool, colourmaps: bool) -> BackendResult<()>;
    fn clear_data(&mut self, id: ObjectId, role: DataRole) -> BackendResult<()>;
    fn clear_values(&mut self, id: ObjectId, label: &str) -> BackendResult<()>;
    fn reload_object(&mut self, id: ObjectId) -> BackendResult<()>;
    /// Close the current element; a no-op when it holds no data
    fn append_to_object(&mut self, id: ObjectId) -> BackendResult<()>;
    fn object_data_labels(&self, id: ObjectId) -> BackendResult<Vec<String>>;
    /// `[min, max]` corners over one object or all objects
    fn bounding_box(&self, id: Option<ObjectId>, all_steps: bool) -> [[f32; 3]; 2];
    fn update_bounding_box(&mut self);
    /// Range of a value label on an object over the current step
    fn value_range(&self, id: ObjectId, label: &str) -> Option<(f64, f64)>;

    // Time steps

    /// Add a step; a negative step appends after the last
    fn add_time_step(&mut self, step: i32, props: &serde_json::Value) -> BackendResult<()>;
    fn time_steps(&self) -> Vec<i32>;
    fn time_step(&self) -> i32;
    fn set_time_step(&mut self, step: i32) -> BackendResult<()>;

    // Data load

    fn array_f32(
        &mut self,
        id: ObjectId,
        data: &[f32],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()>;
    fn array_u32(
        &mut self,
        id: ObjectId,
        data: &[u32],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()>;
    fn array_u8(
        &mut self,
        id: ObjectId,
        data: &[u8],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()>;
    fn load_labels(&mut self, id: ObjectId, labels: &[String]) -> BackendResult<()>;
    /// Parse colour strings and load them as packed colours
    fn load_colours(&mut self, id: ObjectId, colours: &[String]) -> BackendResult<()>;
    /// Load triangle vertices, subdividing each `split` times
    fn load_triangles(&mut self, id: ObjectId, vertices: &[f32], split: u32) -> BackendResult<()>;
    fn texture_u32(&mut self, id: ObjectId, data: &[u32], spec: &TextureSpec) -> BackendResult<()>;
    fn texture_u8(&mut self, id: ObjectId, data: &[u8], spec: &TextureSpec) -> BackendResult<()>;
    fn set_texture(&mut self, id: ObjectId, path: &Path) -> BackendResult<()>;
    fn clear_texture(&mut self, id: ObjectId) -> BackendResult<()>;
    fn load_file(&mut self, path: &Path) -> BackendResult<()>;

    // Data read

    fn geometry(&self, id: ObjectId, scope: StepScope) -> BackendResult<Vec<ElementInfo>>;
    fn view_f32(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[f32]>;
    fn view_u32(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[u32]>;
    fn view_u8(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[u8]>;
    fn write_f32(
        &mut self,
        element: ElementId,
        label: &DataLabel,
        data: &[f32],
    ) -> BackendResult<()>;
    fn write_u32(
        &mut self,
        element: ElementId,
        label: &DataLabel,
        data: &[u32],
    ) -> BackendResult<()>;
    fn write_u8(&mut self, element: ElementId, label: &DataLabel, data: &[u8]) -> BackendResult<()>;
    fn set_element_dims(&mut self, element: ElementId, dims: Dims) -> BackendResult<()>;

    // Colour maps

    /// Add a map, or return the existing one with this name
    fn add_colour_map(&mut self, name: &str) -> BackendResult<()>;
    /// Replace a map's stops from palette text and apply properties
    fn update_colour_map(
        &mut self,
        name: &str,
        palette: &str,
        props: &serde_json::Value,
    ) -> BackendResult<()>;
    fn colour_map(&self, name: &str) -> Option<String>;
    fn flip_colour_map(&mut self, name: &str) -> BackendResult<()>;
    fn monochrome_colour_map(&mut self, name: &str) -> BackendResult<()>;
    fn default_map_names(&self) -> Vec<String>;
    fn default_map(&self, name: &str) -> Option<String>;

    // Scripting

    /// Execute script lines now
    fn parse_commands(&mut self, commands: &str) -> BackendResult<()>;
    /// Queue script lines for the next `execute`
    fn queue_commands(&mut self, commands: &str);
    /// Apply a `name=<json>` assignment to an object or the globals
    fn parse_property(&mut self, assignment: &str, target: Option<ObjectId>) -> BackendResult<()>;
    fn help_command(&self, name: &str, markdown: bool) -> String;
    fn command_list(&self, category: Option<&str>) -> Vec<String>;
    fn command_categories(&self) -> Vec<String>;

    // State

    fn get_state(&self) -> String;
    fn set_state(&mut self, json: &str) -> BackendResult<()>;
    fn property_list(&self) -> String;
    fn figure_names(&self) -> Vec<String>;

    // Surfaces

    /// Marching squares over the grid data of `src` into `dst`
    fn contour(
        &mut self,
        dst: ObjectId,
        src: ObjectId,
        props: &serde_json::Value,
        labels: bool,
        clear: bool,
    ) -> BackendResult<()>;
    /// Marching tetrahedra over the volume data of `src` into `dst`
    fn iso_surface(
        &mut self,
        dst: ObjectId,
        src: ObjectId,
        props: &serde_json::Value,
        clear: bool,
    ) -> BackendResult<()>;

    // Images and video

    /// Render and encode a frame
    fn image(&mut self, request: &ImageRequest) -> BackendResult<Vec<u8>>;
    /// Render to raw pixels with `channels` bytes per pixel
    fn image_buffer(&mut self, width: u32, height: u32, channels: u32) -> BackendResult<RawImage>;
    /// Mean absolute difference between two image files, in [0,1]
    fn image_diff(&mut self, a: &Path, b: &Path) -> BackendResult<f32>;
    fn image_from_file(&mut self, path: &Path) -> BackendResult<RawImage>;
    fn raw_image_write(&mut self, image: &RawImage, path: &Path) -> BackendResult<()>;
    fn encode_video(&mut self, request: &VideoRequest) -> BackendResult<PathBuf> {
        Err(BackendError::Unsupported {
            operation: format!("video encoding to {}", request.path.display()),
        })
    }
    /// JSON scene export for the WebGL viewer
    fn web(&mut self) -> BackendResult<String>;
    fn gl_version(&self) -> String {
        "none".to_string()
    }
}
