//! lavavu-core - Scripting core for the LavaVu 3D viewer
//!
//! This crate drives a rendering backend from Rust: it owns the object,
//! colour map and figure registries, keeps a mirror of the backend state,
//! converts caller arrays into the backend's element types and routes
//! render-thread work through a single bridge.
//!
//! # Key Components
//!
//! - **Session**: root container, scripting commands, state, images and export
//! - **Object**: one drawing object with data loaders, filters and maps
//! - **Geometry**: per-element views and copies of loaded data
//! - **ColourMap** / **Palette**: colour map handles and the stop model
//! - **RenderBridge**: direct, threaded or async scheduling of backend calls
//! - **Backend**: the native renderer interface, with an in-memory
//!   [`HeadlessBackend`] for scripting and tests without a GPU
//!
//! # Example
//!
//! ```no_run
//! use lavavu_core::{Session, SessionConfig};
//! use serde_json::json;
//!
//! let lv = Session::new(SessionConfig::default())?;
//! let points = lv.points(Some("pts"), json!({"pointsize": 5}))?;
//! points.vertices(vec![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]])?;
//! points.values(vec![0.0f32, 1.0], Some("height"))?;
//! points.colourmap("cubehelix")?;
//! lv.image(Some(std::path::Path::new("points.png")), Some((640, 480)), false)?;
//! # Ok::<(), lavavu_core::LavaVuError>(())
//! ```

pub mod backend;
pub mod bridge;
pub mod colour;
pub mod colourmap;
pub mod config;
pub mod control;
pub mod convert;
pub mod error;
pub mod export;
pub mod figure;
pub mod filter;
pub mod geometry;
pub mod input;
pub mod object;
pub mod palette;
pub mod property;
pub mod session;
pub mod testing;
pub mod types;

pub use backend::{Backend, ElementId, HeadlessBackend, ImageFormat, ObjectId};
pub use bridge::{BridgeMode, LoopSettings, RenderBridge, RenderMethod};
pub use colour::Colour;
pub use colourmap::{ColourMap, ColourMapExport, MapOptions};
pub use config::{SessionConfig, SessionMode, TimestepOption};
pub use control::{ControlRequest, PropertyCollection};
pub use convert::{CanonicalArray, NumericArray};
pub use error::*;
pub use figure::Figure;
pub use filter::{Filter, FilterRange};
pub use geometry::{GeomData, Geometry, GeometryView};
pub use input::{ClosePolicy, Key, Modifiers, MouseButton, WindowEvent};
pub use object::{ColourInput, Dataset, Object, OpacityData, TextureOptions, TextureSource};
pub use palette::{ColourMapData, ColourStop, Palette};
pub use property::{PropertyBag, PropertySchema, PropertyValue};
pub use session::{shutdown_all, Camera, ObjectIdent, Session, SessionCore, WeakSession};
pub use types::{DataLabel, DataRole, Dims, ElementType, Renderer, RendererType, StepScope};
