//! Viewer session
//!
//! [`Session`] owns the render bridge, the published property schema and a
//! decoded mirror of the backend state. The mirror is refreshed after every
//! mutating call and before every public read, so reads never see stale
//! state. Handles ([`Object`], [`ColourMap`], [`Figure`]) keep only a weak
//! reference to the session core and fail with [`SessionError::Defunct`]
//! once the session is closed or dropped. Object handles are also
//! invalidated by [`SessionCore::clear`].
//!
//! Dropping a [`Session`] shuts the bridge down; [`shutdown_all`] closes
//! every live session, for use from a process exit path.

use base64::Engine;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

use crate::backend::{Backend, HeadlessBackend, ImageFormat, ImageRequest, ObjectId, ObjectKey};
use crate::bridge::{BridgeMode, LoopSettings, RenderBridge, RenderMethod};
use crate::colourmap::{ColourMap, ColourMapExport, MapOptions};
use crate::config::{SessionConfig, SessionMode};
use crate::control::PropertyCollection;
use crate::error::validation::validate_resolution;
use crate::error::{
    BackendError, ConvertError, LavaVuError, LavaVuResult, SessionError, ValidationError,
};
use crate::figure::Figure;
use crate::object::Object;
use crate::palette::{ColourMapData, Palette};
use crate::property::{assignment, PropertyBag, PropertySchema, PropertyValue};
use crate::types::{Renderer, RendererType};

/// Property keys on [`SessionCore::add`] that carry data rather than properties
const DATA_KEYS: [&str; 7] = [
    "vertices", "normals", "vectors", "colours", "indices", "values", "labels",
];

static SESSIONS: Mutex<Vec<Weak<SessionCore>>> = Mutex::new(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, Vec<Weak<SessionCore>>> {
    SESSIONS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Close every live session exactly once
pub fn shutdown_all() {
    let live: Vec<Arc<SessionCore>> = registry().drain(..).filter_map(|w| w.upgrade()).collect();
    for session in live {
        session.close();
    }
}

pub(crate) fn into_map(props: Value) -> LavaVuResult<Map<String, Value>> {
    match props {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ValidationError::InvalidArgument {
            message: format!("expected a property map, got {}", other),
        }
        .into()),
    }
}

pub(crate) fn data_url(format: ImageFormat, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        format.mime(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Weak link from a handle back to its session
#[derive(Clone, Debug)]
pub(crate) struct SessionRef {
    core: Weak<SessionCore>,
    /// Clear generation the handle was created in; `None` survives clears
    epoch: Option<u64>,
}

impl SessionRef {
    /// The live session core, or `Defunct` naming the handle
    pub(crate) fn upgrade(&self, name: &str) -> LavaVuResult<Arc<SessionCore>> {
        let defunct = || -> LavaVuError {
            SessionError::Defunct {
                name: name.to_string(),
            }
            .into()
        };
        let core = self.core.upgrade().ok_or_else(defunct)?;
        if core.is_closed() || self.epoch.is_some_and(|e| e != core.epoch.load(Ordering::SeqCst)) {
            return Err(defunct());
        }
        Ok(core)
    }

    pub(crate) fn belongs_to(&self, core: &SessionCore) -> bool {
        std::ptr::eq(self.core.as_ptr(), core)
    }
}

/// How [`SessionCore::object`] picks an object
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectIdent {
    /// By name, creating the object if missing
    Name(String),
    /// One-based creation order
    Index(usize),
    /// Backend handle
    Handle(ObjectId),
    /// The most recently created object
    Last,
}

impl From<&str> for ObjectIdent {
    fn from(name: &str) -> Self {
        ObjectIdent::Name(name.to_string())
    }
}

impl From<String> for ObjectIdent {
    fn from(name: String) -> Self {
        ObjectIdent::Name(name)
    }
}

impl From<usize> for ObjectIdent {
    fn from(index: usize) -> Self {
        ObjectIdent::Index(index)
    }
}

impl From<ObjectId> for ObjectIdent {
    fn from(id: ObjectId) -> Self {
        ObjectIdent::Handle(id)
    }
}

impl<T: Into<ObjectIdent>> From<Option<T>> for ObjectIdent {
    fn from(ident: Option<T>) -> Self {
        ident.map(Into::into).unwrap_or(ObjectIdent::Last)
    }
}

/// Camera parameters from the first view, rounded to three decimals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub translation: [f64; 3],
    pub xyzrotation: [f64; 3],
    pub rotation: [f64; 4],
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn vector<const N: usize>(value: Option<&Value>) -> [f64; N] {
    let mut out = [0.0; N];
    if let Some(items) = value.and_then(Value::as_array) {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = round3(item.as_f64().unwrap_or(0.0));
        }
    }
    out
}

/// Shared session state; reached through [`Session`] or a handle
pub struct SessionCore {
    id: u64,
    me: Weak<SessionCore>,
    bridge: RenderBridge,
    schema: Arc<PropertySchema>,
    mirror: Mutex<Value>,
    epoch: AtomicU64,
    closed: AtomicBool,
    config: SessionConfig,
    collections: Mutex<BTreeMap<String, Weak<PropertyCollection>>>,
    connected: Mutex<Option<String>>,
    server_port: Mutex<Option<u16>>,
}

/// Owning handle to a session; dropping it closes the session
pub struct Session(Arc<SessionCore>);

/// Non-owning handle, as held by the control server
#[derive(Clone, Debug)]
pub struct WeakSession(Weak<SessionCore>);

impl WeakSession {
    pub fn upgrade(&self) -> Option<Arc<SessionCore>> {
        self.0.upgrade().filter(|core| !core.is_closed())
    }
}

impl Session {
    /// Start a session on the headless backend
    pub fn new(config: SessionConfig) -> LavaVuResult<Self> {
        Self::with_backend(Box::new(HeadlessBackend::new()), config)
    }

    /// Load the user config file and the `LV_*` environment, then start
    pub fn from_environment() -> LavaVuResult<Self> {
        let mut config = SessionConfig::load_user()?;
        config.apply_env();
        Self::new(config)
    }

    pub fn with_backend(backend: Box<dyn Backend>, config: SessionConfig) -> LavaVuResult<Self> {
        Self::with_settings(backend, config, LoopSettings::default())
    }

    /// Start with explicit render loop settings, e.g. a hosted window
    pub fn with_settings(
        backend: Box<dyn Backend>,
        config: SessionConfig,
        mut settings: LoopSettings,
    ) -> LavaVuResult<Self> {
        let schema =
            PropertySchema::from_json(&backend.property_list())?.with_validation(config.validate);
        if let Some(fps) = config.properties.get("fps").and_then(Value::as_u64) {
            settings.fps = fps as u32;
        }
        settings.close_policy = config.close_policy;

        let mode = match config.mode {
            SessionMode::Direct => BridgeMode::Direct,
            SessionMode::Thread => BridgeMode::Thread,
            SessionMode::Async => BridgeMode::Async(
                tokio::runtime::Handle::try_current().map_err(|e| {
                    LavaVuError::InvalidConfig(format!("async mode needs a tokio runtime: {}", e))
                })?,
            ),
        };
        let bridge = RenderBridge::new(backend, mode, settings)?;

        let argv = config.to_argv();
        debug!(?argv, mode = bridge.mode_name(), "starting backend");
        if let Err(err) = bridge.call(RenderMethod::Run, move |b| b.run(&argv))? {
            warn!(error = %err, "backend reported an error at startup");
        }

        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        let core = Arc::new_cyclic(|me| SessionCore {
            id,
            me: me.clone(),
            bridge,
            schema: Arc::new(schema),
            mirror: Mutex::new(Value::Null),
            epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
            collections: Mutex::new(BTreeMap::new()),
            connected: Mutex::new(None),
            server_port: Mutex::new(None),
        });
        registry().push(Arc::downgrade(&core));
        core.refresh()?;
        info!(session = id, "session started");
        Ok(Session(core))
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.0))
    }

    /// A shared reference to the core, which does not keep the session open
    pub fn core(&self) -> Arc<SessionCore> {
        self.0.clone()
    }
}

impl Deref for Session {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.0
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.0.close();
    }
}

macro_rules! renderer_factories {
    ($($method:ident => $renderer:expr),* $(,)?) => {
        impl SessionCore {
            $(
                #[doc = concat!(
                    "Add an object rendered as `",
                    stringify!($method),
                    "`; unnamed objects are numbered"
                )]
                pub fn $method(&self, name: Option<&str>, props: Value) -> LavaVuResult<Object> {
                    self.add_typed($renderer, name, props)
                }
            )*
        }
    };
}

renderer_factories! {
    points => Renderer::Points,
    lines => Renderer::Lines,
    triangles => Renderer::Triangles,
    vectors => Renderer::Vectors,
    tracers => Renderer::Tracers,
    shapes => Renderer::Shapes,
    volume => Renderer::Volume,
    labels => Renderer::Labels,
    screen => Renderer::Screen,
}

impl SessionCore {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.bridge.is_closed()
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession(self.me.clone())
    }

    pub(crate) fn session_ref(&self, track_clears: bool) -> SessionRef {
        SessionRef {
            core: self.me.clone(),
            epoch: track_clears.then(|| self.epoch.load(Ordering::SeqCst)),
        }
    }

    fn ensure_open(&self) -> LavaVuResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed.into());
        }
        Ok(())
    }

    /// Run against the backend on the calling thread
    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut dyn Backend) -> R) -> LavaVuResult<R> {
        self.ensure_open()?;
        Ok(self.bridge.with(f))
    }

    /// Run a method that must execute on the render thread
    pub(crate) fn routed<R, F>(&self, method: RenderMethod, f: F) -> LavaVuResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Backend) -> R + Send + 'static,
    {
        self.ensure_open()?;
        Ok(self.bridge.call(method, f)?)
    }

    fn mirror(&self) -> MutexGuard<'_, Value> {
        self.mirror.lock().unwrap_or_else(|e| e.into_inner())
    }

    // State

    /// Pull the backend state into the mirror
    pub fn refresh(&self) -> LavaVuResult<()> {
        let text = self.with_backend(|b| b.get_state())?;
        let state: Value = serde_json::from_str(&text)?;
        *self.mirror() = state;
        Ok(())
    }

    /// Fresh copy of the full state
    pub fn state(&self) -> LavaVuResult<Value> {
        self.refresh()?;
        Ok(self.mirror().clone())
    }

    pub fn get_state(&self) -> LavaVuResult<Value> {
        self.state()
    }

    /// Replace the backend state
    pub fn set_state(&self, state: &Value) -> LavaVuResult<()> {
        let text = state.to_string();
        self.with_backend(|b| b.set_state(&text))??;
        self.refresh()
    }

    /// Read a property from the first view, the top level of the state or
    /// the globals, in that order, falling back to its default
    pub fn get(&self, name: &str) -> LavaVuResult<PropertyValue> {
        let state = self.state()?;
        let view = state.get("views").and_then(|v| v.get(0)).and_then(Value::as_object);
        let top = state.as_object();
        let props = state.get("properties").and_then(Value::as_object);
        Ok(self.schema.resolve(name, &[view, top, props])?)
    }

    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) -> LavaVuResult<()> {
        self.schema.check(name)?;
        let line = assignment(name, &value.into());
        self.with_backend(|b| b.parse_property(&line, None))??;
        self.refresh()
    }

    /// Global and first-view properties that are set
    pub fn properties(&self) -> LavaVuResult<PropertyBag> {
        let state = self.state()?;
        let mut merged = state
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(view) = state.get("views").and_then(|v| v.get(0)).and_then(Value::as_object) {
            merged.extend(view.clone());
        }
        Ok(PropertyBag::from_map(self.schema.clone(), &merged))
    }

    /// Write the state to a JSON file
    pub fn store(&self, path: &Path) -> LavaVuResult<()> {
        let state = self.state()?;
        fs::write(path, serde_json::to_string_pretty(&state)?)?;
        Ok(())
    }

    /// Load state from a file written by [`SessionCore::store`]; false if absent
    pub fn restore(&self, path: &Path) -> LavaVuResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let state: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.set_state(&state)?;
        Ok(true)
    }

    // Objects

    pub(crate) fn object_id(&self, name: &str) -> LavaVuResult<ObjectId> {
        self.with_backend(|b| b.get_object(ObjectKey::Name(name)))?
            .ok_or_else(|| {
                BackendError::MissingObject {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Properties of an object from a fresh mirror
    pub(crate) fn object_props(&self, name: &str) -> LavaVuResult<Map<String, Value>> {
        self.refresh()?;
        self.mirror()
            .get("objects")
            .and_then(Value::as_array)
            .and_then(|objects| {
                objects
                    .iter()
                    .find(|o| o.get("name").and_then(Value::as_str) == Some(name))
            })
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                BackendError::MissingObject {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn handle(&self, name: impl Into<String>) -> Object {
        Object::new(self.session_ref(true), name.into())
    }

    fn find_object(&self, name: &str) -> LavaVuResult<Option<Object>> {
        let found = self.with_backend(|b| b.get_object(ObjectKey::Name(name)))?;
        Ok(found.map(|_| self.handle(name)))
    }

    /// Create an object, or return the existing one with this name
    ///
    /// Data keys in `props` (`vertices`, `colours`, ...) are loaded after
    /// creation; `geometry` is accepted for `renderer`.
    pub fn add(&self, name: &str, props: Value) -> LavaVuResult<Object> {
        let mut props = into_map(props)?;
        if !name.is_empty() {
            if let Some(existing) = self.find_object(name)? {
                debug!(name, "object exists");
                return Ok(existing);
            }
            props.insert("name".into(), Value::from(name));
        }
        self.setup_object(None, props)
    }

    fn add_typed(
        &self,
        renderer: Renderer,
        name: Option<&str>,
        props: Value,
    ) -> LavaVuResult<Object> {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => {
                let names = self.object_names()?;
                let mut n = names.len() + 1;
                while names.contains(&format!("{}{}", renderer, n)) {
                    n += 1;
                }
                format!("{}{}", renderer, n)
            }
        };
        let mut props = into_map(props)?;
        props.insert("renderer".into(), Value::from(renderer.as_str()));
        self.add(&name, Value::Object(props))
    }

    /// Apply properties and data keys to a new or existing object
    pub(crate) fn setup_object(
        &self,
        target: Option<ObjectId>,
        mut props: Map<String, Value>,
    ) -> LavaVuResult<Object> {
        let datasets: Vec<(&str, Value)> = DATA_KEYS
            .iter()
            .filter_map(|key| props.remove(*key).map(|v| (*key, v)))
            .collect();
        if let Some(geometry) = props.remove("geometry") {
            props.entry("renderer").or_insert(geometry);
        }
        if let Some(renderer) = props.get("renderer") {
            let text = renderer.as_str().ok_or_else(|| ValidationError::InvalidRenderer {
                name: renderer.to_string(),
            })?;
            text.parse::<RendererType>()?;
        }
        for key in props.keys() {
            self.schema.check(key)?;
        }

        let json = Value::Object(props);
        let id = match target {
            Some(id) => {
                self.with_backend(|b| b.set_object(id, &json))??;
                id
            }
            None => self.with_backend(|b| b.create_object(&json))??,
        };
        let name = self
            .with_backend(|b| b.object_name(id))?
            .ok_or_else(|| BackendError::MissingObject { name: id.to_string() })?;
        self.refresh()?;

        let object = self.handle(name);
        for (key, value) in datasets {
            object.load_json(key, &value)?;
        }
        Ok(object)
    }

    /// A regular `dims.0` x `dims.1` quad lattice spanning `width` x `height`
    pub fn grid(
        &self,
        name: Option<&str>,
        width: f64,
        height: f64,
        dims: (u32, u32),
        props: Value,
    ) -> LavaVuResult<Object> {
        let mut props = into_map(props)?;
        props.insert("dims".into(), json!([dims.0, dims.1]));
        let object = self.add_typed(Renderer::Grid, name, Value::Object(props))?;
        if width > 0.0 && height > 0.0 && dims.0 > 0 && dims.1 > 0 {
            let (dx, dy) = (width / dims.0 as f64, height / dims.1 as f64);
            let mut lattice = Vec::with_capacity((dims.0 * dims.1) as usize);
            for j in 0..dims.1 {
                for i in 0..dims.0 {
                    lattice.push([(i as f64 * dx) as f32, (j as f64 * dy) as f32, 0.0f32]);
                }
            }
            object.vertices(lattice)?;
        }
        Ok(object)
    }

    /// Look up an object; a name that does not exist creates it
    pub fn object(&self, ident: impl Into<ObjectIdent>) -> LavaVuResult<Object> {
        let ident = ident.into();
        let invalid = |ident: &ObjectIdent| -> LavaVuError {
            ValidationError::InvalidIdentifier {
                ident: format!("{:?}", ident),
            }
            .into()
        };
        let name = match &ident {
            ObjectIdent::Name(name) => {
                return match self.find_object(name)? {
                    Some(object) => Ok(object),
                    None => self.add(name, Value::Null),
                }
            }
            ObjectIdent::Index(index) => {
                let position = index.checked_sub(1).ok_or_else(|| invalid(&ident))?;
                self.with_backend(|b| {
                    b.get_object(ObjectKey::Index(position))
                        .and_then(|id| b.object_name(id))
                })?
            }
            ObjectIdent::Handle(id) => self.with_backend(|b| b.object_name(*id))?,
            ObjectIdent::Last => self.object_names()?.pop(),
        };
        name.map(|n| self.handle(n)).ok_or_else(|| invalid(&ident))
    }

    pub fn object_names(&self) -> LavaVuResult<Vec<String>> {
        let state = self.state()?;
        Ok(state
            .get("objects")
            .and_then(Value::as_array)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|o| o.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Handles for every object, in creation order
    pub fn objects(&self) -> LavaVuResult<Vec<Object>> {
        Ok(self.object_names()?.into_iter().map(|n| self.handle(n)).collect())
    }

    pub fn delete(&self, name: &str) -> LavaVuResult<()> {
        let id = self.object_id(name)?;
        self.with_backend(|b| b.delete_object(id))??;
        self.refresh()
    }

    /// Add a colour bar for `obj`, or for the selected object
    ///
    /// The bar is named `<object>_colourbar` and shows the object's colour
    /// map. `props` are applied to the new bar.
    pub fn colourbar(&self, obj: Option<&Object>, props: Value) -> LavaVuResult<Object> {
        let target = obj.map(|o| self.object_id(o.name())).transpose()?;
        let id = self.with_backend(|b| b.colour_bar(target))??;
        self.setup_object(Some(id), into_map(props)?)
    }

    /// Remove all objects (or only their data) and optionally all colour maps
    ///
    /// Deleting objects invalidates every existing object handle.
    pub fn clear(&self, objects: bool, colourmaps: bool) -> LavaVuResult<()> {
        self.routed(RenderMethod::ClearAll, move |b| b.clear_all(objects, colourmaps))??;
        if objects {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.refresh()
    }

    // Colour maps

    /// Create or update a named colour map
    pub fn colourmap(&self, name: &str, data: impl Into<ColourMapData>) -> LavaVuResult<ColourMap> {
        self.colourmap_with(name, data, MapOptions::default())
    }

    pub fn colourmap_with(
        &self,
        name: &str,
        data: impl Into<ColourMapData>,
        options: MapOptions,
    ) -> LavaVuResult<ColourMap> {
        self.with_backend(|b| b.add_colour_map(name))??;
        let map = ColourMap::new(self.session_ref(false), name.to_string());
        map.update_with(data, options)?;
        Ok(map)
    }

    pub(crate) fn colourmap_handle(&self, name: &str) -> ColourMap {
        ColourMap::new(self.session_ref(false), name.to_string())
    }

    pub fn colourmap_names(&self) -> LavaVuResult<Vec<String>> {
        let state = self.state()?;
        Ok(state
            .get("colourmaps")
            .and_then(Value::as_array)
            .map(|maps| {
                maps.iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn colourmaps(&self) -> LavaVuResult<Vec<ColourMap>> {
        Ok(self
            .colourmap_names()?
            .into_iter()
            .map(|n| self.colourmap_handle(&n))
            .collect())
    }

    /// Stops of a map as palette text or a position/colour list
    pub fn getcolourmap(&self, name: &str, as_string: bool) -> LavaVuResult<ColourMapExport> {
        let palette = self.colourmap_handle(name).palette()?;
        Ok(if as_string {
            ColourMapExport::Text(palette.to_string())
        } else {
            ColourMapExport::List(palette.to_list())
        })
    }

    /// Names of the maps the backend provides
    pub fn default_colourmaps(&self) -> LavaVuResult<Vec<String>> {
        self.with_backend(|b| b.default_map_names())
    }

    pub fn default_colourmap(&self, name: &str) -> LavaVuResult<Option<Palette>> {
        Ok(self
            .with_backend(|b| b.default_map(name))?
            .and_then(|text| Palette::parse(&text).ok()))
    }

    // Figures

    /// Save a figure showing only `objects` (all when empty), with `props` applied
    pub fn figure(&self, name: &str, objects: &[&str], props: Value) -> LavaVuResult<Figure> {
        if !objects.is_empty() {
            for object in self.objects()? {
                object.set("visible", objects.contains(&object.name()))?;
            }
        }
        self.execute_script(&format!("savefigure {}", name))?;
        let figure = Figure::new(self.session_ref(false), name.to_string());
        for (key, value) in into_map(props)? {
            figure.set(&key, value)?;
        }
        Ok(figure)
    }

    pub fn figures(&self) -> LavaVuResult<Vec<Figure>> {
        Ok(self
            .with_backend(|b| b.figure_names())?
            .into_iter()
            .map(|n| Figure::new(self.session_ref(false), n))
            .collect())
    }

    // Commands

    /// Run a script, or apply a JSON state when the text starts with `{`
    ///
    /// Goes through the background queue when the session was configured
    /// with `queue`.
    pub fn commands(&self, text: &str) -> LavaVuResult<()> {
        if self.config.queue && !text.trim_start().starts_with('{') {
            self.queue_commands(text)
        } else {
            self.execute_script(text)
        }
    }

    /// Run a script now and wait for it
    pub fn execute_script(&self, text: &str) -> LavaVuResult<()> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            let state: Value = serde_json::from_str(trimmed)?;
            return self.set_state(&state);
        }
        let script = text.to_string();
        self.routed(RenderMethod::Commands, move |b| b.parse_commands(&script))??;
        self.refresh()
    }

    /// Queue script lines for the render loop without waiting
    pub fn queue_commands(&self, text: &str) -> LavaVuResult<()> {
        self.ensure_open()?;
        let script = text.to_string();
        self.bridge
            .submit(RenderMethod::Commands, move |b| b.queue_commands(&script))?;
        Ok(())
    }

    /// Run a published command with space-joined arguments
    pub fn command(&self, name: &str, args: &[&str]) -> LavaVuResult<()> {
        let known = self.with_backend(|b| b.command_list(None))?;
        if !known.iter().any(|c| c == name) {
            return Err(ValidationError::UnknownCommand { name: name.to_string() }.into());
        }
        let line = std::iter::once(name)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.commands(&line)
    }

    /// Help for a command or property
    ///
    /// Names that are both, such as `background`, give the command; prefix
    /// with `@` for the property.
    pub fn help(&self, name: &str) -> LavaVuResult<String> {
        let is_command = self.command_list(None)?.iter().any(|c| c == name);
        if !is_command {
            if let Some(doc) = self.schema.doc(name.trim_start_matches('@')) {
                return Ok(doc);
            }
        }
        self.with_backend(|b| b.help_command(name, false))
    }

    pub fn command_list(&self, category: Option<&str>) -> LavaVuResult<Vec<String>> {
        self.with_backend(|b| b.command_list(category))
    }

    pub fn command_categories(&self) -> LavaVuResult<Vec<String>> {
        self.with_backend(|b| b.command_categories())
    }

    // Time steps

    /// Add a time step, after the last when `step` is `None`
    pub fn addstep(&self, step: Option<i32>, props: Value) -> LavaVuResult<()> {
        let props = Value::Object(into_map(props)?);
        self.with_backend(|b| b.add_time_step(step.unwrap_or(-1), &props))??;
        self.refresh()
    }

    pub fn timesteps(&self) -> LavaVuResult<Vec<i32>> {
        self.with_backend(|b| b.time_steps())
    }

    pub fn timestep(&self) -> LavaVuResult<i32> {
        self.with_backend(|b| b.time_step())
    }

    pub fn set_timestep(&self, step: i32) -> LavaVuResult<()> {
        self.with_backend(|b| b.set_time_step(step))??;
        self.refresh()
    }

    // Files

    /// Load a file, into `target` when given
    ///
    /// Returns the target or the most recent object, with `props` applied.
    pub fn file(
        &self,
        path: &Path,
        target: Option<&Object>,
        props: Value,
    ) -> LavaVuResult<Option<Object>> {
        if let Some(object) = target {
            object.select()?;
        }
        let owned = path.to_path_buf();
        let loaded = self.routed(RenderMethod::LoadFile, move |b| b.load_file(&owned))?;
        if target.is_some() {
            self.routed(RenderMethod::Commands, |b| b.parse_commands("select"))??;
        }
        loaded?;
        self.refresh()?;

        let object = match target {
            Some(object) => Some(object.clone()),
            None => self.object_names()?.pop().map(|n| self.handle(n)),
        };
        let props = into_map(props)?;
        match &object {
            Some(object) if !props.is_empty() => {
                let id = self.object_id(object.name())?;
                self.setup_object(Some(id), props)?;
            }
            Some(_) => {}
            None => debug!(path = %path.display(), "no object after load"),
        }
        Ok(object)
    }

    /// Load each file in turn; returns the object from the last load
    pub fn files(
        &self,
        paths: &[PathBuf],
        target: Option<&Object>,
        props: Value,
    ) -> LavaVuResult<Option<Object>> {
        let mut last = None;
        for path in paths {
            last = self.file(path, target, props.clone())?;
        }
        Ok(last)
    }

    // View

    pub fn camera(&self) -> LavaVuResult<Option<Camera>> {
        let state = self.state()?;
        let Some(view) = state.get("views").and_then(|v| v.get(0)) else {
            return Ok(None);
        };
        let camera = Camera {
            translation: vector(view.get("translate")),
            xyzrotation: vector(view.get("xyzrotate")),
            rotation: vector(view.get("rotate")),
        };
        info!(
            "translation {:?} rotation {:?} (xyz {:?})",
            camera.translation, camera.rotation, camera.xyzrotation
        );
        Ok(Some(camera))
    }

    /// The first view as JSON text
    pub fn getview(&self) -> LavaVuResult<String> {
        let state = self.state()?;
        Ok(state
            .get("views")
            .and_then(|v| v.get(0))
            .cloned()
            .unwrap_or(Value::Null)
            .to_string())
    }

    /// Replace the first view from JSON text
    pub fn setview(&self, view: &str) -> LavaVuResult<()> {
        let view: Value = serde_json::from_str(view)?;
        let mut state = self.state()?;
        match state.get_mut("views").and_then(Value::as_array_mut) {
            Some(views) if !views.is_empty() => views[0] = view,
            _ => state["views"] = Value::from(vec![view]),
        }
        self.set_state(&state)
    }

    /// Scene bounds `[min, max]`
    pub fn bounding_box(&self, all_steps: bool) -> LavaVuResult<[[f32; 3]; 2]> {
        self.with_backend(|b| b.bounding_box(None, all_steps))
    }

    pub fn render(&self) -> LavaVuResult<()> {
        Ok(self.with_backend(|b| b.render())??)
    }

    // Images

    pub(crate) fn render_image(&self, request: ImageRequest) -> LavaVuResult<Vec<u8>> {
        validate_resolution(request.width, request.height)?;
        Ok(self.routed(RenderMethod::Image, move |b| b.image(&request))??)
    }

    /// Render to `path`, or to a data URL when no path is given
    ///
    /// A `None` resolution uses the session default.
    pub fn image(
        &self,
        path: Option<&Path>,
        resolution: Option<(u32, u32)>,
        transparent: bool,
    ) -> LavaVuResult<String> {
        let (width, height) = resolution.unwrap_or((0, 0));
        let format = path.map(ImageFormat::from_path).unwrap_or(ImageFormat::Png);
        let bytes = self.render_image(ImageRequest {
            width,
            height,
            format,
            transparent,
            ..ImageRequest::default()
        })?;
        match path {
            Some(path) => {
                fs::write(path, &bytes)?;
                Ok(path.display().to_string())
            }
            None => Ok(data_url(format, &bytes)),
        }
    }

    /// A JPEG frame as a data URL
    pub fn frame(&self, resolution: Option<(u32, u32)>) -> LavaVuResult<String> {
        let bytes = self.jpeg(resolution, 90)?;
        Ok(data_url(ImageFormat::Jpeg, &bytes))
    }

    pub fn jpeg(&self, resolution: Option<(u32, u32)>, quality: u8) -> LavaVuResult<Vec<u8>> {
        let (width, height) = resolution.unwrap_or((0, 0));
        self.render_image(ImageRequest {
            width,
            height,
            format: ImageFormat::Jpeg,
            quality: quality.clamp(1, 100),
            transparent: false,
        })
    }

    pub fn png(&self, resolution: Option<(u32, u32)>, transparent: bool) -> LavaVuResult<Vec<u8>> {
        let (width, height) = resolution.unwrap_or((0, 0));
        self.render_image(ImageRequest {
            width,
            height,
            format: ImageFormat::Png,
            transparent,
            ..ImageRequest::default()
        })
    }

    /// Raw pixels shaped `(height, width, channels)`
    pub fn raw_image(&self, width: u32, height: u32, channels: u32) -> LavaVuResult<Array3<u8>> {
        validate_resolution(width, height)?;
        let raw = self.routed(RenderMethod::Image, move |b| {
            b.image_buffer(width, height, channels)
        })??;
        let shape = (raw.height as usize, raw.width as usize, raw.channels as usize);
        Array3::from_shape_vec(shape, raw.pixels).map_err(|_| {
            ConvertError::ShapeMismatch {
                shape: vec![shape.0, shape.1, shape.2],
                role: "image".into(),
                width: shape.2,
            }
            .into()
        })
    }

    pub fn gl_version(&self) -> LavaVuResult<String> {
        self.routed(RenderMethod::GlVersion, |b| b.gl_version())
    }

    // Control

    /// Record the first non-empty caller URL and return the session id
    pub fn connect(&self, url: &str) -> u64 {
        let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        if connected.is_none() && !url.is_empty() {
            debug!(url, "viewer connected");
            *connected = Some(url.to_string());
        }
        self.id
    }

    pub fn connected_url(&self) -> Option<String> {
        self.connected.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_server_port(&self, port: Option<u16>) {
        *self.server_port.lock().unwrap_or_else(|e| e.into_inner()) = port;
    }

    pub fn server_port(&self) -> Option<u16> {
        *self.server_port.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Keep a weak reference to a collection for `$id` control requests
    pub fn register_collection(&self, collection: &Arc<PropertyCollection>) {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.retain(|_, c| c.strong_count() > 0);
        collections.insert(collection.id().to_string(), Arc::downgrade(collection));
    }

    pub fn collection(&self, id: &str) -> Option<Arc<PropertyCollection>> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(id).and_then(Weak::upgrade)
    }

    /// One render loop iteration, for direct mode; false once closed
    pub fn pump(&self) -> bool {
        self.bridge.pump()
    }

    /// Render loop iterations so far
    pub fn ticks(&self) -> u64 {
        self.bridge.ticks()
    }

    /// Shut the bridge down; later calls fail with `Closed`
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.bridge.shutdown();
        let me = self.me.as_ptr();
        registry().retain(|w| w.strong_count() > 0 && !std::ptr::eq(w.as_ptr(), me));
        info!(session = self.id, "session closed");
    }
}

impl fmt::Display for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mirror = self.mirror();
        let sections = [
            mirror.get("properties").and_then(Value::as_object),
            mirror.get("views").and_then(|v| v.get(0)).and_then(Value::as_object),
        ];
        for (key, value) in sections.into_iter().flatten().flatten() {
            writeln!(f, "    {}={}", key, value)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("id", &self.id)
            .field("mode", &self.bridge.mode_name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CommandJournal;

    fn direct() -> Session {
        Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let lv = direct();
        let a = lv.add("pts", json!({"renderer": "points"})).unwrap();
        let b = lv.add("pts", json!({"renderer": "lines"})).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(lv.object_names().unwrap(), vec!["pts"]);
    }

    #[test]
    fn test_add_rejects_bad_renderer_and_property() {
        let lv = direct();
        let err = lv.add("x", json!({"renderer": "blobs"})).unwrap_err();
        assert!(matches!(err, LavaVuError::Validation(ValidationError::InvalidRenderer { .. })));
        let err = lv.add("y", json!({"bogus": 1})).unwrap_err();
        assert!(matches!(err, LavaVuError::Validation(ValidationError::UnknownProperty { .. })));
        assert!(lv.object_names().unwrap().is_empty());
    }

    #[test]
    fn test_factory_names() {
        let lv = direct();
        let a = lv.points(None, Value::Null).unwrap();
        let b = lv.points(None, Value::Null).unwrap();
        assert_eq!(a.name(), "points1");
        assert_eq!(b.name(), "points2");
        assert_eq!(b.get("renderer").unwrap(), PropertyValue::from("points"));
    }

    #[test]
    fn test_object_identifiers() {
        let lv = direct();
        lv.add("first", Value::Null).unwrap();
        lv.add("second", Value::Null).unwrap();
        assert_eq!(lv.object(1usize).unwrap().name(), "first");
        assert_eq!(lv.object(ObjectIdent::Last).unwrap().name(), "second");
        assert!(lv.object(0usize).is_err());
        assert!(lv.object(5usize).is_err());
        // A missing name creates the object
        assert_eq!(lv.object("third").unwrap().name(), "third");
        assert_eq!(lv.object_names().unwrap().len(), 3);
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let lv = direct();
        assert_eq!(lv.get("fov").unwrap(), PropertyValue::Number(45.0));
        lv.set("background", "white").unwrap();
        assert_eq!(lv.get("background").unwrap(), PropertyValue::from("white"));
        assert!(lv.get("nonsense").is_err());
        assert!(lv.set("nonsense", 1).is_err());
    }

    #[test]
    fn test_get_precedence() {
        let lv = direct();
        lv.set_state(&json!({
            "properties": {"title": "globals", "fps": 10},
            "views": [{"zoom": 1.0}],
            "title": "top",
        }))
        .unwrap();
        assert_eq!(lv.get("title").unwrap(), PropertyValue::from("top"));
        assert_eq!(lv.get("fps").unwrap(), PropertyValue::Number(10.0));
        assert_eq!(lv.state().unwrap()["title"], json!("top"));

        lv.set_state(&json!({"views": [{"title": "view"}], "title": "top"}))
            .unwrap();
        assert_eq!(lv.get("title").unwrap(), PropertyValue::from("view"));
    }

    #[test]
    fn test_command_validation() {
        let journal = CommandJournal::new();
        let lv = Session::with_backend(
            Box::new(HeadlessBackend::with_journal(journal.clone())),
            SessionConfig::default().with_mode(SessionMode::Direct),
        )
        .unwrap();
        lv.command("zoom", &["2"]).unwrap();
        assert!(matches!(
            lv.command("fly", &[]),
            Err(LavaVuError::Validation(ValidationError::UnknownCommand { .. }))
        ));
        assert_eq!(journal.entries().last().map(String::as_str), Some("zoom 2"));
    }

    #[test]
    fn test_clear_invalidates_objects() {
        let lv = direct();
        let obj = lv.add("a", Value::Null).unwrap();
        let map = lv.colourmap("m", "red blue").unwrap();
        lv.clear(true, false).unwrap();
        assert!(matches!(
            obj.get("opacity"),
            Err(LavaVuError::Session(SessionError::Defunct { .. }))
        ));
        assert!(map.tolist().is_ok());
    }

    #[test]
    fn test_close_makes_handles_defunct() {
        let lv = direct();
        let obj = lv.add("a", Value::Null).unwrap();
        lv.close();
        assert!(lv.is_closed());
        assert!(matches!(
            obj.get("opacity"),
            Err(LavaVuError::Session(SessionError::Defunct { .. }))
        ));
        assert!(matches!(lv.state(), Err(LavaVuError::Session(SessionError::Closed))));
    }

    #[test]
    fn test_json_commands_set_state() {
        let lv = direct();
        let mut state = lv.state().unwrap();
        state["properties"]["title"] = json!("from json");
        lv.commands(&state.to_string()).unwrap();
        assert_eq!(lv.get("title").unwrap(), PropertyValue::from("from json"));
    }

    #[test]
    fn test_camera_rounding() {
        let lv = direct();
        lv.commands("translate 0.12345 0 -1").unwrap();
        let camera = lv.camera().unwrap().unwrap();
        assert_eq!(camera.translation, [0.123, 0.0, -1.0]);
        assert_eq!(camera.rotation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_setview_roundtrip() {
        let lv = direct();
        let view = lv.getview().unwrap();
        lv.commands("zoom 3").unwrap();
        lv.setview(&view).unwrap();
        assert_eq!(lv.get("zoom").unwrap(), PropertyValue::Number(1.0));
    }

    #[test]
    fn test_raw_image_shape() {
        let lv = direct();
        let raw = lv.raw_image(8, 4, 3).unwrap();
        assert_eq!(raw.shape(), &[4, 8, 3]);
    }

    #[test]
    fn test_data_url() {
        let lv = direct();
        let url = lv.frame(Some((16, 16))).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let png = lv.image(None, Some((16, 16)), false).unwrap();
        assert!(png.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_connect_first_url_wins() {
        let lv = direct();
        let id = lv.connect("");
        assert_eq!(lv.connected_url(), None);
        assert_eq!(lv.connect("http://a"), id);
        lv.connect("http://b");
        assert_eq!(lv.connected_url().as_deref(), Some("http://a"));
    }
}
