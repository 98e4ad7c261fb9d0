//! Headless reference backend
//!
//! Implements the whole [`Backend`] surface in memory: the property
//! schema, the JSON state, the element store, colour maps, a small script
//! interpreter, contouring and software frames. Used for scripting without
//! a GPU and as the backend in tests.

mod raster;
mod schema;
mod script;
mod store;
mod surface;

use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::backend::{
    Backend, ElementId, ElementInfo, ImageFormat, ImageRequest, ObjectId, ObjectKey, RawImage,
    TextureSpec,
};
use crate::colour::Colour;
use crate::error::{BackendError, BackendResult};
use crate::palette::{defaults, Palette};
use crate::types::{DataLabel, DataRole, Dims, Renderer, StepScope};

use raster::{Canvas, Drawable};
use store::{expand_grid_corners, storage_key, tessellate, Element, ObjectRecord, Texture};
use surface::{marching_squares, marching_tetrahedra, Lattice, Surface};

const DEFAULT_RESOLUTION: (u32, u32) = (640, 480);

/// Shared record of every script line the backend executed, in order
#[derive(Clone, Debug, Default)]
pub struct CommandJournal(Arc<Mutex<Vec<String>>>);

impl CommandJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, line: &str) {
        let mut entries = self.0.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(line.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[derive(Clone, Debug)]
struct MapRecord {
    name: String,
    palette: Palette,
    props: Map<String, Value>,
}

impl MapRecord {
    fn to_json(&self) -> Value {
        let mut map = self.props.clone();
        map.insert("name".into(), Value::from(self.name.clone()));
        map.insert("colours".into(), self.palette.to_json());
        Value::Object(map)
    }
}

fn default_view() -> Map<String, Value> {
    let list = schema::property_list();
    let mut view = Map::new();
    if let Some(entries) = list.as_object() {
        for (name, entry) in entries {
            if entry.get("scope").and_then(Value::as_str) == Some("view") {
                view.insert(name.clone(), entry.get("default").cloned().unwrap_or(Value::Null));
            }
        }
    }
    view
}

fn missing(id: ObjectId) -> BackendError {
    BackendError::MissingObject {
        name: id.to_string(),
    }
}

fn isovalues(props: &Value) -> Vec<f32> {
    match props.get("isovalues") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect(),
        Some(Value::Number(n)) => n.as_f64().map(|v| vec![v as f32]).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn as_vector(value: Option<&Value>, len: usize) -> Vec<f64> {
    let mut out: Vec<f64> = value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    out.resize(len, 0.0);
    out
}

fn merge_bounds(boxes: impl IntoIterator<Item = [[f32; 3]; 2]>) -> Option<[[f32; 3]; 2]> {
    boxes.into_iter().reduce(|mut acc, b| {
        for axis in 0..3 {
            acc[0][axis] = acc[0][axis].min(b[0][axis]);
            acc[1][axis] = acc[1][axis].max(b[1][axis]);
        }
        acc
    })
}

const STATE_SECTIONS: [&str; 4] = ["properties", "views", "objects", "colourmaps"];

/// In-memory backend
pub struct HeadlessBackend {
    globals: Map<String, Value>,
    /// Top-level state keys outside the four sections, kept as given
    extras: Map<String, Value>,
    views: Vec<Map<String, Value>>,
    objects: Vec<ObjectRecord>,
    colourmaps: Vec<MapRecord>,
    figures: Vec<(String, Value)>,
    current_figure: Option<String>,
    steps: Vec<i32>,
    current_step: i32,
    selected: Option<ObjectId>,
    next_object: u64,
    next_element: u64,
    queue: VecDeque<String>,
    journal: CommandJournal,
    running: bool,
    quit: bool,
    hidden: bool,
    dirty: bool,
    destroyed: bool,
    frames: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_journal(CommandJournal::new())
    }

    /// Record executed script lines into an existing journal
    pub fn with_journal(journal: CommandJournal) -> Self {
        Self {
            globals: Map::new(),
            extras: Map::new(),
            views: vec![default_view()],
            objects: Vec::new(),
            colourmaps: Vec::new(),
            figures: Vec::new(),
            current_figure: None,
            steps: Vec::new(),
            current_step: -1,
            selected: None,
            next_object: 0,
            next_element: 0,
            queue: VecDeque::new(),
            journal,
            running: false,
            quit: false,
            hidden: true,
            dirty: false,
            destroyed: false,
            frames: 0,
        }
    }

    pub fn journal(&self) -> CommandJournal {
        self.journal.clone()
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Between `run` and `close`
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn object(&self, id: ObjectId) -> BackendResult<&ObjectRecord> {
        self.objects.iter().find(|o| o.id == id).ok_or_else(|| missing(id))
    }

    fn object_mut(&mut self, id: ObjectId) -> BackendResult<&mut ObjectRecord> {
        self.objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| missing(id))
    }

    fn element(&self, id: ElementId) -> BackendResult<&Element> {
        self.objects
            .iter()
            .flat_map(|o| o.elements.iter())
            .find(|e| e.id == id)
            .ok_or(BackendError::MissingElement { id: id.0 })
    }

    fn element_mut(&mut self, id: ElementId) -> BackendResult<&mut Element> {
        self.dirty = true;
        self.objects
            .iter_mut()
            .flat_map(|o| o.elements.iter_mut())
            .find(|e| e.id == id)
            .ok_or(BackendError::MissingElement { id: id.0 })
    }

    /// Name or 1-based index
    fn find(&self, ident: &str) -> Option<ObjectId> {
        let ident = ident.trim();
        if let Some(obj) = self.objects.iter().find(|o| o.name() == ident) {
            return Some(obj.id);
        }
        ident
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.objects.get(i))
            .map(|o| o.id)
    }

    fn view_mut(&mut self) -> &mut Map<String, Value> {
        if self.views.is_empty() {
            self.views.push(default_view());
        }
        &mut self.views[0]
    }

    /// Fixed objects and sessions without time steps load at step -1
    fn load_step(&self, id: ObjectId) -> BackendResult<i32> {
        let obj = self.object(id)?;
        let fixed = obj.props.get("fixed").and_then(Value::as_bool).unwrap_or(false);
        Ok(if fixed || self.steps.is_empty() {
            -1
        } else {
            self.current_step
        })
    }

    /// Element the next load into `id` writes to
    fn target(&mut self, id: ObjectId, dims: Dims) -> BackendResult<&mut Element> {
        let step = self.load_step(id)?;
        self.dirty = true;
        let next = &mut self.next_element;
        let obj = self
            .objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| missing(id))?;
        let declared = obj.declared_dims();
        let element = obj.target_element(step, next);
        if dims.is_set() {
            element.dims = dims;
        } else if declared.is_set() && !element.dims.is_set() {
            element.dims = declared;
        }
        Ok(element)
    }

    fn store_texture(
        &mut self,
        id: ObjectId,
        mut pixels: Vec<u8>,
        spec: &TextureSpec,
    ) -> BackendResult<()> {
        let channels = spec.channels.max(1) as usize;
        let row = spec.width as usize * channels;
        if spec.bgr && channels >= 3 {
            for px in pixels.chunks_exact_mut(channels) {
                px.swap(0, 2);
            }
        }
        if spec.flip && row > 0 {
            let flipped: Vec<u8> = pixels.chunks(row).rev().flatten().copied().collect();
            pixels = flipped;
        }
        let obj = self.object_mut(id)?;
        obj.texture = Some(Texture {
            width: spec.width,
            height: spec.height,
            channels: spec.channels,
            pixels,
            path: None,
        });
        self.dirty = true;
        Ok(())
    }

    fn state(&self) -> Value {
        let mut state = self.extras.clone();
        state.insert("properties".into(), Value::Object(self.globals.clone()));
        state.insert("views".into(), json!(self.views));
        state.insert(
            "objects".into(),
            self.objects.iter().map(|o| Value::Object(o.props.clone())).collect(),
        );
        state.insert(
            "colourmaps".into(),
            self.colourmaps.iter().map(MapRecord::to_json).collect(),
        );
        Value::Object(state)
    }

    fn figure_snapshot(&self) -> Value {
        let visible: Map<String, Value> = self
            .objects
            .iter()
            .map(|o| (o.name().to_string(), Value::Bool(o.is_visible())))
            .collect();
        json!({
            "properties": self.globals,
            "view": self.views.first().cloned().unwrap_or_default(),
            "visible": visible,
        })
    }

    fn apply_figure(&mut self, snapshot: &Value) {
        if let Some(props) = snapshot.get("properties").and_then(Value::as_object) {
            self.globals = props.clone();
        }
        if let Some(view) = snapshot.get("view").and_then(Value::as_object) {
            *self.view_mut() = view.clone();
        }
        if let Some(visible) = snapshot.get("visible").and_then(Value::as_object) {
            for obj in &mut self.objects {
                if let Some(flag) = visible.get(obj.name()).cloned() {
                    obj.props.insert("visible".into(), flag);
                }
            }
        }
        self.dirty = true;
    }

    fn save_figure(&mut self, name: &str) {
        let snapshot = self.figure_snapshot();
        match self.figures.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = snapshot,
            None => self.figures.push((name.to_string(), snapshot)),
        }
        self.current_figure = Some(name.to_string());
    }

    fn frame_size(&self, width: u32, height: u32) -> (u32, u32) {
        let default = self
            .globals
            .get("resolution")
            .and_then(Value::as_array)
            .and_then(|r| Some((r.first()?.as_u64()? as u32, r.get(1)?.as_u64()? as u32)))
            .filter(|(w, h)| *w > 0 && *h > 0)
            .unwrap_or(DEFAULT_RESOLUTION);
        match (width, height) {
            (0, 0) => default,
            (w, 0) => (w, ((w as u64 * default.1 as u64) / default.0 as u64).max(1) as u32),
            (0, h) => (((h as u64 * default.0 as u64) / default.1 as u64).max(1) as u32, h),
            (w, h) => (w, h),
        }
    }

    fn canvas(&self, width: u32, height: u32) -> Canvas {
        let background = self
            .globals
            .get("background")
            .and_then(|v| Colour::from_json(v).ok())
            .unwrap_or_else(Colour::black);
        let mut canvas = Canvas::new(width, height, background);
        let mut drawables = Vec::new();
        for obj in self.objects.iter().filter(|o| o.is_visible()) {
            let colour = obj
                .props
                .get("colour")
                .and_then(|v| Colour::from_json(v).ok())
                .unwrap_or(Colour::rgb(128, 128, 128));
            let size = obj
                .props
                .get("pointsize")
                .and_then(Value::as_f64)
                .unwrap_or(1.0)
                .max(1.0) as u32;
            for element in obj.elements_in(StepScope::CurrentWithFixed, self.current_step) {
                let colours = match element.u32s.get("colours") {
                    Some(packed) if !packed.is_empty() => {
                        packed.iter().map(|&c| Colour::from_u32(c)).collect()
                    }
                    _ => vec![colour],
                };
                drawables.push(Drawable {
                    vertices: element.vertices().to_vec(),
                    colours,
                    size,
                    segments: element.renderer == Renderer::Lines,
                });
            }
        }
        canvas.draw(&drawables, self.bounding_box(None, false));
        canvas
    }

    fn write_surface(
        &mut self,
        dst: ObjectId,
        surface: Surface,
        label: String,
        renderer: Renderer,
        clear: bool,
    ) -> BackendResult<()> {
        let step = self.load_step(dst)?;
        self.dirty = true;
        let next = &mut self.next_element;
        let obj = self
            .objects
            .iter_mut()
            .find(|o| o.id == dst)
            .ok_or_else(|| missing(dst))?;
        obj.props.insert("renderer".into(), Value::from(renderer.as_str()));
        if clear {
            obj.elements.clear();
            obj.texture = None;
            obj.props.remove("dims");
        }
        if surface.vertices.is_empty() {
            return Ok(());
        }
        obj.append_pending = !obj.elements.is_empty();
        let element = obj.target_element(step, next);
        element.renderer = renderer;
        element.f32s.insert("vertices".into(), surface.vertices);
        element
            .f32s
            .insert(storage_key(&DataLabel::values(label)), surface.values);
        element.labels = surface.labels;
        Ok(())
    }

    /// Value label to contour: `colourby` if present on the element, else the first
    fn surface_label(element: &Element, props: &Value, source: &ObjectRecord) -> Option<String> {
        let wanted = props
            .get("colourby")
            .or_else(|| source.props.get("colourby"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let labels = element.value_labels();
        match wanted {
            Some(w) if labels.iter().any(|l| l == w) => Some(w.to_string()),
            _ => labels.into_iter().next(),
        }
    }

    fn extract(
        &self,
        src: ObjectId,
        props: &Value,
        extract: impl Fn(&Lattice<'_>, &[f32]) -> Surface,
    ) -> BackendResult<(Surface, String)> {
        let source = self.object(src)?;
        let mut levels = isovalues(props);
        if levels.is_empty() {
            levels = isovalues(&Value::Object(source.props.clone()));
        }
        let mut out = Surface::default();
        let mut label = DataLabel::DEFAULT_VALUES.to_string();
        for element in source.elements_in(StepScope::CurrentWithFixed, self.current_step) {
            let Some(value_label) = Self::surface_label(element, props, source) else {
                continue;
            };
            let dims = if element.dims.is_set() {
                element.dims
            } else {
                source.declared_dims()
            };
            let values = element.values(&value_label).unwrap_or(&[]);
            let lattice = Lattice::new(
                [
                    dims.width().max(1) as usize,
                    dims.height().max(1) as usize,
                    dims.depth().max(1) as usize,
                ],
                values,
                element.vertices(),
            );
            let part = extract(&lattice, &levels);
            out.vertices.extend(part.vertices);
            out.values.extend(part.values);
            out.labels.extend(part.labels);
            label = value_label;
        }
        Ok((out, label))
    }

    fn execute_line(&mut self, line: &str) -> BackendResult<()> {
        self.journal.record(line);
        let (command, args) = script::split_command(line);
        let fail = |message: &str| BackendError::Script {
            line: line.to_string(),
            message: message.to_string(),
        };
        match command {
            "quit" => self.quit = true,
            "help" => info!("{}", self.help_command(args, false)),
            "open" | "file" => self.load_file(Path::new(args))?,
            "image" => {
                let path = if args.is_empty() { "image.png" } else { args };
                let request = ImageRequest {
                    format: ImageFormat::from_path(Path::new(path)),
                    ..ImageRequest::default()
                };
                let bytes = self.image(&request)?;
                fs::write(path, bytes)?;
            }
            "render" | "redraw" => self.render()?,
            "resize" => match script::numbers(args).as_slice() {
                [w, h, ..] => self.resize(*w as u32, *h as u32),
                _ => return Err(fail("expected width and height")),
            },
            "select" => {
                self.selected = if args.is_empty() {
                    None
                } else {
                    Some(self.find(args).ok_or_else(|| fail("no such object"))?)
                };
            }
            "hide" | "show" => {
                let visible = command == "show";
                let target = if args.is_empty() {
                    self.selected
                } else {
                    Some(self.find(args).ok_or_else(|| fail("no such object"))?)
                };
                match target {
                    Some(id) => {
                        self.object_mut(id)?
                            .props
                            .insert("visible".into(), Value::Bool(visible));
                        self.dirty = true;
                    }
                    None if visible => self.show(),
                    None => self.hide(),
                }
            }
            "delete" => {
                let id = if args.is_empty() {
                    self.selected.ok_or_else(|| fail("no object selected"))?
                } else {
                    self.find(args).ok_or_else(|| fail("no such object"))?
                };
                self.delete_object(id)?;
            }
            "clear" => match args {
                "" | "all" | "objects" => {
                    self.objects.clear();
                    self.selected = None;
                    self.dirty = true;
                }
                "data" => {
                    let id = self.selected.ok_or_else(|| fail("no object selected"))?;
                    self.clear_object(id)?;
                }
                _ => return Err(fail("expected objects or data")),
            },
            "rotate" | "translate" => {
                let key = if command == "rotate" { "xyzrotate" } else { "translate" };
                let (first, rest) = script::split_command(args);
                let mut delta = [0.0f64; 3];
                match script::axis(first) {
                    Some(axis) => {
                        delta[axis] = rest.parse().map_err(|_| fail("expected a number"))?;
                    }
                    None => match script::numbers(args).as_slice() {
                        [x, y, z, ..] => delta = [*x, *y, *z],
                        _ => return Err(fail("expected an axis and amount or three numbers")),
                    },
                }
                let view = self.view_mut();
                let mut current = as_vector(view.get(key), 3);
                for (c, d) in current.iter_mut().zip(delta) {
                    *c += d;
                }
                view.insert(key.into(), Value::from(current));
                self.dirty = true;
            }
            "zoom" => {
                let factor = script::numbers(args)
                    .first()
                    .copied()
                    .ok_or_else(|| fail("expected a factor"))?;
                let view = self.view_mut();
                let zoom = view.get("zoom").and_then(Value::as_f64).unwrap_or(1.0);
                view.insert("zoom".into(), Value::from(zoom * factor));
                self.dirty = true;
            }
            "reset" => {
                *self.view_mut() = default_view();
                self.update_bounding_box();
                self.dirty = true;
            }
            "background" => {
                Colour::parse(args).map_err(|e| fail(&e.to_string()))?;
                self.globals.insert("background".into(), Value::from(args));
                self.dirty = true;
            }
            "figure" => {
                if args.is_empty() {
                    return Err(fail("expected a figure name"));
                }
                match self.figures.iter().find(|(n, _)| n == args).map(|(_, s)| s.clone()) {
                    Some(snapshot) => {
                        self.apply_figure(&snapshot);
                        self.current_figure = Some(args.to_string());
                    }
                    None => self.save_figure(args),
                }
            }
            "savefigure" => {
                let name = if args.is_empty() {
                    self.current_figure
                        .clone()
                        .unwrap_or_else(|| format!("fig{}", self.figures.len()))
                } else {
                    args.to_string()
                };
                self.save_figure(&name);
            }
            "timestep" => {
                let step = args.parse().map_err(|_| fail("expected a step"))?;
                self.set_time_step(step)?;
            }
            "next" => {
                if let Some(&step) = self.steps.iter().find(|&&s| s > self.current_step) {
                    self.set_time_step(step)?;
                }
            }
            "key" | "mouse" => self.dirty = true,
            _ if line.contains('=') => self.parse_property(line, None)?,
            _ => return Err(fail("unknown command")),
        }
        Ok(())
    }
}

impl Backend for HeadlessBackend {
    fn run(&mut self, argv: &[String]) -> BackendResult<()> {
        debug!(?argv, "headless backend starting");
        self.running = true;
        let mut figure = None;
        for arg in argv {
            if let Some(flag) = arg.strip_prefix('-').filter(|f| !f.is_empty()) {
                let (opt, value) = flag.split_at(flag.chars().next().map_or(0, char::len_utf8));
                match opt {
                    "x" | "r" => match script::numbers(value).as_slice() {
                        [w, h, ..] => self.resize(*w as u32, *h as u32),
                        _ => warn!(arg = %arg, "ignoring malformed resolution"),
                    },
                    "z" => {
                        if let Ok(q) = value.parse::<u32>() {
                            self.globals.insert("quality".into(), Value::from(q));
                        }
                    }
                    "h" => self.hidden = true,
                    "f" => figure = Some(value.to_string()),
                    _ if flag.parse::<i32>().is_ok() => {
                        // Start at step -N
                        if let Ok(step) = flag.parse::<i32>() {
                            self.set_time_step(step)?;
                        }
                    }
                    _ => debug!(arg = %arg, "ignoring option"),
                }
            } else if arg.contains('=') {
                self.parse_property(arg, None)?;
            } else if Path::new(arg).exists() {
                self.load_file(Path::new(arg))?;
            } else if script::lookup(script::split_command(arg).0).is_some() {
                self.execute_line(arg)?;
            } else {
                warn!(arg = %arg, "ignoring unrecognised argument");
            }
        }
        if let Some(name) = figure {
            self.execute_line(&format!("figure {}", name))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.running = false;
        self.quit = true;
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.queue.clear();
        for obj in &mut self.objects {
            obj.texture = None;
        }
    }

    fn render(&mut self) -> BackendResult<()> {
        self.frames += 1;
        self.dirty = false;
        Ok(())
    }

    fn display(&mut self) -> BackendResult<()> {
        if self.dirty {
            self.render()?;
        }
        Ok(())
    }

    fn events(&mut self) -> bool {
        !self.quit
    }

    fn execute(&mut self) -> BackendResult<bool> {
        let mut ran = false;
        while let Some(line) = self.queue.pop_front() {
            if let Err(err) = self.execute_line(&line) {
                warn!(error = %err, "queued command failed");
            }
            ran = true;
        }
        Ok(ran)
    }

    fn show(&mut self) {
        self.hidden = false;
    }

    fn hide(&mut self) {
        self.hidden = true;
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.globals
                .insert("resolution".into(), json!([width, height]));
            self.dirty = true;
        }
    }

    fn create_object(&mut self, props: &Value) -> BackendResult<ObjectId> {
        let mut map = props.as_object().cloned().unwrap_or_default();
        let name = match map.get("name").and_then(Value::as_str) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("object{}", self.objects.len() + 1),
        };
        if let Some(existing) = self.objects.iter_mut().find(|o| o.name() == name) {
            existing.props.extend(map);
            return Ok(existing.id);
        }
        map.insert("name".into(), Value::from(name));
        self.next_object += 1;
        let id = ObjectId(self.next_object);
        self.objects.push(ObjectRecord::new(id, map));
        self.dirty = true;
        Ok(id)
    }

    fn set_object(&mut self, id: ObjectId, props: &Value) -> BackendResult<()> {
        let obj = self.object_mut(id)?;
        if let Some(map) = props.as_object() {
            obj.props.extend(map.clone());
        }
        self.dirty = true;
        Ok(())
    }

    fn get_object(&self, key: ObjectKey<'_>) -> Option<ObjectId> {
        match key {
            ObjectKey::Index(i) => self.objects.get(i).map(|o| o.id),
            ObjectKey::Name(name) => self.objects.iter().find(|o| o.name() == name).map(|o| o.id),
        }
    }

    fn object_name(&self, id: ObjectId) -> Option<String> {
        self.object(id).ok().map(|o| o.name().to_string())
    }

    fn delete_object(&mut self, id: ObjectId) -> BackendResult<()> {
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        if self.objects.len() == before {
            return Err(missing(id));
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.dirty = true;
        Ok(())
    }

    fn colour_bar(&mut self, target: Option<ObjectId>) -> BackendResult<ObjectId> {
        let source = match target.or(self.selected) {
            Some(id) => Some(self.object(id)?),
            None => None,
        };
        let mut props = json!({"colourbar": true});
        match source {
            Some(obj) => {
                props["name"] = Value::from(format!("{}_colourbar", obj.name()));
                if let Some(map) = obj.props.get("colourmap") {
                    props["colourmap"] = map.clone();
                }
            }
            None => props["name"] = Value::from("colourbar"),
        }
        self.create_object(&props)
    }

    fn clear_object(&mut self, id: ObjectId) -> BackendResult<()> {
        let obj = self.object_mut(id)?;
        obj.elements.clear();
        obj.append_pending = false;
        self.dirty = true;
        Ok(())
    }

    fn clear_all(&mut self, objects: bool, colourmaps: bool) -> BackendResult<()> {
        if objects {
            self.objects.clear();
            self.selected = None;
        } else {
            for obj in &mut self.objects {
                obj.elements.clear();
                obj.append_pending = false;
            }
        }
        if colourmaps {
            self.colourmaps.clear();
        }
        self.dirty = true;
        Ok(())
    }

    fn clear_data(&mut self, id: ObjectId, role: DataRole) -> BackendResult<()> {
        let obj = self.object_mut(id)?;
        for element in &mut obj.elements {
            match role {
                DataRole::Values => {
                    element.f32s.retain(|k, _| !k.starts_with("values:"));
                }
                other => element.remove_label(&DataLabel::Role(other)),
            }
        }
        obj.elements.retain(|e| !e.is_empty());
        self.dirty = true;
        Ok(())
    }

    fn clear_values(&mut self, id: ObjectId, label: &str) -> BackendResult<()> {
        let obj = self.object_mut(id)?;
        let label = DataLabel::values(label);
        for element in &mut obj.elements {
            element.remove_label(&label);
        }
        self.dirty = true;
        Ok(())
    }

    fn reload_object(&mut self, id: ObjectId) -> BackendResult<()> {
        self.object(id)?;
        self.dirty = true;
        Ok(())
    }

    fn append_to_object(&mut self, id: ObjectId) -> BackendResult<()> {
        let step = self.load_step(id)?;
        self.object_mut(id)?.append(step);
        Ok(())
    }

    fn object_data_labels(&self, id: ObjectId) -> BackendResult<Vec<String>> {
        let obj = self.object(id)?;
        let mut labels: Vec<String> = Vec::new();
        for label in obj.elements.iter().flat_map(Element::value_labels) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    fn bounding_box(&self, id: Option<ObjectId>, all_steps: bool) -> [[f32; 3]; 2] {
        let scope = if all_steps {
            None
        } else {
            Some(StepScope::CurrentWithFixed)
        };
        let current = self.current_step;
        let boxes: Vec<[[f32; 3]; 2]> = match id {
            Some(id) => self
                .object(id)
                .ok()
                .and_then(|o| o.bounds(scope, current))
                .into_iter()
                .collect(),
            None => self
                .objects
                .iter()
                .filter(|o| o.is_visible())
                .filter_map(|o| o.bounds(scope, current))
                .collect(),
        };
        merge_bounds(boxes).unwrap_or([[0.0; 3]; 2])
    }

    fn update_bounding_box(&mut self) {
        let [min, max] = self.bounding_box(None, false);
        let view = self.view_mut();
        view.insert("min".into(), json!(min));
        view.insert("max".into(), json!(max));
        self.dirty = true;
    }

    fn value_range(&self, id: ObjectId, label: &str) -> Option<(f64, f64)> {
        self.object(id)
            .ok()?
            .value_range(label, StepScope::CurrentWithFixed, self.current_step)
    }

    fn add_time_step(&mut self, step: i32, props: &Value) -> BackendResult<()> {
        let step = if step < 0 {
            self.steps.last().map_or(0, |last| last + 1)
        } else {
            step
        };
        if let Err(pos) = self.steps.binary_search(&step) {
            self.steps.insert(pos, step);
        }
        if let Some(map) = props.as_object() {
            self.globals.extend(map.clone());
        }
        self.current_step = step;
        self.globals.insert("timestep".into(), Value::from(step));
        Ok(())
    }

    fn time_steps(&self) -> Vec<i32> {
        self.steps.clone()
    }

    fn time_step(&self) -> i32 {
        self.current_step
    }

    fn set_time_step(&mut self, step: i32) -> BackendResult<()> {
        if self.steps.is_empty() {
            return Ok(());
        }
        // Jump to the nearest known step at or before the request
        let chosen = self
            .steps
            .iter()
            .rev()
            .find(|&&s| s <= step)
            .or_else(|| self.steps.first())
            .copied()
            .unwrap_or(step);
        self.current_step = chosen;
        self.globals.insert("timestep".into(), Value::from(chosen));
        self.dirty = true;
        Ok(())
    }

    fn array_f32(
        &mut self,
        id: ObjectId,
        data: &[f32],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()> {
        let grid = self.object(id)?.renderer() == Renderer::Grid;
        let element = self.target(id, dims)?;
        let corners = grid
            && *label == DataLabel::Role(DataRole::Vertices)
            && data.len() == 12
            && element.dims.product() > 4;
        let data = if corners {
            expand_grid_corners(
                data,
                element.dims.width().max(1) as usize,
                element.dims.height().max(1) as usize,
            )
        } else {
            data.to_vec()
        };
        element.f32s.entry(storage_key(label)).or_default().extend(data);
        Ok(())
    }

    fn array_u32(
        &mut self,
        id: ObjectId,
        data: &[u32],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()> {
        let element = self.target(id, dims)?;
        element
            .u32s
            .entry(storage_key(label))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn array_u8(
        &mut self,
        id: ObjectId,
        data: &[u8],
        label: &DataLabel,
        dims: Dims,
    ) -> BackendResult<()> {
        let element = self.target(id, dims)?;
        element
            .u8s
            .entry(storage_key(label))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn load_labels(&mut self, id: ObjectId, labels: &[String]) -> BackendResult<()> {
        let element = self.target(id, Dims::default())?;
        element.labels.extend(labels.iter().cloned());
        Ok(())
    }

    fn load_colours(&mut self, id: ObjectId, colours: &[String]) -> BackendResult<()> {
        let packed = colours
            .iter()
            .map(|c| {
                Colour::parse(c).map(|c| c.to_u32()).map_err(|e| BackendError::Script {
                    line: c.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<BackendResult<Vec<u32>>>()?;
        self.array_u32(id, &packed, &DataLabel::Role(DataRole::Colours), Dims::default())
    }

    fn load_triangles(&mut self, id: ObjectId, vertices: &[f32], split: u32) -> BackendResult<()> {
        let data = tessellate(vertices, split);
        self.array_f32(id, &data, &DataLabel::Role(DataRole::Vertices), Dims::default())
    }

    fn texture_u32(&mut self, id: ObjectId, data: &[u32], spec: &TextureSpec) -> BackendResult<()> {
        let pixels: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let spec = TextureSpec {
            channels: 4,
            ..spec.clone()
        };
        self.store_texture(id, pixels, &spec)
    }

    fn texture_u8(&mut self, id: ObjectId, data: &[u8], spec: &TextureSpec) -> BackendResult<()> {
        self.store_texture(id, data.to_vec(), spec)
    }

    fn set_texture(&mut self, id: ObjectId, path: &Path) -> BackendResult<()> {
        let image = raster::load(path)?;
        let obj = self.object_mut(id)?;
        let path_text = path.display().to_string();
        obj.props.insert("texture".into(), Value::from(path_text.clone()));
        obj.texture = Some(Texture {
            width: image.width,
            height: image.height,
            channels: image.channels,
            pixels: image.pixels,
            path: Some(path_text),
        });
        self.dirty = true;
        Ok(())
    }

    fn clear_texture(&mut self, id: ObjectId) -> BackendResult<()> {
        let obj = self.object_mut(id)?;
        obj.texture = None;
        obj.props.remove("texture");
        self.dirty = true;
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> BackendResult<()> {
        let load_error = |message: String| BackendError::Load {
            path: path.to_path_buf(),
            message,
        };
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => {
                let text = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
                self.set_state(&text)
            }
            "script" | "lv" | "txt" => {
                let text = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
                self.parse_commands(&text)
            }
            "png" | "jpg" | "jpeg" => match self.selected {
                Some(id) => self.set_texture(id, path),
                None => Err(load_error("select an object to load a texture".into())),
            },
            other => Err(BackendError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }

    fn geometry(&self, id: ObjectId, scope: StepScope) -> BackendResult<Vec<ElementInfo>> {
        let obj = self.object(id)?;
        Ok(obj
            .elements_in(scope, self.current_step)
            .map(|e| e.info(id))
            .collect())
    }

    fn view_f32(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[f32]> {
        let element = self.element(element)?;
        Ok(element.f32s.get(&storage_key(label)).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn view_u32(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[u32]> {
        let element = self.element(element)?;
        Ok(element.u32s.get(&storage_key(label)).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn view_u8(&self, element: ElementId, label: &DataLabel) -> BackendResult<&[u8]> {
        let element = self.element(element)?;
        Ok(element.u8s.get(&storage_key(label)).map(Vec::as_slice).unwrap_or(&[]))
    }

    fn write_f32(
        &mut self,
        element: ElementId,
        label: &DataLabel,
        data: &[f32],
    ) -> BackendResult<()> {
        self.element_mut(element)?
            .f32s
            .insert(storage_key(label), data.to_vec());
        Ok(())
    }

    fn write_u32(
        &mut self,
        element: ElementId,
        label: &DataLabel,
        data: &[u32],
    ) -> BackendResult<()> {
        self.element_mut(element)?
            .u32s
            .insert(storage_key(label), data.to_vec());
        Ok(())
    }

    fn write_u8(
        &mut self,
        element: ElementId,
        label: &DataLabel,
        data: &[u8],
    ) -> BackendResult<()> {
        self.element_mut(element)?
            .u8s
            .insert(storage_key(label), data.to_vec());
        Ok(())
    }

    fn set_element_dims(&mut self, element: ElementId, dims: Dims) -> BackendResult<()> {
        self.element_mut(element)?.dims = dims;
        Ok(())
    }

    fn add_colour_map(&mut self, name: &str) -> BackendResult<()> {
        if !self.colourmaps.iter().any(|m| m.name == name) {
            self.colourmaps.push(MapRecord {
                name: name.to_string(),
                palette: Palette::default(),
                props: Map::new(),
            });
        }
        Ok(())
    }

    fn update_colour_map(&mut self, name: &str, palette: &str, props: &Value) -> BackendResult<()> {
        let parsed = Palette::parse(palette).map_err(|e| BackendError::Script {
            line: palette.to_string(),
            message: e.to_string(),
        })?;
        self.add_colour_map(name)?;
        if let Some(map) = self.colourmaps.iter_mut().find(|m| m.name == name) {
            map.palette = parsed;
            if let Some(extra) = props.as_object() {
                map.props.extend(extra.clone());
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn colour_map(&self, name: &str) -> Option<String> {
        self.colourmaps
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.palette.to_string())
    }

    fn flip_colour_map(&mut self, name: &str) -> BackendResult<()> {
        let map = self
            .colourmaps
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| BackendError::MissingObject {
                name: name.to_string(),
            })?;
        map.palette.flip();
        self.dirty = true;
        Ok(())
    }

    fn monochrome_colour_map(&mut self, name: &str) -> BackendResult<()> {
        let map = self
            .colourmaps
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| BackendError::MissingObject {
                name: name.to_string(),
            })?;
        map.palette.monochrome();
        self.dirty = true;
        Ok(())
    }

    fn default_map_names(&self) -> Vec<String> {
        defaults::NAMES.iter().map(|n| n.to_string()).collect()
    }

    fn default_map(&self, name: &str) -> Option<String> {
        defaults::text(name)
    }

    fn parse_commands(&mut self, commands: &str) -> BackendResult<()> {
        for line in script::split_lines(commands) {
            self.execute_line(line)?;
        }
        Ok(())
    }

    fn queue_commands(&mut self, commands: &str) {
        self.queue
            .extend(script::split_lines(commands).into_iter().map(str::to_string));
    }

    fn parse_property(&mut self, assignment: &str, target: Option<ObjectId>) -> BackendResult<()> {
        let (name, raw) = assignment
            .split_once('=')
            .ok_or_else(|| BackendError::Script {
                line: assignment.to_string(),
                message: "expected name=value".into(),
            })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(BackendError::Script {
                line: assignment.to_string(),
                message: "missing property name".into(),
            });
        }
        let raw = raw.trim();
        // Bare words are taken as strings
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        let scope = schema::scope_of(name);
        let target = target.or(if scope == Some("object") { self.selected } else { None });
        match target {
            Some(id) => {
                self.object_mut(id)?.props.insert(name.to_string(), value);
            }
            None if scope == Some("view") => {
                self.view_mut().insert(name.to_string(), value);
            }
            None if name == "timestep" => {
                let step = value.as_i64().unwrap_or(-1) as i32;
                self.set_time_step(step)?;
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn help_command(&self, name: &str, markdown: bool) -> String {
        if let Some(info) = script::lookup(name.trim()) {
            return script::help_text(info, markdown);
        }
        if let Some(doc) = schema::property_list()
            .get(name.trim())
            .and_then(|p| p.get("doc"))
            .and_then(Value::as_str)
        {
            return format!("{}: {}\n", name.trim(), doc);
        }
        if name.trim().is_empty() {
            return self.command_list(None).join(" ");
        }
        format!("No help for '{}'\n", name.trim())
    }

    fn command_list(&self, category: Option<&str>) -> Vec<String> {
        script::COMMANDS
            .iter()
            .filter(|c| category.map_or(true, |cat| c.category.eq_ignore_ascii_case(cat)))
            .map(|c| c.name.to_string())
            .collect()
    }

    fn command_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for c in script::COMMANDS {
            if !categories.iter().any(|n| n == c.category) {
                categories.push(c.category.to_string());
            }
        }
        categories
    }

    fn get_state(&self) -> String {
        self.state().to_string()
    }

    fn set_state(&mut self, json: &str) -> BackendResult<()> {
        let state: Value = serde_json::from_str(json).map_err(|e| BackendError::Script {
            line: "state".into(),
            message: e.to_string(),
        })?;
        if let Some(props) = state.get("properties").and_then(Value::as_object) {
            self.globals = props.clone();
        }
        if let Some(top) = state.as_object() {
            self.extras = top
                .iter()
                .filter(|(k, _)| !STATE_SECTIONS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        if let Some(views) = state.get("views").and_then(Value::as_array) {
            self.views = views.iter().filter_map(Value::as_object).cloned().collect();
            if self.views.is_empty() {
                self.views.push(default_view());
            }
        }
        if let Some(objects) = state.get("objects").and_then(Value::as_array) {
            let mut keep = Vec::with_capacity(objects.len());
            for entry in objects.iter().filter(|e| e.is_object()) {
                let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
                let existing = self
                    .objects
                    .iter()
                    .position(|o| !name.is_empty() && o.name() == name);
                let id = match existing {
                    Some(index) => {
                        let obj = &mut self.objects[index];
                        obj.props = entry.as_object().cloned().unwrap_or_default();
                        obj.id
                    }
                    None => self.create_object(entry)?,
                };
                keep.push(id);
            }
            self.objects.retain(|o| keep.contains(&o.id));
            if self.selected.is_some_and(|id| !keep.contains(&id)) {
                self.selected = None;
            }
        }
        if let Some(maps) = state.get("colourmaps").and_then(Value::as_array) {
            for entry in maps {
                let Some(name) = entry.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let palette = match entry.get("colours") {
                    Some(Value::String(text)) => Palette::parse(text).ok(),
                    Some(stops) => Palette::from_json(stops).ok(),
                    None => None,
                }
                .unwrap_or_default();
                let mut props = entry.as_object().cloned().unwrap_or_default();
                props.remove("name");
                props.remove("colours");
                let record = MapRecord {
                    name: name.to_string(),
                    palette,
                    props,
                };
                match self.colourmaps.iter_mut().find(|m| m.name == name) {
                    Some(existing) => *existing = record,
                    None => self.colourmaps.push(record),
                }
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn property_list(&self) -> String {
        schema::property_list().to_string()
    }

    fn figure_names(&self) -> Vec<String> {
        self.figures.iter().map(|(n, _)| n.clone()).collect()
    }

    fn contour(
        &mut self,
        dst: ObjectId,
        src: ObjectId,
        props: &Value,
        labels: bool,
        clear: bool,
    ) -> BackendResult<()> {
        let (surface, label) = self.extract(src, props, |lattice, levels| {
            marching_squares(lattice, levels, labels)
        })?;
        debug!(vertices = surface.vertices.len() / 3, "contour extracted");
        self.write_surface(dst, surface, label, Renderer::Lines, clear)
    }

    fn iso_surface(
        &mut self,
        dst: ObjectId,
        src: ObjectId,
        props: &Value,
        clear: bool,
    ) -> BackendResult<()> {
        let (surface, label) = self.extract(src, props, marching_tetrahedra)?;
        debug!(vertices = surface.vertices.len() / 3, "isosurface extracted");
        self.write_surface(dst, surface, label, Renderer::Triangles, clear)
    }

    fn image(&mut self, request: &ImageRequest) -> BackendResult<Vec<u8>> {
        let (width, height) = self.frame_size(request.width, request.height);
        self.render()?;
        self.canvas(width, height)
            .encode(request.format, request.quality, request.transparent)
    }

    fn image_buffer(&mut self, width: u32, height: u32, channels: u32) -> BackendResult<RawImage> {
        let (width, height) = self.frame_size(width, height);
        self.render()?;
        self.canvas(width, height).raw(channels)
    }

    fn image_diff(&mut self, a: &Path, b: &Path) -> BackendResult<f32> {
        let (a, b) = (raster::load(a)?, raster::load(b)?);
        Ok(raster::diff(&a, &b))
    }

    fn image_from_file(&mut self, path: &Path) -> BackendResult<RawImage> {
        raster::load(path)
    }

    fn raw_image_write(&mut self, image: &RawImage, path: &Path) -> BackendResult<()> {
        raster::save(image, path)
    }

    fn web(&mut self) -> BackendResult<String> {
        let mut state = self.state();
        let objects: Vec<Value> = self
            .objects
            .iter()
            .map(|obj| {
                let elements: Vec<Value> = obj
                    .elements_in(StepScope::CurrentWithFixed, self.current_step)
                    .map(|e| {
                        let values: Map<String, Value> = e
                            .value_labels()
                            .into_iter()
                            .map(|label| {
                                let data = e.values(&label).unwrap_or(&[]).to_vec();
                                (label, json!(data))
                            })
                            .collect();
                        json!({
                            "renderer": e.renderer.as_str(),
                            "step": e.step,
                            "dims": e.dims.to_json(),
                            "vertices": e.vertices(),
                            "colours": e.u32s.get("colours").cloned().unwrap_or_default(),
                            "values": values,
                        })
                    })
                    .collect();
                let mut props = obj.props.clone();
                props.insert("elements".into(), Value::from(elements));
                if let Some(texture) = &obj.texture {
                    props.insert(
                        "image".into(),
                        json!({
                            "width": texture.width,
                            "height": texture.height,
                            "channels": texture.channels,
                            "size": texture.pixels.len(),
                            "path": texture.path,
                        }),
                    );
                }
                Value::Object(props)
            })
            .collect();
        state["objects"] = Value::from(objects);
        Ok(state.to_string())
    }

    fn gl_version(&self) -> String {
        "headless".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(name: &str, renderer: &str) -> (HeadlessBackend, ObjectId) {
        let mut backend = HeadlessBackend::new();
        let id = backend
            .create_object(&json!({"name": name, "renderer": renderer}))
            .unwrap();
        (backend, id)
    }

    #[test]
    fn test_create_object_is_idempotent() {
        let (mut backend, id) = backend_with("pts", "points");
        let again = backend.create_object(&json!({"name": "pts"})).unwrap();
        assert_eq!(id, again);
        assert_eq!(backend.get_object(ObjectKey::Index(0)), Some(id));
        assert_eq!(backend.get_object(ObjectKey::Name("nope")), None);
    }

    #[test]
    fn test_state_has_sections() {
        let backend = HeadlessBackend::new();
        let state: Value = serde_json::from_str(&backend.get_state()).unwrap();
        for key in ["properties", "views", "objects", "colourmaps"] {
            assert!(state.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_set_state_removes_unlisted_objects() {
        let (mut backend, _) = backend_with("a", "points");
        backend.create_object(&json!({"name": "b"})).unwrap();
        backend
            .set_state(r#"{"objects": [{"name": "b", "renderer": "lines"}]}"#)
            .unwrap();
        assert!(backend.get_object(ObjectKey::Name("a")).is_none());
        let b = backend.get_object(ObjectKey::Name("b")).unwrap();
        assert_eq!(backend.object(b).unwrap().renderer(), Renderer::Lines);
    }

    #[test]
    fn test_grid_corner_expansion() {
        let (mut backend, id) = backend_with("grid", "grid");
        let corners = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        backend
            .array_f32(id, &corners, &DataLabel::Role(DataRole::Vertices), Dims::new(3, 3, 0))
            .unwrap();
        let info = backend.geometry(id, StepScope::default()).unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].count, 9);
    }

    #[test]
    fn test_append_starts_new_element() {
        let (mut backend, id) = backend_with("lines", "lines");
        let label = DataLabel::Role(DataRole::Vertices);
        backend.array_f32(id, &[0.0; 6], &label, Dims::default()).unwrap();
        backend.append_to_object(id).unwrap();
        backend.append_to_object(id).unwrap();
        backend.array_f32(id, &[1.0; 6], &label, Dims::default()).unwrap();
        assert_eq!(backend.geometry(id, StepScope::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_property_routing() {
        let (mut backend, id) = backend_with("pts", "points");
        backend.parse_property("zoom=2.5", None).unwrap();
        backend.parse_property("opacity=0.5", Some(id)).unwrap();
        backend.parse_property("title=hello world", None).unwrap();
        let state: Value = serde_json::from_str(&backend.get_state()).unwrap();
        assert_eq!(state["views"][0]["zoom"], json!(2.5));
        assert_eq!(state["objects"][0]["opacity"], json!(0.5));
        assert_eq!(state["properties"]["title"], json!("hello world"));
    }

    #[test]
    fn test_script_journal_and_errors() {
        let (mut backend, _) = backend_with("pts", "points");
        let journal = backend.journal();
        backend.parse_commands("select pts\nopacity=0.25; rotate y 90").unwrap();
        assert_eq!(journal.entries(), vec!["select pts", "opacity=0.25", "rotate y 90"]);
        let state: Value = serde_json::from_str(&backend.get_state()).unwrap();
        assert_eq!(state["objects"][0]["opacity"], json!(0.25));
        assert_eq!(state["views"][0]["xyzrotate"], json!([0.0, 90.0, 0.0]));
        assert!(matches!(
            backend.parse_commands("frobnicate"),
            Err(BackendError::Script { .. })
        ));
    }

    #[test]
    fn test_queue_runs_on_execute() {
        let mut backend = HeadlessBackend::new();
        backend.queue_commands("background white\nquit");
        assert!(backend.events());
        assert!(backend.execute().unwrap());
        assert!(!backend.events());
        assert!(!backend.execute().unwrap());
    }

    #[test]
    fn test_time_steps() {
        let mut backend = HeadlessBackend::new();
        backend.add_time_step(-1, &Value::Null).unwrap();
        backend.add_time_step(5, &Value::Null).unwrap();
        assert_eq!(backend.time_steps(), vec![0, 5]);
        assert_eq!(backend.time_step(), 5);
        backend.set_time_step(3).unwrap();
        assert_eq!(backend.time_step(), 0);
    }

    #[test]
    fn test_contour_convert() {
        let (mut backend, id) = backend_with("grid", "grid");
        backend.set_object(id, &json!({"dims": [3, 3]})).unwrap();
        let corners = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        backend
            .array_f32(id, &corners, &DataLabel::Role(DataRole::Vertices), Dims::default())
            .unwrap();
        let values = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        backend
            .array_f32(id, &values, &DataLabel::values("v"), Dims::default())
            .unwrap();
        backend
            .contour(id, id, &json!({"isovalues": [0.5]}), false, true)
            .unwrap();
        let info = backend.geometry(id, StepScope::default()).unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].renderer, Renderer::Lines);
        assert_eq!(info[0].count, 8);
        assert_eq!(backend.object(id).unwrap().renderer(), Renderer::Lines);
    }

    #[test]
    fn test_colour_maps() {
        let mut backend = HeadlessBackend::new();
        backend
            .update_colour_map("cm", "red blue", &json!({"logscale": true}))
            .unwrap();
        backend.flip_colour_map("cm").unwrap();
        let text = backend.colour_map("cm").unwrap();
        assert!(text.starts_with("0=rgba(0,0,255,1)"));
        let state: Value = serde_json::from_str(&backend.get_state()).unwrap();
        assert_eq!(state["colourmaps"][0]["logscale"], json!(true));
        assert!(backend.flip_colour_map("missing").is_err());
    }

    #[test]
    fn test_image_jpeg() {
        let (mut backend, id) = backend_with("pts", "points");
        backend
            .array_f32(
                id,
                &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
                &DataLabel::Role(DataRole::Vertices),
                Dims::default(),
            )
            .unwrap();
        let request = ImageRequest {
            width: 64,
            height: 48,
            format: ImageFormat::Jpeg,
            ..ImageRequest::default()
        };
        let bytes = backend.image(&request).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(backend.frames_rendered(), 1);
        let raw = backend.image_buffer(0, 0, 3).unwrap();
        assert_eq!((raw.width, raw.height), (640, 480));
    }

    #[test]
    fn test_figures() {
        let (mut backend, _) = backend_with("pts", "points");
        backend.parse_commands("savefigure one\nhide pts\nsavefigure two").unwrap();
        backend.parse_commands("figure one").unwrap();
        assert_eq!(backend.figure_names(), vec!["one", "two"]);
        let state: Value = serde_json::from_str(&backend.get_state()).unwrap();
        assert_eq!(state["objects"][0]["visible"], json!(true));
    }
}
