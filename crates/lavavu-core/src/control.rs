//! Control requests
//!
//! The text dialect shared by every remote control surface. A request is
//! plain script unless it starts with one of these prefixes:
//!
//! - `_` the rest is base64 and is decoded before anything else
//! - `<name>` select object `name`, then handle the remainder
//! - `.method arg` call a session (or selected object) method with the
//!   rest of the line as a single string argument
//! - `$id key value` set `key` on a registered [`PropertyCollection`],
//!   `value` being JSON
//!
//! Unknown methods fall back to script.

use base64::Engine;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LavaVuResult, ValidationError};
use crate::object::Object;
use crate::session::SessionCore;

/// A parsed control request
#[derive(Clone, Debug, PartialEq)]
pub enum ControlRequest {
    Script(String),
    /// Run `rest` as script with `object` selected
    Select { object: String, rest: String },
    MethodCall {
        object: Option<String>,
        method: String,
        arg: String,
    },
    CollectionSet { id: String, key: String, value: Value },
}

impl ControlRequest {
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let decoded;
        let mut text = text;
        if let Some(encoded) = text.strip_prefix('_') {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ValidationError::InvalidArgument {
                    message: format!("bad base64 request: {}", e),
                })?;
            decoded = String::from_utf8(bytes).map_err(|e| ValidationError::InvalidArgument {
                message: format!("request is not utf-8: {}", e),
            })?;
            text = &decoded;
        }

        let mut object = None;
        if let Some(rest) = text.strip_prefix('<') {
            let (name, rest) = rest.split_once('>').ok_or_else(|| ValidationError::InvalidArgument {
                message: format!("unterminated object name in {:?}", text),
            })?;
            object = Some(name.trim().to_string());
            text = rest;
        }

        if let Some(call) = text.strip_prefix('.') {
            let (method, arg) = call.split_once(' ').unwrap_or((call, ""));
            return Ok(ControlRequest::MethodCall {
                object,
                method: method.trim().to_string(),
                arg: arg.trim().to_string(),
            });
        }
        if let Some(object) = object {
            return Ok(ControlRequest::Select {
                object,
                rest: text.to_string(),
            });
        }
        if let Some(set) = text.strip_prefix('$') {
            let mut parts = set.splitn(3, char::is_whitespace);
            let id = parts.next().unwrap_or_default().to_string();
            let key = parts.next().unwrap_or_default().to_string();
            if id.is_empty() || key.is_empty() {
                return Err(ValidationError::InvalidArgument {
                    message: format!("expected $id key value, got {:?}", text),
                });
            }
            let raw = parts.next().unwrap_or_default().trim();
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
            return Ok(ControlRequest::CollectionSet { id, key, value });
        }
        Ok(ControlRequest::Script(text.to_string()))
    }
}

type Callback = Box<dyn Fn(&str, &Value) + Send + Sync>;

/// Named values edited by remote controls
///
/// Sessions hold collections weakly, by id; the callback runs after each
/// remote write with the key and new value.
pub struct PropertyCollection {
    id: String,
    values: Mutex<Map<String, Value>>,
    callback: Option<Callback>,
}

impl PropertyCollection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Mutex::new(Map::new()),
            callback: None,
        }
    }

    pub fn with_callback(
        mut self,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.clone());
        if let Some(callback) = &self.callback {
            callback(key, &value);
        }
    }

    pub fn values(&self) -> Map<String, Value> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl fmt::Debug for PropertyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCollection")
            .field("id", &self.id)
            .field("values", &self.values())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

fn number<T: std::str::FromStr>(arg: &str, method: &str) -> LavaVuResult<T> {
    arg.trim().parse().map_err(|_| {
        ValidationError::InvalidArgument {
            message: format!("{} expects a number, got {:?}", method, arg),
        }
        .into()
    })
}

fn optional_path(arg: &str) -> Option<&Path> {
    let arg = arg.trim();
    (!arg.is_empty()).then(|| Path::new(arg))
}

impl SessionCore {
    /// Parse and execute one control request
    pub fn control(&self, text: &str) -> LavaVuResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let request = ControlRequest::parse(text)?;
        self.execute_request(&request)
    }

    fn existing_object(&self, name: &str) -> LavaVuResult<Object> {
        self.object_id(name)?;
        self.object(name)
    }

    pub fn execute_request(&self, request: &ControlRequest) -> LavaVuResult<()> {
        debug!(?request, "control");
        match request {
            ControlRequest::Script(text) => self.commands(text),
            ControlRequest::Select { object, rest } => {
                self.existing_object(object)?.select()?;
                self.commands(rest)
            }
            ControlRequest::MethodCall { object: Some(name), method, arg } => {
                let object = self.existing_object(name)?;
                if !self.object_method(&object, method, arg)? {
                    object.select()?;
                    self.commands(&format!("{} {}", method, arg))?;
                }
                Ok(())
            }
            ControlRequest::MethodCall { object: None, method, arg } => {
                if !self.session_method(method, arg)? {
                    self.commands(&format!("{} {}", method, arg))?;
                }
                Ok(())
            }
            ControlRequest::CollectionSet { id, key, value } => match self.collection(id) {
                Some(collection) => {
                    collection.set(key, value.clone());
                    Ok(())
                }
                None => {
                    warn!(id = %id, "no property collection");
                    Ok(())
                }
            },
        }
    }

    /// Session methods reachable from `.method`; false when unknown
    fn session_method(&self, method: &str, arg: &str) -> LavaVuResult<bool> {
        match method {
            "render" => self.render()?,
            "image" => {
                self.image(optional_path(arg), None, false)?;
            }
            "store" => self.store(optional_path(arg).unwrap_or(Path::new("state.json")))?,
            "restore" => {
                self.restore(optional_path(arg).unwrap_or(Path::new("state.json")))?;
            }
            "commands" => self.commands(arg)?,
            "clear" => self.clear(true, false)?,
            "setview" => self.setview(arg)?,
            "timestep" => self.set_timestep(number(arg, method)?)?,
            "addstep" => {
                let step = if arg.trim().is_empty() { None } else { Some(number(arg, method)?) };
                self.addstep(step, Value::Null)?;
            }
            "file" => {
                if let Some(path) = optional_path(arg) {
                    self.file(path, None, Value::Null)?;
                }
            }
            "webgl" => {
                self.webgl(optional_path(arg), None)?;
            }
            "colourbar" => {
                self.colourbar(None, Value::Null)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Object methods reachable from `<name>.method`; false when unknown
    fn object_method(&self, object: &Object, method: &str, arg: &str) -> LavaVuResult<bool> {
        match method {
            "select" => object.select()?,
            "clear" => object.clear()?,
            "reload" => object.reload()?,
            "append" => object.append()?,
            "delete" => object.delete()?,
            "cleardata" => object.cleardata(arg)?,
            "swapxy" => object.swapxy()?,
            "swapyz" => object.swapyz()?,
            "swapxz" => object.swapxz()?,
            "file" => {
                if let Some(path) = optional_path(arg) {
                    object.file(path)?;
                }
            }
            "colourmap" => {
                object.colourmap(arg)?;
            }
            "colourbar" => {
                object.colourbar(Value::Null)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}
