//! Colour map handles
//!
//! A [`ColourMap`] names one colour map in a session. Stops live in the
//! backend; the handle reads them back as a [`Palette`] and writes updates
//! as palette text.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::bridge::RenderMethod;
use crate::error::{BackendError, LavaVuResult};
use crate::palette::{ColourMapData, Palette};
use crate::property::PropertyValue;
use crate::session::{SessionCore, SessionRef};

/// Adjustments applied after resolving colour map data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapOptions {
    /// Reverse the stop order
    pub reverse: bool,
    /// Convert to greyscale
    pub monochrome: bool,
}

impl MapOptions {
    pub fn reversed() -> Self {
        Self {
            reverse: true,
            ..Self::default()
        }
    }
}

/// Colour map stops as palette text or `(position, rgba)` pairs
#[derive(Clone, Debug, PartialEq)]
pub enum ColourMapExport {
    Text(String),
    List(Vec<(f64, [u8; 4])>),
}

impl fmt::Display for ColourMapExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColourMapExport::Text(text) => f.write_str(text),
            ColourMapExport::List(list) => write!(f, "{}", Palette::from_list(list)),
        }
    }
}

/// Handle to a named colour map
#[derive(Clone, Debug)]
pub struct ColourMap {
    session: SessionRef,
    name: String,
}

impl ColourMap {
    pub(crate) fn new(session: SessionRef, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn belongs_to(&self, core: &SessionCore) -> bool {
        self.session.belongs_to(core)
    }

    fn core(&self) -> LavaVuResult<Arc<SessionCore>> {
        self.session.upgrade(&self.name)
    }

    /// The map's record in the session state
    fn record(&self) -> LavaVuResult<Map<String, Value>> {
        let state = self.core()?.state()?;
        state
            .get("colourmaps")
            .and_then(Value::as_array)
            .and_then(|maps| {
                maps.iter()
                    .find(|m| m.get("name").and_then(Value::as_str) == Some(self.name.as_str()))
            })
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| self.missing().into())
    }

    fn missing(&self) -> BackendError {
        BackendError::MissingObject {
            name: self.name.clone(),
        }
    }

    /// Current stops
    pub fn palette(&self) -> LavaVuResult<Palette> {
        let core = self.core()?;
        let text = core
            .with_backend(|b| b.colour_map(&self.name))?
            .ok_or_else(|| self.missing())?;
        Ok(Palette::parse(&text)?)
    }

    pub fn tolist(&self) -> LavaVuResult<Vec<(f64, [u8; 4])>> {
        Ok(self.palette()?.to_list())
    }

    /// Stop colours as `#rrggbbaa` hex, space separated
    pub fn tohexstr(&self) -> LavaVuResult<String> {
        Ok(self.palette()?.to_hex_string())
    }

    pub fn update(&self, data: impl Into<ColourMapData>) -> LavaVuResult<()> {
        self.update_with(data, MapOptions::default())
    }

    /// Replace the stops
    ///
    /// Single words name a session map, a built-in map or a preset. Explicit
    /// position lists have their end stops moved to 0 and 1.
    pub fn update_with(
        &self,
        data: impl Into<ColourMapData>,
        options: MapOptions,
    ) -> LavaVuResult<()> {
        let core = self.core()?;
        let data = data.into();
        let explicit = matches!(&data, ColourMapData::Stops(s) if s.len() > 1)
            || matches!(&data, ColourMapData::List(l) if l.len() > 1);
        let mut palette = data.resolve(|name| {
            core.with_backend(|b| b.colour_map(name).or_else(|| b.default_map(name)))
                .ok()
                .flatten()
                .and_then(|text| Palette::parse(&text).ok())
        })?;
        if explicit {
            palette.clamp_endpoints();
        }
        if options.reverse {
            palette.flip();
        }
        if options.monochrome {
            palette.monochrome();
        }
        debug!(map = %self.name, stops = palette.len(), "update colour map");
        self.write(&core, &palette, Map::new())
    }

    fn write(
        &self,
        core: &SessionCore,
        palette: &Palette,
        props: Map<String, Value>,
    ) -> LavaVuResult<()> {
        let name = self.name.clone();
        let text = palette.to_string();
        let props = Value::Object(props);
        core.routed(RenderMethod::UpdateColourMap, move |b| {
            b.update_colour_map(&name, &text, &props)
        })??;
        core.refresh()
    }

    /// Reverse the stop order in place
    pub fn flip(&self) -> LavaVuResult<()> {
        let core = self.core()?;
        core.with_backend(|b| b.flip_colour_map(&self.name))??;
        core.refresh()
    }

    /// Convert to greyscale in place
    pub fn monochrome(&self) -> LavaVuResult<()> {
        let core = self.core()?;
        core.with_backend(|b| b.monochrome_colour_map(&self.name))??;
        core.refresh()
    }

    /// A colour map property such as `logscale` or `range`
    pub fn get(&self, key: &str) -> LavaVuResult<PropertyValue> {
        let record = self.record()?;
        Ok(self.core()?.schema().resolve(key, &[Some(&record)])?)
    }

    pub fn set(&self, key: &str, value: impl Into<PropertyValue>) -> LavaVuResult<()> {
        let core = self.core()?;
        core.schema().check(key)?;
        let mut props = Map::new();
        props.insert(key.to_string(), value.into().to_json());
        self.write(&core, &self.palette()?, props)
    }
}

impl fmt::Display for ColourMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.palette() {
            Ok(palette) => write!(f, "{}", palette),
            Err(_) => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SessionMode};
    use crate::session::Session;

    fn direct() -> Session {
        Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap()
    }

    #[test]
    fn test_update_and_read_back() {
        let lv = direct();
        let cm = lv.colourmap("heat", "black red yellow").unwrap();
        let list = cm.tolist().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].0, 0.0);
        assert_eq!(list[2].0, 1.0);
        assert_eq!(list[1].1, [255, 0, 0, 255]);
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let lv = direct();
        let cm = lv.colourmap("cm", "red green blue").unwrap();
        let before = cm.tolist().unwrap();
        cm.flip().unwrap();
        assert_ne!(cm.tolist().unwrap(), before);
        cm.flip().unwrap();
        assert_eq!(cm.tolist().unwrap(), before);
    }

    #[test]
    fn test_explicit_positions_clamped() {
        let lv = direct();
        let cm = lv
            .colourmap("cm", vec![(0.25, "red"), (0.75, "blue")])
            .unwrap();
        let positions: Vec<f64> = cm.tolist().unwrap().iter().map(|s| s.0).collect();
        assert_eq!(positions, vec![0.0, 1.0]);
    }

    #[test]
    fn test_reverse_option() {
        let lv = direct();
        let cm = lv
            .colourmap_with("cm", "red blue", MapOptions::reversed())
            .unwrap();
        let list = cm.tolist().unwrap();
        assert_eq!(list[0].1, [0, 0, 255, 255]);
    }

    #[test]
    fn test_map_properties() {
        let lv = direct();
        let cm = lv.colourmap("cm", "red blue").unwrap();
        assert_eq!(cm.get("logscale").unwrap(), PropertyValue::Bool(false));
        cm.set("logscale", true).unwrap();
        assert_eq!(cm.get("logscale").unwrap(), PropertyValue::Bool(true));
        // stops survive a property write
        assert_eq!(cm.tolist().unwrap().len(), 2);
    }
}
