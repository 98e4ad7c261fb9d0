//! Saved figures
//!
//! A figure is a named snapshot of the view, global properties and object
//! visibility. Every operation on a [`Figure`] first makes it the active
//! figure; writes are saved back into the snapshot.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::LavaVuResult;
use crate::property::PropertyValue;
use crate::session::{SessionCore, SessionRef};

#[derive(Clone, Debug)]
pub struct Figure {
    session: SessionRef,
    name: String,
}

impl Figure {
    pub(crate) fn new(session: SessionRef, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> LavaVuResult<Arc<SessionCore>> {
        self.session.upgrade(&self.name)
    }

    /// Restore this figure's snapshot
    pub fn activate(&self) -> LavaVuResult<Arc<SessionCore>> {
        let core = self.core()?;
        core.execute_script(&format!("figure {}", self.name))?;
        Ok(core)
    }

    pub fn get(&self, key: &str) -> LavaVuResult<PropertyValue> {
        self.activate()?.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<PropertyValue>) -> LavaVuResult<()> {
        let core = self.activate()?;
        core.set(key, value)?;
        core.execute_script(&format!("savefigure {}", self.name))
    }

    /// Activate and render
    pub fn show(&self) -> LavaVuResult<()> {
        self.activate()?.render()
    }

    /// Activate and save an image; see `Session::image`
    pub fn image(
        &self,
        path: Option<&Path>,
        resolution: Option<(u32, u32)>,
    ) -> LavaVuResult<String> {
        self.activate()?.image(path, resolution, false)
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, SessionMode};
    use crate::session::Session;
    use serde_json::json;

    #[test]
    fn test_figure_properties_are_per_figure() {
        let lv = Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap();
        let first = lv.figure("first", &[], json!({"zoom": 2.0})).unwrap();
        let second = lv.figure("second", &[], json!({"zoom": 3.0})).unwrap();
        assert_eq!(first.get("zoom").unwrap().as_f64(), Some(2.0));
        assert_eq!(second.get("zoom").unwrap().as_f64(), Some(3.0));
        let names: Vec<String> = lv
            .figures()
            .unwrap()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_figure_visibility() {
        let lv = Session::new(SessionConfig::default().with_mode(SessionMode::Direct)).unwrap();
        let a = lv.points(Some("a"), json!({})).unwrap();
        lv.points(Some("b"), json!({})).unwrap();
        lv.figure("only_b", &["b"], json!({})).unwrap();
        assert_eq!(a.get("visible").unwrap(), PropertyValue::Bool(false));
    }
}
