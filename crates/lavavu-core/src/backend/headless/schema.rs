//! Property dictionary published by the headless backend

use serde_json::{json, Map, Value};

/// `(name, default, type, scope, doc)`
type Entry = (&'static str, Value, &'static str, &'static str, &'static str);

fn entries() -> Vec<Entry> {
    vec![
        // Global
        ("background", json!("black"), "colour", "global", "Background colour"),
        ("resolution", json!([640, 480]), "integer[2]", "global", "Default output image size"),
        ("fps", json!(30), "integer", "global", "Animation timer rate in frames per second"),
        ("quality", json!(2), "integer", "global", "Anti-alias supersampling factor"),
        ("title", json!(""), "string", "global", "Window title"),
        ("caption", json!(""), "string", "global", "Caption drawn on output images"),
        ("fontscale", json!(1.0), "real", "global", "Font scaling factor"),
        ("axis", json!(true), "boolean", "global", "Draw the axis indicator"),
        ("border", json!(1.0), "real", "global", "Bounding box border width, 0 to disable"),
        ("bordercolour", json!("grey"), "colour", "global", "Bounding box border colour"),
        ("timestep", json!(-1), "integer", "global", "Current time step"),
        // View
        ("translate", json!([0.0, 0.0, 0.0]), "real[3]", "view", "Camera translation"),
        ("rotate", json!([0.0, 0.0, 0.0, 1.0]), "real[4]", "view", "Camera rotation quaternion"),
        ("xyzrotate", json!([0.0, 0.0, 0.0]), "real[3]", "view", "Camera rotation in degrees"),
        ("focus", json!([0.0, 0.0, 0.0]), "real[3]", "view", "Camera focal point"),
        ("scale", json!([1.0, 1.0, 1.0]), "real[3]", "view", "Model scaling"),
        ("fov", json!(45.0), "real", "view", "Field of view in degrees"),
        ("zoom", json!(1.0), "real", "view", "Zoom factor"),
        ("min", json!([0.0, 0.0, 0.0]), "real[3]", "view", "Bounding box minimum"),
        ("max", json!([0.0, 0.0, 0.0]), "real[3]", "view", "Bounding box maximum"),
        // Object
        ("name", json!(""), "string", "object", "Object name"),
        ("renderer", json!("points"), "string", "object", "Geometry type, optionally type:subtype"),
        ("visible", json!(true), "boolean", "object", "Draw this object"),
        ("colour", json!("grey"), "colour", "object", "Base colour"),
        ("opacity", json!(1.0), "real", "object", "Opacity in [0,1]"),
        ("pointsize", json!(1.0), "real", "object", "Point size in pixels"),
        ("pointtype", json!("flat"), "string", "object", "Point shape"),
        ("linewidth", json!(1.0), "real", "object", "Line width in pixels"),
        ("link", json!(false), "boolean", "object", "Join line vertices into a strip"),
        ("dims", json!(null), "integer[3]", "object", "Element width, height and depth"),
        ("filters", json!([]), "object", "object", "Value filter list"),
        ("colourmap", json!(null), "string", "object", "Colour map name"),
        ("opacitymap", json!(null), "string", "object", "Opacity map name"),
        ("colourby", json!(""), "string", "object", "Value label used for colour mapping"),
        ("opacityby", json!(""), "string", "object", "Value label used for opacity mapping"),
        ("isovalues", json!([]), "real[]", "object", "Isovalues for contours and isosurfaces"),
        ("texture", json!(""), "string", "object", "Texture image path"),
        ("shapetype", json!("sphere"), "string", "object", "Shape glyph"),
        ("arrowhead", json!(2.0), "real", "object", "Vector arrow head size"),
        ("steps", json!(0), "integer", "object", "Tracer history length"),
        ("fixed", json!(false), "boolean", "object", "Load data as fixed, visible at every step"),
        ("colourbar", json!(false), "boolean", "colourbar", "Indicates object is a colourbar"),
        ("align", json!("bottom"), "string", "colourbar", "left, right, top or bottom"),
        ("ticks", json!(0), "integer", "colourbar", "Number of intermediate ticks"),
        // Colour map
        ("colours", json!([]), "object", "colourmap", "Colour stops"),
        ("logscale", json!(false), "boolean", "colourmap", "Logarithmic value mapping"),
        ("discrete", json!(false), "boolean", "colourmap", "No interpolation between stops"),
        ("range", json!([0.0, 0.0]), "real[2]", "colourmap", "Value range, [0,0] for auto"),
        ("locked", json!(false), "boolean", "colourmap", "Ignore data range changes"),
    ]
}

/// The property list as the backend returns it from `property_list`
pub fn property_list() -> Value {
    let map: Map<String, Value> = entries()
        .into_iter()
        .map(|(name, default, kind, scope, doc)| {
            (
                name.to_string(),
                json!({"default": default, "type": kind, "scope": scope, "doc": doc}),
            )
        })
        .collect();
    Value::Object(map)
}

/// Scope of a property name, if known
pub fn scope_of(name: &str) -> Option<&'static str> {
    entries()
        .into_iter()
        .find(|(n, ..)| *n == name)
        .map(|(_, _, _, scope, _)| scope)
}
