//! Colour palette data model
//!
//! A palette is an ordered list of `(position, colour)` stops with positions
//! in [0,1]. Positions are held on a 1e-6 grid so that flipping a palette
//! twice gives back exactly the same stops.
//!
//! Text form, as used in scripts and by `update`:
//! - `"red green blue"`: evenly spaced colours
//! - `"0=red; 0.25=#ff8000; 1=rgba(0,0,255,1)"`: explicit positions

use serde_json::{json, Value};
use std::fmt;

use crate::colour::Colour;
use crate::error::ValidationError;

const POSITION_SCALE: f64 = 1.0e6;

fn quantize(position: f64) -> f64 {
    (position.clamp(0.0, 1.0) * POSITION_SCALE).round() / POSITION_SCALE
}

/// One stop in a palette
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColourStop {
    pub position: f64,
    pub colour: Colour,
}

impl ColourStop {
    pub fn new(position: f64, colour: Colour) -> Self {
        Self {
            position: quantize(position),
            colour,
        }
    }
}

/// Ordered colour stops
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Palette {
    stops: Vec<ColourStop>,
}

impl Palette {
    /// Build from stops, sorting by position (stable for equal positions)
    pub fn new(stops: impl IntoIterator<Item = ColourStop>) -> Self {
        let mut stops: Vec<ColourStop> = stops
            .into_iter()
            .map(|s| ColourStop::new(s.position, s.colour))
            .collect();
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { stops }
    }

    /// Evenly spaced colours
    pub fn from_colours(colours: impl IntoIterator<Item = Colour>) -> Self {
        let colours: Vec<Colour> = colours.into_iter().collect();
        let n = colours.len();
        let stops = colours
            .into_iter()
            .enumerate()
            .map(|(i, c)| ColourStop::new(i as f64 / (n.max(2) - 1) as f64, c));
        Self::new(stops)
    }

    /// Build from `(position, rgba bytes)` pairs as returned by [`Palette::to_list`]
    pub fn from_list(list: &[(f64, [u8; 4])]) -> Self {
        Self::new(
            list.iter()
                .map(|(p, [r, g, b, a])| ColourStop::new(*p, Colour::new(*r, *g, *b, *a))),
        )
    }

    /// Parse the text form
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(ValidationError::InvalidColour {
                value: text.to_string(),
            });
        }
        let n = tokens.len();
        let mut stops = Vec::with_capacity(n);
        for (i, token) in tokens.iter().enumerate() {
            let default_pos = i as f64 / (n.max(2) - 1) as f64;
            let (position, colour) = match token.split_once('=') {
                Some((pos, colour)) => {
                    let pos: f64 = pos.trim().parse().map_err(|_| ValidationError::InvalidColour {
                        value: token.clone(),
                    })?;
                    (pos, colour.trim())
                }
                None => (default_pos, token.as_str()),
            };
            stops.push(ColourStop::new(position, Colour::parse(colour)?));
        }
        if stops.len() == 1 {
            // A single colour becomes a flat map
            let only = stops[0].colour;
            return Ok(Self::new([ColourStop::new(0.0, only), ColourStop::new(1.0, only)]));
        }
        Ok(Self::new(stops))
    }

    /// Decode the stops array used in the state mirror
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidColour {
            value: value.to_string(),
        };
        let items = value.as_array().ok_or_else(invalid)?;
        let mut stops = Vec::with_capacity(items.len());
        for item in items {
            let position = item.get("position").and_then(Value::as_f64).ok_or_else(invalid)?;
            let colour = Colour::from_json(item.get("colour").ok_or_else(invalid)?)?;
            stops.push(ColourStop::new(position, colour));
        }
        Ok(Self::new(stops))
    }

    pub fn stops(&self) -> &[ColourStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// At least two stops are needed before a palette can be used
    pub fn is_usable(&self) -> bool {
        self.stops.len() >= 2
    }

    /// Reverse: each position p becomes 1-p and the stop order is reversed
    pub fn flip(&mut self) {
        self.stops.reverse();
        for stop in &mut self.stops {
            stop.position = quantize(1.0 - stop.position);
        }
    }

    /// Replace each colour with its luminance grey
    pub fn monochrome(&mut self) {
        for stop in &mut self.stops {
            stop.colour = stop.colour.monochrome();
        }
    }

    /// Force the first and last positions to 0 and 1
    pub fn clamp_endpoints(&mut self) {
        if let Some(first) = self.stops.first_mut() {
            first.position = 0.0;
        }
        if let Some(last) = self.stops.last_mut() {
            last.position = 1.0;
        }
    }

    /// `(position, [r,g,b,a])` pairs
    pub fn to_list(&self) -> Vec<(f64, [u8; 4])> {
        self.stops
            .iter()
            .map(|s| (s.position, s.colour.to_bytes()))
            .collect()
    }

    /// Positionless space separated `#rrggbbaa` string
    pub fn to_hex_string(&self) -> String {
        self.stops
            .iter()
            .map(|s| s.colour.to_hex())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Stops array for the state mirror
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.stops
                .iter()
                .map(|s| json!({"position": s.position, "colour": s.colour.to_string()}))
                .collect(),
        )
    }

    /// Interpolated colour at `t`
    pub fn sample(&self, t: f64) -> Colour {
        let t = t.clamp(0.0, 1.0);
        match self.stops.as_slice() {
            [] => Colour::default(),
            [only] => only.colour,
            stops => {
                for pair in stops.windows(2) {
                    let (a, b) = (&pair[0], &pair[1]);
                    if t >= a.position && t <= b.position {
                        let span = b.position - a.position;
                        let local = if span > 0.0 { (t - a.position) / span } else { 0.0 };
                        return lerp(a.colour, b.colour, local);
                    }
                }
                if t < stops[0].position {
                    stops[0].colour
                } else {
                    stops[stops.len() - 1].colour
                }
            }
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .stops
            .iter()
            .map(|s| format!("{}={}", s.position, s.colour))
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

fn lerp(a: Colour, b: Colour, t: f64) -> Colour {
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Colour::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a))
}

/// Split on whitespace, `;` and newlines, but not inside parentheses
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if depth == 0 && (c.is_whitespace() || c == ';') => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if depth > 0 && c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    // Rejoin "0.5 = red" written with spaces around '='
    let mut joined: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match joined.last_mut() {
            Some(prev) if prev.ends_with('=') || token.starts_with('=') => prev.push_str(&token),
            _ => joined.push(token),
        }
    }
    joined
}

/// Input accepted when creating or updating a colour map
#[derive(Clone, Debug, PartialEq)]
pub enum ColourMapData {
    /// Single-word map name or palette text
    Text(String),
    /// Evenly spaced colour strings
    Colours(Vec<String>),
    /// Positioned colour strings
    Stops(Vec<(f64, String)>),
    /// Positioned byte colours, the shape returned by `tolist`
    List(Vec<(f64, [u8; 4])>),
    /// A ready palette
    Palette(Palette),
    /// Raw JSON
    Json(Value),
}

impl ColourMapData {
    /// Resolve to a palette; `named` looks up built-in maps by name
    pub fn resolve(
        &self,
        named: impl Fn(&str) -> Option<Palette>,
    ) -> Result<Palette, ValidationError> {
        match self {
            ColourMapData::Text(text) => {
                let trimmed = text.trim();
                let single_word = !trimmed.is_empty()
                    && !trimmed.contains(|c: char| c.is_whitespace() || c == '=' || c == ';');
                if single_word {
                    if let Some(palette) = named(trimmed).or_else(|| presets::lookup(trimmed)) {
                        return Ok(palette);
                    }
                }
                Palette::parse(trimmed)
            }
            ColourMapData::Colours(colours) => {
                let parsed: Result<Vec<Colour>, _> =
                    colours.iter().map(|c| Colour::parse(c)).collect();
                Ok(Palette::from_colours(parsed?))
            }
            ColourMapData::Stops(stops) => {
                let parsed: Result<Vec<ColourStop>, ValidationError> = stops
                    .iter()
                    .map(|(p, c)| Ok(ColourStop::new(*p, Colour::parse(c)?)))
                    .collect();
                Ok(Palette::new(parsed?))
            }
            ColourMapData::List(list) => Ok(Palette::from_list(list)),
            ColourMapData::Palette(palette) => Ok(palette.clone()),
            ColourMapData::Json(value) => Self::from_json(value)?.resolve(named),
        }
    }

    fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidColour {
            value: value.to_string(),
        };
        match value {
            Value::String(s) => Ok(ColourMapData::Text(s.clone())),
            Value::Object(map) => match map.get("colours") {
                Some(colours) if colours.get(0).is_some_and(Value::is_object) => {
                    Ok(ColourMapData::Palette(Palette::from_json(colours)?))
                }
                Some(colours) => Self::from_json(colours),
                None => Err(invalid()),
            },
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    return Ok(ColourMapData::Colours(
                        items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                    ));
                }
                if items.iter().all(Value::is_object) {
                    return Ok(ColourMapData::Palette(Palette::from_json(value)?));
                }
                let mut stops = Vec::with_capacity(items.len());
                for item in items {
                    let pair = item.as_array().filter(|p| p.len() == 2).ok_or_else(invalid)?;
                    let position = pair[0].as_f64().ok_or_else(invalid)?;
                    let colour = Colour::from_json(&pair[1])?;
                    stops.push(ColourStop::new(position, colour));
                }
                Ok(ColourMapData::Palette(Palette::new(stops)))
            }
            _ => Err(invalid()),
        }
    }
}

impl From<&str> for ColourMapData {
    fn from(s: &str) -> Self {
        ColourMapData::Text(s.to_string())
    }
}

impl From<String> for ColourMapData {
    fn from(s: String) -> Self {
        ColourMapData::Text(s)
    }
}

impl From<Vec<&str>> for ColourMapData {
    fn from(v: Vec<&str>) -> Self {
        ColourMapData::Colours(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<(f64, &str)>> for ColourMapData {
    fn from(v: Vec<(f64, &str)>) -> Self {
        ColourMapData::Stops(v.into_iter().map(|(p, c)| (p, c.to_string())).collect())
    }
}

impl From<Vec<(f64, [u8; 4])>> for ColourMapData {
    fn from(v: Vec<(f64, [u8; 4])>) -> Self {
        ColourMapData::List(v)
    }
}

impl From<Palette> for ColourMapData {
    fn from(p: Palette) -> Self {
        ColourMapData::Palette(p)
    }
}

impl From<Value> for ColourMapData {
    fn from(v: Value) -> Self {
        ColourMapData::Json(v)
    }
}

/// Maps a backend publishes by name
pub mod defaults {
    use super::{presets, Palette};

    pub const NAMES: [&str; 8] = [
        "cubehelix",
        "greyscale",
        "coolwarm",
        "spectral",
        "heat",
        "diverge",
        "isolum",
        "cubelaw",
    ];

    /// Palette text for a named default map
    pub fn text(name: &str) -> Option<String> {
        let text = match name {
            "cubehelix" => {
                return Some(presets::cubehelix(16, 0.5, -0.9, 1.0, 1.0, None).to_string())
            }
            "greyscale" => "black white",
            "coolwarm" => "#3b4cc0 #7396f5 #b0cbfc #dcdddd #f6bfa5 #ea7b60 #b40426",
            "spectral" => "#d53e4f #fc8d59 #fee08b #ffffbf #e6f598 #99d594 #3288bd",
            "heat" => "black red yellow white",
            "diverge" | "isolum" | "cubelaw" => {
                return presets::lookup(name).map(|p| p.to_string())
            }
            _ => return None,
        };
        Some(text.to_string())
    }

    pub fn palette(name: &str) -> Option<Palette> {
        text(name).and_then(|t| Palette::parse(&t).ok())
    }
}

/// Hand-tuned palettes and the CubeHelix generator
pub mod presets {
    use super::{ColourStop, Palette};
    use crate::colour::Colour;
    use std::f64::consts::PI;

    /// CubeHelix palette with monotonic intensity (Green 2011, BASI 39, 289)
    ///
    /// `start` is the start colour in [0,3], `rot` the number of rotations,
    /// `sat` the saturation and `gamma` the intensity correction. `alpha`
    /// gives an optional `(min, max)` opacity ramp. Produces `samples + 1`
    /// stops from 0 to 1.
    pub fn cubehelix(
        samples: usize,
        start: f64,
        rot: f64,
        sat: f64,
        gamma: f64,
        alpha: Option<(f64, f64)>,
    ) -> Palette {
        let samples = samples.max(1);
        let stops = (0..=samples).map(|i| {
            let fract = i as f64 / samples as f64;
            let angle = 2.0 * PI * (start / 3.0 + 1.0 + rot * fract);
            let amp = sat * fract * (1.0 - fract);
            let fract = fract.powf(gamma);

            let r = fract + amp * (-0.14861 * angle.cos() + 1.78277 * angle.sin());
            let g = fract + amp * (-0.29227 * angle.cos() - 0.90649 * angle.sin());
            let b = fract + amp * (1.97294 * angle.cos());
            let a = alpha.map(|(lo, hi)| lo + (hi - lo) * fract).unwrap_or(1.0);

            let byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0) as u8;
            ColourStop::new(fract, Colour::new(byte(r), byte(g), byte(b), byte(a)))
        });
        Palette::new(stops)
    }

    /// Equal-luminance hue cycle
    pub fn isoluminant() -> Palette {
        parse_static("#e1988a #c9a36b #a3ae66 #78b57e #5bb5a6 #62abc8 #8d9bd8 #b58fcb")
    }

    /// Blue to red through a light neutral centre
    pub fn diverging() -> Palette {
        parse_static("#2166ac #67a9cf #d1e5f0 #f7f7f7 #fddbc7 #ef8a62 #b2182b")
    }

    /// Rainbow with lightness increasing as a cube law
    pub fn cubelaw() -> Palette {
        parse_static("#440079 #2f3caf #1c79c1 #14aca3 #47cd60 #a8d833 #f1d53a #ffb47a")
    }

    /// Preset by name, including a default cubehelix
    pub fn lookup(name: &str) -> Option<Palette> {
        match name.to_ascii_lowercase().as_str() {
            "cubehelix" => Some(cubehelix(16, 0.5, -0.9, 1.0, 1.0, None)),
            "isoluminant" | "isolum" => Some(isoluminant()),
            "diverging" | "diverge" => Some(diverging()),
            "cubelaw" => Some(cubelaw()),
            _ => None,
        }
    }

    fn parse_static(text: &str) -> Palette {
        Palette::parse(text).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_palette() -> Palette {
        Palette::parse("0=red; 0.3=#00ff0080; 0.7=blue; 1=white").unwrap()
    }

    #[test]
    fn test_parse_even_spacing() {
        let p = Palette::parse("red green blue").unwrap();
        let positions: Vec<f64> = p.stops().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0.0, 0.5, 1.0]);
        assert_eq!(p.stops()[1].colour, Colour::parse("green").unwrap());
    }

    #[test]
    fn test_parse_positions_and_functional() {
        let p = Palette::parse("0.0=rgba(255, 0, 0, 1)\n1.0=rgb(0,0,255)").unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.stops()[0].colour, Colour::rgb(255, 0, 0));
        assert!(Palette::parse("").is_err());
        assert!(Palette::parse("0.5=nocolour").is_err());
    }

    #[test]
    fn test_flip_involution() {
        let original = sample_palette();
        let mut p = original.clone();
        p.flip();
        assert_eq!(p.stops()[0].colour, Colour::rgb(255, 255, 255));
        assert!((p.stops()[1].position - 0.3).abs() < 1e-9);
        p.flip();
        for (a, b) in p.stops().iter().zip(original.stops()) {
            assert_eq!(a.position.to_bits(), b.position.to_bits());
            assert_eq!(a.colour, b.colour);
        }
    }

    #[test]
    fn test_tolist_round_trip() {
        let original = sample_palette();
        let rebuilt = Palette::from_list(&original.to_list());
        assert_eq!(rebuilt.to_list(), original.to_list());
    }

    #[test]
    fn test_text_round_trip() {
        let original = sample_palette();
        let rebuilt = Palette::parse(&original.to_string()).unwrap();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_monochrome() {
        let mut p = Palette::parse("red blue").unwrap();
        p.monochrome();
        assert_eq!(p.stops()[0].colour, Colour::rgb(76, 76, 76));
        assert_eq!(p.stops()[1].colour, Colour::rgb(29, 29, 29));
    }

    #[test]
    fn test_cubehelix() {
        let p = presets::cubehelix(8, 0.5, -0.9, 1.0, 1.0, None);
        assert_eq!(p.len(), 9);
        assert_eq!(p.stops()[0].position, 0.0);
        assert_eq!(p.stops()[8].position, 1.0);
        assert!(p.stops().windows(2).all(|w| w[0].position <= w[1].position));
        assert_eq!(p.stops()[0].colour, Colour::rgb(0, 0, 0));
        assert_eq!(p.stops()[8].colour, Colour::rgb(255, 255, 255));

        let faded = presets::cubehelix(4, 0.5, -0.9, 1.0, 1.0, Some((0.0, 1.0)));
        assert_eq!(faded.stops()[0].colour.a, 0);
        assert_eq!(faded.stops()[4].colour.a, 255);
    }

    #[test]
    fn test_resolve_data() {
        let none = |_: &str| None;
        let named = ColourMapData::from("diverging").resolve(none).unwrap();
        assert_eq!(named, presets::diverging());

        let colours = ColourMapData::from(vec!["red", "blue"]).resolve(none).unwrap();
        assert_eq!(colours.len(), 2);

        let stops = ColourMapData::from(vec![(1.0, "red"), (0.0, "blue")])
            .resolve(none)
            .unwrap();
        assert_eq!(stops.stops()[0].colour, Colour::rgb(0, 0, 255));

        let json = ColourMapData::from(serde_json::json!([[0, "black"], [1, [1.0, 1.0, 1.0]]]))
            .resolve(none)
            .unwrap();
        assert_eq!(json.stops()[1].colour, Colour::rgb(255, 255, 255));
    }

    #[test]
    fn test_json_round_trip() {
        let original = sample_palette();
        assert_eq!(Palette::from_json(&original.to_json()).unwrap(), original);
    }

    #[test]
    fn test_sample_and_hex() {
        let p = Palette::parse("black white").unwrap();
        assert_eq!(p.sample(0.5), Colour::rgb(128, 128, 128));
        assert_eq!(p.to_hex_string(), "#000000ff #ffffffff");
    }

    #[test]
    fn test_defaults() {
        for name in defaults::NAMES {
            let p = defaults::palette(name).unwrap();
            assert!(p.is_usable(), "{} unusable", name);
        }
        assert!(defaults::palette("nonexistent").is_none());
    }
}
