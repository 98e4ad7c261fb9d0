//! Colour values and parsing
//!
//! Accepts the colour notations used throughout scripts and properties:
//! - html/X11 names, optionally with `:opacity` suffix (`"red:0.5"`)
//! - `#rgb`, `#rrggbb`, `#rrggbbaa` and `0xaabbggrr` packed hex
//! - `rgb(r,g,b)` and `rgba(r,g,b,a)` where alpha ≤ 1 is a fraction
//! - JSON arrays `[r,g,b(,a)]` of fractions or bytes
//! - `grey0`..`grey100` levels

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ValidationError;

/// An 8-bit RGBA colour as stored by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Colour {
    /// Create a new colour
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour from rgb bytes
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Opaque black
    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    /// Create from fractional components in [0,1]
    pub fn from_fractions(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: fraction_to_byte(r),
            g: fraction_to_byte(g),
            b: fraction_to_byte(b),
            a: fraction_to_byte(a),
        }
    }

    /// Unpack from `r | g<<8 | b<<16 | a<<24`
    pub fn from_u32(value: u32) -> Self {
        let [r, g, b, a] = value.to_le_bytes();
        Self { r, g, b, a }
    }

    /// Pack to `r | g<<8 | b<<16 | a<<24`
    pub fn to_u32(&self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Components as fractions `[r, g, b, a]`
    pub fn to_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    /// Components as bytes `[r, g, b, a]`
    pub fn to_bytes(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Hex string with alpha, e.g. `#ff000080`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    /// Luminance-weighted grey with the same alpha
    pub fn monochrome(&self) -> Self {
        let lum = 0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64;
        let level = lum.round().clamp(0.0, 255.0) as u8;
        Self::new(level, level, level, self.a)
    }

    /// Parse any supported colour notation
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        parse_colour_str(input).ok_or_else(|| ValidationError::InvalidColour {
            value: input.to_string(),
        })
    }

    /// Parse a JSON value: packed integer, `[r,g,b(,a)]` array or string
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidColour {
            value: value.to_string(),
        };
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Self::from_u32)
                .ok_or_else(invalid),
            Value::String(s) => Self::parse(s),
            Value::Array(items) => {
                let comps: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                comps
                    .and_then(|c| components_to_colour(&c))
                    .ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::black()
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Alpha is written as a fraction so the text parses back to the same byte
        let alpha = self.a as f64 / 255.0;
        write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, alpha)
    }
}

/// Parse a colour string to fractional `[r, g, b, a]`
pub fn parse_colour(input: &str) -> Result<[f32; 4], ValidationError> {
    Colour::parse(input).map(|c| c.to_array())
}

fn fraction_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A component above 1 is a byte value, otherwise a fraction
fn component_to_byte(v: f64) -> u8 {
    if v > 1.0 {
        v.round().clamp(0.0, 255.0) as u8
    } else {
        (v.max(0.0) * 255.0).round() as u8
    }
}

fn components_to_colour(comps: &[f64]) -> Option<Colour> {
    if comps.len() < 3 || comps.len() > 4 {
        return None;
    }
    let alpha = comps.get(3).copied().map(component_to_byte).unwrap_or(255);
    Some(Colour::new(
        component_to_byte(comps[0]),
        component_to_byte(comps[1]),
        component_to_byte(comps[2]),
        alpha,
    ))
}

fn parse_colour_str(input: &str) -> Option<Colour> {
    let text = input.trim().to_ascii_lowercase();
    if text.is_empty() {
        return None;
    }

    if let Some(body) = text.strip_prefix("rgba(") {
        return parse_functional(body, true);
    }
    if let Some(body) = text.strip_prefix("rgb(") {
        return parse_functional(body, false);
    }
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(hex) = text.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).ok().map(Colour::from_u32);
    }
    if text.starts_with('[') {
        let value: Value = serde_json::from_str(&text).ok()?;
        return Colour::from_json(&value).ok();
    }

    // name[:opacity]
    let (name, opacity) = match text.split_once(':') {
        Some((name, op)) => (name.trim(), op.trim().parse::<f32>().ok()?),
        None => (text.as_str(), 1.0),
    };
    let mut colour = lookup_name(name)?;
    colour.a = fraction_to_byte(opacity);
    Some(colour)
}

fn parse_functional(body: &str, with_alpha: bool) -> Option<Colour> {
    let body = body.strip_suffix(')')?;
    let parts: Vec<&str> = body
        .split([',', ' '])
        .filter(|s| !s.is_empty())
        .collect();
    let expected = if with_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        let v: f64 = part.parse().ok()?;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    let alpha = if with_alpha {
        let a: f64 = parts[3].parse().ok()?;
        component_to_byte(a)
    } else {
        255
    };
    Some(Colour::new(rgb[0], rgb[1], rgb[2], alpha))
}

fn parse_hex(hex: &str) -> Option<Colour> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let expand = |i: usize| byte(&hex[i..i + 1]).map(|v| v * 17);
            Some(Colour::rgb(expand(0)?, expand(1)?, expand(2)?))
        }
        6 => Some(Colour::rgb(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
        )),
        8 => Some(Colour::new(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        )),
        _ => None,
    }
}

fn lookup_name(name: &str) -> Option<Colour> {
    let key: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    let level = key
        .strip_prefix("grey")
        .or_else(|| key.strip_prefix("gray"))
        .and_then(|rest| rest.parse::<u32>().ok());
    if let Some(level) = level {
        if level > 100 {
            return None;
        }
        let v = (level as f64 * 2.55).round() as u8;
        return Some(Colour::rgb(v, v, v));
    }
    NAMED_COLOURS
        .binary_search_by(|(n, _)| n.cmp(&key.as_str()))
        .ok()
        .map(|i| {
            let [r, g, b] = NAMED_COLOURS[i].1;
            Colour::rgb(r, g, b)
        })
}

/// X11 colour names, sorted for binary search
static NAMED_COLOURS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [190, 190, 190]),
    ("green", [0, 255, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [190, 190, 190]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrod", [238, 221, 130]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslateblue", [132, 112, 255]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [176, 48, 96]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("navyblue", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [160, 32, 240]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("violetred", [208, 32, 144]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgba_fraction_alpha() {
        let c = parse_colour("rgba(255,24,128,1.0)").unwrap();
        assert!((c[0] - 1.0).abs() < 1e-3);
        assert!((c[1] - 24.0 / 255.0).abs() < 1e-3);
        assert!((c[2] - 128.0 / 255.0).abs() < 1e-3);
        assert!((c[3] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_parse_rgba_byte_alpha() {
        let c = Colour::parse("rgba(10, 20, 30, 128)").unwrap();
        assert_eq!(c, Colour::new(10, 20, 30, 128));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Colour::parse("red").unwrap(), Colour::rgb(255, 0, 0));
        assert_eq!(Colour::parse("Blue").unwrap(), Colour::rgb(0, 0, 255));
        assert_eq!(Colour::parse("red:0.5").unwrap().a, 128);
        assert_eq!(Colour::parse("grey50").unwrap(), Colour::rgb(127, 127, 127));
        assert_eq!(Colour::parse("grey100").unwrap(), Colour::rgb(255, 255, 255));
        assert_eq!(Colour::parse("gray0").unwrap(), Colour::rgb(0, 0, 0));
        assert!(Colour::parse("grey101").is_err());
        assert!(Colour::parse("notacolour").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(Colour::parse("#ff8000").unwrap(), Colour::rgb(255, 128, 0));
        assert_eq!(Colour::parse("#f00").unwrap(), Colour::rgb(255, 0, 0));
        assert_eq!(
            Colour::parse("#11223344").unwrap(),
            Colour::new(0x11, 0x22, 0x33, 0x44)
        );
        assert!(Colour::parse("#12345").is_err());
    }

    #[test]
    fn test_packing() {
        let c = Colour::new(1, 2, 3, 4);
        assert_eq!(c.to_u32(), 1 | 2 << 8 | 3 << 16 | 4 << 24);
        assert_eq!(Colour::from_u32(c.to_u32()), c);
        assert_eq!(Colour::parse("0x04030201").unwrap(), c);
    }

    #[test]
    fn test_json_colours() {
        let c = Colour::from_json(&serde_json::json!([1.0, 0.0, 0.0])).unwrap();
        assert_eq!(c, Colour::rgb(255, 0, 0));
        let c = Colour::from_json(&serde_json::json!([0, 128, 255, 0.5])).unwrap();
        assert_eq!(c, Colour::new(0, 128, 255, 128));
        assert!(Colour::from_json(&serde_json::json!({"r": 1})).is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for c in [
            Colour::new(12, 34, 56, 0),
            Colour::new(255, 0, 0, 128),
            Colour::new(1, 1, 1, 255),
            Colour::new(200, 100, 50, 1),
        ] {
            assert_eq!(Colour::parse(&c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn test_monochrome() {
        let grey = Colour::new(255, 0, 0, 200).monochrome();
        assert_eq!(grey, Colour::new(76, 76, 76, 200));
    }

    #[test]
    fn test_table_sorted() {
        assert!(NAMED_COLOURS.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
