// CSS color parsing
// Covers the formats a color picker produces: hex and rgb()/rgba()

use crate::error::ColorError;
use std::str::FromStr;

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Rgba {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_ascii_lowercase();
        let err = || ColorError(s.to_string());

        if let Some(hex) = input.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(err);
        }

        if let Some(args) = function_args(&input, "rgba").or_else(|| function_args(&input, "rgb")) {
            return parse_rgb_args(args).ok_or_else(err);
        }

        match input.as_str() {
            "black" => Ok(Rgba::new(0, 0, 0, 255)),
            "white" => Ok(Rgba::new(255, 255, 255, 255)),
            "transparent" => Ok(Rgba::TRANSPARENT),
            _ => Err(err()),
        }
    }
}

/// Return the text between `name(` and the closing `)`
fn function_args<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    input
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    match hex.len() {
        3 => Some(Rgba::new(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
        4 => Some(Rgba::new(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        6 => Some(Rgba::new(byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some(Rgba::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |s: &str| -> Option<u8> {
        let v: f32 = match s.strip_suffix('%') {
            Some(pct) => pct.trim().parse::<f32>().ok()? * 2.55,
            None => s.parse().ok()?,
        };
        v.is_finite().then(|| v.round().clamp(0.0, 255.0) as u8)
    };

    let alpha = match parts.get(3) {
        Some(s) => {
            let v: f32 = match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f32>().ok()? / 100.0,
                None => s.parse().ok()?,
            };
            if !v.is_finite() {
                return None;
            }
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        None => 255,
    };

    Some(Rgba::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_watermark_color() {
        let c: Rgba = "rgba(0,0,0,0.12)".parse().unwrap();
        assert_eq!(c, Rgba::new(0, 0, 0, 31));
    }

    #[test]
    fn parses_hex_forms() {
        assert_eq!("#fff".parse::<Rgba>().unwrap(), Rgba::new(255, 255, 255, 255));
        assert_eq!("#f008".parse::<Rgba>().unwrap(), Rgba::new(255, 0, 0, 136));
        assert_eq!("#165DFF".parse::<Rgba>().unwrap(), Rgba::new(0x16, 0x5d, 0xff, 255));
        assert_eq!("#00000080".parse::<Rgba>().unwrap(), Rgba::new(0, 0, 0, 128));
    }

    #[test]
    fn parses_rgb_with_spaces_and_percent_alpha() {
        let c: Rgba = " rgb( 10, 20 ,30 ) ".parse().unwrap();
        assert_eq!(c, Rgba::new(10, 20, 30, 255));

        let c: Rgba = "rgba(255, 0, 0, 50%)".parse().unwrap();
        assert_eq!(c.a, 128);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Rgba>().is_err());
        assert!("#12".parse::<Rgba>().is_err());
        assert!("#gggggg".parse::<Rgba>().is_err());
        assert!("rgba(1,2)".parse::<Rgba>().is_err());
        assert!("hsl(0, 0%, 0%)".parse::<Rgba>().is_err());
    }
}
