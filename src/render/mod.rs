//! PNG rendering of QR codes on top of the `qrcode` crate.

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba};
use qrcode::{EcLevel, QrCode};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_FOREGROUND: &str = "#000000";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";
pub const DEFAULT_SIZE: u32 = 200;
pub const MIN_SIZE: u32 = 100;
pub const MAX_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid color '{0}', expected #RRGGBB")]
    InvalidColor(String),
    #[error("size must be between 100 and 1000 pixels, got {0}")]
    InvalidSize(u32),
    #[error("error correction level must be one of L, M, Q, H, got '{0}'")]
    InvalidErrorCorrection(String),
    #[error("payload cannot be encoded as a QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("failed to encode PNG: {0}")]
    Png(#[from] image::ImageError),
}

impl RenderError {
    /// Whether the error comes from caller input rather than the encoder
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidColor(_)
                | RenderError::InvalidSize(_)
                | RenderError::InvalidErrorCorrection(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl FromStr for Color {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RenderError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Color([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl Color {
    fn to_rgba(self) -> Rgba<u8> {
        let [r, g, b] = self.0;
        Rgba([r, g, b, 255])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub foreground: Color,
    pub background: Color,
    /// Minimum width and height of the output image in pixels
    pub size: u32,
    pub error_correction: EcLevel,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            foreground: Color([0, 0, 0]),
            background: Color([255, 255, 255]),
            size: DEFAULT_SIZE,
            error_correction: EcLevel::M,
        }
    }
}

impl RenderOptions {
    /// Build options from optional request fields, applying defaults
    pub fn from_request(
        color: Option<&str>,
        background_color: Option<&str>,
        size: Option<u32>,
        error_correction: Option<&str>,
    ) -> Result<Self, RenderError> {
        let foreground = color.unwrap_or(DEFAULT_FOREGROUND).parse()?;
        let background = background_color.unwrap_or(DEFAULT_BACKGROUND).parse()?;

        let size = size.unwrap_or(DEFAULT_SIZE);
        if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
            return Err(RenderError::InvalidSize(size));
        }

        let error_correction = match error_correction {
            None => EcLevel::M,
            Some(level) => parse_ec_level(level)?,
        };

        Ok(Self {
            foreground,
            background,
            size,
            error_correction,
        })
    }
}

fn parse_ec_level(level: &str) -> Result<EcLevel, RenderError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "L" => Ok(EcLevel::L),
        "M" => Ok(EcLevel::M),
        "Q" => Ok(EcLevel::Q),
        "H" => Ok(EcLevel::H),
        _ => Err(RenderError::InvalidErrorCorrection(level.to_string())),
    }
}

/// Render `payload` as a PNG image
pub fn render_png(payload: &str, options: &RenderOptions) -> Result<Bytes, RenderError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), options.error_correction)?;
    let image = code
        .render::<Rgba<u8>>()
        .dark_color(options.foreground.to_rgba())
        .light_color(options.background.to_rgba())
        .min_dimensions(options.size, options.size)
        .build();

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;

    Ok(Bytes::from(png))
}
