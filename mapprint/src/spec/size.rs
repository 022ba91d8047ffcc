//! Output size with physical units.
//!
//! Sizes are given as `[width, height]` (pixels) or `[width, height, unit]`
//! where the unit is one of `px`, `mm`, `cm`, `m` or `in`. Physical units
//! convert to pixels through the spec's DPI.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PrintError;

/// Unit of an [`OutputSize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeUnit {
    /// Device pixels (DPI is ignored).
    #[default]
    Px,
    /// Millimeters.
    Mm,
    /// Centimeters.
    Cm,
    /// Meters.
    M,
    /// Inches.
    In,
}

impl SizeUnit {
    /// Returns the unit suffix used in serialized specs.
    pub fn as_str(self) -> &'static str {
        match self {
            SizeUnit::Px => "px",
            SizeUnit::Mm => "mm",
            SizeUnit::Cm => "cm",
            SizeUnit::M => "m",
            SizeUnit::In => "in",
        }
    }
}

impl FromStr for SizeUnit {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "px" => Ok(SizeUnit::Px),
            "mm" => Ok(SizeUnit::Mm),
            "cm" => Ok(SizeUnit::Cm),
            "m" => Ok(SizeUnit::M),
            "in" => Ok(SizeUnit::In),
            other => Err(PrintError::InvalidSpec(format!(
                "unknown size unit '{}' (expected px, mm, cm, m or in)",
                other
            ))),
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested output size of a print job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSize {
    /// Width in `unit`.
    pub width: f64,
    /// Height in `unit`.
    pub height: f64,
    /// Unit of `width` and `height`.
    pub unit: SizeUnit,
}

impl OutputSize {
    /// Creates a pixel-unit size.
    pub fn pixels(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: SizeUnit::Px,
        }
    }

    /// Creates a size in the given unit.
    pub fn new(width: f64, height: f64, unit: SizeUnit) -> Self {
        Self {
            width,
            height,
            unit,
        }
    }

    /// Converts to whole output pixels at the given DPI.
    ///
    /// Pixel sizes pass through unchanged; physical sizes convert through
    /// the DPI. The result is rounded and is at least 1x1 for any positive
    /// input.
    pub fn to_pixels(&self, dpi: f64) -> Result<(u32, u32), PrintError> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(PrintError::InvalidSpec(format!(
                "output size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        let to_px = |value: f64| -> u32 {
            let px = match self.unit {
                SizeUnit::Px => value,
                SizeUnit::In => value * dpi,
                SizeUnit::Mm => value / 25.4 * dpi,
                SizeUnit::Cm => value / 2.54 * dpi,
                SizeUnit::M => value / 0.0254 * dpi,
            };
            (px.round() as u32).max(1)
        };
        Ok((to_px(self.width), to_px(self.height)))
    }
}

impl Serialize for OutputSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.unit == SizeUnit::Px { 2 } else { 3 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.width)?;
        seq.serialize_element(&self.height)?;
        if self.unit != SizeUnit::Px {
            seq.serialize_element(self.unit.as_str())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for OutputSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl<'de> Visitor<'de> for SizeVisitor {
            type Value = OutputSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("[width, height] or [width, height, unit]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let width: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let height: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let unit = match seq.next_element::<String>()? {
                    Some(s) => SizeUnit::from_str(&s).map_err(de::Error::custom)?,
                    None => SizeUnit::Px,
                };
                Ok(OutputSize {
                    width,
                    height,
                    unit,
                })
            }
        }

        deserializer.deserialize_seq(SizeVisitor)
    }
}
