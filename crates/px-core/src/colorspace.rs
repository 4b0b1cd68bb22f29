//! Colorspace tags and storage classes.
//!
//! Pixels are always stored as three channels plus opacity; the
//! [`ColorspaceType`] tag says how those channels are to be interpreted.
//! CMYK additionally keeps the black channel in the index channel.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Interpretation of the three color channels of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorspaceType {
    /// Unknown or not yet assigned.
    Undefined,
    /// Linear RGB, the pivot of all conversions.
    #[default]
    Rgb,
    /// Cyan, magenta, yellow (`Range - RGB`).
    Cmy,
    /// CMY plus black in the index channel.
    Cmyk,
    /// Rec.601 luma replicated into all channels.
    Gray,
    /// Hue, saturation, brightness.
    Hsb,
    /// Hue, saturation, lightness.
    Hsl,
    /// Hue, whiteness, blackness.
    Hwb,
    /// CIE L*a*b* (D65).
    Lab,
    /// Cineon printing density log.
    Log,
    /// Ohta I1 I2 I3.
    Ohta,
    /// Rec.601 luma.
    Rec601Luma,
    /// Rec.601 Y Cb Cr.
    Rec601YCbCr,
    /// Rec.709 luma.
    Rec709Luma,
    /// Rec.709 Y Cb Cr.
    Rec709YCbCr,
    /// sRGB with the standard transfer curve.
    Srgb,
    /// RGB with an enabled matte channel.
    Transparent,
    /// CIE XYZ.
    Xyz,
    /// Kodak PhotoYCC.
    Ycc,
    /// NTSC Y I Q.
    Yiq,
    /// Y Pb Pr.
    YPbPr,
    /// PAL Y U V.
    Yuv,
}

impl ColorspaceType {
    /// Every tag except [`ColorspaceType::Undefined`].
    pub const ALL: [ColorspaceType; 21] = [
        Self::Rgb,
        Self::Cmy,
        Self::Cmyk,
        Self::Gray,
        Self::Hsb,
        Self::Hsl,
        Self::Hwb,
        Self::Lab,
        Self::Log,
        Self::Ohta,
        Self::Rec601Luma,
        Self::Rec601YCbCr,
        Self::Rec709Luma,
        Self::Rec709YCbCr,
        Self::Srgb,
        Self::Transparent,
        Self::Xyz,
        Self::Ycc,
        Self::Yiq,
        Self::YPbPr,
        Self::Yuv,
    ];

    /// Canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Rgb => "RGB",
            Self::Cmy => "CMY",
            Self::Cmyk => "CMYK",
            Self::Gray => "Gray",
            Self::Hsb => "HSB",
            Self::Hsl => "HSL",
            Self::Hwb => "HWB",
            Self::Lab => "Lab",
            Self::Log => "Log",
            Self::Ohta => "OHTA",
            Self::Rec601Luma => "Rec601Luma",
            Self::Rec601YCbCr => "Rec601YCbCr",
            Self::Rec709Luma => "Rec709Luma",
            Self::Rec709YCbCr => "Rec709YCbCr",
            Self::Srgb => "sRGB",
            Self::Transparent => "Transparent",
            Self::Xyz => "XYZ",
            Self::Ycc => "YCC",
            Self::Yiq => "YIQ",
            Self::YPbPr => "YPbPr",
            Self::Yuv => "YUV",
        }
    }

    /// Returns `true` for spaces whose pixels are plain RGB triples.
    #[inline]
    pub const fn is_rgb_compatible(&self) -> bool {
        matches!(self, Self::Rgb | Self::Transparent)
    }

    /// Returns `true` for spaces that carry black in the index channel.
    #[inline]
    pub const fn uses_index_black(&self) -> bool {
        matches!(self, Self::Cmyk)
    }

    /// Returns `true` for single-channel spaces.
    #[inline]
    pub const fn is_gray(&self) -> bool {
        matches!(self, Self::Gray | Self::Rec601Luma | Self::Rec709Luma)
    }
}

impl fmt::Display for ColorspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorspaceType {
    type Err = Error;

    /// Case-insensitive parse; `-` and `_` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        let space = match key.as_str() {
            "undefined" => Self::Undefined,
            "rgb" | "linearrgb" => Self::Rgb,
            "cmy" => Self::Cmy,
            "cmyk" => Self::Cmyk,
            "gray" | "grey" => Self::Gray,
            "hsb" | "hsv" => Self::Hsb,
            "hsl" => Self::Hsl,
            "hwb" => Self::Hwb,
            "lab" => Self::Lab,
            "log" => Self::Log,
            "ohta" => Self::Ohta,
            "rec601luma" => Self::Rec601Luma,
            "rec601ycbcr" | "ycbcr" => Self::Rec601YCbCr,
            "rec709luma" => Self::Rec709Luma,
            "rec709ycbcr" => Self::Rec709YCbCr,
            "srgb" => Self::Srgb,
            "transparent" => Self::Transparent,
            "xyz" => Self::Xyz,
            "ycc" => Self::Ycc,
            "yiq" => Self::Yiq,
            "ypbpr" => Self::YPbPr,
            "yuv" => Self::Yuv,
            _ => return Err(Error::invalid_argument(format!("unknown colorspace '{s}'"))),
        };
        Ok(space)
    }
}

/// How pixel colors are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageClass {
    /// Colors live in the pixel packets.
    #[default]
    Direct,
    /// Colors live in the colormap; pixels mirror `colormap[index]`.
    Pseudo,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("DirectClass"),
            Self::Pseudo => f.write_str("PseudoClass"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for space in ColorspaceType::ALL {
            let parsed: ColorspaceType = space.name().parse().unwrap();
            assert_eq!(parsed, space);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("rec-601-luma".parse::<ColorspaceType>().unwrap(), ColorspaceType::Rec601Luma);
        assert_eq!("GREY".parse::<ColorspaceType>().unwrap(), ColorspaceType::Gray);
        assert!("rgbz".parse::<ColorspaceType>().is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(ColorspaceType::Cmyk.uses_index_black());
        assert!(ColorspaceType::Transparent.is_rgb_compatible());
        assert!(!ColorspaceType::Srgb.is_rgb_compatible());
        assert_eq!(StorageClass::Pseudo.to_string(), "PseudoClass");
    }
}
