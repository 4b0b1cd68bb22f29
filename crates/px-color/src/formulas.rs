//! Closed-form per-pixel converters.
//!
//! All functions work on normalized channels in `[0, 1]`. Hue is stored as a
//! fraction of a full turn. RGB is treated as linear.
//!
//! # Storage of alternate channels
//!
//! | Space | red        | green        | blue       | index |
//! |-------|------------|--------------|------------|-------|
//! | CMY   | cyan       | magenta      | yellow     |       |
//! | CMYK  | cyan       | magenta      | yellow     | black |
//! | HSB   | hue        | saturation   | brightness |       |
//! | HSL   | hue        | saturation   | lightness  |       |
//! | HWB   | hue        | whiteness    | blackness  |       |
//! | Lab   | L / 100    | a / 255 + .5 | b / 255 + .5 |     |

use glam::{DMat3, DVec3};

use crate::matrix::{D65_WHITE, rgb_to_xyz_matrix};

/// Hue of an RGB triple as a fraction of a turn; 0 for grays.
#[inline]
fn hue(r: f64, g: f64, b: f64, max: f64, delta: f64) -> f64 {
    if delta <= 0.0 {
        return 0.0;
    }
    let sector = if r == max {
        (g - b) / delta
    } else if g == max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    (sector / 6.0).rem_euclid(1.0)
}

/// RGB to cyan, magenta, yellow.
#[inline]
pub fn rgb_to_cmy(rgb: [f64; 3]) -> [f64; 3] {
    [1.0 - rgb[0], 1.0 - rgb[1], 1.0 - rgb[2]]
}

/// Cyan, magenta, yellow to RGB.
#[inline]
pub fn cmy_to_rgb(cmy: [f64; 3]) -> [f64; 3] {
    rgb_to_cmy(cmy)
}

/// RGB to CMY plus black.
///
/// Black is `min(c, m, y)`; the remaining inks are rescaled by
/// `(c - k) / (1 - k)`. Pure black yields zero inks.
#[inline]
pub fn rgb_to_cmyk(rgb: [f64; 3]) -> ([f64; 3], f64) {
    let [c, m, y] = rgb_to_cmy(rgb);
    let k = c.min(m).min(y);
    if k >= 1.0 {
        return ([0.0, 0.0, 0.0], 1.0);
    }
    let scale = 1.0 / (1.0 - k);
    ([(c - k) * scale, (m - k) * scale, (y - k) * scale], k)
}

/// CMY plus black to RGB: `1 - (cmy * (1 - k) + k)`.
#[inline]
pub fn cmyk_to_rgb(cmy: [f64; 3], k: f64) -> [f64; 3] {
    let ink = |v: f64| 1.0 - (v * (1.0 - k) + k);
    [ink(cmy[0]), ink(cmy[1]), ink(cmy[2])]
}

/// RGB to hue, saturation, lightness.
pub fn rgb_to_hsl(rgb: [f64; 3]) -> [f64; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let delta = max - min;
    if delta <= 0.0 {
        return [0.0, 0.0, lightness];
    }
    let saturation = if lightness <= 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };
    [hue(r, g, b, max, delta), saturation, lightness]
}

/// Hue, saturation, lightness to RGB.
pub fn hsl_to_rgb(hsl: [f64; 3]) -> [f64; 3] {
    let [h, s, l] = hsl;
    if s <= 0.0 {
        return [l, l, l];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

#[inline]
fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// RGB to hue, saturation, brightness.
pub fn rgb_to_hsb(rgb: [f64; 3]) -> [f64; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let saturation = if max > 0.0 { delta / max } else { 0.0 };
    [hue(r, g, b, max, delta), saturation, max]
}

/// Hue, saturation, brightness to RGB.
pub fn hsb_to_rgb(hsb: [f64; 3]) -> [f64; 3] {
    let [h, s, v] = hsb;
    if s <= 0.0 {
        return [v, v, v];
    }
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u8 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// RGB to hue, whiteness, blackness.
pub fn rgb_to_hwb(rgb: [f64; 3]) -> [f64; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    [hue(r, g, b, max, max - min), min, 1.0 - max]
}

/// Hue, whiteness, blackness to RGB.
///
/// Whiteness plus blackness of one or more is an achromatic gray.
pub fn hwb_to_rgb(hwb: [f64; 3]) -> [f64; 3] {
    let [h, w, b] = hwb;
    if w + b >= 1.0 {
        let gray = w / (w + b);
        return [gray, gray, gray];
    }
    let v = 1.0 - b;
    hsb_to_rgb([h, 1.0 - w / v, v])
}

const LAB_EPSILON: f64 = 216.0 / 24389.0;
const LAB_KAPPA: f64 = 24389.0 / 27.0;

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        (LAB_KAPPA * t + 16.0) / 116.0
    }
}

#[inline]
fn lab_f_inv(f: f64) -> f64 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (116.0 * f - 16.0) / LAB_KAPPA
    }
}

/// RGB to CIE L*a*b* (D65), stored as `L/100, a/255 + 0.5, b/255 + 0.5`.
pub fn rgb_to_lab(rgb: [f64; 3]) -> [f64; 3] {
    let xyz = rgb_to_xyz_matrix() * DVec3::from_array(rgb) / D65_WHITE;
    let (fx, fy, fz) = (lab_f(xyz.x), lab_f(xyz.y), lab_f(xyz.z));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);
    [l / 100.0, a / 255.0 + 0.5, b / 255.0 + 0.5]
}

/// Stored L*a*b* back to RGB.
pub fn lab_to_rgb(lab: [f64; 3]) -> [f64; 3] {
    let l = lab[0] * 100.0;
    let a = (lab[1] - 0.5) * 255.0;
    let b = (lab[2] - 0.5) * 255.0;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let xyz = DVec3::new(lab_f_inv(fx), lab_f_inv(fy), lab_f_inv(fz)) * D65_WHITE;
    xyz_to_rgb_matrix().mul_vec3(xyz).to_array()
}

fn xyz_to_rgb_matrix() -> DMat3 {
    rgb_to_xyz_matrix().inverse()
}

/// sRGB encoding of linear light.
#[inline]
pub fn srgb_encode(l: f64) -> f64 {
    if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    }
}

/// Linear light from sRGB encoding.
#[inline]
pub fn srgb_decode(v: f64) -> f64 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}
