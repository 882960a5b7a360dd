use std::collections::{BTreeMap, BTreeSet};

/// Vehicle id → `#rrggbb`, evenly spaced hues over the sorted distinct ids.
///
/// The result depends only on the set of ids, never on their order or multiplicity.
pub fn vehicle_legend<'a, I>(ids: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<&str> = ids.into_iter().collect();
    let count = distinct.len();
    distinct
        .into_iter()
        .enumerate()
        .map(|(idx, id)| {
            let hue = 360.0 * idx as f64 / count as f64;
            (id.to_string(), hsl_hex(hue, 0.8, 0.5))
        })
        .collect()
}

fn hsl_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}
