//! Magnitude rates per band and g-r colour per object

use std::collections::HashMap;

use alert_archive_common::CellValue;

use super::{
    MaterializedRow, V_COLOR, V_COLOR_RATE, V_RATE, V_SIGMA_COLOR, V_SIGMA_COLOR_RATE,
    V_SIGMA_RATE,
};

/// Band identifiers of the two principal filters
pub const FID_G: i64 = 1;
pub const FID_R: i64 = 2;

/// Columns read by [`extract_rate_and_color`]
pub const PHOTOMETRY_COLUMNS: &[&str] = &["i:objectId", "i:jd", "i:fid", "i:magpsf", "i:sigmapsf"];

#[derive(Debug, Clone, Copy)]
struct Point {
    row: usize,
    jd: f64,
    mag: f64,
    sigma: f64,
}

#[derive(Debug, Clone, Copy)]
struct ColorPoint {
    jd: f64,
    color: f64,
    sigma: f64,
    rate: Option<f64>,
    sigma_rate: Option<f64>,
}

/// Fill rate and colour columns on every row.
///
/// Rates are `Δmag / Δjd` between consecutive same-band alerts of an
/// object; the first alert of a band gets none. Colour pairs each g alert
/// with the nearest r alert within `tolerance` days, and every alert of the
/// object then takes the nearest colour point within the same tolerance.
pub fn extract_rate_and_color(rows: &mut [MaterializedRow], tolerance: f64) {
    for row in rows.iter_mut() {
        for column in [
            V_RATE,
            V_SIGMA_RATE,
            V_COLOR,
            V_SIGMA_COLOR,
            V_COLOR_RATE,
            V_SIGMA_COLOR_RATE,
        ] {
            row.derived.insert(column, CellValue::Null);
        }
    }

    let mut objects: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let Some(object) = row.str("i:objectId") {
            objects.entry(object.to_string()).or_default().push(i);
        }
    }

    for indices in objects.values() {
        let mut history: Vec<(usize, f64)> = indices
            .iter()
            .filter_map(|&i| rows[i].f64("i:jd").map(|jd| (i, jd)))
            .collect();
        history.sort_by(|a, b| a.1.total_cmp(&b.1));

        let band = |fid: i64| -> Vec<Point> {
            history
                .iter()
                .filter(|(i, _)| rows[*i].i64("i:fid") == Some(fid))
                .filter_map(|&(i, jd)| {
                    Some(Point {
                        row: i,
                        jd,
                        mag: rows[i].f64("i:magpsf")?,
                        sigma: rows[i].f64("i:sigmapsf").unwrap_or(f64::NAN),
                    })
                })
                .collect()
        };
        let g = band(FID_G);
        let r = band(FID_R);

        for points in [&g, &r] {
            for pair in points.windows(2) {
                let (prev, cur) = (pair[0], pair[1]);
                let djd = cur.jd - prev.jd;
                if djd == 0.0 {
                    continue;
                }
                let row = &mut rows[cur.row];
                row.derived.insert(V_RATE, finite((cur.mag - prev.mag) / djd));
                row.derived
                    .insert(V_SIGMA_RATE, finite(cur.sigma.hypot(prev.sigma) / djd));
            }
        }

        let colors = pair_colors(&g, &r, tolerance);
        if colors.is_empty() {
            continue;
        }
        for &(i, jd) in &history {
            if let Some(point) = nearest(&colors, jd, tolerance, |c| c.jd) {
                let row = &mut rows[i];
                row.derived.insert(V_COLOR, finite(point.color));
                row.derived.insert(V_SIGMA_COLOR, finite(point.sigma));
                row.derived
                    .insert(V_COLOR_RATE, point.rate.map_or(CellValue::Null, finite));
                row.derived.insert(
                    V_SIGMA_COLOR_RATE,
                    point.sigma_rate.map_or(CellValue::Null, finite),
                );
            }
        }
    }
}

/// g-r at each g alert that has an r alert within tolerance, with its
/// rate of change between consecutive matched g alerts
fn pair_colors(g: &[Point], r: &[Point], tolerance: f64) -> Vec<ColorPoint> {
    let mut colors: Vec<ColorPoint> = g
        .iter()
        .filter_map(|gp| {
            let rp = nearest(r, gp.jd, tolerance, |p| p.jd)?;
            Some(ColorPoint {
                jd: gp.jd,
                color: gp.mag - rp.mag,
                sigma: gp.sigma.hypot(rp.sigma),
                rate: None,
                sigma_rate: None,
            })
        })
        .collect();

    for i in 1..colors.len() {
        let (prev, cur) = (colors[i - 1], colors[i]);
        let djd = cur.jd - prev.jd;
        if djd != 0.0 {
            colors[i].rate = Some((cur.color - prev.color) / djd);
            colors[i].sigma_rate = Some(cur.sigma.hypot(prev.sigma) / djd);
        }
    }
    colors
}

/// Closest item in time within `tolerance`, earliest on ties
fn nearest<T: Copy>(items: &[T], jd: f64, tolerance: f64, time: impl Fn(&T) -> f64) -> Option<T> {
    items
        .iter()
        .map(|item| ((time(item) - jd).abs(), *item))
        .filter(|(distance, _)| *distance <= tolerance)
        .fold(None, |best: Option<(f64, T)>, (distance, item)| match best {
            Some((d, _)) if d <= distance => best,
            _ => Some((distance, item)),
        })
        .map(|(_, item)| item)
}

fn finite(value: f64) -> CellValue {
    if value.is_finite() {
        CellValue::Float(value)
    } else {
        CellValue::Null
    }
}
