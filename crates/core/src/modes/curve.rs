//! Curve helpers shared by the line-based modes.

use glam::Vec2;

/// Uniform Catmull-Rom interpolation of evenly spaced control values into
/// `samples` output values. End points are clamped (the first and last
/// control values are repeated as phantom neighbours).
pub fn catmull_rom(controls: &[f32], samples: usize) -> Vec<f32> {
    match controls.len() {
        0 => return vec![0.0; samples],
        1 => return vec![controls[0]; samples],
        _ => {}
    }
    if samples < 2 {
        return controls.first().copied().into_iter().take(samples).collect();
    }

    let last = controls.len() - 1;
    let at = |i: isize| controls[i.clamp(0, last as isize) as usize];

    (0..samples)
        .map(|s| {
            let position = s as f32 / (samples - 1) as f32 * last as f32;
            let segment = (position.floor() as usize).min(last - 1);
            let t = position - segment as f32;
            let i = segment as isize;
            let (p0, p1, p2, p3) = (at(i - 1), at(i), at(i + 1), at(i + 2));

            let t2 = t * t;
            let t3 = t2 * t;
            0.5 * ((2.0 * p1)
                + (-p0 + p2) * t
                + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
                + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
        })
        .collect()
}

/// Lays values out left to right across `[0, 1]`.
pub fn polyline(values: &[f32]) -> Vec<Vec2> {
    let span = values.len().saturating_sub(1).max(1) as f32;
    values
        .iter()
        .enumerate()
        .map(|(i, y)| Vec2::new(i as f32 / span, *y))
        .collect()
}

pub fn points_finite(points: &[Vec2]) -> bool {
    points.iter().all(|p| p.is_finite())
}

/// Largest vertical distance between two equally sampled polylines.
pub fn max_vertical_gap(a: &[Vec2], b: &[Vec2]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p.y - q.y).abs())
        .fold(0.0, f32::max)
}
