use crate::align::overlap::OverlapPair;
use crate::foundation::math::sample_rgba8_bilinear;
use crate::geometry::projection::ProjectionSet;
use crate::source::RawFrame;

/// Lower bound of a per-channel gain.
pub const MIN_GAIN: f32 = 0.5;
/// Upper bound of a per-channel gain.
pub const MAX_GAIN: f32 = 2.0;

/// Per-lens RGB gains that bring every lens's overlap mean to the common mean.
///
/// Each lens is averaged over the overlap nodes it shares with any other lens; the target is the
/// mean of those averages. Channels too dark to measure keep a gain of 1.
pub(crate) fn overlap_gains(
    projections: &ProjectionSet,
    pairs: &[OverlapPair],
    frames: &[RawFrame],
) -> Vec<[f32; 3]> {
    let n = projections.len();
    let mut sums = vec![[0.0f64; 3]; n];
    let mut counts = vec![0usize; n];
    for pair in pairs {
        for s in [pair.a, pair.b] {
            let map = projections.map(s);
            let frame = &frames[s];
            for &idx in &pair.nodes {
                let p = map.node(idx);
                let px = sample_rgba8_bilinear(&frame.data, frame.width, frame.height, p.x, p.y);
                for (acc, v) in sums[s].iter_mut().zip(px) {
                    *acc += f64::from(v);
                }
                counts[s] += 1;
            }
        }
    }

    let means: Vec<Option<[f64; 3]>> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &c)| (c > 0).then(|| sum.map(|v| v / c as f64)))
        .collect();
    let measured: Vec<[f64; 3]> = means.iter().flatten().copied().collect();
    if measured.is_empty() {
        return vec![[1.0; 3]; n];
    }
    let mut target = [0.0f64; 3];
    for m in &measured {
        for (t, v) in target.iter_mut().zip(m) {
            *t += v / measured.len() as f64;
        }
    }

    means
        .iter()
        .map(|m| match m {
            Some(m) => {
                let mut g = [1.0f32; 3];
                for ch in 0..3 {
                    if m[ch] >= 1.0 {
                        g[ch] = ((target[ch] / m[ch]) as f32).clamp(MIN_GAIN, MAX_GAIN);
                    }
                }
                g
            }
            None => [1.0; 3],
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/fusion/exposure.rs"]
mod tests;
