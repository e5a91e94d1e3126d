use super::encoding_error;
use image::{Rgb, RgbImage};
use log::debug;
use rfspikecore::{DetectionEvent, EventSink, SinkError, SinkResult};
use std::fs;
use std::path::PathBuf;

/// Viridis control points, dark to bright.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

/// Maps `t` in `[0, 1]` onto the colour ramp.
pub fn viridis(t: f32) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let lower = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lower as f32;
    let (a, b) = (VIRIDIS[lower], VIRIDIS[lower + 1]);
    let mix = |i: usize| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * frac).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// Renders a waterfall as one pixel per bin, newest row at the top and
/// oldest at the bottom, scaled between the snapshot's min and max power.
pub fn render_waterfall(event: &DetectionEvent) -> SinkResult<RgbImage> {
    let matrix = event.waterfall.to_matrix();
    let (rows, bins) = matrix.dim();
    if rows == 0 || bins == 0 {
        return Err(SinkError::Encoding("waterfall snapshot is empty".into()));
    }
    let (min, max) = matrix
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = if max > min { max - min } else { 1.0 };

    let height = rows as u32;
    let mut image = RgbImage::new(bins as u32, height);
    for ((row, bin), &value) in matrix.indexed_iter() {
        let y = height - 1 - row as u32;
        image.put_pixel(bin as u32, y, viridis((value - min) / span));
    }
    Ok(image)
}

/// Saves `event_<stamp>.png` for every detection.
pub struct SnapshotSink {
    dir: PathBuf,
}

impl SnapshotSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, event: &DetectionEvent) -> PathBuf {
        self.dir
            .join(format!("event_{}.png", event.detection.file_stamp()))
    }
}

impl EventSink for SnapshotSink {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
        let image = render_waterfall(event)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path(event);
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(encoding_error)?;
        debug!(
            "snapshot {}x{} written to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(())
    }
}
