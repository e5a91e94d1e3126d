/// Floor used for bins whose magnitude is zero or not finite.
pub const POWER_FLOOR_DB: f32 = -200.0;

pub struct StatsHelper;

impl StatsHelper {
    /// `20 * log10(magnitude)`, clamped to [`POWER_FLOOR_DB`] for zero and
    /// degenerate inputs.
    pub fn magnitude_db(magnitude: f32) -> f32 {
        if !(magnitude.is_finite() && magnitude > 0.0) {
            return POWER_FLOOR_DB;
        }
        (20.0 * magnitude.log10()).max(POWER_FLOOR_DB)
    }

    /// Evenly spaced values over `[start, stop]`, both endpoints included.
    pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
        match count {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (count - 1) as f64;
                (0..count)
                    .map(|idx| {
                        if idx == count - 1 {
                            stop
                        } else {
                            start + step * idx as f64
                        }
                    })
                    .collect()
            }
        }
    }

    /// Minimum, maximum and mean of a row.
    pub fn min_max_mean(values: &[f32]) -> Option<(f32, f32, f32)> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        Some((min, max, mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_magnitude_is_clamped() {
        assert_eq!(StatsHelper::magnitude_db(0.0), POWER_FLOOR_DB);
        assert_eq!(StatsHelper::magnitude_db(f32::NAN), POWER_FLOOR_DB);
        assert_eq!(StatsHelper::magnitude_db(1e-30), POWER_FLOOR_DB);
        assert!((StatsHelper::magnitude_db(10.0) - 20.0).abs() < 1e-5);
    }

    #[test]
    fn linspace_includes_both_endpoints() {
        let axis = StatsHelper::linspace(913.8, 916.2, 1024);
        assert_eq!(axis.len(), 1024);
        assert_eq!(axis[0], 913.8);
        assert_eq!(axis[1023], 916.2);
        assert!(axis.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn min_max_mean_of_row() {
        assert_eq!(StatsHelper::min_max_mean(&[]), None);
        assert_eq!(
            StatsHelper::min_max_mean(&[-60.0, -10.0, -50.0]),
            Some((-60.0, -10.0, -40.0))
        );
    }
}
