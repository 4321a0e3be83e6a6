//! RPM to lightbar color.

use crate::config::LedThresholds;

pub type Rgb = (u8, u8, u8);

pub const LED_OFF: Rgb = (0, 0, 0);
const GREEN: [f32; 3] = [0.0, 255.0, 0.0];
const YELLOW: [f32; 3] = [255.0, 255.0, 0.0];
const RED: [f32; 3] = [255.0, 0.0, 0.0];

/// Map an RPM percentage through green, yellow and red segments.
///
/// `None` (no valid RPM) turns the LED off.
#[must_use]
pub fn rpm_color(rpm_percent: Option<f32>, thresholds: &LedThresholds) -> Rgb {
    let Some(pct) = rpm_percent.filter(|pct| pct.is_finite() && *pct > 0.0) else {
        return LED_OFF;
    };
    let LedThresholds { green, yellow, red } = *thresholds;

    if pct < green {
        to_rgb(GREEN)
    } else if pct < yellow {
        interpolate(GREEN, YELLOW, segment_factor(pct, green, yellow))
    } else if pct < red {
        interpolate(YELLOW, RED, segment_factor(pct, yellow, red))
    } else {
        to_rgb(RED)
    }
}

fn segment_factor(value: f32, start: f32, end: f32) -> f32 {
    let span = end - start;
    if span <= f32::EPSILON {
        return 1.0;
    }
    ((value - start) / span).clamp(0.0, 1.0)
}

fn interpolate(from: [f32; 3], to: [f32; 3], factor: f32) -> Rgb {
    let [r1, g1, b1] = from;
    let [r2, g2, b2] = to;
    to_rgb([
        r1 + (r2 - r1) * factor,
        g1 + (g2 - g1) * factor,
        b1 + (b2 - b1) * factor,
    ])
}

fn to_rgb([r, g, b]: [f32; 3]) -> Rgb {
    (channel(r), channel(g), channel(b))
}

/// Truncating conversion of a 0-255 channel value.
#[expect(
    clippy::cast_possible_truncation,
    reason = "value is clamped to 0..=255 before the cast"
)]
fn channel(value: f32) -> u8 {
    let clamped = if value.is_finite() { value.clamp(0.0, 255.0) } else { 0.0 };
    u8::try_from(clamped.trunc() as i32).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> LedThresholds {
        LedThresholds::default()
    }

    #[test]
    fn test_segments() {
        assert_eq!(rpm_color(Some(10.0), &thresholds()), (0, 255, 0));
        assert_eq!(rpm_color(Some(60.0), &thresholds()), (0, 255, 0));
        assert_eq!(rpm_color(Some(70.0), &thresholds()), (127, 255, 0));
        assert_eq!(rpm_color(Some(80.0), &thresholds()), (255, 255, 0));
        assert_eq!(rpm_color(Some(87.5), &thresholds()), (255, 127, 0));
        assert_eq!(rpm_color(Some(95.0), &thresholds()), (255, 0, 0));
        assert_eq!(rpm_color(Some(100.0), &thresholds()), (255, 0, 0));
    }

    #[test]
    fn test_invalid_rpm_turns_led_off() {
        assert_eq!(rpm_color(None, &thresholds()), LED_OFF);
        assert_eq!(rpm_color(Some(0.0), &thresholds()), LED_OFF);
        assert_eq!(rpm_color(Some(f32::NAN), &thresholds()), LED_OFF);
    }

    #[test]
    fn test_collapsed_segment_does_not_divide_by_zero() {
        let flat = LedThresholds {
            green: 80.0,
            yellow: 80.0,
            red: 80.0,
        };
        assert_eq!(rpm_color(Some(79.9), &flat), (0, 255, 0));
        assert_eq!(rpm_color(Some(80.0), &flat), (255, 0, 0));
    }
}
