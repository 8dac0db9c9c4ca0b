use serde::Deserialize;

use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl AxisRange {
    fn values(&self) -> Vec<i32> {
        let mut v = Vec::new();
        let mut cur = self.min;
        while cur < self.max {
            v.push(cur);
            cur += self.step.max(1);
        }
        v
    }
}

/// Sample offsets relative to an anchor point.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Region {
    /// Strided rectangular range, one axis range per dimension.
    Grid {
        x_range: AxisRange,
        y_range: AxisRange,
    },
    /// Unit-step box centered on the anchor.
    Box { width: i32, height: i32 },
    /// Per-axis offset list applied as a cross product.
    Cross { offsets: Vec<i32> },
}

impl Region {
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        match self {
            Region::Grid { x_range, y_range } => {
                for dx in x_range.values() {
                    for dy in y_range.values() {
                        out.push((dx, dy));
                    }
                }
            }
            Region::Box { width, height } => {
                let (hw, hh) = (width / 2, height / 2);
                for dx in -hw..=hw {
                    for dy in -hh..=hh {
                        out.push((dx, dy));
                    }
                }
            }
            Region::Cross { offsets } => {
                for &dx in offsets {
                    for &dy in offsets {
                        out.push((dx, dy));
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Channel {
    pub min: u8,
    pub max: u8,
}

impl Channel {
    fn contains(&self, value: u8) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Three independent inclusive channel intervals. A pixel matches iff all
/// three channels fall inside.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ColorRange {
    pub r: Channel,
    pub g: Channel,
    pub b: Channel,
}

impl ColorRange {
    pub fn contains(&self, [r, g, b]: [u8; 3]) -> bool {
        self.r.contains(r) && self.g.contains(g) && self.b.contains(b)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum MatchThreshold {
    MinPixels { min_pixels: u32 },
    Ratio { ratio: f32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub matched: u32,
    pub total: u32,
}

impl RuleOutcome {
    pub fn ratio(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f32 / self.total as f32
        }
    }

    /// Every offset fell outside the frame; the rule must not pass.
    pub fn is_inconclusive(&self) -> bool {
        self.total == 0
    }
}

/// Count how many samples of `region` around `anchor` fall inside `range`.
/// Offsets outside the frame are skipped and excluded from the total.
pub fn match_ratio(
    frame: &Frame,
    anchor: Point,
    region: &Region,
    range: &ColorRange,
) -> RuleOutcome {
    let mut outcome = RuleOutcome::default();
    for (dx, dy) in region.offsets() {
        let Some(pixel) = frame.pixel(anchor.x + dx, anchor.y + dy) else {
            continue;
        };
        outcome.total += 1;
        if range.contains(pixel) {
            outcome.matched += 1;
        }
    }
    outcome
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRule {
    pub sample_area: Region,
    pub color_range: ColorRange,
    pub threshold: MatchThreshold,
}

impl DetectionRule {
    pub fn evaluate(&self, frame: &Frame, anchor: Point) -> RuleOutcome {
        match_ratio(frame, anchor, &self.sample_area, &self.color_range)
    }

    pub fn passes(&self, outcome: RuleOutcome) -> bool {
        if outcome.is_inconclusive() {
            return false;
        }
        match self.threshold {
            MatchThreshold::MinPixels { min_pixels } => outcome.matched >= min_pixels,
            MatchThreshold::Ratio { ratio } => outcome.ratio() > ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: u8, max: u8) -> Channel {
        Channel { min, max }
    }

    fn black_range() -> ColorRange {
        ColorRange {
            r: range(0, 10),
            g: range(0, 10),
            b: range(0, 10),
        }
    }

    #[test]
    fn all_channels_must_be_in_range() {
        let cr = black_range();
        assert!(cr.contains([0, 0, 0]));
        assert!(cr.contains([10, 10, 10]));
        assert!(!cr.contains([11, 0, 0]));
        assert!(!cr.contains([0, 11, 0]));
        assert!(!cr.contains([0, 0, 11]));
    }

    #[test]
    fn out_of_bounds_samples_excluded_from_total() {
        let frame = Frame::solid(10, 10, [0, 0, 0]);
        let region = Region::Box {
            width: 5,
            height: 5,
        };
        // Anchor in a corner: only the in-frame quadrant is sampled.
        let outcome = match_ratio(&frame, Point { x: 0, y: 0 }, &region, &black_range());
        assert_eq!(outcome.total, 9);
        assert_eq!(outcome.matched, 9);
    }

    #[test]
    fn fully_out_of_bounds_region_is_inconclusive() {
        let frame = Frame::solid(10, 10, [0, 0, 0]);
        let region = Region::Box {
            width: 3,
            height: 3,
        };
        let outcome = match_ratio(&frame, Point { x: 100, y: 100 }, &region, &black_range());
        assert!(outcome.is_inconclusive());
        assert_eq!(outcome.ratio(), 0.0);

        let rule = DetectionRule {
            sample_area: region,
            color_range: black_range(),
            threshold: MatchThreshold::Ratio { ratio: 0.0 },
        };
        assert!(!rule.passes(outcome));
    }

    #[test]
    fn grid_region_strides_both_axes() {
        let region = Region::Grid {
            x_range: AxisRange {
                min: -10,
                max: 11,
                step: 5,
            },
            y_range: AxisRange {
                min: -10,
                max: 11,
                step: 5,
            },
        };
        // -10, -5, 0, 5, 10 on each axis.
        assert_eq!(region.offsets().len(), 25);
    }

    #[test]
    fn cross_region_is_offsets_squared() {
        let region = Region::Cross {
            offsets: vec![-2, 0, 2],
        };
        let offsets = region.offsets();
        assert_eq!(offsets.len(), 9);
        assert!(offsets.contains(&(-2, 2)));
        assert!(offsets.contains(&(0, 0)));
    }

    #[test]
    fn ratio_threshold_is_strict() {
        let rule = DetectionRule {
            sample_area: Region::Box {
                width: 1,
                height: 1,
            },
            color_range: black_range(),
            threshold: MatchThreshold::Ratio { ratio: 1.0 },
        };
        let outcome = RuleOutcome {
            matched: 1,
            total: 1,
        };
        assert!(!rule.passes(outcome));
    }

    #[test]
    fn min_pixels_threshold_counts_matches() {
        let mut frame = Frame::solid(10, 10, [200, 200, 200]);
        frame.paint(4, 4, 1, 1, [5, 5, 5]);
        let rule = DetectionRule {
            sample_area: Region::Box {
                width: 3,
                height: 3,
            },
            color_range: black_range(),
            threshold: MatchThreshold::MinPixels { min_pixels: 1 },
        };
        let outcome = rule.evaluate(&frame, Point { x: 4, y: 4 });
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.total, 9);
        assert!(rule.passes(outcome));
    }
}
