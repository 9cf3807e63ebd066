use crate::business_logic::schema::PatternFamily;
use crate::errors::GeometryError;
use crate::models::pattern::PatternGeometry;

/// Height, target and symmetry projections over finished geometry.
///
/// Missing geometry is reported as an error instead of a zero measurement.
#[derive(Debug, Clone, Copy)]
pub struct TargetProjector<'a> {
    family: PatternFamily,
    geometry: &'a PatternGeometry,
}

impl<'a> TargetProjector<'a> {
    pub fn new(family: PatternFamily, geometry: &'a PatternGeometry) -> Self {
        Self { family, geometry }
    }

    pub fn pattern_height(&self) -> Result<f64, GeometryError> {
        match self.family {
            PatternFamily::InverseHeadAndShoulders => {
                let neckline = self.neckline()?;
                let head = self.head()?;
                Ok(neckline - head)
            }
            PatternFamily::HeadAndShoulders => {
                let neckline = self.neckline()?;
                let head = self.head()?;
                Ok(head - neckline)
            }
            PatternFamily::FallingWedge => self
                .geometry
                .height
                .ok_or(GeometryError::Missing("pattern height")),
        }
    }

    pub fn target_price(&self) -> Result<f64, GeometryError> {
        let height = self.pattern_height()?;
        match self.family {
            PatternFamily::InverseHeadAndShoulders => Ok(self.neckline()? + height),
            PatternFamily::HeadAndShoulders => Ok(self.neckline()? - height),
            PatternFamily::FallingWedge => {
                let breakout = self
                    .geometry
                    .breakout_level
                    .ok_or(GeometryError::Missing("breakout level"))?;
                Ok(breakout + height)
            }
        }
    }

    /// Shoulder symmetry for head-and-shoulders, convergence for wedges; 0-100
    pub fn symmetry_score(&self) -> Result<f64, GeometryError> {
        if self.family == PatternFamily::FallingWedge {
            return self
                .geometry
                .convergence
                .map(|score| score.clamp(0.0, 100.0))
                .ok_or(GeometryError::Missing("convergence"));
        }

        let neckline = self.neckline()?;
        let left = self
            .geometry
            .left_shoulder
            .ok_or(GeometryError::Missing("left shoulder"))?;
        let right = self
            .geometry
            .right_shoulder
            .ok_or(GeometryError::RightShoulderPending)?;

        let left_height = (left.price - neckline).abs();
        let right_height = (right.price - neckline).abs();
        let avg = (left_height + right_height) / 2.0;
        if avg == 0.0 {
            // both shoulders sit on the neckline
            return Ok(100.0);
        }

        let score = 100.0 * (1.0 - (left_height - right_height).abs() / avg);
        Ok(score.clamp(0.0, 100.0))
    }

    fn neckline(&self) -> Result<f64, GeometryError> {
        self.geometry.neckline.ok_or(GeometryError::Missing("neckline"))
    }

    fn head(&self) -> Result<f64, GeometryError> {
        self.geometry
            .head
            .map(|head| head.price)
            .ok_or(GeometryError::Missing("head"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pattern::PricePoint;
    use chrono::{TimeZone, Utc};

    fn point(price: f64) -> Option<PricePoint> {
        Some(PricePoint {
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        })
    }

    fn make_hs(neckline: f64, head: f64) -> PatternGeometry {
        PatternGeometry {
            neckline: Some(neckline),
            head: point(head),
            ..PatternGeometry::default()
        }
    }

    #[test]
    fn inverse_head_and_shoulders_projects_up() {
        let geometry = make_hs(100.0, 80.0);
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &geometry);
        assert!((projector.pattern_height().unwrap() - 20.0).abs() < 1e-9);
        assert!((projector.target_price().unwrap() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn head_and_shoulders_projects_down() {
        let geometry = make_hs(100.0, 130.0);
        let projector = TargetProjector::new(PatternFamily::HeadAndShoulders, &geometry);
        assert!((projector.pattern_height().unwrap() - 30.0).abs() < 1e-9);
        assert!((projector.target_price().unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn falling_wedge_uses_breakout_level() {
        let geometry = PatternGeometry {
            breakout_level: Some(50.0),
            height: Some(10.0),
            ..PatternGeometry::default()
        };
        let projector = TargetProjector::new(PatternFamily::FallingWedge, &geometry);
        assert!((projector.target_price().unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn missing_geometry_is_undefined_not_zero() {
        let geometry = PatternGeometry {
            neckline: Some(100.0),
            ..PatternGeometry::default()
        };
        let projector = TargetProjector::new(PatternFamily::HeadAndShoulders, &geometry);
        assert_eq!(projector.pattern_height(), Err(GeometryError::Missing("head")));
        assert_eq!(projector.target_price(), Err(GeometryError::Missing("head")));

        let wedge = PatternGeometry {
            breakout_level: Some(50.0),
            ..PatternGeometry::default()
        };
        let projector = TargetProjector::new(PatternFamily::FallingWedge, &wedge);
        assert_eq!(
            projector.target_price(),
            Err(GeometryError::Missing("pattern height"))
        );
    }

    #[test]
    fn zero_price_head_is_a_real_point() {
        let geometry = make_hs(5.0, 0.0);
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &geometry);
        assert_eq!(projector.pattern_height(), Ok(5.0));
    }

    #[test]
    fn symmetry_waits_for_right_shoulder() {
        let geometry = PatternGeometry {
            left_shoulder: point(90.0),
            ..make_hs(100.0, 80.0)
        };
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &geometry);
        assert_eq!(
            projector.symmetry_score(),
            Err(GeometryError::RightShoulderPending)
        );
    }

    #[test]
    fn symmetry_score_scales_with_shoulder_mismatch() {
        let even = PatternGeometry {
            left_shoulder: point(90.0),
            right_shoulder: point(90.0),
            ..make_hs(100.0, 80.0)
        };
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &even);
        assert!((projector.symmetry_score().unwrap() - 100.0).abs() < 1e-9);

        // heights 10 and 6, avg 8 -> 100 * (1 - 4/8)
        let uneven = PatternGeometry {
            left_shoulder: point(90.0),
            right_shoulder: point(94.0),
            ..make_hs(100.0, 80.0)
        };
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &uneven);
        assert!((projector.symmetry_score().unwrap() - 50.0).abs() < 1e-9);

        let lopsided = PatternGeometry {
            left_shoulder: point(70.0),
            right_shoulder: point(99.0),
            ..make_hs(100.0, 60.0)
        };
        let projector = TargetProjector::new(PatternFamily::InverseHeadAndShoulders, &lopsided);
        assert_eq!(projector.symmetry_score(), Ok(0.0));
    }

    #[test]
    fn wedge_symmetry_is_convergence() {
        let geometry = PatternGeometry {
            convergence: Some(72.5),
            ..PatternGeometry::default()
        };
        let projector = TargetProjector::new(PatternFamily::FallingWedge, &geometry);
        assert_eq!(projector.symmetry_score(), Ok(72.5));
    }
}
