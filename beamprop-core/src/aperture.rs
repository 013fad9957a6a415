//! Physical apertures limiting the transverse acceptance of an element

use glam::DVec2;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApertureShape {
    Rectangular { half_width: f64, half_height: f64 },
    Elliptic { semi_x: f64, semi_y: f64 },
    Circular { radius: f64 },
    /// Intersection of a rectangle and an ellipse (LHC beam screen)
    RectElliptic {
        half_width: f64,
        half_height: f64,
        semi_x: f64,
        semi_y: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aperture {
    pub shape: ApertureShape,
    /// Centre of the aperture in the transverse plane
    pub position: DVec2,
}

impl Aperture {
    pub fn new(shape: ApertureShape) -> Self {
        Self {
            shape,
            position: DVec2::ZERO,
        }
    }

    pub fn rectangular(half_width: f64, half_height: f64) -> Self {
        Self::new(ApertureShape::Rectangular {
            half_width,
            half_height,
        })
    }

    pub fn elliptic(semi_x: f64, semi_y: f64) -> Self {
        Self::new(ApertureShape::Elliptic { semi_x, semi_y })
    }

    pub fn circular(radius: f64) -> Self {
        Self::new(ApertureShape::Circular { radius })
    }

    pub fn rect_elliptic(half_width: f64, half_height: f64, semi_x: f64, semi_y: f64) -> Self {
        Self::new(ApertureShape::RectElliptic {
            half_width,
            half_height,
            semi_x,
            semi_y,
        })
    }

    pub fn centered_at(mut self, position: DVec2) -> Self {
        self.position = position;
        self
    }

    pub fn offset(&mut self, offset: DVec2) {
        self.position += offset;
    }

    /// True if `point` lies strictly inside the clear aperture
    pub fn contains(&self, point: DVec2) -> bool {
        let d = point - self.position;
        match self.shape {
            ApertureShape::Rectangular {
                half_width,
                half_height,
            } => inside_rectangle(d, half_width, half_height),
            ApertureShape::Elliptic { semi_x, semi_y } => inside_ellipse(d, semi_x, semi_y),
            ApertureShape::Circular { radius } => inside_ellipse(d, radius, radius),
            ApertureShape::RectElliptic {
                half_width,
                half_height,
                semi_x,
                semi_y,
            } => inside_rectangle(d, half_width, half_height) && inside_ellipse(d, semi_x, semi_y),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.shape {
            ApertureShape::Rectangular { .. } => "rectangular",
            ApertureShape::Elliptic { .. } => "elliptic",
            ApertureShape::Circular { .. } => "circular",
            ApertureShape::RectElliptic { .. } => "rect-elliptic",
        }
    }
}

fn inside_rectangle(d: DVec2, half_width: f64, half_height: f64) -> bool {
    d.x.abs() < half_width && d.y.abs() < half_height
}

fn inside_ellipse(d: DVec2, semi_x: f64, semi_y: f64) -> bool {
    (d.x / semi_x).powi(2) + (d.y / semi_y).powi(2) < 1.0
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            ApertureShape::Rectangular {
                half_width,
                half_height,
            } => write!(f, "rectangular({:.4e}, {:.4e})", half_width, half_height)?,
            ApertureShape::Elliptic { semi_x, semi_y } => {
                write!(f, "elliptic({:.4e}, {:.4e})", semi_x, semi_y)?
            }
            ApertureShape::Circular { radius } => write!(f, "circular({:.4e})", radius)?,
            ApertureShape::RectElliptic {
                half_width,
                half_height,
                semi_x,
                semi_y,
            } => write!(
                f,
                "rect-elliptic({:.4e}, {:.4e}, {:.4e}, {:.4e})",
                half_width, half_height, semi_x, semi_y
            )?,
        }
        if self.position != DVec2::ZERO {
            write!(f, " at ({:.3e}, {:.3e})", self.position.x, self.position.y)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangular_contains() {
        let aper = Aperture::rectangular(1e-3, 2e-3);
        assert!(aper.contains(DVec2::new(0.9e-3, 1.9e-3)));
        assert!(!aper.contains(DVec2::new(1.1e-3, 0.0)));
        assert!(!aper.contains(DVec2::new(0.0, -2.1e-3)));
    }

    #[test]
    fn test_boundary_is_outside() {
        let aper = Aperture::circular(1.0);
        assert!(!aper.contains(DVec2::new(1.0, 0.0)));
        let aper = Aperture::rectangular(1.0, 1.0);
        assert!(!aper.contains(DVec2::new(1.0, 0.5)));
    }

    #[test]
    fn test_elliptic_contains() {
        let aper = Aperture::elliptic(2.0, 1.0);
        assert!(aper.contains(DVec2::new(1.9, 0.0)));
        assert!(!aper.contains(DVec2::new(1.5, 0.8)));
    }

    #[test]
    fn test_rect_ellipse_is_intersection() {
        let aper = Aperture::rect_elliptic(0.022, 0.0175, 0.022, 0.022);
        assert!(aper.contains(DVec2::new(0.0, 0.0)));
        // inside the circle, outside the rectangle
        assert!(!aper.contains(DVec2::new(0.0, 0.018)));
        // inside the rectangle, outside the circle
        assert!(!aper.contains(DVec2::new(0.0215, 0.017)));
    }

    #[test]
    fn test_offset_aperture() {
        let mut aper = Aperture::circular(1e-3).centered_at(DVec2::new(5e-3, 0.0));
        assert!(!aper.contains(DVec2::ZERO));
        assert!(aper.contains(DVec2::new(5.5e-3, 0.0)));
        aper.offset(DVec2::new(-5e-3, 0.0));
        assert!(aper.contains(DVec2::ZERO));
    }
}
