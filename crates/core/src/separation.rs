//! Pairwise separation of points in the plane.
//!
//! Distance constraints of the form `k − |a − b| ≤ 0` are everywhere in
//! crease-pattern optimization. The distance is not differentiable where the
//! two points coincide, so this module fixes one policy for that case instead
//! of letting `0 / 0` reach a solver: at coincidence the direction is
//! [`COINCIDENT_DIRECTION`]. It is a valid supergradient of the concave
//! `−|a − b|`, keeps every value finite, and lets a solver pull coincident
//! points apart.

/// Unit direction reported when the two points coincide.
pub const COINCIDENT_DIRECTION: [f64; 2] = [-1.0, 0.0];

/// Distance between two points and the unit direction from `b` to `a`.
///
/// The direction is the gradient of the distance with respect to `a`; the
/// gradient with respect to `b` is its negation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub distance: f64,
    pub direction: [f64; 2],
}

/// Computes the separation of `a` from `b`.
///
/// # Example
///
/// ```
/// use crease_core::separation::separation;
///
/// let s = separation([3.0, 4.0], [0.0, 0.0]);
/// assert_eq!(s.distance, 5.0);
/// assert_eq!(s.direction, [0.6, 0.8]);
/// ```
#[must_use]
pub fn separation(a: [f64; 2], b: [f64; 2]) -> Separation {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let distance = dx.hypot(dy);

    let direction = if distance > 0.0 {
        [dx / distance, dy / distance]
    } else {
        COINCIDENT_DIRECTION
    };

    Separation {
        distance,
        direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn direction_is_unit() {
        let s = separation([0.2, 0.9], [0.7, 0.1]);
        let [ux, uy] = s.direction;

        assert_relative_eq!(ux.hypot(uy), 1.0, epsilon = 1e-15);
        assert_relative_eq!(s.distance, 0.89_f64.sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn coincident_points_use_fixed_direction() {
        let s = separation([0.0, 1.0], [0.0, 1.0]);

        assert_eq!(s.distance, 0.0);
        assert_eq!(s.direction, COINCIDENT_DIRECTION);
    }

    #[test]
    fn tiny_offsets_stay_finite() {
        let s = separation([1e-300, 0.0], [0.0, 0.0]);

        assert!(s.distance > 0.0);
        assert_eq!(s.direction, [1.0, 0.0]);
    }
}
