//! Geometric model of the coverage gained by network-coding two packets
//!
//! Each broadcast covers a disk of radius `R`. For a relay at `e` holding a
//! packet last sent from `f` and a coding candidate last sent from `o`, the
//! union of the three disks splits into zones:
//!
//! - `A0 = A - |F∩E|`: reached by our broadcast, not by `f`
//! - `A1 = |F∩E| - |F∩O|`
//! - `A2 = |E∩O| - |F∩O|`
//! - `A3 = |F∩O|`
//!
//! The model compares the expected number of nodes that learn something new
//! from one coded broadcast against one plain broadcast.

use std::f64::consts::PI;

use ncflood_core::Position;

#[derive(Debug, Clone, Copy)]
pub struct GainModel {
    range: f64,
    density: f64,
}

impl GainModel {
    pub fn new(range: f64, density: f64) -> Self {
        Self { range, density }
    }

    /// Area covered by two disks of the model's radius whose centers are `d`
    /// apart. Disks further than `2R` apart do not overlap.
    pub fn overlap_area(&self, d: f64) -> f64 {
        let r = self.range;
        let alpha = (d / (2.0 * r)).clamp(0.0, 1.0).acos();
        2.0 * alpha * r * r - d * r * alpha.sin()
    }

    /// Expected extra coverage of coding versus not coding. Positive values
    /// favor sending the coded pair.
    pub fn coding_gain(&self, e: &Position, f: &Position, o: &Position, loss_rate: f64) -> f64 {
        let p_e = loss_rate;
        let p_s = 1.0 - p_e;
        let rho = self.density;

        let area = PI * self.range * self.range;
        let overlap_fo = self.overlap_area(f.distance_to(o));
        let overlap_eo = self.overlap_area(e.distance_to(o));
        let overlap_fe = self.overlap_area(f.distance_to(e));

        let a0 = area - overlap_fe;
        let a1 = overlap_fe - overlap_fo;
        let a2 = overlap_eo - overlap_fo;
        let a3 = overlap_fo;

        let uncoded = p_s * rho * (a0 + (a1 + a3) * p_e);
        let coded = p_s * rho * ((a1 + a2) * p_s + a3 * 2.0 * p_e * p_s);

        coded - uncoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 500.0;
    const RHO: f64 = 12.0 / 1e6;

    fn model() -> GainModel {
        GainModel::new(R, RHO)
    }

    #[test]
    fn overlap_extremes() {
        let m = model();
        assert!((m.overlap_area(0.0) - PI * R * R).abs() < 1e-6);
        assert!(m.overlap_area(2.0 * R).abs() < 1e-6);
        assert_eq!(m.overlap_area(3.0 * R), 0.0);
    }

    #[test]
    fn overlap_shrinks_with_distance() {
        let m = model();
        let near = m.overlap_area(100.0);
        let mid = m.overlap_area(400.0);
        let far = m.overlap_area(900.0);
        assert!(near > mid && mid > far && far > 0.0);
    }

    #[test]
    fn opposite_last_hops_favor_coding() {
        // f and o on opposite sides of e: each half reaches an area the
        // other's sender did not cover
        let e = Position::ORIGIN;
        let f = Position::new(-450.0, 0.0, 0.0);
        let o = Position::new(450.0, 0.0, 0.0);
        let gain = model().coding_gain(&e, &f, &o, 0.0);
        assert!(gain > 0.0, "gain {}", gain);
    }

    #[test]
    fn shared_last_hop_disfavors_coding() {
        let e = Position::ORIGIN;
        let f = Position::new(450.0, 0.0, 0.0);
        let gain = model().coding_gain(&e, &f, &f, 0.0);
        assert!(gain < 0.0, "gain {}", gain);
    }

    #[test]
    fn everything_colocated() {
        // all disks identical: gain = ps * rho * A * pe * (2ps - 1)
        let p = Position::new(10.0, 10.0, 0.0);
        let pe = 0.2;
        let expected = (1.0 - pe) * RHO * PI * R * R * pe * (2.0 * (1.0 - pe) - 1.0);
        let gain = model().coding_gain(&p, &p, &p, pe);
        assert!((gain - expected).abs() < 1e-9);
        assert_eq!(model().coding_gain(&p, &p, &p, 0.0), 0.0);
    }

    #[test]
    fn total_loss_means_no_gain() {
        let e = Position::ORIGIN;
        let f = Position::new(-450.0, 0.0, 0.0);
        let o = Position::new(450.0, 0.0, 0.0);
        assert_eq!(model().coding_gain(&e, &f, &o, 1.0), 0.0);
    }
}
