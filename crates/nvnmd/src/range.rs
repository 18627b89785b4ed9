//! Range of the switched radial feature `s` seen by the fixed-point datapath.

use crate::sections::Descriptor;
use anyhow::{ensure, Result};
use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};

/// Widest `smax - smin` the fixed-point format represents.
pub const MAX_S_RANGE: f64 = 16.0;

/// Smoothly switched inverse distance.
///
/// `1/r` inside `rmin`, decaying to zero at `rmax` with a quintic switch.
pub fn r2s(r: f64, rmin: f64, rmax: f64) -> f64 {
    if r > 0.01 && r <= rmin {
        1.0 / r
    } else if r > rmin && r <= rmax {
        let u = (r - rmin) / (rmax - rmin);
        (u * u * u * (-6.0 * u * u + 15.0 * u - 10.0) + 1.0) / r
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub smin: f64,
    pub smax: f64,
}

impl ScaleRange {
    pub fn width(&self) -> f64 {
        self.smax - self.smin
    }

    pub fn exceeds_limit(&self) -> bool {
        self.width() > MAX_S_RANGE
    }
}

/// Normalized `s` range over the first `ntype` types.
///
/// `mean` and `stdev` are the per-type statistics of the environment matrix;
/// only column 0 (the radial component) is used.
pub fn scale_range(
    dscp: &Descriptor,
    mean: ArrayView2<'_, f64>,
    stdev: ArrayView2<'_, f64>,
) -> Result<ScaleRange> {
    let ntype = dscp.ntype;
    ensure!(ntype > 0, "descriptor has no types; derive the configuration first");
    ensure!(
        mean.nrows() >= ntype && stdev.nrows() >= ntype,
        "statistics cover {} / {} types, descriptor needs {}",
        mean.nrows(),
        stdev.nrows(),
        ntype
    );
    ensure!(
        mean.ncols() > 0 && stdev.ncols() > 0,
        "statistics have no radial column"
    );

    let s0 = r2s(dscp.dmin, dscp.rcut_smth, dscp.rcut);
    let mean = mean.slice(s![..ntype, 0]);
    let stdev = stdev.slice(s![..ntype, 0]);
    ensure!(
        stdev.iter().all(|v| *v != 0.0),
        "standard deviation must be non-zero"
    );

    let (smin, smax) = mean.iter().zip(stdev.iter()).fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), (avg, std)| (lo.min(-avg / std), hi.max((s0 - avg) / std)),
    );
    Ok(ScaleRange { smin, smax })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn r2s_is_continuous_at_the_switch_points() {
        let (rmin, rmax) = (0.5, 6.0);
        assert_abs_diff_eq!(r2s(rmin, rmin, rmax), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r2s(rmin + 1e-9, rmin, rmax), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r2s(rmax, rmin, rmax), 0.0, epsilon = 1e-12);
        assert_eq!(r2s(rmax + 1.0, rmin, rmax), 0.0);
        assert_eq!(r2s(0.0, rmin, rmax), 0.0);
    }

    #[test]
    fn r2s_midpoint_value() {
        // u = 0.5 gives a switch factor of exactly one half.
        assert_abs_diff_eq!(r2s(3.0, 2.0, 4.0), 0.5 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn range_over_first_ntype_rows() -> Result<()> {
        let mut dscp = Descriptor {
            sel: vec![10, 10],
            dmin: 1.0,
            rcut_smth: 2.0,
            rcut: 6.0,
            ..Descriptor::default()
        }
        .derive();
        dscp.ntype = 2;

        let mean = array![[0.1, 0.0], [0.2, 0.0], [-50.0, 0.0]];
        let stdev = array![[0.5, 1.0], [0.25, 1.0], [1.0, 1.0]];
        let range = scale_range(&dscp, mean.view(), stdev.view())?;

        // s0 = 1 / dmin = 1.0
        assert_abs_diff_eq!(range.smin, -0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(range.smax, 3.2, epsilon = 1e-12);
        assert!(!range.exceeds_limit());
        Ok(())
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let dscp = Descriptor::default().derive();
        let mean = array![[0.0], [0.0]];
        let stdev = array![[1.0], [1.0]];
        assert!(scale_range(&dscp, mean.view(), stdev.view()).is_err());
    }

    #[test]
    fn wide_range_exceeds_limit() {
        let range = ScaleRange {
            smin: -4.0,
            smax: 12.5,
        };
        assert!(range.exceeds_limit());
    }
}
