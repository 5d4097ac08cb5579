//! Spatial pixelizer: coordinates and radii to HEALPix pixel sets

use std::collections::BTreeSet;

use alert_archive_common::{ArchiveError, Result};

pub mod coords;
pub mod healpix;

pub use coords::{parse_coordinates, parse_dec, parse_ra, SkyCoord};
pub use healpix::Healpix;

/// Largest cone radius served (5 degrees)
pub const MAX_RADIUS_ARCSEC: f64 = 18_000.0;

/// Reject radii the pixel index cannot serve cheaply
pub fn check_radius(radius_arcsec: f64, max_arcsec: f64) -> Result<()> {
    if !radius_arcsec.is_finite() || radius_arcsec < 0.0 {
        return Err(ArchiveError::InvalidCoordinate(format!(
            "radius must be a non-negative number of arcseconds, got {}",
            radius_arcsec
        )));
    }
    if radius_arcsec > max_arcsec {
        return Err(ArchiveError::RadiusTooLarge {
            radius_arcsec,
            max_arcsec,
        });
    }
    Ok(())
}

/// Pixels at `nside` (RING) whose area may intersect the cone. The set
/// over-covers; rows must be refined by exact separation afterwards.
pub fn pixelize(ra_deg: f64, dec_deg: f64, radius_arcsec: f64, nside: u32) -> Result<BTreeSet<u64>> {
    check_radius(radius_arcsec, MAX_RADIUS_ARCSEC)?;
    let center = SkyCoord::new(ra_deg, dec_deg)?;
    let grid = Healpix::new(nside)?;
    Ok(grid.query_disc_inclusive(
        &center.unit_vector(),
        (radius_arcsec / 3600.0).to_radians(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_limits() {
        assert!(matches!(
            pixelize(10.0, 10.0, 18_000.1, 128),
            Err(ArchiveError::RadiusTooLarge { .. })
        ));
        assert!(matches!(
            pixelize(10.0, 10.0, -1.0, 128),
            Err(ArchiveError::InvalidCoordinate(_))
        ));
        assert!(pixelize(10.0, 10.0, 18_000.0, 128).is_ok());
    }

    #[test]
    fn test_pixel_set_contains_query_point() {
        let grid = Healpix::new(128).unwrap();
        for (ra, dec) in [
            (193.821739, 2.897311),
            (0.0, 0.0),
            (359.99, -89.9),
            (45.0, 41.8),
            (271.3, 66.5),
        ] {
            let coord = SkyCoord::new(ra, dec).unwrap();
            let (theta, phi) = coord.theta_phi();
            let own = grid.ang2pix(theta, phi);
            for radius in [0.0, 1.0, 10.0, 600.0, 18_000.0] {
                assert!(
                    pixelize(ra, dec, radius, 128).unwrap().contains(&own),
                    "({}, {}) r={}",
                    ra,
                    dec,
                    radius
                );
            }
        }
    }

    #[test]
    fn test_monotonic_in_radius() {
        let radii = [0.0, 5.0, 60.0, 900.0, 3600.0, 18_000.0];
        let sets: Vec<BTreeSet<u64>> = radii
            .iter()
            .map(|r| pixelize(150.0, -30.0, *r, 128).unwrap())
            .collect();
        for pair in sets.windows(2) {
            assert!(pair[0].is_subset(&pair[1]));
        }
    }

    #[test]
    fn test_small_cone_covers_few_pixels() {
        let pixels = pixelize(193.821739, 2.897311, 10.0, 128).unwrap();
        assert!(!pixels.is_empty());
        assert!(pixels.len() <= 16, "{} pixels", pixels.len());
    }
}
