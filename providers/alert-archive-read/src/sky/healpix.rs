//! HEALPix pixelization in the RING scheme
//!
//! Only what the cone search needs: point-to-pixel, pixel centres, the
//! maximal pixel radius and an inclusive disc query.

use std::collections::BTreeSet;
use std::f64::consts::{FRAC_PI_2, PI};

use alert_archive_common::{ArchiveError, Result};

/// Largest supported resolution parameter
pub const MAX_NSIDE: u32 = 8192;

/// Fudge applied to the maximal pixel radius in inclusive queries
const INCLUSIVE_FUDGE: f64 = 1.1;

/// One isolatitude ring: first pixel, pixel count, cos(colatitude), and
/// whether pixel centres are offset by half a pixel in longitude
#[derive(Debug, Clone, Copy)]
struct RingInfo {
    start: u64,
    count: u64,
    z: f64,
    shifted: bool,
}

/// RING-ordered HEALPix grid at a fixed `nside`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Healpix {
    nside: u64,
}

impl Healpix {
    pub fn new(nside: u32) -> Result<Self> {
        if nside == 0 || !nside.is_power_of_two() || nside > MAX_NSIDE {
            return Err(ArchiveError::InvalidCoordinate(format!(
                "nside must be a power of two in [1, {}], got {}",
                MAX_NSIDE, nside
            )));
        }
        Ok(Self {
            nside: u64::from(nside),
        })
    }

    pub fn nside(&self) -> u64 {
        self.nside
    }

    pub fn npix(&self) -> u64 {
        12 * self.nside * self.nside
    }

    fn ncap(&self) -> u64 {
        2 * self.nside * (self.nside - 1)
    }

    fn ring_count(&self) -> u64 {
        4 * self.nside - 1
    }

    /// Pixel containing the direction (colatitude `theta`, longitude `phi`)
    pub fn ang2pix(&self, theta: f64, phi: f64) -> u64 {
        let nside = self.nside as f64;
        let z = theta.cos();
        let za = z.abs();
        let tt = (phi / FRAC_PI_2).rem_euclid(4.0);

        if za <= 2.0 / 3.0 {
            let nl4 = 4 * self.nside;
            let temp1 = nside * (0.5 + tt);
            let temp2 = nside * z * 0.75;
            let jp = (temp1 - temp2) as u64;
            let jm = (temp1 + temp2) as u64;
            let ir = self.nside + 1 + jp - jm;
            let kshift = 1 - (ir & 1);
            let ip = ((jp + jm + kshift + 1 + 2 * nl4 - self.nside) / 2) % nl4;
            self.ncap() + (ir - 1) * nl4 + ip
        } else {
            let tp = tt - tt.floor();
            let tmp = nside * (3.0 * (1.0 - za)).sqrt();
            let jp = (tp * tmp) as u64;
            let jm = ((1.0 - tp) * tmp) as u64;
            let ir = jp + jm + 1;
            let ip = ((tt * ir as f64) as u64).min(4 * ir - 1);
            if z > 0.0 {
                2 * ir * (ir - 1) + ip
            } else {
                self.npix() - 2 * ir * (ir + 1) + ip
            }
        }
    }

    /// Colatitude and longitude of a pixel centre
    pub fn pix2ang(&self, pix: u64) -> (f64, f64) {
        let nside = self.nside as f64;
        let npix = self.npix();
        let ncap = self.ncap();

        if pix < ncap {
            let iring = (1 + isqrt(1 + 2 * pix)) >> 1;
            let iphi = pix + 1 - 2 * iring * (iring - 1);
            let z = 1.0 - (iring * iring) as f64 / (3.0 * nside * nside);
            let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
            (z.acos(), phi)
        } else if pix < npix - ncap {
            let nl4 = 4 * self.nside;
            let ip = pix - ncap;
            let tmp = ip / nl4;
            let iring = tmp + self.nside;
            let iphi = ip - tmp * nl4 + 1;
            let fodd = if (iring + self.nside) & 1 == 1 { 1.0 } else { 0.5 };
            let z = (2.0 * nside - iring as f64) * 2.0 / (3.0 * nside);
            let phi = (iphi as f64 - fodd) * PI / (2.0 * nside);
            (z.acos(), phi)
        } else {
            let ip = npix - pix;
            let iring = (1 + isqrt(2 * ip - 1)) >> 1;
            let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
            let z = -1.0 + (iring * iring) as f64 / (3.0 * nside * nside);
            let phi = (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64;
            (z.acos(), phi)
        }
    }

    /// Unit vector of a pixel centre
    pub fn pix2vec(&self, pix: u64) -> [f64; 3] {
        let (theta, phi) = self.pix2ang(pix);
        let st = theta.sin();
        [st * phi.cos(), st * phi.sin(), theta.cos()]
    }

    /// Maximal angular distance (radians) between a pixel centre and its corners
    pub fn max_pixrad(&self) -> f64 {
        let nside = self.nside as f64;
        let va = vec_from_z_phi(2.0 / 3.0, PI / (4.0 * nside));
        let t1 = (1.0 - 1.0 / nside).powi(2);
        let vb = vec_from_z_phi(1.0 - t1 / 3.0, 0.0);
        angle_between(&va, &vb)
    }

    fn ring_info(&self, ring: u64) -> RingInfo {
        let nside = self.nside as f64;
        let fact = 3.0 * nside * nside;
        if ring < self.nside {
            RingInfo {
                start: 2 * ring * (ring - 1),
                count: 4 * ring,
                z: 1.0 - (ring * ring) as f64 / fact,
                shifted: true,
            }
        } else if ring <= 3 * self.nside {
            RingInfo {
                start: self.ncap() + (ring - self.nside) * 4 * self.nside,
                count: 4 * self.nside,
                z: (2.0 * nside - ring as f64) * 2.0 / (3.0 * nside),
                shifted: (ring - self.nside) & 1 == 0,
            }
        } else {
            let ir = 4 * self.nside - ring;
            RingInfo {
                start: self.npix() - 2 * ir * (ir + 1),
                count: 4 * ir,
                z: -1.0 + (ir * ir) as f64 / fact,
                shifted: true,
            }
        }
    }

    /// Every pixel that may overlap the disc of `radius` radians around
    /// `center`. Pixels whose centre lies within `radius` plus the maximal
    /// pixel radius are kept, so the result over-covers the disc.
    pub fn query_disc_inclusive(&self, center: &[f64; 3], radius: f64) -> BTreeSet<u64> {
        let search = (radius + INCLUSIVE_FUDGE * self.max_pixrad()).min(PI);
        let cos_search = search.cos();
        let theta0 = center[2].clamp(-1.0, 1.0).acos();
        let theta_min = (theta0 - search).max(0.0);
        let theta_max = (theta0 + search).min(PI);

        let mut pixels = BTreeSet::new();
        for ring in 1..=self.ring_count() {
            let info = self.ring_info(ring);
            let theta = info.z.acos();
            if theta < theta_min || theta > theta_max {
                continue;
            }
            let sin_theta = (1.0 - info.z * info.z).max(0.0).sqrt();
            let offset = if info.shifted { 0.5 } else { 0.0 };
            let dphi = 2.0 * PI / info.count as f64;
            for j in 0..info.count {
                let phi = (j as f64 + offset) * dphi;
                let v = [sin_theta * phi.cos(), sin_theta * phi.sin(), info.z];
                if dot(&v, center) >= cos_search {
                    pixels.insert(info.start + j);
                }
            }
        }
        pixels
    }
}

fn isqrt(v: u64) -> u64 {
    let mut r = (v as f64).sqrt() as u64;
    while r * r > v {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    r
}

fn vec_from_z_phi(z: f64, phi: f64) -> [f64; 3] {
    let st = (1.0 - z * z).max(0.0).sqrt();
    [st * phi.cos(), st * phi.sin(), z]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn angle_between(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let cross = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    dot(&cross, &cross).sqrt().atan2(dot(a, b))
}
