//! Sky coordinate parsing and angular separation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use alert_archive_common::{ArchiveError, Result};

/// Equatorial position in degrees (ICRS)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyCoord {
    /// Build a coordinate, checking `ra` in [0, 360] and `dec` in [-90, 90]
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self> {
        if !ra_deg.is_finite() || !(0.0..=360.0).contains(&ra_deg) {
            return Err(ArchiveError::InvalidCoordinate(format!(
                "right ascension {} is outside [0, 360] degrees",
                ra_deg
            )));
        }
        if !dec_deg.is_finite() || !(-90.0..=90.0).contains(&dec_deg) {
            return Err(ArchiveError::InvalidCoordinate(format!(
                "declination {} is outside [-90, 90] degrees",
                dec_deg
            )));
        }
        Ok(Self { ra_deg, dec_deg })
    }

    /// Colatitude and longitude in radians
    pub fn theta_phi(&self) -> (f64, f64) {
        (
            std::f64::consts::FRAC_PI_2 - self.dec_deg.to_radians(),
            self.ra_deg.to_radians(),
        )
    }

    pub fn unit_vector(&self) -> [f64; 3] {
        let (ra, dec) = (self.ra_deg.to_radians(), self.dec_deg.to_radians());
        [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
    }

    /// Great-circle distance in degrees (Vincenty formula)
    pub fn separation_deg(&self, other: &SkyCoord) -> f64 {
        let (lon1, lat1) = (self.ra_deg.to_radians(), self.dec_deg.to_radians());
        let (lon2, lat2) = (other.ra_deg.to_radians(), other.dec_deg.to_radians());
        let (sdlon, cdlon) = (lon2 - lon1).sin_cos();
        let (slat1, clat1) = lat1.sin_cos();
        let (slat2, clat2) = lat2.sin_cos();

        let num1 = clat2 * sdlon;
        let num2 = clat1 * slat2 - slat1 * clat2 * cdlon;
        let denominator = slat1 * slat2 + clat1 * clat2 * cdlon;
        num1.hypot(num2).atan2(denominator).to_degrees()
    }
}

struct Patterns {
    hms: Regex,
    dms: Regex,
    sexagesimal: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        hms: Regex::new(r"^([+-]?)(\d{1,2})h\s*(\d{1,2})m\s*(\d{1,2}(?:\.\d*)?)s?$").unwrap(),
        dms: Regex::new(r"^([+-]?)(\d{1,3})d\s*(\d{1,2})m\s*(\d{1,2}(?:\.\d*)?)s?$").unwrap(),
        sexagesimal: Regex::new(r"^([+-]?)(\d{1,3})(?:\s*:\s*|\s+)(\d{1,2})(?:\s*:\s*|\s+)(\d{1,2}(?:\.\d*)?)$")
            .unwrap(),
    })
}

/// Sign, whole units, minutes and seconds of a sexagesimal match
fn sexagesimal_parts(caps: &regex::Captures<'_>, input: &str) -> Result<(f64, f64, f64, f64)> {
    let number = |i: usize| -> Result<f64> {
        caps.get(i)
            .map(|m| m.as_str())
            .unwrap_or("")
            .parse::<f64>()
            .map_err(|_| ArchiveError::InvalidCoordinate(format!("cannot parse '{}'", input)))
    };
    let sign = if caps.get(1).map(|m| m.as_str()) == Some("-") {
        -1.0
    } else {
        1.0
    };
    let (units, minutes, seconds) = (number(2)?, number(3)?, number(4)?);
    if minutes >= 60.0 || seconds >= 60.0 {
        return Err(ArchiveError::InvalidCoordinate(format!(
            "minutes and seconds must be below 60 in '{}'",
            input
        )));
    }
    Ok((sign, units, minutes, seconds))
}

fn is_sexagesimal(text: &str) -> bool {
    text.contains(':') || text.split_whitespace().count() > 1
}

/// Parse a right ascension: decimal degrees, `HH:MM:SS.s`, `HH MM SS.s` or `HHhMMmSS.ss`
pub fn parse_ra(text: &str) -> Result<f64> {
    let text = text.trim();
    let captures = if text.contains('h') {
        patterns().hms.captures(text)
    } else if is_sexagesimal(text) {
        patterns().sexagesimal.captures(text)
    } else {
        return text
            .parse::<f64>()
            .map_err(|_| ArchiveError::InvalidCoordinate(format!("cannot parse RA '{}'", text)));
    };

    let caps = captures.ok_or_else(|| {
        ArchiveError::InvalidCoordinate(format!("cannot parse RA '{}'", text))
    })?;
    let (sign, hours, minutes, seconds) = sexagesimal_parts(&caps, text)?;
    if sign < 0.0 || hours >= 24.0 {
        return Err(ArchiveError::InvalidCoordinate(format!(
            "right ascension '{}' must be within 0h to 24h",
            text
        )));
    }
    Ok((hours + minutes / 60.0 + seconds / 3600.0) * 15.0)
}

/// Parse a declination: decimal degrees, `+DD:MM:SS.s`, `+DD MM SS.s` or `+DDdMMmSS.ss`
pub fn parse_dec(text: &str) -> Result<f64> {
    let text = text.trim();
    let captures = if text.contains('d') {
        patterns().dms.captures(text)
    } else if is_sexagesimal(text) {
        patterns().sexagesimal.captures(text)
    } else {
        return text
            .parse::<f64>()
            .map_err(|_| ArchiveError::InvalidCoordinate(format!("cannot parse Dec '{}'", text)));
    };

    let caps = captures.ok_or_else(|| {
        ArchiveError::InvalidCoordinate(format!("cannot parse Dec '{}'", text))
    })?;
    let (sign, degrees, minutes, seconds) = sexagesimal_parts(&caps, text)?;
    Ok(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}

/// Parse a coordinate pair given in any supported notation
pub fn parse_coordinates(ra: &str, dec: &str) -> Result<SkyCoord> {
    SkyCoord::new(parse_ra(ra)?, parse_dec(dec)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_decimal_degrees() {
        let coord = parse_coordinates("193.821739", "2.897311").unwrap();
        assert!(close(coord.ra_deg, 193.821739));
        assert!(close(coord.dec_deg, 2.897311));
    }

    #[test]
    fn test_sexagesimal_forms_agree() {
        let colon = parse_coordinates("12:55:17.2173", "+02:53:50.32").unwrap();
        let space = parse_coordinates("12 55 17.2173", "+02 53 50.32").unwrap();
        let letters = parse_coordinates("12h55m17.2173s", "+02d53m50.32s").unwrap();

        assert!(close(colon.ra_deg, space.ra_deg));
        assert!(close(colon.ra_deg, letters.ra_deg));
        assert!(close(colon.dec_deg, letters.dec_deg));
        assert!((colon.ra_deg - 193.8217).abs() < 1e-3);
        assert!((colon.dec_deg - 2.8973).abs() < 1e-3);
    }

    #[test]
    fn test_negative_declination() {
        assert!((parse_dec("-30:30:00").unwrap() + 30.5).abs() < 1e-12);
        assert!((parse_dec("-30d30m00s").unwrap() + 30.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        for (ra, dec) in [
            ("abc", "2.0"),
            ("25:00:00", "+02:00:00"),
            ("12:61:00", "+02:00:00"),
            ("12:00:00", "+02:00:75"),
            ("400", "0"),
            ("10", "95"),
            ("-12:00:00", "0"),
        ] {
            let err = parse_coordinates(ra, dec).unwrap_err();
            assert!(
                matches!(err, ArchiveError::InvalidCoordinate(_)),
                "{} {} gave {:?}",
                ra,
                dec,
                err
            );
        }
    }

    #[test]
    fn test_separation() {
        let a = SkyCoord::new(193.821739, 2.897311).unwrap();
        let b = SkyCoord::new(193.821739, 2.897311 + 10.0 / 3600.0).unwrap();
        assert!((a.separation_deg(&b) * 3600.0 - 10.0).abs() < 1e-6);
        assert!(close(a.separation_deg(&a), 0.0));

        let pole = SkyCoord::new(0.0, 90.0).unwrap();
        let equator = SkyCoord::new(120.0, 0.0).unwrap();
        assert!((pole.separation_deg(&equator) - 90.0).abs() < 1e-9);
    }
}
