//! Constellation names for sky positions

use crate::sky::SkyCoord;

/// Pluggable position-to-constellation lookup
pub trait ConstellationLookup: Send + Sync {
    fn constellation(&self, coord: &SkyCoord) -> &'static str;
}

/// Approximate lookup: the constellation whose centre is closest.
///
/// Accurate away from boundaries; swap in a boundary-table lookup where
/// exact IAU membership matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroid;

/// (name, RA hours, Dec degrees) of each constellation centre
const CENTROIDS: &[(&str, f64, f64)] = &[
    ("Andromeda", 0.8, 37.4),
    ("Antlia", 10.3, -32.5),
    ("Apus", 16.1, -75.3),
    ("Aquarius", 22.3, -10.8),
    ("Aquila", 19.7, 3.4),
    ("Ara", 17.4, -56.6),
    ("Aries", 2.6, 20.8),
    ("Auriga", 6.0, 42.0),
    ("Bootes", 14.7, 31.2),
    ("Caelum", 4.7, -37.9),
    ("Camelopardalis", 8.9, 69.4),
    ("Cancer", 8.6, 19.8),
    ("Canes Venatici", 13.1, 40.1),
    ("Canis Major", 6.8, -22.1),
    ("Canis Minor", 7.6, 6.4),
    ("Capricornus", 21.0, -18.0),
    ("Carina", 8.7, -63.2),
    ("Cassiopeia", 1.3, 62.2),
    ("Centaurus", 13.1, -47.3),
    ("Cepheus", 22.0, 71.0),
    ("Cetus", 1.7, -7.2),
    ("Chamaeleon", 10.7, -79.2),
    ("Circinus", 14.6, -63.0),
    ("Columba", 5.9, -35.1),
    ("Coma Berenices", 12.8, 23.3),
    ("Corona Australis", 18.6, -41.1),
    ("Corona Borealis", 15.8, 32.6),
    ("Corvus", 12.4, -18.4),
    ("Crater", 11.4, -15.9),
    ("Crux", 12.4, -60.2),
    ("Cygnus", 20.6, 44.5),
    ("Delphinus", 20.7, 11.7),
    ("Dorado", 5.2, -59.4),
    ("Draco", 15.1, 67.0),
    ("Equuleus", 21.2, 7.8),
    ("Eridanus", 3.3, -28.8),
    ("Fornax", 2.7, -31.6),
    ("Gemini", 7.1, 22.6),
    ("Grus", 22.5, -46.4),
    ("Hercules", 17.4, 27.5),
    ("Horologium", 3.3, -53.3),
    ("Hydra", 11.6, -14.5),
    ("Hydrus", 2.3, -69.9),
    ("Indus", 21.97, -59.7),
    ("Lacerta", 22.5, 46.0),
    ("Leo", 10.7, 13.1),
    ("Leo Minor", 10.2, 32.1),
    ("Lepus", 5.6, -19.0),
    ("Libra", 15.2, -15.2),
    ("Lupus", 15.2, -42.7),
    ("Lynx", 8.0, 47.5),
    ("Lyra", 18.9, 36.7),
    ("Mensa", 5.4, -77.5),
    ("Microscopium", 21.0, -36.3),
    ("Monoceros", 7.1, 0.3),
    ("Musca", 12.6, -70.2),
    ("Norma", 15.9, -51.4),
    ("Octans", 23.0, -82.2),
    ("Ophiuchus", 17.4, -7.9),
    ("Orion", 5.6, 5.9),
    ("Pavo", 19.6, -65.8),
    ("Pegasus", 22.7, 19.5),
    ("Perseus", 3.2, 45.0),
    ("Phoenix", 0.9, -48.6),
    ("Pictor", 5.7, -53.5),
    ("Pisces", 0.5, 13.7),
    ("Piscis Austrinus", 22.3, -30.6),
    ("Puppis", 7.3, -31.2),
    ("Pyxis", 8.95, -27.4),
    ("Reticulum", 3.9, -60.0),
    ("Sagitta", 19.7, 18.9),
    ("Sagittarius", 19.1, -28.5),
    ("Scorpius", 16.9, -27.0),
    ("Sculptor", 0.4, -32.1),
    ("Scutum", 18.7, -9.9),
    ("Serpens", 16.9, 6.1),
    ("Sextans", 10.3, -2.6),
    ("Taurus", 4.7, 14.9),
    ("Telescopium", 19.3, -51.0),
    ("Triangulum", 2.2, 31.5),
    ("Triangulum Australe", 16.1, -65.4),
    ("Tucana", 23.8, -65.8),
    ("Ursa Major", 11.3, 50.7),
    ("Ursa Minor", 15.0, 77.7),
    ("Vela", 9.6, -47.2),
    ("Virgo", 13.4, -4.2),
    ("Volans", 7.8, -69.8),
    ("Vulpecula", 20.2, 24.4),
];

impl ConstellationLookup for NearestCentroid {
    fn constellation(&self, coord: &SkyCoord) -> &'static str {
        CENTROIDS
            .iter()
            .map(|&(name, ra_hours, dec)| {
                let centre = SkyCoord {
                    ra_deg: ra_hours * 15.0,
                    dec_deg: dec,
                };
                (name, coord.separation_deg(&centre))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or("Unknown", |(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalogue_is_complete() {
        assert_eq!(CENTROIDS.len(), 88);
    }

    #[test]
    fn test_well_known_positions() {
        let lookup = NearestCentroid;
        let at = |ra: f64, dec: f64| lookup.constellation(&SkyCoord::new(ra, dec).unwrap());
        assert_eq!(at(193.821739, 2.897311), "Virgo");
        // Betelgeuse
        assert_eq!(at(88.79, 7.41), "Orion");
        // Polaris
        assert_eq!(at(37.95, 89.26), "Ursa Minor");
        // Deneb
        assert_eq!(at(310.36, 45.28), "Cygnus");
    }
}
