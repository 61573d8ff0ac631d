//! Coordinate transforms between WGS84, British National Grid and Web Mercator.
//!
//! British National Grid is the Ordnance Survey transverse Mercator projection
//! on the Airy 1830 ellipsoid (OSGB36 datum). Datum shifts to and from WGS84
//! use the standard 7-parameter Helmert transform, good to a few metres.

use crate::utils::error::PrepError;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

struct Ellipsoid {
    a: f64,
    b: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        1.0 - (self.b * self.b) / (self.a * self.a)
    }
}

const AIRY_1830: Ellipsoid = Ellipsoid {
    a: 6_377_563.396,
    b: 6_356_256.909,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    b: 6_356_752.314_245,
};

// National Grid true origin and scale.
const F0: f64 = 0.999_601_271_7;
const LAT0_DEG: f64 = 49.0;
const LON0_DEG: f64 = -2.0;
const E0: f64 = 400_000.0;
const N0: f64 = -100_000.0;

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

struct Helmert {
    tx: f64,
    ty: f64,
    tz: f64,
    /// Scale in ppm.
    s: f64,
    /// Rotations in arc seconds.
    rx: f64,
    ry: f64,
    rz: f64,
}

impl Helmert {
    fn inverse(&self) -> Helmert {
        Helmert {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            s: -self.s,
            rx: -self.rx,
            ry: -self.ry,
            rz: -self.rz,
        }
    }

    fn apply(&self, (x, y, z): (f64, f64, f64)) -> (f64, f64, f64) {
        let s1 = 1.0 + self.s * 1e-6;
        let arcsec = PI / (180.0 * 3600.0);
        let (rx, ry, rz) = (self.rx * arcsec, self.ry * arcsec, self.rz * arcsec);
        (
            self.tx + s1 * x - rz * y + ry * z,
            self.ty + rz * x + s1 * y - rx * z,
            self.tz - ry * x + rx * y + s1 * z,
        )
    }
}

const WGS84_TO_OSGB36: Helmert = Helmert {
    tx: -446.448,
    ty: 125.157,
    tz: -542.060,
    s: 20.4894,
    rx: -0.1502,
    ry: -0.2470,
    rz: -0.8421,
};

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, positions are `[lon, lat]` degrees.
    Wgs84,
    /// EPSG:27700, positions are `[easting, northing]` metres.
    BritishNationalGrid,
    /// EPSG:3857, positions are `[x, y]` metres.
    WebMercator,
}

impl Crs {
    pub fn code(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::BritishNationalGrid => "EPSG:27700",
            Crs::WebMercator => "EPSG:3857",
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Crs {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let code = code.strip_prefix("EPSG:").unwrap_or(&code);
        match code {
            "4326" => Ok(Crs::Wgs84),
            "27700" => Ok(Crs::BritishNationalGrid),
            "3857" | "900913" => Ok(Crs::WebMercator),
            _ => Err(PrepError::InvalidConfigValueError {
                field: "crs".to_string(),
                value: s.to_string(),
                reason: "Supported CRS: EPSG:4326, EPSG:27700, EPSG:3857".to_string(),
            }),
        }
    }
}

/// Transforms one `(x, y)` pair (axis order as documented on [`Crs`]).
pub fn transform(src: Crs, dst: Crs, x: f64, y: f64) -> (f64, f64) {
    if src == dst {
        return (x, y);
    }
    let (lon, lat) = match src {
        Crs::Wgs84 => (x, y),
        Crs::BritishNationalGrid => {
            let (lat, lon) = bng_to_wgs84(x, y);
            (lon, lat)
        }
        Crs::WebMercator => web_mercator_to_wgs84(x, y),
    };
    match dst {
        Crs::Wgs84 => (lon, lat),
        Crs::BritishNationalGrid => wgs84_to_bng(lat, lon),
        Crs::WebMercator => wgs84_to_web_mercator(lon, lat),
    }
}

/// Meridional arc for the National Grid projection.
fn meridional_arc(phi: f64) -> f64 {
    let (a, b) = (AIRY_1830.a, AIRY_1830.b);
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);
    let phi0 = LAT0_DEG.to_radians();
    let dp = phi - phi0;
    let sp = phi + phi0;

    b * F0
        * ((1.0 + n + 1.25 * n2 + 1.25 * n3) * dp
            - (3.0 * n + 3.0 * n2 + 2.625 * n3) * dp.sin() * sp.cos()
            + (1.875 * n2 + 1.875 * n3) * (2.0 * dp).sin() * (2.0 * sp).cos()
            - (35.0 / 24.0) * n3 * (3.0 * dp).sin() * (3.0 * sp).cos())
}

/// Radii of curvature (nu, rho) and eta² at latitude `phi`.
fn curvature(phi: f64) -> (f64, f64, f64) {
    let a = AIRY_1830.a;
    let e2 = AIRY_1830.e2();
    let sin2 = phi.sin().powi(2);
    let nu = a * F0 / (1.0 - e2 * sin2).sqrt();
    let rho = a * F0 * (1.0 - e2) / (1.0 - e2 * sin2).powf(1.5);
    (nu, rho, nu / rho - 1.0)
}

/// OSGB36 latitude/longitude (degrees) to National Grid easting/northing.
pub fn osgb36_to_grid(lat: f64, lon: f64) -> (f64, f64) {
    let phi = lat.to_radians();
    let dl = lon.to_radians() - LON0_DEG.to_radians();
    let (nu, rho, eta2) = curvature(phi);

    let (sin, cos, tan) = (phi.sin(), phi.cos(), phi.tan());
    let (tan2, tan4) = (tan * tan, tan.powi(4));
    let cos3 = cos.powi(3);
    let cos5 = cos.powi(5);

    let i = meridional_arc(phi) + N0;
    let ii = nu / 2.0 * sin * cos;
    let iii = nu / 24.0 * sin * cos3 * (5.0 - tan2 + 9.0 * eta2);
    let iiia = nu / 720.0 * sin * cos5 * (61.0 - 58.0 * tan2 + tan4);
    let iv = nu * cos;
    let v = nu / 6.0 * cos3 * (nu / rho - tan2);
    let vi = nu / 120.0 * cos5 * (5.0 - 18.0 * tan2 + tan4 + 14.0 * eta2 - 58.0 * tan2 * eta2);

    let northing = i + ii * dl.powi(2) + iii * dl.powi(4) + iiia * dl.powi(6);
    let easting = E0 + iv * dl + v * dl.powi(3) + vi * dl.powi(5);
    (easting, northing)
}

/// National Grid easting/northing to OSGB36 latitude/longitude (degrees).
pub fn grid_to_osgb36(easting: f64, northing: f64) -> (f64, f64) {
    let a = AIRY_1830.a;
    let phi0 = LAT0_DEG.to_radians();

    let mut phi = (northing - N0) / (a * F0) + phi0;
    let mut m = meridional_arc(phi);
    // Converges to 0.01 mm in a handful of iterations.
    for _ in 0..64 {
        if (northing - N0 - m).abs() < 1e-5 {
            break;
        }
        phi += (northing - N0 - m) / (a * F0);
        m = meridional_arc(phi);
    }

    let (nu, rho, eta2) = curvature(phi);
    let tan = phi.tan();
    let (tan2, tan4, tan6) = (tan * tan, tan.powi(4), tan.powi(6));
    let sec = 1.0 / phi.cos();

    let vii = tan / (2.0 * rho * nu);
    let viii = tan / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * tan2 + eta2 - 9.0 * tan2 * eta2);
    let ix = tan / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * tan2 + 45.0 * tan4);
    let x = sec / nu;
    let xi = sec / (6.0 * nu.powi(3)) * (nu / rho + 2.0 * tan2);
    let xii = sec / (120.0 * nu.powi(5)) * (5.0 + 28.0 * tan2 + 24.0 * tan4);
    let xiia = sec / (5040.0 * nu.powi(7)) * (61.0 + 662.0 * tan2 + 1320.0 * tan4 + 720.0 * tan6);

    let de = easting - E0;
    let lat = phi - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let lon = LON0_DEG.to_radians() + x * de - xi * de.powi(3) + xii * de.powi(5) - xiia * de.powi(7);
    (lat.to_degrees(), lon.to_degrees())
}

fn to_cartesian(ellipsoid: &Ellipsoid, lat: f64, lon: f64) -> (f64, f64, f64) {
    let (phi, lambda) = (lat.to_radians(), lon.to_radians());
    let e2 = ellipsoid.e2();
    let nu = ellipsoid.a / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    (
        nu * phi.cos() * lambda.cos(),
        nu * phi.cos() * lambda.sin(),
        (1.0 - e2) * nu * phi.sin(),
    )
}

fn from_cartesian(ellipsoid: &Ellipsoid, (x, y, z): (f64, f64, f64)) -> (f64, f64) {
    let e2 = ellipsoid.e2();
    let p = (x * x + y * y).sqrt();
    let mut phi = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let nu = ellipsoid.a / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let next = (z + e2 * nu * phi.sin()).atan2(p);
        if (next - phi).abs() < 1e-12 {
            phi = next;
            break;
        }
        phi = next;
    }
    (phi.to_degrees(), y.atan2(x).to_degrees())
}

/// WGS84 latitude/longitude to National Grid easting/northing.
pub fn wgs84_to_bng(lat: f64, lon: f64) -> (f64, f64) {
    let cart = WGS84_TO_OSGB36.apply(to_cartesian(&WGS84, lat, lon));
    let (lat, lon) = from_cartesian(&AIRY_1830, cart);
    osgb36_to_grid(lat, lon)
}

/// National Grid easting/northing to WGS84 latitude/longitude.
pub fn bng_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let (lat, lon) = grid_to_osgb36(easting, northing);
    let cart = WGS84_TO_OSGB36
        .inverse()
        .apply(to_cartesian(&AIRY_1830, lat, lon));
    from_cartesian(&WGS84, cart)
}

pub fn wgs84_to_web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WEB_MERCATOR_RADIUS * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}
