//! Coordinate type, distance, Japanese mesh code and time arithmetic (component A).

use geo::Point;

use crate::Error;

/// Mean earth radius used for every haversine computation in this crate, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Walking speed used by the road/transit engines, in metres per minute (30 m/min).
pub const WALK_SPEED_M_PER_MIN: f64 = 30.0;

/// Number of daily circuits synthesised for a combus timetable.
pub const CIRCUIT_COUNT: usize = 10;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn as_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl From<Point<f64>> for Coord {
    fn from(p: Point<f64>) -> Self {
        Self { lat: p.y(), lon: p.x() }
    }
}

/// Great-circle distance between two coordinates, rounded to the nearest metre.
///
/// Uses the mean earth radius fixed by the data this engine was calibrated
/// against rather than `geo`'s own haversine (which defaults to a slightly
/// different radius), so that scenario-level distances stay reproducible.
pub fn haversine_m(a: Coord, b: Coord) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Rounds half-away-from-zero, matching the fixed-speed duration rule (section 3).
pub fn round_half_away_from_zero(x: f64) -> i64 {
    if x >= 0.0 {
        (x + 0.5).floor() as i64
    } else {
        (x - 0.5).ceil() as i64
    }
}

/// Computes the 3rd-order Japanese mesh code for a coordinate (spec 4.A).
///
/// Defined only for the Japan bounding box the source data covers; callers
/// outside that box get a code that is simply not present in any `MeshIndex`.
pub fn latlon_to_mesh(coord: Coord) -> i64 {
    let lat = coord.lat;
    let lon = coord.lon;

    let primary = (lat * 1.5).floor() as i64 * 100 + (lon - 100.0).floor() as i64;

    let secondary_lat = (((lat * 60.0).rem_euclid(40.0)) / 5.0).floor() as i64;
    let secondary_lon = (((lon * 60.0).rem_euclid(60.0)) / 7.5).floor() as i64;
    let secondary = secondary_lat * 10 + secondary_lon;

    let tertiary_lat = (((lat * 3600.0).rem_euclid(300.0)) / 30.0).floor() as i64;
    let tertiary_lon = (((lon * 3600.0).rem_euclid(450.0)) / 45.0).floor() as i64;
    let tertiary = tertiary_lat * 10 + tertiary_lon;

    format!("{primary}{secondary:02}{tertiary:02}")
        .parse()
        .expect("mesh code digits are always well formed")
}

/// Parses an `HH:MM` string into minutes since midnight.
pub fn hhmm_to_minutes(s: &str) -> Result<u32, Error> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| Error::MalformedInput(format!("invalid time string: {s}")))?;
    let h: u32 = h
        .parse()
        .map_err(|_| Error::MalformedInput(format!("invalid hour in time string: {s}")))?;
    let m: u32 = m
        .parse()
        .map_err(|_| Error::MalformedInput(format!("invalid minute in time string: {s}")))?;
    Ok(h * 60 + m)
}

/// Formats minutes since midnight as `HH:MM`, wrapping modulo one day.
pub fn minutes_to_hhmm(minutes: i64) -> String {
    let wrapped = minutes.rem_euclid(24 * 60);
    format!("{:02}:{:02}", wrapped / 60, wrapped % 60)
}

/// Converts an `HH:MM` (or `HH:MM:SS`) string to the 4-digit key form used to
/// index precomputed artefacts (e.g. `"10:00"` -> `"1000"`).
pub fn hhmm_to_key(s: &str) -> Result<String, Error> {
    let minutes = hhmm_to_minutes(s)?;
    Ok(format!("{:02}{:02}", minutes / 60, minutes % 60))
}

/// Decodes a Google encoded polyline into a sequence of coordinates.
pub fn decode_polyline(encoded: &str) -> Vec<Coord> {
    let mut coords = Vec::new();
    let bytes = encoded.as_bytes();
    let mut index = 0usize;
    let (mut lat, mut lon) = (0i64, 0i64);

    while index < bytes.len() {
        lat += decode_signed_value(bytes, &mut index);
        lon += decode_signed_value(bytes, &mut index);
        coords.push(Coord::new(lat as f64 / 1e5, lon as f64 / 1e5));
    }
    coords
}

fn decode_signed_value(bytes: &[u8], index: &mut usize) -> i64 {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = bytes[*index] as i64 - 63;
        *index += 1;
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
    }
    if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    }
}

/// Encodes a sequence of coordinates into a Google encoded polyline.
pub fn encode_polyline(coords: &[Coord]) -> String {
    let mut out = String::new();
    let (mut prev_lat, mut prev_lon) = (0i64, 0i64);

    for c in coords {
        let lat = (c.lat * 1e5).round() as i64;
        let lon = (c.lon * 1e5).round() as i64;
        encode_signed_value(lat - prev_lat, &mut out);
        encode_signed_value(lon - prev_lon, &mut out);
        prev_lat = lat;
        prev_lon = lon;
    }
    out
}

fn encode_signed_value(value: i64, out: &mut String) {
    let mut v = value << 1;
    if value < 0 {
        v = !v;
    }
    while v >= 0x20 {
        let byte = ((v & 0x1f) | 0x20) as u8 + 63;
        out.push(byte as char);
        v >>= 5;
    }
    out.push((v as u8 + 63) as char);
}

/// Concatenates two encoded polylines, decoding both, dropping an exact
/// duplicate join point (the last point of `first` equal to the first point
/// of `second`), and re-encoding (spec invariant 7).
pub fn merge_polylines(first: &str, second: &str) -> String {
    let mut a = decode_polyline(first);
    let b = decode_polyline(second);
    if let (Some(last), Some(head)) = (a.last(), b.first()) {
        if last == head {
            a.extend_from_slice(&b[1..]);
        } else {
            a.extend_from_slice(&b);
        }
    } else {
        a.extend_from_slice(&b);
    }
    encode_polyline(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn haversine_known_distance() {
        let tokyo = Coord::new(35.6895, 139.6917);
        let osaka = Coord::new(34.6937, 135.5023);
        let d = haversine_m(tokyo, osaka);
        assert!((395_000.0..405_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn mesh_code_is_total_and_stable() {
        let coord = Coord::new(36.61095, 137.2509);
        let code = latlon_to_mesh(coord);
        assert_eq!(code, latlon_to_mesh(coord));
        assert!(code > 0);
    }

    #[test]
    fn time_roundtrip() {
        assert_eq!(hhmm_to_minutes("10:00").unwrap(), 600);
        assert_eq!(minutes_to_hhmm(600), "10:00");
        assert_eq!(minutes_to_hhmm(1500), "01:00");
        assert_eq!(hhmm_to_key("10:00").unwrap(), "1000");
        assert_eq!(hhmm_to_key("15:25").unwrap(), "1525");
    }

    #[test]
    fn polyline_roundtrip() {
        let coords = vec![Coord::new(38.5, -120.2), Coord::new(40.7, -120.95), Coord::new(43.252, -126.453)];
        let encoded = encode_polyline(&coords);
        let decoded = decode_polyline(&encoded);
        for (a, b) in coords.iter().zip(decoded.iter()) {
            assert_abs_diff_eq!(a.lat, b.lat, epsilon = 1e-5);
            assert_abs_diff_eq!(a.lon, b.lon, epsilon = 1e-5);
        }
    }

    #[test]
    fn merge_drops_duplicate_join_point() {
        let a = encode_polyline(&[Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)]);
        let b = encode_polyline(&[Coord::new(1.0, 1.0), Coord::new(2.0, 2.0)]);
        let merged = decode_polyline(&merge_polylines(&a, &b));
        assert_eq!(merged.len(), 3);
    }
}
