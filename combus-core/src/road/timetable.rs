use super::Section;
use crate::geo_primitives::{hhmm_to_minutes, minutes_to_hhmm, CIRCUIT_COUNT};
use crate::Error;

/// Synthesises `CIRCUIT_COUNT` daily departure times per stop (spec 4.C
/// `departure_matrix`). `sections[i]` is the leg from stop `i` to stop
/// `i + 1`; the route is circular, so `sections.len() == stops.len()` and
/// the full loop duration `T` sums every leg plus one stay per stop.
pub fn departure_matrix(
    sections: &[Section],
    stay_time_min: i64,
    start_time_hhmm: &str,
) -> Result<Vec<Vec<String>>, Error> {
    let start = hhmm_to_minutes(start_time_hhmm)? as i64;
    let n = sections.len();

    let leg_total: i64 = sections.iter().map(|s| s.duration_min + stay_time_min).sum();
    let total_loop_duration = leg_total;

    let mut leg_offset = vec![0i64; n];
    let mut cumulative = 0i64;
    for (i, section) in sections.iter().enumerate() {
        leg_offset[i] = cumulative;
        cumulative += section.duration_min + stay_time_min;
    }

    let mut matrix = Vec::with_capacity(n);
    for &offset in &leg_offset {
        let mut row = Vec::with_capacity(CIRCUIT_COUNT);
        for circuit in 0..CIRCUIT_COUNT as i64 {
            row.push(minutes_to_hhmm(start + offset + circuit * total_loop_duration));
        }
        matrix.push(row);
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(duration_min: i64) -> Section {
        Section { distance_m: 0.0, duration_min, polyline: String::new() }
    }

    #[test]
    fn departures_wrap_modulo_a_day() {
        let sections = vec![section(700), section(700)];
        let matrix = departure_matrix(&sections, 1, "10:00").unwrap();
        assert_eq!(matrix[0][0], "10:00");
        // T = 700 + 1 + 700 + 1 = 1402
        assert_eq!(matrix[0][1], minutes_to_hhmm(600 + 1402));
    }

    #[test]
    fn leg_offsets_accumulate_across_stops() {
        let sections = vec![section(30), section(60)];
        let matrix = departure_matrix(&sections, 1, "09:00").unwrap();
        assert_eq!(matrix[0][0], "09:00");
        assert_eq!(matrix[1][0], "09:31");
    }
}
