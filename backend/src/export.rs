use common::model::Reading;

pub const CSV_HEADER: &str = "Timestamp,Temperature (°C),Humidity (%)";

/// Plain CSV, no quoting: none of the value domains can contain a comma.
pub fn readings_csv(readings: &[Reading]) -> String {
    let mut lines = Vec::with_capacity(readings.len() + 1);
    lines.push(CSV_HEADER.to_owned());
    for reading in readings {
        lines.push(format!(
            "{},{},{}",
            reading.timestamp.format("%Y-%m-%d %H:%M:%S"),
            reading.temperature,
            reading.humidity
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(id: i32, ts: i64, temperature: f32, humidity: f32) -> Reading {
        Reading {
            id,
            device_id: "dev-42".to_owned(),
            temperature,
            humidity,
            timestamp: Utc.timestamp_opt(ts, 0).single().unwrap(),
        }
    }

    #[test]
    fn three_readings_make_four_lines() {
        let readings = vec![
            reading(1, 1700000000, 21.5, 55.0),
            reading(2, 1700003600, 22.0, 54.5),
            reading(3, 1700007200, 22.5, 54.0),
        ];
        let csv = readings_csv(&readings);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Timestamp,Temperature (°C),Humidity (%)");
        assert!(lines[1].ends_with(",21.5,55"));
        assert!(lines[3].ends_with(",22.5,54"));
    }

    #[test]
    fn empty_export_is_just_the_header() {
        assert_eq!(readings_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn timestamps_render_as_display_strings() {
        let csv = readings_csv(&[reading(1, 0, 0.0, 0.0)]);
        assert!(csv.contains("1970-01-01 00:00:00,0,0"));
    }
}
