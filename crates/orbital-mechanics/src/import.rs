//! Constellation import from CSV element tables.
//!
//! Header: `satellite_id,name,altitude_km,inclination_deg,raan_deg,eccentricity,arg_perigee_deg,mean_anomaly_deg`.
//! Altitude is converted to `a = R_earth + altitude`; all angles in degrees.
//! Any bad row rejects the entire import.

use std::io::Read;

use chrono::{DateTime, Utc};

use crate::{
    ConstellationSatellite, KeplerianElements, OrbitalError, Result, EARTH_RADIUS_KM,
};

const EXPECTED_HEADER: [&str; 8] = [
    "satellite_id",
    "name",
    "altitude_km",
    "inclination_deg",
    "raan_deg",
    "eccentricity",
    "arg_perigee_deg",
    "mean_anomaly_deg",
];

/// Parse a constellation CSV. `epoch` becomes the element epoch for every row
/// (the wire format carries none).
pub fn import_constellation_csv<R: Read>(
    reader: R,
    epoch: DateTime<Utc>,
) -> Result<Vec<ConstellationSatellite>> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let header = csv_reader.headers()?.clone();
    for (position, expected) in EXPECTED_HEADER.iter().enumerate() {
        match header.get(position) {
            Some(found) if found.trim() == *expected => {}
            found => {
                return Err(OrbitalError::Import(format!(
                    "column {position} must be '{expected}', got {:?}",
                    found.unwrap_or("<missing>")
                )))
            }
        }
    }

    let mut satellites = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = row + 2; // 1-based, after the header

        if record.len() < EXPECTED_HEADER.len() {
            return Err(OrbitalError::Import(format!(
                "line {line}: expected {} columns, got {}",
                EXPECTED_HEADER.len(),
                record.len()
            )));
        }

        let id = record[0].trim().to_string();
        let name = record[1].trim().to_string();
        if id.is_empty() {
            return Err(OrbitalError::Import(format!(
                "line {line}: satellite_id is empty"
            )));
        }
        if satellites
            .iter()
            .any(|s: &ConstellationSatellite| s.id == id)
        {
            return Err(OrbitalError::Import(format!(
                "line {line}: duplicate satellite_id '{id}'"
            )));
        }

        let altitude_km = parse_field(&record[2], "altitude_km", line)?;
        let inclination = parse_field(&record[3], "inclination_deg", line)?;
        let raan = parse_field(&record[4], "raan_deg", line)?;
        let eccentricity = parse_field(&record[5], "eccentricity", line)?;
        let arg_perigee = parse_field(&record[6], "arg_perigee_deg", line)?;
        let mean_anomaly = parse_field(&record[7], "mean_anomaly_deg", line)?;

        let elements = KeplerianElements::new(
            EARTH_RADIUS_KM + altitude_km,
            eccentricity,
            inclination,
            raan,
            arg_perigee,
            mean_anomaly,
            epoch,
        )
        .map_err(|e| OrbitalError::Import(format!("line {line} ({id}): {e}")))?;

        satellites.push(ConstellationSatellite { id, name, elements });
    }

    if satellites.is_empty() {
        return Err(OrbitalError::Import("no satellite rows".to_string()));
    }

    Ok(satellites)
}

fn parse_field(raw: &str, column: &str, line: usize) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| OrbitalError::Import(format!("line {line}: bad {column} value '{raw}'")))
}
