//! Ground-station import from CSV.
//!
//! Header: `station_id,name,latitude_deg,longitude_deg[,altitude_km,elevation_mask_deg,max_range_km]`.
//! Missing optional columns take the library defaults. Any bad row rejects
//! the entire import.

use std::io::Read;

use orbital_mechanics::GeodeticPosition;

use crate::{
    GroundStation, Result, StationError, DEFAULT_ANTENNA_GAIN_DBI, DEFAULT_ELEVATION_MASK_DEG,
    DEFAULT_MAX_RANGE_KM,
};

const REQUIRED_HEADER: [&str; 4] = ["station_id", "name", "latitude_deg", "longitude_deg"];
const OPTIONAL_HEADER: [&str; 3] = ["altitude_km", "elevation_mask_deg", "max_range_km"];

pub fn import_stations_csv<R: Read>(reader: R) -> Result<Vec<GroundStation>> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let header = csv_reader.headers()?.clone();
    for (position, expected) in REQUIRED_HEADER.iter().enumerate() {
        match header.get(position) {
            Some(found) if found.trim() == *expected => {}
            found => {
                return Err(StationError::Import(format!(
                    "column {position} must be '{expected}', got {:?}",
                    found.unwrap_or("<missing>")
                )))
            }
        }
    }
    for (offset, expected) in OPTIONAL_HEADER.iter().enumerate() {
        let position = REQUIRED_HEADER.len() + offset;
        if let Some(found) = header.get(position) {
            if found.trim() != *expected {
                return Err(StationError::Import(format!(
                    "column {position} must be '{expected}', got '{found}'"
                )));
            }
        }
    }

    let mut stations: Vec<GroundStation> = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = row + 2;

        if record.len() < REQUIRED_HEADER.len() {
            return Err(StationError::Import(format!(
                "line {line}: expected at least {} columns, got {}",
                REQUIRED_HEADER.len(),
                record.len()
            )));
        }

        let id = record[0].trim().to_string();
        let name = record[1].trim().to_string();
        let latitude = parse_field(&record[2], "latitude_deg", line)?;
        let longitude = parse_field(&record[3], "longitude_deg", line)?;
        let altitude = optional_field(&record, 4, "altitude_km", line)?.unwrap_or(0.0);
        let mask = optional_field(&record, 5, "elevation_mask_deg", line)?
            .unwrap_or(DEFAULT_ELEVATION_MASK_DEG);
        let range =
            optional_field(&record, 6, "max_range_km", line)?.unwrap_or(DEFAULT_MAX_RANGE_KM);

        if stations.iter().any(|s| s.id == id) {
            return Err(StationError::Import(format!(
                "line {line}: duplicate station_id '{id}'"
            )));
        }

        let station = GroundStation::new(
            id,
            name,
            GeodeticPosition {
                latitude_deg: latitude,
                longitude_deg: longitude,
                altitude_km: altitude,
            },
            mask,
            range,
            DEFAULT_ANTENNA_GAIN_DBI,
        )
        .map_err(|e| StationError::Import(format!("line {line}: {e}")))?;

        stations.push(station);
    }

    if stations.is_empty() {
        return Err(StationError::Import("no station rows".to_string()));
    }

    Ok(stations)
}

fn parse_field(raw: &str, column: &str, line: usize) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| StationError::Import(format!("line {line}: bad {column} value '{raw}'")))
}

fn optional_field(
    record: &csv::StringRecord,
    position: usize,
    column: &str,
    line: usize,
) -> Result<Option<f64>> {
    match record.get(position) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_field(raw, column, line).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_minimal_columns() {
        let csv = "station_id,name,latitude_deg,longitude_deg\n\
                   gs_la,Los Angeles,34.05,-118.24\n\
                   gs_tokyo,Tokyo,35.68,139.65\n";
        let stations = import_stations_csv(csv.as_bytes()).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].elevation_mask_deg, DEFAULT_ELEVATION_MASK_DEG);
        assert_eq!(stations[1].max_range_km, DEFAULT_MAX_RANGE_KM);
    }

    #[test]
    fn test_import_full_columns() {
        let csv = "station_id,name,latitude_deg,longitude_deg,altitude_km,elevation_mask_deg,max_range_km\n\
                   gs_la,Los Angeles,34.05,-118.24,0.1,5,2500\n";
        let stations = import_stations_csv(csv.as_bytes()).unwrap();
        assert_eq!(stations[0].elevation_mask_deg, 5.0);
        assert_eq!(stations[0].max_range_km, 2500.0);
        assert_eq!(stations[0].position.altitude_km, 0.1);
    }

    #[test]
    fn test_out_of_range_latitude_rejects_import() {
        let csv = "station_id,name,latitude_deg,longitude_deg\n\
                   gs_la,Los Angeles,34.05,-118.24\n\
                   gs_bad,Nowhere,95.0,10.0\n";
        assert!(matches!(
            import_stations_csv(csv.as_bytes()),
            Err(StationError::Import(_))
        ));
    }

    #[test]
    fn test_missing_column_rejects_import() {
        let csv = "station_id,name,latitude_deg,longitude_deg\ngs_la,Los Angeles,34.05\n";
        assert!(import_stations_csv(csv.as_bytes()).is_err());
    }
}
