use geo::Point;
use serde::Serialize;

/// Placeholder shown wherever a text field is blank or missing from the source table.
pub const UNAVAILABLE: &str = "No disponible";

/// Column headers of the facility tables.
pub mod columns {
    pub const NAME: &str = "Nombre";
    pub const COMPANY: &str = "Empresa";
    pub const REGION: &str = "Región";
    pub const PRIMARY_MINERAL: &str = "Mineral principal";
    pub const SECONDARY_MINERALS: &str = "Minerales secundarios";
    pub const DEPOSIT_TYPE: &str = "Tipo de yacimiento";
    pub const LINK: &str = "Link";
    pub const CLIENT_TYPE: &str = "Tipo Cliente";
    pub const LATITUDE: &str = "Latitud";
    pub const LONGITUDE: &str = "Longitud";
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite and inside the WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    /// x = longitude, y = latitude
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// One mining facility. Text fields never hold blanks, they carry [`UNAVAILABLE`] instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityRecord {
    pub name: String,
    pub company: String,
    pub region: String,
    pub primary_mineral: String,
    pub secondary_minerals: String,
    pub deposit_type: String,
    pub client_type: String,
    pub link: String,
    pub coordinates: Option<Coordinates>,
}
