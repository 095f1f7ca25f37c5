use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Device position reported alongside a check-in, attendance or heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    /// Horizontal accuracy in metres, when the device reports it
    #[schema(example = 12.5, nullable = true)]
    pub accuracy_m: Option<f64>,
}
