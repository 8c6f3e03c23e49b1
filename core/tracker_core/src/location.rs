use thiserror::Error;

use crate::sighting::Coordinates;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Single-shot device position, behind whatever permission prompt the host
/// has.
pub trait LocationSource {
    fn locate(&mut self) -> Result<Coordinates, LocationError>;
}

/// Coordinates known up front (e.g. given on the command line).
#[derive(Clone, Copy, Debug)]
pub struct FixedLocation(pub Coordinates);

impl LocationSource for FixedLocation {
    fn locate(&mut self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

impl<F> LocationSource for F
where
    F: FnMut() -> Result<Coordinates, LocationError>,
{
    fn locate(&mut self) -> Result<Coordinates, LocationError> {
        self()
    }
}
