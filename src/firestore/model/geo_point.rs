use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::firestore::codec::ScalarKind;
use crate::firestore::error::{invalid_argument, FirestoreResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> FirestoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid_argument("Latitude must be between -90 and 90 degrees."));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid_argument("Longitude must be between -180 and 180 degrees."));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl Serialize for GeoPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_newtype_struct(ScalarKind::GeoPoint.token(), &(self.latitude, self.longitude))
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GeoPointVisitor;

        impl<'de> Visitor<'de> for GeoPointVisitor {
            type Value = GeoPoint;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a latitude/longitude pair")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<GeoPoint, D::Error>
            where
                D: Deserializer<'de>,
            {
                let (latitude, longitude) = <(f64, f64)>::deserialize(deserializer)?;
                GeoPoint::new(latitude, longitude).map_err(de::Error::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<GeoPoint, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let latitude = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let longitude = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                GeoPoint::new(latitude, longitude).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_newtype_struct(ScalarKind::GeoPoint.token(), GeoPointVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_coordinates() {
        let point = GeoPoint::new(10.0, 20.0).unwrap();
        assert_eq!(point.latitude(), 10.0);
        assert_eq!(point.longitude(), 20.0);
    }

    #[test]
    fn invalid_latitude() {
        let err = GeoPoint::new(100.0, 0.0).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn invalid_longitude() {
        let err = GeoPoint::new(0.0, -180.5).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }
}
