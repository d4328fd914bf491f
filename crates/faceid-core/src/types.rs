use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of values in a face descriptor produced by the external embedding model.
pub const DESCRIPTOR_LEN: usize = 128;

/// Euclidean distance below which two descriptors are considered the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("Invalid descriptor length. Expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("descriptor value at index {index} is not a finite number")]
    NotFinite { index: usize },
    #[error("descriptor blob must be {expected} bytes, got {actual}")]
    Encoding { expected: usize, actual: usize },
}

/// A 128-dimension face descriptor.
///
/// Always holds exactly [`DESCRIPTOR_LEN`] finite values; serializes as a
/// plain JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::Length {
                expected: DESCRIPTOR_LEN,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NotFinite { index });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance between two descriptors. Lower = more similar.
    ///
    /// Accumulated in f64 and saturated at `f32::MAX`, so the result is always finite.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        let sum: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| (f64::from(a) - f64::from(b)).powi(2))
            .sum();
        (sum.sqrt() as f32).min(f32::MAX)
    }

    /// Little-endian byte encoding (4 bytes per value).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let expected = DESCRIPTOR_LEN * 4;
        if bytes.len() != expected {
            return Err(DescriptorError::Encoding {
                expected,
                actual: bytes.len(),
            });
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(values)
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.values
    }
}

/// Face bounding box in source-frame pixels, with the detector's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_score")]
    pub score: f32,
}

fn default_score() -> f32 {
    1.0
}

/// A registered person in a user's gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    /// Account that registered this person.
    pub owner_id: String,
    pub name: String,
    pub info: String,
    pub descriptor: Descriptor,
    pub created_at: String,
}

/// Result of matching a query descriptor against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest gallery entry; `None` for an empty gallery.
    pub distance: Option<f32>,
    pub person_id: Option<String>,
    pub person_name: Option<String>,
}

impl MatchResult {
    pub fn no_match(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            distance,
            person_id: None,
            person_name: None,
        }
    }
}

/// Strategy for comparing a query descriptor against a gallery of registered people.
pub trait Matcher {
    fn best_match(&self, query: &Descriptor, gallery: &[Person]) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Always visits every gallery entry so timing does not depend on the
/// position of the match.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match(&self, query: &Descriptor, gallery: &[Person]) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, person) in gallery.iter().enumerate() {
            let dist = query.euclidean_distance(&person.descriptor);
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < self.threshold => MatchResult {
                matched: true,
                distance: Some(best_dist),
                person_id: Some(gallery[idx].id.clone()),
                person_name: Some(gallery[idx].name.clone()),
            },
            Some(_) => MatchResult::no_match(Some(best_dist)),
            None => MatchResult::no_match(None),
        }
    }
}
