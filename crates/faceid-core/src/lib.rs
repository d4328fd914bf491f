//! faceid-core — Face descriptor gallery and live recognition loop.
//!
//! Detection and embedding are done by an external detector; this crate
//! matches its 128-dimension descriptors against a registered gallery and
//! turns a stream of per-frame observations into debounced labels,
//! lighting warnings and overlay boxes.

pub mod lighting;
pub mod live;
pub mod overlay;
pub mod types;

pub use lighting::{LightingStats, LightingThresholds, LightingWarning};
pub use live::{Detection, FrameObservation, Label, LiveConfig, LiveRecognizer, TickOutcome};
pub use overlay::{DisplayGeometry, Fit, Overlay, Rect, Tone};
pub use types::{
    BoundingBox, Descriptor, DescriptorError, EuclideanMatcher, MatchResult, Matcher, Person,
    DEFAULT_MATCH_THRESHOLD, DESCRIPTOR_LEN,
};
