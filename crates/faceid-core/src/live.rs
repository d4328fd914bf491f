//! Live recognition loop.
//!
//! The caller polls the external detector on a fixed interval (500 ms by
//! default) and feeds each result to [`LiveRecognizer::observe`]. The
//! recognizer matches the face against the gallery, debounces changes to the
//! displayed name, tracks lighting warnings and produces the overlay to draw.
//! It holds no timers itself, so the caller owns scheduling and cancellation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lighting::{self, LightingStats, LightingThresholds, LightingWarning};
use crate::overlay::{DisplayGeometry, Fit, Overlay, Tone};
use crate::types::{
    BoundingBox, Descriptor, EuclideanMatcher, MatchResult, Matcher, Person,
    DEFAULT_MATCH_THRESHOLD,
};

/// One face reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// What the detector saw in one polled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub face: Option<Detection>,
    #[serde(default)]
    pub lighting: Option<LightingStats>,
}

/// Name shown for the tracked face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Label {
    Known { name: String, distance: f32 },
    Unknown,
}

impl Label {
    pub fn text(&self) -> &str {
        match self {
            Self::Known { name, .. } => name,
            Self::Unknown => "Unknown",
        }
    }

    /// Same person, ignoring distance jitter.
    fn same_identity(&self, other: &Label) -> bool {
        match (self, other) {
            (Self::Known { name: a, .. }, Self::Known { name: b, .. }) => a == b,
            (Self::Unknown, Self::Unknown) => true,
            _ => false,
        }
    }

    fn tone(&self) -> Tone {
        match self {
            Self::Known { .. } => Tone::Known,
            Self::Unknown => Tone::Unknown,
        }
    }
}

impl From<&MatchResult> for Label {
    fn from(result: &MatchResult) -> Self {
        match (&result.person_name, result.distance) {
            (Some(name), Some(distance)) if result.matched => Self::Known {
                name: name.clone(),
                distance,
            },
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Polling interval in milliseconds.
    pub interval_ms: u64,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Consecutive ticks a new name must persist before it replaces the shown one.
    pub stable_ticks: u32,
    /// Consecutive ticks without a face before the shown name is cleared.
    pub clear_after_ticks: u32,
    /// Consecutive ticks a lighting problem must persist before it is reported.
    pub warn_after_ticks: u32,
    /// Detector scores below this are reported as an unclear face.
    pub min_score: f32,
    pub lighting: LightingThresholds,
    /// Display size; the frame size is used when unset.
    pub display_size: Option<(u32, u32)>,
    pub fit: Fit,
    pub mirrored: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            stable_ticks: 2,
            clear_after_ticks: 3,
            warn_after_ticks: 2,
            min_score: 0.5,
            lighting: LightingThresholds::default(),
            display_size: None,
            fit: Fit::Cover,
            mirrored: false,
        }
    }
}

impl LiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    fn geometry(&self, obs: &FrameObservation) -> DisplayGeometry {
        let (display_width, display_height) = self.display_size.unwrap_or((obs.width, obs.height));
        DisplayGeometry {
            frame_width: obs.width,
            frame_height: obs.height,
            display_width,
            display_height,
            fit: self.fit,
            mirrored: self.mirrored,
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    /// Name currently shown, after debouncing.
    pub label: Option<Label>,
    /// The shown name changed on this tick.
    pub changed: bool,
    pub overlay: Option<Overlay>,
    pub warning: Option<LightingWarning>,
    pub warning_changed: bool,
    /// Raw match for this frame, before debouncing.
    pub raw_match: Option<MatchResult>,
}

/// Debounced recognition state over a stream of observations.
#[derive(Debug)]
pub struct LiveRecognizer {
    config: LiveConfig,
    matcher: EuclideanMatcher,
    gallery: Vec<Person>,
    displayed: Option<Label>,
    pending: Option<(Label, u32)>,
    misses: u32,
    pending_warning: Option<(LightingWarning, u32)>,
    active_warning: Option<LightingWarning>,
}

impl LiveRecognizer {
    pub fn new(config: LiveConfig, gallery: Vec<Person>) -> Self {
        let matcher = EuclideanMatcher {
            threshold: config.match_threshold,
        };
        Self {
            config,
            matcher,
            gallery,
            displayed: None,
            pending: None,
            misses: 0,
            pending_warning: None,
            active_warning: None,
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn gallery_len(&self) -> usize {
        self.gallery.len()
    }

    /// Swap in a freshly fetched gallery. The shown name is kept until the next match.
    pub fn set_gallery(&mut self, gallery: Vec<Person>) {
        tracing::debug!(people = gallery.len(), "gallery replaced");
        self.gallery = gallery;
        self.pending = None;
    }

    /// Forget all tracking state, as when the camera is stopped.
    pub fn reset(&mut self) {
        self.displayed = None;
        self.pending = None;
        self.misses = 0;
        self.pending_warning = None;
        self.active_warning = None;
    }

    pub fn observe(&mut self, obs: &FrameObservation) -> TickOutcome {
        let (warning, warning_changed) = self.update_warning(obs);

        let Some(face) = &obs.face else {
            self.pending = None;
            self.misses = self.misses.saturating_add(1);
            let changed = self.misses >= self.config.clear_after_ticks && self.displayed.is_some();
            if changed {
                tracing::debug!(misses = self.misses, "face lost; clearing label");
                self.displayed = None;
            }
            return TickOutcome {
                label: self.displayed.clone(),
                changed,
                overlay: None,
                warning,
                warning_changed,
                raw_match: None,
            };
        };

        self.misses = 0;
        let result = self.matcher.best_match(&face.descriptor, &self.gallery);
        let changed = self.debounce(Label::from(&result));

        let overlay = self.displayed.as_ref().and_then(|label| {
            let rect = self.config.geometry(obs).map_box(&face.bbox)?;
            let tone = if warning.is_some() {
                Tone::Warning
            } else {
                label.tone()
            };
            Some(Overlay::new(rect, label.text(), tone))
        });

        TickOutcome {
            label: self.displayed.clone(),
            changed,
            overlay,
            warning,
            warning_changed,
            raw_match: Some(result),
        }
    }

    /// Apply a new candidate label; returns whether the shown label changed.
    fn debounce(&mut self, candidate: Label) -> bool {
        let same_as_shown = self
            .displayed
            .as_ref()
            .map(|shown| shown.same_identity(&candidate));
        match same_as_shown {
            None => {
                self.displayed = Some(candidate);
                self.pending = None;
                return true;
            }
            Some(true) => {
                // Same person: refresh the distance without counting a change.
                self.displayed = Some(candidate);
                self.pending = None;
                return false;
            }
            Some(false) => {}
        }

        let count = match &mut self.pending {
            Some((label, count)) if label.same_identity(&candidate) => {
                *count += 1;
                *count
            }
            _ => 1,
        };

        if count >= self.config.stable_ticks {
            tracing::debug!(label = candidate.text(), ticks = count, "label switched");
            self.displayed = Some(candidate);
            self.pending = None;
            true
        } else {
            self.pending = Some((candidate, count));
            false
        }
    }

    fn update_warning(&mut self, obs: &FrameObservation) -> (Option<LightingWarning>, bool) {
        let raw = obs
            .lighting
            .as_ref()
            .and_then(|stats| lighting::assess(stats, &self.config.lighting))
            .or_else(|| {
                obs.face
                    .as_ref()
                    .filter(|f| f.bbox.score < self.config.min_score)
                    .map(|_| LightingWarning::FaceUnclear)
            });

        let previous = self.active_warning;
        match raw {
            None => {
                self.pending_warning = None;
                self.active_warning = None;
            }
            Some(w) => {
                let count = match self.pending_warning {
                    Some((pending, count)) if pending == w => count + 1,
                    _ => 1,
                };
                self.pending_warning = Some((w, count));
                self.active_warning = if count >= self.config.warn_after_ticks {
                    Some(w)
                } else {
                    None
                };
            }
        }

        let changed = previous != self.active_warning;
        if changed {
            match self.active_warning {
                Some(w) => tracing::info!(warning = ?w, "lighting warning raised"),
                None => tracing::info!("lighting warning cleared"),
            }
        }
        (self.active_warning, changed)
    }
}
