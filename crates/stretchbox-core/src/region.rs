//! Region definitions
//!
//! A region is a span of the source rendered with its own factors. A
//! negative length plays the span backwards: the engine still reads forward
//! from `start`, and the rendered block is reversed afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One span of the source with its own stretch parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// First source frame
    pub start: u64,
    /// Frame count; negative renders the span reversed
    pub length: i64,
    #[serde(rename = "time")]
    pub time_factor: f64,
    #[serde(rename = "pitch", default = "unit")]
    pub pitch_factor: f64,
    /// Defaults to 1 / pitch when absent
    #[serde(rename = "formant", default, skip_serializing_if = "Option::is_none")]
    pub formant_factor: Option<f64>,
}

fn unit() -> f64 {
    1.0
}

impl Region {
    pub fn new(start: u64, length: i64, time_factor: f64, pitch_factor: f64) -> Self {
        Self {
            start,
            length,
            time_factor,
            pitch_factor,
            formant_factor: None,
        }
    }

    pub fn with_formant(mut self, formant_factor: f64) -> Self {
        self.formant_factor = Some(formant_factor);
        self
    }

    pub fn is_reversed(&self) -> bool {
        self.length < 0
    }

    /// Source frames covered, regardless of direction
    pub fn frame_count(&self) -> u64 {
        self.length.unsigned_abs()
    }

    /// One past the last source frame covered
    pub fn end(&self) -> u64 {
        self.start + self.frame_count()
    }

    /// Output frames the region renders to: round(time × |length|)
    pub fn output_frames(&self) -> usize {
        (self.time_factor * self.frame_count() as f64).round() as usize
    }

    pub fn formant(&self) -> f64 {
        self.formant_factor.unwrap_or(1.0 / self.pitch_factor)
    }

    /// Check the region against a source of `source_frames` frames (if known)
    pub fn validate(&self, index: usize, source_frames: Option<u64>) -> Result<()> {
        let invalid = |reason: String| Error::InvalidRegion { index, reason };

        if self.length == 0 {
            return Err(invalid("length is zero".into()));
        }
        for (name, value) in [
            ("time factor", self.time_factor),
            ("pitch factor", self.pitch_factor),
            ("formant factor", self.formant()),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{} must be positive and finite, got {}", name, value)));
            }
        }
        if let Some(total) = source_frames {
            if self.start >= total {
                return Err(invalid(format!(
                    "starts at frame {} but the source has {} frames",
                    self.start, total
                )));
            }
            if self.end() > total {
                log::warn!(
                    "Region #{} runs {} frames past the end of the source; the rest renders as silence",
                    index,
                    self.end() - total
                );
            }
        }
        Ok(())
    }
}

impl From<(u64, i64, f64, f64)> for Region {
    fn from((start, length, time_factor, pitch_factor): (u64, i64, f64, f64)) -> Self {
        Region::new(start, length, time_factor, pitch_factor)
    }
}

/// A region as written in a region list: a `[start, length, time, pitch]`
/// tuple or a map with named fields
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RegionEntry {
    Tuple(u64, i64, f64, f64),
    Named(Region),
}

impl From<RegionEntry> for Region {
    fn from(entry: RegionEntry) -> Self {
        match entry {
            RegionEntry::Tuple(start, length, time, pitch) => Region::new(start, length, time, pitch),
            RegionEntry::Named(region) => region,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionList {
    regions: Vec<RegionEntry>,
}

/// Parse a YAML region list
///
/// ```yaml
/// regions:
///   - [0, 44100, 1.0, 1.0]
///   - { start: 44100, length: -44100, time: 1.5, pitch: 0.8 }
/// ```
pub fn parse_regions(yaml: &str) -> std::result::Result<Vec<Region>, serde_yaml::Error> {
    let list: RegionList = serde_yaml::from_str(yaml)?;
    Ok(list.regions.into_iter().map(Region::from).collect())
}

/// Serialize regions to the named-field YAML form
pub fn regions_to_yaml(regions: &[Region]) -> std::result::Result<String, serde_yaml::Error> {
    #[derive(Serialize)]
    struct Out<'a> {
        regions: &'a [Region],
    }
    serde_yaml::to_string(&Out { regions })
}
