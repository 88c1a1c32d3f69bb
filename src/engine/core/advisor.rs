use super::error::EngineResult;
use super::types::Resolution;

const SHORT_CLIP_SECS: f64 = 30.0;
const MEDIUM_CLIP_SECS: f64 = 60.0;

/// One entry of the offered resolution list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionChoice {
    pub resolution: Resolution,
    pub recommended: bool,
}

impl ResolutionChoice {
    /// Display label, e.g. `720p (Recommended)`.
    pub fn label(&self) -> String {
        if self.recommended {
            format!("{} (Recommended)", self.resolution.label())
        } else {
            self.resolution.label().to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    /// Resolution to preselect.
    pub selected: Resolution,
    /// Always all three resolutions, largest first.
    pub choices: Vec<ResolutionChoice>,
}

impl Recommendation {
    /// The advisor's pick, if any entry is flagged.
    pub fn recommended(&self) -> Option<Resolution> {
        self.choices
            .iter()
            .find(|c| c.recommended)
            .map(|c| c.resolution)
    }

    pub fn labels(&self) -> Vec<String> {
        self.choices.iter().map(ResolutionChoice::label).collect()
    }
}

/// Pick an output resolution from the clip length: shorter clips can afford more pixels.
pub fn recommend(duration_s: f64) -> Recommendation {
    let pick = if duration_s < SHORT_CLIP_SECS {
        Resolution::P1080
    } else if duration_s < MEDIUM_CLIP_SECS {
        Resolution::P720
    } else {
        Resolution::P480
    };

    Recommendation {
        selected: pick,
        choices: Resolution::ALL
            .into_iter()
            .map(|resolution| ResolutionChoice {
                resolution,
                recommended: resolution == pick,
            })
            .collect(),
    }
}

/// Used when the source could not be probed: 720p preselected, nothing flagged.
pub fn fallback_recommendation() -> Recommendation {
    Recommendation {
        selected: Resolution::default(),
        choices: Resolution::ALL
            .into_iter()
            .map(|resolution| ResolutionChoice {
                resolution,
                recommended: false,
            })
            .collect(),
    }
}

/// Advisor entry point for a probe result. The advisor is skipped entirely on failure.
pub fn recommend_for_probe(probed: &EngineResult<f64>) -> Recommendation {
    match probed {
        Ok(duration) => recommend(*duration),
        Err(_) => fallback_recommendation(),
    }
}
