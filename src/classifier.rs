//! Fault classification.
//!
//! The classifier itself is a black box behind [`FaultClassifier`]: six
//! phase readings in, five class probabilities out.  This module owns the
//! policy applied to its output ([`predicted_class`]) and a threshold
//! classifier built from the recorded fault signatures, used by the host
//! runtime and in tests.

use core::fmt;

use crate::error::ClassifierError;
use crate::sim::transformer::{IA, IB};

/// Length of the feature vector (Ia, Ib, Ic, Va, Vb, Vc).
pub const FEATURES: usize = 6;
/// Number of fault classes.
pub const CLASSES: usize = 5;

/// Transformer fault class, as numbered by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaultClass {
    Nominal = 0,
    Minor = 1,
    Major = 2,
    Severe = 3,
    Unrepairable = 4,
}

impl FaultClass {
    pub const ALL: [Self; CLASSES] = [
        Self::Nominal,
        Self::Minor,
        Self::Major,
        Self::Severe,
        Self::Unrepairable,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Maps a feature vector to per-class probabilities.
pub trait FaultClassifier {
    fn predict_proba(&self, features: &[f32; FEATURES]) -> [f32; CLASSES];
}

/// Run `classifier` on `features` and pick the winning class.
///
/// Non-finite inputs are rejected before the classifier sees them and
/// non-finite outputs are rejected after.
pub fn classify<C: FaultClassifier + ?Sized>(
    classifier: &C,
    features: &[f32; FEATURES],
) -> Result<FaultClass, ClassifierError> {
    if let Some(index) = features.iter().position(|v| !v.is_finite()) {
        return Err(ClassifierError::NonFiniteFeature { index });
    }
    predicted_class(&classifier.predict_proba(features))
}

/// Index of the largest probability.  Ties go to the lowest index, so an
/// all-equal vector yields [`FaultClass::Nominal`].
pub fn predicted_class(probabilities: &[f32; CLASSES]) -> Result<FaultClass, ClassifierError> {
    let mut best = 0;
    for (index, p) in probabilities.iter().enumerate() {
        if !p.is_finite() {
            return Err(ClassifierError::NonFiniteProbability { index });
        }
        if *p > probabilities[best] {
            best = index;
        }
    }
    Ok(FaultClass::ALL[best])
}

// ───────────────────────────────────────────────────────────────
// Threshold classifier
// ───────────────────────────────────────────────────────────────

/// Above this |Ia| the readings match the unrepairable signature.
const IA_UNREPAIRABLE: f32 = 100.0;
/// Above this |Ib| (and |Ic|) the readings match the large-swing signatures.
const PHASE_SWING: f32 = 225.0;
/// Probability mass given to the winning class.
const CONFIDENCE: f32 = 0.9;

/// Rule-based stand-in for the trained model.
///
/// Derived from the recorded fault signatures, which differ only in the
/// phase currents: Ia and Ib in range → nominal, large Ia → unrepairable,
/// large Ib and Ic → severe, large Ib → major, anything else → minor.
/// Voltage excursions alone never raise the class.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdClassifier;

impl ThresholdClassifier {
    pub fn class_of(features: &[f32; FEATURES]) -> FaultClass {
        let [ia, ib, ic, ..] = *features;
        if IA.contains(ia) && IB.contains(ib) {
            FaultClass::Nominal
        } else if ia.abs() > IA_UNREPAIRABLE {
            FaultClass::Unrepairable
        } else if ib.abs() > PHASE_SWING && ic.abs() > PHASE_SWING {
            FaultClass::Severe
        } else if ib.abs() > PHASE_SWING {
            FaultClass::Major
        } else {
            FaultClass::Minor
        }
    }
}

impl FaultClassifier for ThresholdClassifier {
    fn predict_proba(&self, features: &[f32; FEATURES]) -> [f32; CLASSES] {
        let winner = Self::class_of(features).index();
        let rest = (1.0 - CONFIDENCE) / (CLASSES - 1) as f32;
        let mut out = [rest; CLASSES];
        out[winner] = CONFIDENCE;
        out
    }
}
