//! Substation transformer readings: three phase currents and three phase
//! voltages.
//!
//! Phases A and B are simulated, phase C is reconciled so each group's
//! sum stays in its band.  The mode picked by the transformer policy
//! decides how aggressively out-of-range values are brought back.
//!
//! ```text
//!   Correct      walk Ia, Ib, Va, Vb in range, pull them in otherwise;
//!                reconcile Ic, Vc
//!   Repair(1)    Ia, Ib jump 5–10 A toward range; V jump 0.1
//!   Repair(2)    Ib jumps 100–200 A
//!   Repair(3)    Ib jumps 95–105 A dragging Ic along; extra V jitter
//!   Unrepairable every value drifts around itself
//! ```

use rand::Rng;

use super::{SafeRange, gradual_variation, pull_toward, reconcile_sum};
use crate::classifier::{FEATURES, FaultClass};

pub const IA: SafeRange = SafeRange::new(-15.0, 24.0);
pub const IB: SafeRange = SafeRange::new(-32.28, 34.13);
pub const CURRENT_SUM: SafeRange = SafeRange::new(-3.44, -2.90);
pub const VA: SafeRange = SafeRange::new(-0.56, 0.58);
pub const VB: SafeRange = SafeRange::new(-0.29, 0.51);
pub const VOLTAGE_SUM: SafeRange = SafeRange::new(-0.01, 0.01);

pub const CURRENT_STEP: f32 = 0.1;
pub const VOLTAGE_STEP: f32 = 0.01;
pub const VOLTAGE_JUMP: SafeRange = SafeRange::new(0.1, 0.1);
pub const IA_JUMP: SafeRange = SafeRange::new(5.0, 10.0);
pub const IB_JUMP_MODE_1: SafeRange = SafeRange::new(5.0, 10.0);
pub const IB_JUMP_MODE_2: SafeRange = SafeRange::new(100.0, 200.0);
pub const IB_JUMP_MODE_3: SafeRange = SafeRange::new(95.0, 105.0);
/// Beyond this |Ib| mode 3 moves Ic together with Ib.
pub const IB_COUPLING_LIMIT: f32 = 225.0;
pub const MODE_3_VOLTAGE_JITTER: f32 = 0.1;
/// Drift window for a phase-C value while its group is not yet reconciled.
const IC_DRIFT: f32 = 1.0;
const VC_DRIFT: f32 = 0.5;

/// Readings for one transformer tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformerFrame {
    pub ia: f32,
    pub ib: f32,
    pub ic: f32,
    pub va: f32,
    pub vb: f32,
    pub vc: f32,
}

impl TransformerFrame {
    pub const fn new(ia: f32, ib: f32, ic: f32, va: f32, vb: f32, vc: f32) -> Self {
        Self {
            ia,
            ib,
            ic,
            va,
            vb,
            vc,
        }
    }

    /// Classifier feature vector, in phase order.
    pub fn features(&self) -> [f32; FEATURES] {
        [self.ia, self.ib, self.ic, self.va, self.vb, self.vc]
    }
}

/// Nominal readings; also where a cooldown resets to.
pub const BASELINE: TransformerFrame = TransformerFrame::new(-2.93, -26.16, 27.00, 0.58, -0.36, -0.26);

/// Recorded readings of each fault class, used for manual injection.
pub fn fault_preset(class: FaultClass) -> TransformerFrame {
    match class {
        FaultClass::Nominal => BASELINE,
        FaultClass::Minor => TransformerFrame::new(-7.83, 47.13, -49.91, -0.37, 0.57, -0.19),
        FaultClass::Major => {
            TransformerFrame::new(-10.69, -759.75, -56.36, -0.03, 0.23, -0.20)
        }
        FaultClass::Severe => {
            TransformerFrame::new(17.70, -773.05, 757.35, -0.03, 0.0009, 0.03)
        }
        FaultClass::Unrepairable => TransformerFrame::new(166.59, -848.06, 681.51, -0.03, -0.006, 0.03),
    }
}

/// Repair strategies for the repairable fault classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    One,
    Two,
    Three,
}

/// How the next frame is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerMode {
    Correct,
    Repair(RepairMode),
    Unrepairable,
}

/// Next frame, computed only from the previous frame and the mode.
pub fn next<R: Rng + ?Sized>(
    rng: &mut R,
    prev: &TransformerFrame,
    mode: TransformerMode,
) -> TransformerFrame {
    match mode {
        TransformerMode::Correct => correct(rng, prev),
        TransformerMode::Repair(m) => repair(rng, prev, m),
        TransformerMode::Unrepairable => unrepairable(rng, prev),
    }
}

fn correct<R: Rng + ?Sized>(rng: &mut R, prev: &TransformerFrame) -> TransformerFrame {
    let ia = settle(rng, IA, CURRENT_STEP, IA_JUMP, prev.ia);
    let ib = settle(rng, IB, CURRENT_STEP, IB_JUMP_MODE_1, prev.ib);
    let va = settle(rng, VA, VOLTAGE_STEP, VOLTAGE_JUMP, prev.va);
    let vb = settle(rng, VB, VOLTAGE_STEP, VOLTAGE_JUMP, prev.vb);
    TransformerFrame {
        ia,
        ib,
        ic: reconcile_sum(rng, CURRENT_SUM, ia + ib),
        va,
        vb,
        vc: reconcile_sum(rng, VOLTAGE_SUM, va + vb),
    }
}

/// Walk in range, jump toward it otherwise.
fn settle<R: Rng + ?Sized>(
    rng: &mut R,
    range: SafeRange,
    step: f32,
    jump: SafeRange,
    value: f32,
) -> f32 {
    if range.contains(value) {
        gradual_variation(rng, range, step, value)
    } else {
        pull_toward(rng, range, jump, value)
    }
}

fn repair<R: Rng + ?Sized>(
    rng: &mut R,
    prev: &TransformerFrame,
    mode: RepairMode,
) -> TransformerFrame {
    let mut f = *prev;

    f.ia = settle(rng, IA, CURRENT_STEP, IA_JUMP, f.ia);

    let ib_jump = match mode {
        RepairMode::One => IB_JUMP_MODE_1,
        RepairMode::Two => IB_JUMP_MODE_2,
        RepairMode::Three => IB_JUMP_MODE_3,
    };
    let ib_before = f.ib;
    f.ib = settle(rng, IB, CURRENT_STEP, ib_jump, f.ib);

    if mode == RepairMode::Three && !IB.contains(ib_before) {
        // Ib and Ic were pushed apart together; bring Ic back by the same amount.
        let moved = (f.ib - ib_before).abs();
        if f.ib.abs() < IB_COUPLING_LIMIT {
            f.ic = reconcile_sum(rng, CURRENT_SUM, f.ia + f.ib);
        } else if f.ic > 0.0 {
            f.ic -= moved;
        } else {
            f.ic += moved;
        }
    }

    f.va = settle(rng, VA, VOLTAGE_STEP, VOLTAGE_JUMP, f.va);
    f.vb = settle(rng, VB, VOLTAGE_STEP, VOLTAGE_JUMP, f.vb);
    if mode == RepairMode::Three {
        f.va = gradual_variation(rng, VA, MODE_3_VOLTAGE_JITTER, f.va);
        f.vb = gradual_variation(rng, VB, MODE_3_VOLTAGE_JITTER, f.vb);
    }

    f.ic = if IA.contains(f.ia) && IB.contains(f.ib) {
        reconcile_sum(rng, CURRENT_SUM, f.ia + f.ib)
    } else {
        gradual_variation(rng, SafeRange::around(f.ic, IC_DRIFT, IC_DRIFT), CURRENT_STEP, f.ic)
    };
    f.vc = if VA.contains(f.va) && VB.contains(f.vb) {
        reconcile_sum(rng, VOLTAGE_SUM, f.va + f.vb)
    } else {
        gradual_variation(rng, SafeRange::around(f.vc, VC_DRIFT, VC_DRIFT), VOLTAGE_STEP, f.vc)
    };
    f
}

fn unrepairable<R: Rng + ?Sized>(rng: &mut R, prev: &TransformerFrame) -> TransformerFrame {
    let drift = |rng: &mut R, v: f32, below: f32, above: f32| {
        gradual_variation(rng, SafeRange::around(v, below, above), CURRENT_STEP, v)
    };
    TransformerFrame {
        ia: drift(rng, prev.ia, 5.0, 5.0),
        ib: drift(rng, prev.ib, 5.0, 10.0),
        ic: drift(rng, prev.ic, 5.0, 10.0),
        va: drift(rng, prev.va, 0.1, 0.1),
        vb: drift(rng, prev.vb, 0.1, 0.1),
        vc: drift(rng, prev.vc, 0.1, 0.1),
    }
}
