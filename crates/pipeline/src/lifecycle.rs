use serde::{Deserialize, Serialize};

/// Lifecycle stages a strategy moves through.
///
/// Stage passes are strictly ordered; REJECTED, ARCHIVED and DELETED are
/// terminal. DEPLOYED can only fall back to ARCHIVED (degradation) or
/// DELETED (operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Candidate,
    Stage1Pass,
    Stage2Pass,
    Stage3Pass,
    Stage4Pass,
    Stage5Pass,
    Deployed,
    Rejected,
    Archived,
    Deleted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Candidate => "CANDIDATE",
            Stage::Stage1Pass => "STAGE1_PASS",
            Stage::Stage2Pass => "STAGE2_PASS",
            Stage::Stage3Pass => "STAGE3_PASS",
            Stage::Stage4Pass => "STAGE4_PASS",
            Stage::Stage5Pass => "STAGE5_PASS",
            Stage::Deployed => "DEPLOYED",
            Stage::Rejected => "REJECTED",
            Stage::Archived => "ARCHIVED",
            Stage::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        Some(match s {
            "CANDIDATE" => Stage::Candidate,
            "STAGE1_PASS" => Stage::Stage1Pass,
            "STAGE2_PASS" => Stage::Stage2Pass,
            "STAGE3_PASS" => Stage::Stage3Pass,
            "STAGE4_PASS" => Stage::Stage4Pass,
            "STAGE5_PASS" => Stage::Stage5Pass,
            "DEPLOYED" => Stage::Deployed,
            "REJECTED" => Stage::Rejected,
            "ARCHIVED" => Stage::Archived,
            "DELETED" => Stage::Deleted,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Rejected | Stage::Archived | Stage::Deleted)
    }

    /// The single stage that may advance into `self` through a gate pass.
    fn gate_predecessor(&self) -> Option<Stage> {
        Some(match self {
            Stage::Stage1Pass => Stage::Candidate,
            Stage::Stage2Pass => Stage::Stage1Pass,
            Stage::Stage3Pass => Stage::Stage2Pass,
            Stage::Stage4Pass => Stage::Stage3Pass,
            Stage::Stage5Pass => Stage::Stage4Pass,
            Stage::Deployed => Stage::Stage5Pass,
            _ => return None,
        })
    }

    /// Whether the DAG allows `from -> to`. No skipping forward, no silent
    /// rewinds, nothing leaves a terminal state.
    pub fn can_transition(from: Stage, to: Stage) -> bool {
        if from.is_terminal() {
            return false;
        }
        if from == to {
            return true;
        }
        match to {
            Stage::Candidate => false,
            Stage::Rejected => from != Stage::Deployed,
            Stage::Archived => from == Stage::Deployed,
            Stage::Deleted => true,
            _ => to.gate_predecessor() == Some(from),
        }
    }
}
