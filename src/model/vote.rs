use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An agent's position at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Agree,
    Disagree,
    Abstain,
}

impl Vote {
    /// Vote recorded when no marker can be parsed and for failed agents.
    pub const DEFAULT: Vote = Vote::Abstain;
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agree => write!(f, "agree"),
            Self::Disagree => write!(f, "disagree"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

impl FromStr for Vote {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agree" => Ok(Self::Agree),
            "disagree" => Ok(Self::Disagree),
            "abstain" => Ok(Self::Abstain),
            _ => anyhow::bail!("invalid vote '{}' (expected: agree, disagree, abstain)", s),
        }
    }
}

/// Vote counts for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub agree: usize,
    pub disagree: usize,
    pub abstain: usize,
}

impl VoteTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            match vote {
                Vote::Agree => tally.agree += 1,
                Vote::Disagree => tally.disagree += 1,
                Vote::Abstain => tally.abstain += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.agree + self.disagree + self.abstain
    }

    pub fn non_abstaining(&self) -> usize {
        self.agree + self.disagree
    }

    /// `agree / (agree + disagree)`, or `None` when every vote abstained.
    pub fn agreement_fraction(&self) -> Option<f64> {
        match self.non_abstaining() {
            0 => None,
            n => Some(self.agree as f64 / n as f64),
        }
    }

    /// Whether the agreement fraction meets `threshold`.
    ///
    /// A round where nobody took a position (including a round where every
    /// agent failed) never reaches consensus.
    pub fn reaches(&self, threshold: f64) -> bool {
        self.agreement_fraction()
            .is_some_and(|fraction| fraction >= threshold)
    }
}

impl fmt::Display for VoteTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agree={}, disagree={}, abstain={}",
            self.agree, self.disagree, self.abstain
        )
    }
}
