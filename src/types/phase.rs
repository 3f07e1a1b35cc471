//! Phase markers of one station's storm impact and recovery

use serde::{Deserialize, Serialize};

/// The five phase markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Speed-reduction start
    Srst,
    /// Lowest-speed time
    Lst,
    /// Speed-increase start
    Sist,
    /// Pavement-stable time
    Pst,
    /// Normal clearance recovery time
    Ncrt,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Srst => write!(f, "SRST"),
            Phase::Lst => write!(f, "LST"),
            Phase::Sist => write!(f, "SIST"),
            Phase::Pst => write!(f, "PST"),
            Phase::Ncrt => write!(f, "NCRT"),
        }
    }
}

/// Where an NCRT came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcrtType {
    /// Type-1: found from the station's own series
    Station,
    /// Type-2: back-propagated section consensus
    SectionConsensus,
    /// Type-3: estimated from the merged section series
    SectionFallback,
}

impl std::fmt::Display for NcrtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NcrtType::Station => write!(f, "station"),
            NcrtType::SectionConsensus => write!(f, "section-consensus"),
            NcrtType::SectionFallback => write!(f, "section-fallback"),
        }
    }
}

/// An NCRT index together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ncrt {
    pub index: usize,
    pub kind: NcrtType,
}

/// A rejected write that would have broken phase ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderViolation {
    pub phase: Phase,
    pub index: usize,
}

/// Phase indices of one station. Every field is unset until its stage
/// writes it.
///
/// Writes go through the setters, which hold `LST ≤ SIST < NCRT` and
/// `SIST ≤ PST`: a write that would break the ordering leaves the field unset
/// and reports the violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseIndices {
    srst: Option<usize>,
    lst: Option<usize>,
    sist: Option<usize>,
    pst: Option<usize>,
    ncrt: Option<Ncrt>,
}

impl PhaseIndices {
    pub fn srst(&self) -> Option<usize> {
        self.srst
    }

    pub fn lst(&self) -> Option<usize> {
        self.lst
    }

    pub fn sist(&self) -> Option<usize> {
        self.sist
    }

    pub fn pst(&self) -> Option<usize> {
        self.pst
    }

    pub fn ncrt(&self) -> Option<Ncrt> {
        self.ncrt
    }

    pub fn ncrt_index(&self) -> Option<usize> {
        self.ncrt.map(|n| n.index)
    }

    pub fn ncrt_type(&self) -> Option<NcrtType> {
        self.ncrt.map(|n| n.kind)
    }

    pub fn set_srst(&mut self, idx: Option<usize>) {
        self.srst = idx;
    }

    /// Set the NCRT. Phases derived from an earlier NCRT are cleared.
    pub fn set_ncrt(&mut self, index: usize, kind: NcrtType) {
        self.ncrt = Some(Ncrt { index, kind });
        self.lst = None;
        self.sist = None;
        self.pst = None;
    }

    pub fn set_lst(&mut self, idx: usize) -> Result<(), OrderViolation> {
        self.lst = None;
        if self.ncrt_index().is_some_and(|n| idx >= n) {
            return Err(OrderViolation { phase: Phase::Lst, index: idx });
        }
        self.lst = Some(idx);
        Ok(())
    }

    pub fn set_sist(&mut self, idx: usize) -> Result<(), OrderViolation> {
        self.sist = None;
        let after_ncrt = self.ncrt_index().is_some_and(|n| idx >= n);
        let before_lst = self.lst.is_some_and(|l| idx < l);
        let after_pst = self.pst.is_some_and(|p| idx > p);
        if after_ncrt || before_lst || after_pst {
            return Err(OrderViolation { phase: Phase::Sist, index: idx });
        }
        self.sist = Some(idx);
        Ok(())
    }

    pub fn set_pst(&mut self, idx: usize) -> Result<(), OrderViolation> {
        self.pst = None;
        if self.sist.is_some_and(|s| idx < s) {
            return Err(OrderViolation { phase: Phase::Pst, index: idx });
        }
        self.pst = Some(idx);
        Ok(())
    }

    /// Clear every marker that depends on the NCRT.
    pub fn clear_recovery_phases(&mut self) {
        self.lst = None;
        self.sist = None;
        self.pst = None;
    }

    /// True when all set markers respect the ordering.
    pub fn is_ordered(&self) -> bool {
        let n = self.ncrt_index();
        let lst_ok = match (self.lst, self.sist) {
            (Some(l), Some(s)) => l <= s,
            _ => true,
        };
        let sist_ok = match (self.sist, n) {
            (Some(s), Some(n)) => s < n,
            _ => true,
        };
        let pst_ok = match (self.sist, self.pst) {
            (Some(s), Some(p)) => s <= p,
            _ => true,
        };
        lst_ok && sist_ok && pst_ok
    }
}
