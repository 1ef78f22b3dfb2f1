//! Facility identifiers and open/closed decision vectors.
//!
//! The master problem decides which distribution centers (DCs) and return
//! centers (RCs) to open. Rather than passing bare `f64` arrays around, the
//! decision is carried as a [`FacilityDecision`] whose entries can be read as
//! [`FacilityState`] values, so every dual value or cut coefficient can be
//! traced back to the facility it belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a candidate distribution center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DcId(pub usize);

impl DcId {
    pub fn new(index: usize) -> Self {
        DcId(index)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DC{}", self.0)
    }
}

/// Index of a candidate return center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RcId(pub usize);

impl RcId {
    pub fn new(index: usize) -> Self {
        RcId(index)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RC{}", self.0)
    }
}

/// Either kind of facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum FacilityRef {
    Dc(DcId),
    Rc(RcId),
}

impl fmt::Display for FacilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacilityRef::Dc(id) => id.fmt(f),
            FacilityRef::Rc(id) => id.fmt(f),
        }
    }
}

/// One facility together with its open/closed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FacilityState<I> {
    pub id: I,
    pub is_open: bool,
}

/// A facility forced open or closed in every master solution.
///
/// Used for sensitivity experiments that fix part of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityPin {
    pub facility: FacilityRef,
    pub open: bool,
}

impl FacilityPin {
    pub fn open(facility: FacilityRef) -> Self {
        Self {
            facility,
            open: true,
        }
    }

    pub fn closed(facility: FacilityRef) -> Self {
        Self {
            facility,
            open: false,
        }
    }
}

/// Open/closed status of every DC and RC.
///
/// Equality and hashing look only at which facilities are open, which is what
/// the SAA loop uses to deduplicate candidate configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FacilityDecision {
    dcs: Vec<bool>,
    rcs: Vec<bool>,
}

impl FacilityDecision {
    pub fn new(dcs: Vec<bool>, rcs: Vec<bool>) -> Self {
        Self { dcs, rcs }
    }

    /// Every facility open.
    pub fn all_open(num_dcs: usize, num_rcs: usize) -> Self {
        Self::new(vec![true; num_dcs], vec![true; num_rcs])
    }

    /// Every facility closed.
    pub fn all_closed(num_dcs: usize, num_rcs: usize) -> Self {
        Self::new(vec![false; num_dcs], vec![false; num_rcs])
    }

    /// Read a decision from (possibly fractional) solver values; `> 0.5` is open.
    pub fn from_values(dc_values: &[f64], rc_values: &[f64]) -> Self {
        Self {
            dcs: dc_values.iter().map(|v| *v > 0.5).collect(),
            rcs: rc_values.iter().map(|v| *v > 0.5).collect(),
        }
    }

    pub fn num_dcs(&self) -> usize {
        self.dcs.len()
    }

    pub fn num_rcs(&self) -> usize {
        self.rcs.len()
    }

    pub fn is_dc_open(&self, id: DcId) -> bool {
        self.dcs.get(id.0).copied().unwrap_or(false)
    }

    pub fn is_rc_open(&self, id: RcId) -> bool {
        self.rcs.get(id.0).copied().unwrap_or(false)
    }

    pub fn is_open(&self, facility: FacilityRef) -> bool {
        match facility {
            FacilityRef::Dc(id) => self.is_dc_open(id),
            FacilityRef::Rc(id) => self.is_rc_open(id),
        }
    }

    pub fn set(&mut self, facility: FacilityRef, open: bool) {
        match facility {
            FacilityRef::Dc(id) => {
                if let Some(slot) = self.dcs.get_mut(id.0) {
                    *slot = open;
                }
            }
            FacilityRef::Rc(id) => {
                if let Some(slot) = self.rcs.get_mut(id.0) {
                    *slot = open;
                }
            }
        }
    }

    /// Copy of this decision with one facility toggled.
    pub fn with(&self, facility: FacilityRef, open: bool) -> Self {
        let mut next = self.clone();
        next.set(facility, open);
        next
    }

    pub fn dcs(&self) -> impl Iterator<Item = FacilityState<DcId>> + '_ {
        self.dcs.iter().enumerate().map(|(i, open)| FacilityState {
            id: DcId(i),
            is_open: *open,
        })
    }

    pub fn rcs(&self) -> impl Iterator<Item = FacilityState<RcId>> + '_ {
        self.rcs.iter().enumerate().map(|(i, open)| FacilityState {
            id: RcId(i),
            is_open: *open,
        })
    }

    pub fn opened_dcs(&self) -> Vec<DcId> {
        self.dcs().filter(|s| s.is_open).map(|s| s.id).collect()
    }

    pub fn opened_rcs(&self) -> Vec<RcId> {
        self.rcs().filter(|s| s.is_open).map(|s| s.id).collect()
    }

    /// Decision as 0/1 values, DCs first.
    pub fn dc_values(&self) -> Vec<f64> {
        self.dcs.iter().map(|open| if *open { 1.0 } else { 0.0 }).collect()
    }

    pub fn rc_values(&self) -> Vec<f64> {
        self.rcs.iter().map(|open| if *open { 1.0 } else { 0.0 }).collect()
    }
}

impl fmt::Display for FacilityDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dcs: Vec<String> = self.opened_dcs().iter().map(|d| d.0.to_string()).collect();
        let rcs: Vec<String> = self.opened_rcs().iter().map(|r| r.0.to_string()).collect();
        write!(f, "DC{{{}}} RC{{{}}}", dcs.join(","), rcs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_values_thresholds_at_half() {
        let decision = FacilityDecision::from_values(&[0.9, 0.2, 0.51], &[0.49, 1.0]);
        assert_eq!(decision.opened_dcs(), vec![DcId(0), DcId(2)]);
        assert_eq!(decision.opened_rcs(), vec![RcId(1)]);
    }

    #[test]
    fn test_equal_decisions_hash_together() {
        let a = FacilityDecision::new(vec![true, false], vec![true]);
        let b = FacilityDecision::from_values(&[0.99999, 1e-7], &[1.0]);
        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_with_toggles_one_facility() {
        let decision = FacilityDecision::all_open(2, 2);
        let closed = decision.with(FacilityRef::Rc(RcId(1)), false);
        assert!(decision.is_rc_open(RcId(1)));
        assert!(!closed.is_rc_open(RcId(1)));
        assert!(closed.is_rc_open(RcId(0)));
    }

    #[test]
    fn test_display_lists_open_facilities() {
        let decision = FacilityDecision::new(vec![false, true, true], vec![true, false]);
        assert_eq!(decision.to_string(), "DC{1,2} RC{0}");
    }

    #[test]
    fn test_out_of_range_is_closed() {
        let decision = FacilityDecision::all_open(1, 1);
        assert!(!decision.is_dc_open(DcId(5)));
    }
}
