//! # Role-driven admission policy
//!
//! Decides whether a new bag notification may claim a slot, given what the
//! pool currently holds. The policy is a plain value chosen **once** at
//! start-up from the workstation [`Role`] through a [`RoleTable`], then
//! injected into every intake controller.
//!
//! ## Variants
//! - `SingleFlow`: one bag end-to-end at a time. Any in-flight slot
//!   (`Initialised`, `Construction`, `ReadyToRender`, `Rendering`) drops the
//!   notification.
//! - `RetainAndReplace`: a different bag may be accepted while one is on
//!   screen; the displayed bag is retained. A notification for the bag
//!   already on screen is a duplicate.
//!
//! ## Tie-breaking while retaining
//! First arrival wins: once a replacement bag is pending, further different
//! bags are dropped until it reaches the screen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::{SlotState, StateMask};

/// Policy controlling how new bags are admitted while others are in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionPolicy {
    /// Drop any notification while a bag is in flight.
    ///
    /// Use when:
    /// - The operator must finish one bag before the next one is built
    /// - Example: OSR and search stations
    SingleFlow,

    /// Keep the displayed bag, accept one different replacement.
    ///
    /// Use when:
    /// - The operator may be handed a new bag while reviewing another
    /// - Example: supervisor stations
    RetainAndReplace,
}

/// Outcome of an admitted notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Claim a free slot.
    Admit,
    /// Claim a free slot and tell the display to keep the bag it shows.
    Retain {
        /// Slot currently rendering.
        index: usize,
        /// Bag currently rendering.
        bag_id: String,
    },
}

/// Why a notification was dropped by the admission policy.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// A single-flow role already has a bag in flight.
    #[error("bag {bag_id:?} already in flight")]
    InFlight {
        /// Bag currently occupying the flow.
        bag_id: Option<String>,
    },

    /// The bag is already on screen or already pending.
    #[error("duplicate notification")]
    Duplicate,

    /// A replacement bag is already pending behind the displayed one.
    #[error("replacement {bag_id:?} already pending")]
    ReplacementPending {
        /// Bag that arrived first.
        bag_id: Option<String>,
    },
}

impl Rejection {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Rejection::InFlight { .. } => "admission_in_flight",
            Rejection::Duplicate => "admission_duplicate",
            Rejection::ReplacementPending { .. } => "admission_replacement_pending",
        }
    }
}

/// Borrowed view of one slot for policy evaluation.
#[derive(Clone, Copy, Debug)]
pub struct Occupant<'a> {
    /// Slot index.
    pub index: usize,
    /// Slot state.
    pub state: SlotState,
    /// Bag held by the slot.
    pub bag_id: Option<&'a str>,
}

impl AdmissionPolicy {
    /// Evaluates a notification for `bag_id` against the current slot occupancy.
    ///
    /// Pure function of its inputs; the pool calls it again under its lock
    /// when the claim is verified.
    pub fn evaluate<'a>(
        &self,
        occupants: impl IntoIterator<Item = Occupant<'a>>,
        bag_id: &str,
    ) -> Result<Admission, Rejection> {
        let mut rendering: Option<Occupant<'a>> = None;
        let mut pending: Option<Occupant<'a>> = None;

        for occ in occupants {
            if occ.state == SlotState::Rendering {
                rendering = Some(occ);
            } else if StateMask::PENDING.contains(occ.state) {
                if occ.bag_id == Some(bag_id) {
                    return Err(Rejection::Duplicate);
                }
                pending.get_or_insert(occ);
            }
        }

        match self {
            AdmissionPolicy::SingleFlow => match pending.or(rendering) {
                Some(busy) if busy.bag_id == Some(bag_id) => Err(Rejection::Duplicate),
                Some(busy) => Err(Rejection::InFlight {
                    bag_id: busy.bag_id.map(str::to_owned),
                }),
                None => Ok(Admission::Admit),
            },
            AdmissionPolicy::RetainAndReplace => {
                if let Some(shown) = rendering {
                    if shown.bag_id == Some(bag_id) {
                        return Err(Rejection::Duplicate);
                    }
                }
                if let Some(first) = pending {
                    return Err(Rejection::ReplacementPending {
                        bag_id: first.bag_id.map(str::to_owned),
                    });
                }
                Ok(match rendering {
                    Some(shown) => Admission::Retain {
                        index: shown.index,
                        bag_id: shown.bag_id.unwrap_or_default().to_owned(),
                    },
                    None => Admission::Admit,
                })
            }
        }
    }
}

/// Workstation role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// On-screen resolution (primary screening).
    Osr,
    /// Search station (manual inspection).
    Search,
    /// Supervisor station.
    Supervisor,
    /// Training station.
    Training,
    /// Rerun (replay) station.
    Rerun,
}

/// Role → admission policy table.
///
/// The only place where roles are mapped to behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTable(BTreeMap<Role, AdmissionPolicy>);

impl RoleTable {
    /// Policy for `role`; roles missing from the table fall back to `SingleFlow`.
    pub fn policy_for(&self, role: Role) -> AdmissionPolicy {
        self.0
            .get(&role)
            .copied()
            .unwrap_or(AdmissionPolicy::SingleFlow)
    }

    /// Returns a copy with `role` mapped to `policy`.
    pub fn with(mut self, role: Role, policy: AdmissionPolicy) -> Self {
        self.0.insert(role, policy);
        self
    }
}

impl Default for RoleTable {
    /// Supervisor retains and replaces; every other role is single-flow.
    fn default() -> Self {
        Self(BTreeMap::new())
            .with(Role::Osr, AdmissionPolicy::SingleFlow)
            .with(Role::Search, AdmissionPolicy::SingleFlow)
            .with(Role::Supervisor, AdmissionPolicy::RetainAndReplace)
            .with(Role::Training, AdmissionPolicy::SingleFlow)
            .with(Role::Rerun, AdmissionPolicy::SingleFlow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(index: usize, state: SlotState, bag: Option<&str>) -> Occupant<'_> {
        Occupant {
            index,
            state,
            bag_id: bag,
        }
    }

    #[test]
    fn test_single_flow_admits_into_idle_pool() {
        let slots = [occ(0, SlotState::Disposed, Some("B0")), occ(1, SlotState::Empty, None)];
        assert_eq!(
            AdmissionPolicy::SingleFlow.evaluate(slots, "B1"),
            Ok(Admission::Admit)
        );
    }

    #[test]
    fn test_single_flow_drops_while_initialised() {
        let slots = [occ(0, SlotState::Initialised, Some("B1")), occ(1, SlotState::Empty, None)];
        assert_eq!(
            AdmissionPolicy::SingleFlow.evaluate(slots, "B2"),
            Err(Rejection::InFlight {
                bag_id: Some("B1".into())
            })
        );
    }

    #[test]
    fn test_single_flow_drops_while_rendering() {
        let slots = [occ(0, SlotState::Rendering, Some("B1"))];
        assert!(AdmissionPolicy::SingleFlow.evaluate(slots, "B2").is_err());
    }

    #[test]
    fn test_retain_on_different_bag() {
        let slots = [occ(0, SlotState::Rendering, Some("B1")), occ(1, SlotState::Empty, None)];
        assert_eq!(
            AdmissionPolicy::RetainAndReplace.evaluate(slots, "B2"),
            Ok(Admission::Retain {
                index: 0,
                bag_id: "B1".into()
            })
        );
    }

    #[test]
    fn test_retain_duplicate_of_rendering_bag() {
        let slots = [occ(0, SlotState::Rendering, Some("B1")), occ(1, SlotState::Empty, None)];
        assert_eq!(
            AdmissionPolicy::RetainAndReplace.evaluate(slots, "B1"),
            Err(Rejection::Duplicate)
        );
    }

    #[test]
    fn test_retain_first_arrival_wins() {
        let slots = [
            occ(0, SlotState::Rendering, Some("B1")),
            occ(1, SlotState::Construction, Some("B2")),
            occ(2, SlotState::Empty, None),
        ];
        assert_eq!(
            AdmissionPolicy::RetainAndReplace.evaluate(slots, "B3"),
            Err(Rejection::ReplacementPending {
                bag_id: Some("B2".into())
            })
        );
        assert_eq!(
            AdmissionPolicy::RetainAndReplace.evaluate(slots, "B2"),
            Err(Rejection::Duplicate)
        );
    }

    #[test]
    fn test_role_table_defaults_and_override() {
        let table = RoleTable::default();
        assert_eq!(table.policy_for(Role::Supervisor), AdmissionPolicy::RetainAndReplace);
        assert_eq!(table.policy_for(Role::Osr), AdmissionPolicy::SingleFlow);

        let table = table.with(Role::Search, AdmissionPolicy::RetainAndReplace);
        assert_eq!(table.policy_for(Role::Search), AdmissionPolicy::RetainAndReplace);
    }

    #[test]
    fn test_role_table_from_json() {
        let table: RoleTable =
            serde_json::from_str(r#"{"Osr":"RetainAndReplace"}"#).expect("valid table");
        assert_eq!(table.policy_for(Role::Osr), AdmissionPolicy::RetainAndReplace);
        assert_eq!(table.policy_for(Role::Supervisor), AdmissionPolicy::SingleFlow);
    }
}
