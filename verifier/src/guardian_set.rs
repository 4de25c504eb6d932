use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{StateError, VerificationError},
    require, GuardianAddress,
};

/// Largest number of keys a guardian set may hold; signature indices are a single byte.
pub const MAX_GUARDIANS: usize = 256;

/// A `GuardianSet` is a versioned set of keys that can sign Wormhole messages.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct GuardianSet {
    pub index: u32,

    /// Guardian addresses, in signing order.
    pub keys: Vec<GuardianAddress>,

    pub creation_time: u32,

    /// Unix time at which a replaced set stops verifying. 0 until the set is replaced.
    pub expiration_time: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardianSetStatus {
    /// Announced with an index above the current one.
    Pending,
    /// The current set, or a replaced set with no expiration scheduled.
    Active,
    /// Replaced, still verifying until its expiration time.
    Expiring,
    Expired,
}

impl GuardianSet {
    pub fn new(
        index: u32,
        keys: Vec<GuardianAddress>,
        creation_time: u32,
    ) -> Result<GuardianSet, StateError> {
        require!(
            keys.len() <= MAX_GUARDIANS,
            StateError::GuardianSetTooLarge(keys.len())
        );

        Ok(GuardianSet {
            index,
            keys,
            creation_time,
            expiration_time: 0,
        })
    }

    /// Number of signatures needed, the smallest `c` with `3c > 2 * len`.
    pub fn quorum(&self) -> usize {
        debug_assert!(self.keys.len() <= MAX_GUARDIANS);
        (self.keys.len() * 2) / 3 + 1
    }

    pub fn address_at(&self, index: u8) -> Result<&GuardianAddress, VerificationError> {
        self.keys
            .get(usize::from(index))
            .ok_or(VerificationError::InvalidGuardianIndexOutOfRange {
                index,
                len: self.keys.len(),
            })
    }

    pub fn is_active_for_verification(&self, now: u32, current_index: u32) -> bool {
        self.index == current_index || self.expiration_time == 0 || now < self.expiration_time
    }

    pub fn status(&self, now: u32, current_index: u32) -> GuardianSetStatus {
        if self.index > current_index {
            GuardianSetStatus::Pending
        } else if self.index == current_index || self.expiration_time == 0 {
            GuardianSetStatus::Active
        } else if now < self.expiration_time {
            GuardianSetStatus::Expiring
        } else {
            GuardianSetStatus::Expired
        }
    }
}

/// Every guardian set ever installed, in index order. Sets are never removed so VAAs signed by a
/// replaced set can be checked until it expires.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "Vec<GuardianSet>", into = "Vec<GuardianSet>")]
pub struct GuardianSetStore {
    sets: Vec<GuardianSet>,
}

impl TryFrom<Vec<GuardianSet>> for GuardianSetStore {
    type Error = StateError;

    fn try_from(sets: Vec<GuardianSet>) -> Result<Self, Self::Error> {
        require!(!sets.is_empty(), StateError::EmptyGuardianSet);
        for pair in sets.windows(2) {
            let expected = pair[0].index.wrapping_add(1);
            require!(
                pair[1].index == expected,
                StateError::InvalidGuardianSetIndex {
                    expected,
                    got: pair[1].index,
                }
            );
        }
        Ok(GuardianSetStore { sets })
    }
}

impl From<GuardianSetStore> for Vec<GuardianSet> {
    fn from(store: GuardianSetStore) -> Self {
        store.sets
    }
}

impl GuardianSetStore {
    /// Starts a store from its first set, which need not have index 0.
    pub fn genesis(set: GuardianSet) -> Result<GuardianSetStore, StateError> {
        require!(!set.keys.is_empty(), StateError::EmptyGuardianSet);
        info!(index = set.index, guardians = set.keys.len(), "genesis guardian set");
        Ok(GuardianSetStore { sets: vec![set] })
    }

    fn first_index(&self) -> u32 {
        self.sets.first().map_or(0, |s| s.index)
    }

    pub fn get(&self, index: u32) -> Option<&GuardianSet> {
        let offset = index.checked_sub(self.first_index())?;
        self.sets.get(usize::try_from(offset).ok()?)
    }

    pub fn current(&self) -> &GuardianSet {
        // A store always holds at least its genesis set.
        &self.sets[self.sets.len() - 1]
    }

    pub fn current_index(&self) -> u32 {
        self.current().index
    }

    /// Installs the next guardian set and schedules the expiration of the one it replaces.
    pub fn install(
        &mut self,
        new_set: GuardianSet,
        now: u32,
        expiration_period: u32,
    ) -> Result<(), StateError> {
        let expected = self.current_index().wrapping_add(1);
        require!(
            new_set.index == expected,
            StateError::InvalidGuardianSetIndex {
                expected,
                got: new_set.index,
            }
        );
        require!(!new_set.keys.is_empty(), StateError::EmptyGuardianSet);
        require!(
            new_set.keys.len() <= MAX_GUARDIANS,
            StateError::GuardianSetTooLarge(new_set.keys.len())
        );

        let previous = self.sets.len() - 1;
        let expiration_time = now.saturating_add(expiration_period);
        self.sets[previous].expiration_time = expiration_time;

        info!(
            old_index = self.sets[previous].index,
            new_index = new_set.index,
            guardians = new_set.keys.len(),
            old_expires_at = expiration_time,
            "guardian set upgraded"
        );
        self.sets.push(new_set);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GuardianSet> {
        self.sets.iter()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn set(index: u32, len: usize) -> GuardianSet {
        GuardianSet::new(index, vec![GuardianAddress::default(); len], 0).unwrap()
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 3)]
    #[case(4, 3)]
    #[case(5, 4)]
    #[case(6, 5)]
    #[case(7, 5)]
    #[case(8, 6)]
    #[case(9, 7)]
    #[case(10, 7)]
    #[case(11, 8)]
    #[case(12, 9)]
    #[case(13, 9)]
    #[case(14, 10)]
    #[case(15, 11)]
    #[case(16, 11)]
    #[case(17, 12)]
    #[case(18, 13)]
    #[case(19, 13)]
    #[case(50, 34)]
    #[case(100, 67)]
    #[case(256, 171)]
    fn quorum_for_count(#[case] count: usize, #[case] quorum: usize) {
        let gs = set(0, count);
        assert_eq!(quorum, gs.quorum());
        assert!(3 * quorum > 2 * count);
        assert!(quorum == 1 || 3 * (quorum - 1) <= 2 * count);
    }

    #[test]
    fn too_large() {
        assert_eq!(
            Err(StateError::GuardianSetTooLarge(257)),
            GuardianSet::new(0, vec![GuardianAddress::default(); 257], 0)
        );
    }

    #[test]
    fn address_at() {
        let gs = set(0, 2);
        assert!(gs.address_at(1).is_ok());
        assert_eq!(
            Err(VerificationError::InvalidGuardianIndexOutOfRange { index: 2, len: 2 }),
            gs.address_at(2)
        );
    }

    #[test]
    fn expiration_boundary() {
        let mut gs = set(0, 1);
        gs.expiration_time = 1000;

        assert!(gs.is_active_for_verification(999, 1));
        assert!(!gs.is_active_for_verification(1000, 1));
        assert_eq!(GuardianSetStatus::Expiring, gs.status(999, 1));
        assert_eq!(GuardianSetStatus::Expired, gs.status(1000, 1));

        // The current set never expires.
        assert!(gs.is_active_for_verification(5000, 0));
        assert_eq!(GuardianSetStatus::Active, gs.status(5000, 0));
    }

    #[test]
    fn pending() {
        assert_eq!(GuardianSetStatus::Pending, set(3, 1).status(0, 2));
    }

    #[test]
    fn install() {
        let mut store = GuardianSetStore::genesis(set(0, 1)).unwrap();
        assert_eq!(0, store.current_index());

        assert_eq!(
            Err(StateError::InvalidGuardianSetIndex {
                expected: 1,
                got: 2
            }),
            store.install(set(2, 1), 100, 10)
        );
        assert_eq!(
            Err(StateError::EmptyGuardianSet),
            store.install(set(1, 0), 100, 10)
        );

        store.install(set(1, 2), 100, 10).unwrap();
        assert_eq!(1, store.current_index());
        assert_eq!(2, store.current().keys.len());
        assert_eq!(110, store.get(0).unwrap().expiration_time);
        assert_eq!(0, store.get(1).unwrap().expiration_time);
        assert!(store.get(2).is_none());
        assert_eq!(2, store.iter().count());
    }

    #[test]
    fn genesis_at_later_index() {
        let mut store = GuardianSetStore::genesis(set(4, 19)).unwrap();
        assert!(store.get(3).is_none());
        assert_eq!(4, store.get(4).unwrap().index);

        store.install(set(5, 19), 0, 0).unwrap();
        assert_eq!(5, store.get(5).unwrap().index);
    }

    #[test]
    fn persisted_store() {
        let mut store = GuardianSetStore::genesis(set(0, 1)).unwrap();
        store.install(set(1, 1), 10, 10).unwrap();

        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(store, serde_json::from_str(&json).unwrap());

        assert!(serde_json::from_str::<GuardianSetStore>("[]").is_err());

        let gap = serde_json::to_string(&vec![set(0, 1), set(2, 1)]).unwrap();
        assert!(serde_json::from_str::<GuardianSetStore>(&gap).is_err());
    }

    #[test]
    fn genesis_requires_keys() {
        assert_eq!(
            Err(StateError::EmptyGuardianSet),
            GuardianSetStore::genesis(set(0, 0))
        );
    }
}
