//! In-memory keyword profile registry with a single active slot

use crate::capability::{KeywordProfile, ProfileId};

#[derive(Debug, Default)]
pub(crate) struct ProfileRegistry {
    profiles: Vec<KeywordProfile>,
    active: Option<ProfileId>,
}

impl ProfileRegistry {
    /// Add or replace a profile, optionally making it the active one
    pub(crate) fn insert(&mut self, profile: KeywordProfile, activate: bool) {
        let id = profile.id;
        match self.profiles.iter_mut().find(|p| p.id == id) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        if activate {
            self.active = Some(id);
        }
    }

    pub(crate) fn active(&self) -> Option<&KeywordProfile> {
        let id = self.active?;
        self.profiles.iter().find(|p| p.id == id)
    }

    pub(crate) fn is_active(&self, id: ProfileId) -> bool {
        self.active == Some(id)
    }

    pub(crate) fn contains(&self, id: ProfileId) -> bool {
        self.profiles.iter().any(|p| p.id == id)
    }

    /// Make `id` the active profile. Returns false for unknown ids.
    pub(crate) fn activate(&mut self, id: ProfileId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    /// Remove a profile, clearing the active slot if it pointed at it
    pub(crate) fn remove(&mut self, id: ProfileId) -> Option<KeywordProfile> {
        let index = self.profiles.iter().position(|p| p.id == id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        Some(self.profiles.remove(index))
    }

    pub(crate) fn list(&self) -> &[KeywordProfile] {
        &self.profiles
    }
}
