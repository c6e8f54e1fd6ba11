// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The redirect table: logical redirect ids to physical egress.
//!
//! The table is pre-sized to [`MAX_REDIRECTS`] entries and never
//! grows. Resolution takes the read side of the lock and copies out
//! the egress, which is itself fixed-size.

use crate::api::Egress;
use crate::api::MAX_REDIRECTS;
use crate::api::RedirectId;
use crate::api::RedirectTarget;
use crate::api::SgError;
use crate::api::Table;
use crate::ddi::sync::KRwLock;
use alloc::vec::Vec;
use heapless::FnvIndexMap;

type RedirectMap = FnvIndexMap<RedirectId, Egress, MAX_REDIRECTS>;

pub struct RedirectTable {
    map: KRwLock<RedirectMap>,
}

impl Default for RedirectTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectTable {
    pub fn new() -> Self {
        Self { map: KRwLock::new(RedirectMap::new()) }
    }

    pub fn limit(&self) -> usize {
        MAX_REDIRECTS
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    #[inline]
    pub fn resolve(&self, id: &RedirectId) -> Option<Egress> {
        self.map.read().get(id).cloned()
    }

    /// Add `target`, or replace the egress of an existing id. Returns
    /// the egress it replaced.
    pub fn set(
        &self,
        target: RedirectTarget,
    ) -> Result<Option<Egress>, SgError> {
        let mut map = self.map.write();
        if let Some(egress) = map.get_mut(&target.id) {
            return Ok(Some(core::mem::replace(egress, target.egress)));
        }

        map.insert(target.id, target.egress).map_err(|_| {
            SgError::CapacityExceeded {
                table: Table::Redirects,
                limit: MAX_REDIRECTS as u64,
            }
        })
    }

    /// Replace the egress of an id already in the table.
    pub fn update(&self, target: RedirectTarget) -> Result<Egress, SgError> {
        let mut map = self.map.write();
        match map.get_mut(&target.id) {
            Some(egress) => Ok(core::mem::replace(egress, target.egress)),
            None => Err(SgError::RedirectNotFound(target.id)),
        }
    }

    pub fn remove(&self, id: &RedirectId) -> Result<Egress, SgError> {
        self.map
            .write()
            .remove(id)
            .ok_or_else(|| SgError::RedirectNotFound(id.clone()))
    }

    /// All targets, ordered by id.
    pub fn dump(&self) -> Vec<RedirectTarget> {
        let mut targets: Vec<RedirectTarget> = self
            .map
            .read()
            .iter()
            .map(|(id, egress)| RedirectTarget {
                id: id.clone(),
                egress: egress.clone(),
            })
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }
}
