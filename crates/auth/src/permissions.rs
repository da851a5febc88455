//! The permission matrix: a fixed resource × action grid of booleans.
//!
//! There are no wildcards and no nesting. A [`PermissionMatrix`] is always
//! fully populated; a [`PermissionPatch`] is the sparse shape used by elevation
//! requests, where only `true` cells carry meaning.

use serde::{Deserialize, Serialize};

/// Protected resource kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Countries,
    Cities,
}

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::Countries, Resource::Cities];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Countries => "countries",
            Resource::Cities => "cities",
        }
    }
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD actions checked against a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Matrix
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the matrix. Missing cells deserialize to the signup defaults.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudPermissions {
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Default for CrudPermissions {
    fn default() -> Self {
        Self {
            read: true,
            create: false,
            update: false,
            delete: false,
        }
    }
}

impl CrudPermissions {
    pub fn get(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    pub fn set(&mut self, action: Action, value: bool) {
        match action {
            Action::Read => self.read = value,
            Action::Create => self.create = value,
            Action::Update => self.update = value,
            Action::Delete => self.delete = value,
        }
    }
}

/// Per-principal permission grid.
///
/// `Default` is the matrix every new principal starts with: read enabled on
/// both resources, every mutation disabled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionMatrix {
    pub countries: CrudPermissions,
    pub cities: CrudPermissions,
}

impl PermissionMatrix {
    pub fn row(&self, resource: Resource) -> &CrudPermissions {
        match resource {
            Resource::Countries => &self.countries,
            Resource::Cities => &self.cities,
        }
    }

    fn row_mut(&mut self, resource: Resource) -> &mut CrudPermissions {
        match resource {
            Resource::Countries => &mut self.countries,
            Resource::Cities => &mut self.cities,
        }
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.row(resource).get(action)
    }

    pub fn set(&mut self, resource: Resource, action: Action, value: bool) {
        self.row_mut(resource).set(action, value);
    }

    /// Grant every `true` cell of `patch`; never clears anything.
    ///
    /// Returns the cells that flipped from `false` to `true`.
    pub fn merge_grants(&mut self, patch: &PermissionPatch) -> Vec<(Resource, Action)> {
        let mut granted = Vec::new();
        for (resource, action) in patch.grants() {
            if !self.allows(resource, action) {
                self.set(resource, action, true);
                granted.push((resource, action));
            }
        }
        granted
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patch
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrudPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
}

impl CrudPatch {
    fn get(&self, action: Action) -> Option<bool> {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }

    fn set(&mut self, action: Action, value: bool) {
        let slot = match action {
            Action::Read => &mut self.read,
            Action::Create => &mut self.create,
            Action::Update => &mut self.update,
            Action::Delete => &mut self.delete,
        };
        *slot = Some(value);
    }
}

/// Sparse subset of the matrix requested by a principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<CrudPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cities: Option<CrudPatch>,
}

impl PermissionPatch {
    /// Build a patch holding exactly the given `true` cells.
    pub fn from_grants(cells: impl IntoIterator<Item = (Resource, Action)>) -> Self {
        let mut patch = Self::default();
        for (resource, action) in cells {
            let row = match resource {
                Resource::Countries => patch.countries.get_or_insert_with(CrudPatch::default),
                Resource::Cities => patch.cities.get_or_insert_with(CrudPatch::default),
            };
            row.set(action, true);
        }
        patch
    }

    fn row(&self, resource: Resource) -> Option<&CrudPatch> {
        match resource {
            Resource::Countries => self.countries.as_ref(),
            Resource::Cities => self.cities.as_ref(),
        }
    }

    /// Cells explicitly set to `true`, in resource-then-action order.
    pub fn grants(&self) -> Vec<(Resource, Action)> {
        Resource::ALL
            .into_iter()
            .flat_map(|resource| Action::ALL.into_iter().map(move |action| (resource, action)))
            .filter(|&(resource, action)| {
                self.row(resource).and_then(|row| row.get(action)) == Some(true)
            })
            .collect()
    }

    pub fn has_grants(&self) -> bool {
        !self.grants().is_empty()
    }

    /// Drop absent and `false` cells, keeping only what can be granted.
    pub fn only_grants(&self) -> Self {
        Self::from_grants(self.grants())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_matrix_reads_only() {
        let m = PermissionMatrix::default();
        for resource in Resource::ALL {
            assert!(m.allows(resource, Action::Read));
            for action in [Action::Create, Action::Update, Action::Delete] {
                assert!(!m.allows(resource, action), "{resource}.{action} should be off");
            }
        }
    }

    #[test]
    fn partial_matrix_json_fills_defaults() {
        let m: PermissionMatrix = serde_json::from_value(json!({
            "countries": { "create": true }
        }))
        .unwrap();
        assert!(m.countries.read);
        assert!(m.countries.create);
        assert!(!m.countries.delete);
        assert_eq!(m.cities, CrudPermissions::default());
    }

    #[test]
    fn merge_only_sets_true_cells() {
        let mut m = PermissionMatrix::default();
        m.set(Resource::Cities, Action::Delete, true);

        let patch: PermissionPatch = serde_json::from_value(json!({
            "countries": { "create": true, "update": false },
            "cities": { "read": false }
        }))
        .unwrap();

        let granted = m.merge_grants(&patch);
        assert_eq!(granted, vec![(Resource::Countries, Action::Create)]);
        assert!(m.allows(Resource::Countries, Action::Create));
        assert!(!m.allows(Resource::Countries, Action::Update));
        // false in the patch never revokes
        assert!(m.allows(Resource::Cities, Action::Read));
        // unrelated grant survives
        assert!(m.allows(Resource::Cities, Action::Delete));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut m = PermissionMatrix::default();
        let patch = PermissionPatch::from_grants([(Resource::Cities, Action::Create)]);
        assert_eq!(m.merge_grants(&patch).len(), 1);
        let after_first = m;
        assert!(m.merge_grants(&patch).is_empty());
        assert_eq!(m, after_first);
    }

    #[test]
    fn empty_and_all_false_patches_have_no_grants() {
        assert!(!PermissionPatch::default().has_grants());

        let all_false: PermissionPatch = serde_json::from_value(json!({
            "countries": { "read": false, "create": false },
            "cities": {}
        }))
        .unwrap();
        assert!(!all_false.has_grants());
    }

    #[test]
    fn only_grants_strips_false_cells() {
        let patch: PermissionPatch = serde_json::from_value(json!({
            "countries": { "create": true, "delete": false }
        }))
        .unwrap();
        let normalized = patch.only_grants();
        assert_eq!(
            serde_json::to_value(normalized).unwrap(),
            json!({ "countries": { "create": true } })
        );
    }
}
