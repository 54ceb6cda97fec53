// 🌳 Hierarchy Resolver - headquarters ↔ branch links
//
// Two modes:
// - bulk: link a whole import in memory, tolerant of any row order
// - incremental: one add/delete against the live store
//
// Store failures are never swallowed here; they propagate to the caller.

use crate::entities::SwiftCode;
use crate::error::RegistryError;
use crate::store::{BranchUpdate, RegistryStore};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

// ============================================================================
// BULK RESOLUTION
// ============================================================================

/// Result of linking a full import
#[derive(Debug, Default)]
pub struct BulkResolution {
    /// Records to persist, in input order, headquarters carrying their branches
    pub entities: Vec<SwiftCode>,
    pub linked_branches: usize,
    pub orphaned_branches: Vec<String>,
    /// Headquarters dropped because a later row claimed the same prefix
    pub superseded_headquarters: Vec<String>,
    /// Rows dropped because their code already appeared
    pub duplicate_codes: Vec<String>,
}

impl BulkResolution {
    pub fn headquarters(&self) -> usize {
        self.entities.iter().filter(|e| e.is_headquarter).count()
    }
}

/// Link every branch to the headquarters sharing its prefix.
///
/// First pass partitions rows into headquarters (keyed by prefix, last row
/// wins) and unassigned branches. Second pass walks the branches and appends
/// each to its headquarters, so branches listed before their headquarters
/// still link.
pub fn resolve_bulk(rows: Vec<SwiftCode>) -> BulkResolution {
    let mut resolution = BulkResolution::default();

    let mut slots: Vec<Option<SwiftCode>> = Vec::with_capacity(rows.len());
    let mut headquarters: HashMap<String, usize> = HashMap::new();
    let mut unassigned: Vec<usize> = Vec::new();
    let mut seen_branches: HashSet<String> = HashSet::new();

    // First pass: partition
    for mut row in rows {
        row.branches.clear();

        if row.is_headquarter {
            let prefix = row.prefix().to_string();
            let slot = slots.len();

            if let Some(previous) = headquarters.insert(prefix.clone(), slot) {
                if let Some(old) = slots[previous].take() {
                    if old.swift_code == row.swift_code {
                        resolution.duplicate_codes.push(old.swift_code);
                    } else {
                        warn!(
                            prefix = %prefix,
                            dropped = %old.swift_code,
                            kept = %row.swift_code,
                            "Duplicate headquarters prefix in import, last row wins"
                        );
                        resolution.superseded_headquarters.push(old.swift_code);
                    }
                }
            }

            slots.push(Some(row));
        } else {
            if !seen_branches.insert(row.swift_code.clone()) {
                debug!(code = %row.swift_code, "Duplicate branch row skipped");
                resolution.duplicate_codes.push(row.swift_code);
                continue;
            }

            unassigned.push(slots.len());
            slots.push(Some(row));
        }
    }

    // Second pass: assign branches to headquarters
    for branch_slot in unassigned {
        let (branch_code, prefix) = match &slots[branch_slot] {
            Some(branch) => (branch.swift_code.clone(), branch.prefix().to_string()),
            None => continue,
        };

        let hq = headquarters
            .get(&prefix)
            .and_then(|&hq_slot| slots[hq_slot].as_mut());

        match hq {
            Some(hq) => {
                if hq.link_branch(&branch_code) {
                    resolution.linked_branches += 1;
                }
            }
            None => resolution.orphaned_branches.push(branch_code),
        }
    }

    resolution.entities = slots.into_iter().flatten().collect();
    resolution
}

// ============================================================================
// INCREMENTAL RESOLUTION
// ============================================================================

/// Hierarchy maintenance for single add/delete operations
pub struct Resolver<'a> {
    store: &'a dyn RegistryStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn RegistryStore) -> Self {
        Self { store }
    }

    /// Persist a branch, then link it into its headquarters if one exists.
    ///
    /// The branch is durable once inserted: a failing link update is
    /// returned as an error but the branch record stays.
    ///
    /// Returns the headquarters code the branch was linked to.
    pub async fn add_branch(&self, branch: &SwiftCode) -> Result<Option<String>, RegistryError> {
        self.store
            .insert(branch)
            .await
            .map_err(RegistryError::from_insert)?;

        let prefix = branch.prefix();
        match self.store.find_by_prefix(prefix, true).await? {
            Some(hq) => {
                self.store
                    .update_branch_list(&hq.swift_code, BranchUpdate::Add(branch.swift_code.clone()))
                    .await?;
                info!(branch = %branch.swift_code, headquarters = %hq.swift_code, "Linked branch to headquarters");
                Ok(Some(hq.swift_code))
            }
            None => {
                info!(branch = %branch.swift_code, prefix = %prefix, "No headquarters found for branch");
                Ok(None)
            }
        }
    }

    /// Insert a headquarters after adopting every existing branch that
    /// shares its prefix. Fails with `Conflict` if the prefix already has a
    /// headquarters.
    pub async fn add_headquarters(&self, mut hq: SwiftCode) -> Result<SwiftCode, RegistryError> {
        let prefix = hq.prefix().to_string();

        if let Some(existing) = self.store.find_by_prefix(&prefix, true).await? {
            return Err(RegistryError::Conflict(format!(
                "SWIFT code {} that is headquarter already matches existing headquarters prefix {}",
                hq.swift_code, existing.swift_code
            )));
        }

        hq.branches.clear();
        for branch in self.store.find_branches_by_prefix(&prefix).await? {
            hq.link_branch(&branch.swift_code);
        }
        if !hq.branches.is_empty() {
            info!(headquarters = %hq.swift_code, adopted = hq.branches.len(), "Adopted existing branches");
        }

        self.store
            .insert(&hq)
            .await
            .map_err(RegistryError::from_insert)?;

        Ok(hq)
    }

    /// Drop a branch from its headquarters' list before the branch record is
    /// deleted. No-op when the branch is unlinked.
    pub async fn unlink_branch(&self, branch: &SwiftCode) -> Result<Option<String>, RegistryError> {
        let Some(hq) = self.store.find_by_prefix(branch.prefix(), true).await? else {
            debug!(branch = %branch.swift_code, "Deleting unlinked branch");
            return Ok(None);
        };

        self.store
            .update_branch_list(&hq.swift_code, BranchUpdate::Remove(branch.swift_code.clone()))
            .await?;
        info!(branch = %branch.swift_code, headquarters = %hq.swift_code, "Unlinked branch from headquarters");

        Ok(Some(hq.swift_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn code(code: &str) -> SwiftCode {
        SwiftCode {
            country_iso2: "US".to_string(),
            swift_code: code.to_string(),
            code_type: "BIC11".to_string(),
            name: format!("Bank {}", code),
            address: "Main Street 1".to_string(),
            town_name: "NEW YORK".to_string(),
            country_name: "UNITED STATES".to_string(),
            time_zone: "America/New_York".to_string(),
            is_headquarter: code.ends_with("XXX"),
            branches: Vec::new(),
        }
    }

    fn find<'r>(resolution: &'r BulkResolution, swift_code: &str) -> &'r SwiftCode {
        resolution
            .entities
            .iter()
            .find(|e| e.swift_code == swift_code)
            .unwrap()
    }

    #[test]
    fn test_bulk_links_branches_listed_before_headquarters() {
        let resolution = resolve_bulk(vec![
            code("CHASUS33BRN"),
            code("CHASUS33SFC"),
            code("CHASUS33XXX"),
            code("DEUTDEFFBER"),
        ]);

        assert_eq!(resolution.entities.len(), 4);
        assert_eq!(resolution.linked_branches, 2);
        assert_eq!(resolution.orphaned_branches, vec!["DEUTDEFFBER"]);
        assert_eq!(
            find(&resolution, "CHASUS33XXX").branches,
            vec!["CHASUS33BRN", "CHASUS33SFC"]
        );
    }

    #[test]
    fn test_bulk_is_order_independent() {
        let forward = vec![
            code("CHASUS33XXX"),
            code("CHASUS33BRN"),
            code("DEUTDEFFXXX"),
            code("DEUTDEFFBER"),
            code("CHASUS33SFC"),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        for rows in [forward, backward] {
            let resolution = resolve_bulk(rows);
            let mut chase = find(&resolution, "CHASUS33XXX").branches.clone();
            chase.sort();
            assert_eq!(chase, vec!["CHASUS33BRN", "CHASUS33SFC"]);
            assert_eq!(find(&resolution, "DEUTDEFFXXX").branches, vec!["DEUTDEFFBER"]);
            assert!(resolution.orphaned_branches.is_empty());
        }
    }

    /// Headquarters → sorted branches, plus sorted orphans
    fn hierarchy_of(resolution: &BulkResolution) -> (BTreeMap<String, Vec<String>>, Vec<String>) {
        let tree = resolution
            .entities
            .iter()
            .filter(|e| e.is_headquarter)
            .map(|hq| {
                let mut branches = hq.branches.clone();
                branches.sort();
                (hq.swift_code.clone(), branches)
            })
            .collect();
        let mut orphans = resolution.orphaned_branches.clone();
        orphans.sort();
        (tree, orphans)
    }

    /// Rows drawn from a few shared prefixes so hierarchies actually form
    fn arb_rows() -> impl Strategy<Value = Vec<SwiftCode>> {
        let row = (
            prop::sample::select(vec!["CHASUS33", "DEUTDEFF", "BPKOPLPW", "MIDLGB22"]),
            prop_oneof![Just("XXX".to_string()), "[A-Z0-9]{3}"],
        )
            .prop_map(|(prefix, suffix)| code(&format!("{prefix}{suffix}")));
        prop::collection::vec(row, 0..24)
    }

    proptest! {
        #[test]
        fn bulk_resolution_ignores_row_order(
            (rows, shuffled) in arb_rows()
                .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
        ) {
            let expected = resolve_bulk(rows);
            let actual = resolve_bulk(shuffled);

            prop_assert_eq!(hierarchy_of(&expected), hierarchy_of(&actual));
            prop_assert_eq!(expected.linked_branches, actual.linked_branches);
        }

        #[test]
        fn bulk_resolution_links_every_branch_with_a_headquarters(rows in arb_rows()) {
            let resolution = resolve_bulk(rows);
            let (tree, orphans) = hierarchy_of(&resolution);

            for branch in resolution.entities.iter().filter(|e| !e.is_headquarter) {
                let hq_code = format!("{}XXX", branch.prefix());
                match tree.get(&hq_code) {
                    Some(branches) => prop_assert!(branches.contains(&branch.swift_code)),
                    None => prop_assert!(orphans.contains(&branch.swift_code)),
                }
            }
        }
    }

    #[test]
    fn test_bulk_ignores_preset_branch_lists() {
        let mut hq = code("CHASUS33XXX");
        hq.branches = vec!["CHASUS33OLD".to_string()];

        let resolution = resolve_bulk(vec![hq, code("CHASUS33BRN")]);
        assert_eq!(find(&resolution, "CHASUS33XXX").branches, vec!["CHASUS33BRN"]);
    }

    #[test]
    fn test_bulk_duplicate_headquarters_prefix_last_wins() {
        let mut rival = code("CHASUS33ABC");
        rival.is_headquarter = true;

        let resolution = resolve_bulk(vec![code("CHASUS33XXX"), code("CHASUS33BRN"), rival]);

        assert_eq!(resolution.superseded_headquarters, vec!["CHASUS33XXX"]);
        assert_eq!(resolution.headquarters(), 1);
        assert_eq!(find(&resolution, "CHASUS33ABC").branches, vec!["CHASUS33BRN"]);
        assert!(resolution
            .entities
            .iter()
            .all(|e| e.swift_code != "CHASUS33XXX"));
    }

    #[test]
    fn test_bulk_duplicate_codes_listed_once() {
        let resolution = resolve_bulk(vec![
            code("CHASUS33XXX"),
            code("CHASUS33BRN"),
            code("CHASUS33BRN"),
            code("CHASUS33XXX"),
        ]);

        assert_eq!(resolution.entities.len(), 2);
        assert_eq!(resolution.duplicate_codes.len(), 2);
        assert_eq!(find(&resolution, "CHASUS33XXX").branches, vec!["CHASUS33BRN"]);
    }

    #[tokio::test]
    async fn test_add_branch_links_to_headquarters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);

        resolver.add_headquarters(code("CHASUS33XXX")).await.unwrap();
        let linked = resolver.add_branch(&code("CHASUS33BRN")).await.unwrap();
        assert_eq!(linked.as_deref(), Some("CHASUS33XXX"));

        let hq = store.find_by_code("CHASUS33XXX").await.unwrap().unwrap();
        assert_eq!(hq.branches, vec!["CHASUS33BRN"]);
    }

    #[tokio::test]
    async fn test_add_branch_without_headquarters_is_stored_unlinked() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);

        let linked = resolver.add_branch(&code("CHASUS33BRN")).await.unwrap();
        assert!(linked.is_none());
        assert!(store.find_by_code("CHASUS33BRN").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_headquarters_adopts_orphans() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);

        resolver.add_branch(&code("CHASUS33BRN")).await.unwrap();
        resolver.add_branch(&code("CHASUS33SFC")).await.unwrap();
        resolver.add_branch(&code("CHASUS34BRN")).await.unwrap();

        let hq = resolver.add_headquarters(code("CHASUS33XXX")).await.unwrap();
        assert_eq!(hq.branches, vec!["CHASUS33BRN", "CHASUS33SFC"]);

        let stored = store.find_by_code("CHASUS33XXX").await.unwrap().unwrap();
        assert_eq!(stored.branches, hq.branches);
    }

    #[tokio::test]
    async fn test_second_headquarters_for_prefix_conflicts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);

        resolver.add_headquarters(code("CHASUS33XXX")).await.unwrap();

        let mut rival = code("CHASUS33ABC");
        rival.is_headquarter = true;
        let err = resolver.add_headquarters(rival).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));

        let err = resolver
            .add_headquarters(code("CHASUS33XXX"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unlink_branch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);

        resolver.add_headquarters(code("CHASUS33XXX")).await.unwrap();
        resolver.add_branch(&code("CHASUS33BRN")).await.unwrap();
        resolver.add_branch(&code("CHASUS33SFC")).await.unwrap();

        let unlinked = resolver.unlink_branch(&code("CHASUS33BRN")).await.unwrap();
        assert_eq!(unlinked.as_deref(), Some("CHASUS33XXX"));

        let hq = store.find_by_code("CHASUS33XXX").await.unwrap().unwrap();
        assert_eq!(hq.branches, vec!["CHASUS33SFC"]);

        // Branch without a headquarters
        let unlinked = resolver.unlink_branch(&code("DEUTDEFFBER")).await.unwrap();
        assert!(unlinked.is_none());
    }
}
