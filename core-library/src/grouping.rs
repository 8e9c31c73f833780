//! Grouping engine
//!
//! Pure functions turning a flat item list into month buckets and year
//! buckets. No I/O, no shared state: the loader calls these on a snapshot of
//! items and publishes the result.

use crate::models::{Group, ItemId, MediaItem, SystemGroup, YearGroup};
use std::collections::{BTreeMap, HashSet};

/// Month groups and the year groups derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedIndex {
    pub groups: Vec<Group>,
    pub years: Vec<YearGroup>,
}

impl GroupedIndex {
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }
}

/// Partition `items` into month groups, newest month first.
///
/// Items whose identifier is in `excluded`, and items without a creation
/// time, are left out. Within a group, items keep their input order; a
/// repeated identifier keeps its first occurrence.
pub fn group_by_month(items: &[MediaItem], excluded: &HashSet<ItemId>) -> Vec<Group> {
    let mut buckets: BTreeMap<(i32, u32), Group> = BTreeMap::new();

    for item in items {
        if excluded.contains(&item.id) {
            continue;
        }
        let Some(key) = item.month_key() else {
            continue;
        };

        if !buckets.contains_key(&key) {
            let Some(group) = Group::month(key.0, key.1) else {
                continue;
            };
            buckets.insert(key, group);
        }
        if let Some(group) = buckets.get_mut(&key) {
            group.insert(item.clone());
        }
    }

    buckets.into_values().rev().collect()
}

/// Arrange month groups by calendar year, newest year first, months
/// descending within each year. System groups are skipped.
pub fn group_by_year(groups: &[Group]) -> Vec<YearGroup> {
    let mut years: BTreeMap<i32, Vec<Group>> = BTreeMap::new();

    for group in groups {
        if let Some(year) = group.year() {
            years.entry(year).or_default().push(group.clone());
        }
    }

    years
        .into_iter()
        .rev()
        .map(|(year, mut groups)| {
            groups.sort_by(|a, b| b.month_date().cmp(&a.month_date()));
            YearGroup { year, groups }
        })
        .collect()
}

/// Build both views in one pass over the items.
pub fn build_index(items: &[MediaItem], excluded: &HashSet<ItemId>) -> GroupedIndex {
    let groups = group_by_month(items, excluded);
    let years = group_by_year(&groups);
    GroupedIndex { groups, years }
}

/// A system group holding `items` in the given order. Undated items are
/// allowed here.
pub fn system_group(kind: SystemGroup, items: impl IntoIterator<Item = MediaItem>) -> Group {
    let mut group = Group::system(kind);
    for item in items {
        group.insert(item);
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).single()
    }

    fn item(id: &str, year: i32, month: u32, day: u32) -> MediaItem {
        MediaItem::new(id, at(year, month, day))
    }

    #[test]
    fn test_two_months_across_a_year_boundary() {
        let items = vec![
            item("a", 2024, 1, 15),
            item("b", 2024, 1, 3),
            item("c", 2023, 12, 31),
        ];

        let index = build_index(&items, &HashSet::new());

        assert_eq!(index.groups.len(), 2);
        assert_eq!(index.groups[0].title(), "January 2024");
        assert_eq!(index.groups[0].len(), 2);
        assert_eq!(index.groups[1].title(), "December 2023");
        assert_eq!(index.groups[1].len(), 1);

        assert_eq!(index.years.len(), 2);
        assert_eq!(index.years[0].year, 2024);
        assert_eq!(index.years[1].year, 2023);
    }

    #[test]
    fn test_groups_sorted_newest_first() {
        let items = vec![
            item("a", 2022, 3, 1),
            item("b", 2024, 2, 1),
            item("c", 2023, 7, 1),
            item("d", 2024, 11, 1),
        ];

        let groups = group_by_month(&items, &HashSet::new());
        let keys: Vec<_> = groups.iter().map(|g| g.id().as_str().to_string()).collect();

        assert_eq!(
            keys,
            vec!["month-2024-11", "month-2024-02", "month-2023-07", "month-2022-03"]
        );
    }

    #[test]
    fn test_partition_is_exact() {
        let items: Vec<MediaItem> = (0..120)
            .map(|i| item(&format!("IMG_{i}"), 2020 + (i % 4) as i32, 1 + (i % 12) as u32, 1))
            .collect();

        let groups = group_by_month(&items, &HashSet::new());

        let mut seen = HashSet::new();
        for group in &groups {
            for id in group.item_ids() {
                assert!(seen.insert(id.clone()), "{id} appears in two groups");
            }
        }
        let expected: HashSet<_> = items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_excluded_and_undated_items_are_left_out() {
        let items = vec![
            item("keep", 2024, 5, 1),
            item("marked", 2024, 5, 2),
            MediaItem::new("undated", None),
        ];
        let excluded: HashSet<ItemId> = [ItemId::from("marked")].into_iter().collect();

        let groups = group_by_month(&items, &excluded);

        assert_eq!(groups.len(), 1);
        assert!(groups[0].contains(&ItemId::from("keep")));
        assert!(!groups.iter().any(|g| g.contains(&ItemId::from("marked"))));
        assert!(!groups.iter().any(|g| g.contains(&ItemId::from("undated"))));
    }

    #[test]
    fn test_input_order_kept_within_group_and_duplicates_dropped() {
        let items = vec![
            item("z", 2024, 1, 1),
            item("a", 2024, 1, 20),
            item("z", 2024, 1, 2),
        ];

        let groups = group_by_month(&items, &HashSet::new());

        assert_eq!(groups[0].item_ids(), &[ItemId::from("z"), ItemId::from("a")]);
    }

    #[test]
    fn test_year_groups_skip_system_groups() {
        let mut groups = group_by_month(&[item("a", 2024, 3, 1)], &HashSet::new());
        groups.push(system_group(SystemGroup::Saved, vec![MediaItem::new("s", None)]));

        let years = group_by_year(&groups);

        assert_eq!(years.len(), 1);
        assert_eq!(years[0].item_count(), 1);
    }

    #[test]
    fn test_year_groups_order_months_descending() {
        // Deliberately unsorted input.
        let groups = vec![
            Group::month(2024, 2).unwrap(),
            Group::month(2024, 9).unwrap(),
            Group::month(2024, 5).unwrap(),
        ];

        let years = group_by_year(&groups);
        let months: Vec<_> = years[0].groups.iter().map(|g| g.id().month().unwrap().1).collect();

        assert_eq!(months, vec![9, 5, 2]);
    }

    #[test]
    fn test_empty_input() {
        let index = build_index(&[], &HashSet::new());
        assert!(index.groups.is_empty());
        assert!(index.years.is_empty());
        assert_eq!(index.item_count(), 0);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let items = vec![item("a", 2024, 1, 1), item("b", 2023, 6, 1)];
        assert_eq!(
            build_index(&items, &HashSet::new()),
            build_index(&items, &HashSet::new())
        );
    }
}
