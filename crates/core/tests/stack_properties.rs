//! Property tests for stack file selection.

use proptest::prelude::*;

use ozone_harness_core::{AppDescriptor, AppId, AppRegistry, Credentials, select, select_with_common};

fn catalogue_subset() -> impl Strategy<Value = Vec<AppId>> {
    proptest::sample::subsequence(AppId::ALL.to_vec(), 0..=AppId::ALL.len()).prop_shuffle()
}

fn synthetic_app(index: usize, priority: u32) -> AppDescriptor {
    AppDescriptor {
        id: AppId::ALL[index % AppId::ALL.len()],
        base_url: "http://localhost".to_owned(),
        credentials: Credentials::new("u", "p"),
        health_path: "/".to_owned(),
        priority,
        stack_files: vec![format!("app-{index}-a.yml"), format!("app-{index}-b.yml")],
    }
}

proptest! {
    #[test]
    fn selection_starts_with_common_files(ids in catalogue_subset()) {
        let registry = AppRegistry::builtin();
        let apps = registry.descriptors_for(&ids);
        let list = select(&apps);
        prop_assert!(list.len() >= ozone_harness_core::COMMON_STACK_FILES.len());
        for (selected, common) in list.iter().zip(ozone_harness_core::COMMON_STACK_FILES) {
            prop_assert_eq!(selected, *common);
        }
    }

    #[test]
    fn selection_follows_non_decreasing_priority(ids in catalogue_subset()) {
        let registry = AppRegistry::builtin();
        let apps = registry.descriptors_for(&ids);
        let list = select(&apps);

        let owner_priority = |file: &str| {
            apps.iter()
                .find(|app| app.stack_files.iter().any(|f| f == file))
                .map(|app| app.priority)
        };
        let priorities: Vec<u32> = list.iter().filter_map(owner_priority).collect();
        prop_assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn selection_is_deterministic_and_duplicate_free(ids in catalogue_subset()) {
        let registry = AppRegistry::builtin();
        let apps = registry.descriptors_for(&ids);
        let first = select(&apps);
        let second = select(&apps);
        prop_assert_eq!(&first, &second);

        let mut names: Vec<&str> = first.iter().collect();
        names.sort_unstable();
        names.dedup();
        prop_assert_eq!(names.len(), first.len());
    }

    #[test]
    fn equal_priorities_keep_input_order(priorities in proptest::collection::vec(0u32..3, 1..6)) {
        let apps: Vec<AppDescriptor> = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| synthetic_app(i, *p))
            .collect();
        let list = select_with_common(&["common.yml"], &apps);

        // expected: stable sort of the input by priority
        let mut expected_order: Vec<usize> = (0..apps.len()).collect();
        expected_order.sort_by_key(|i| apps[*i].priority);
        let mut expected = vec!["common.yml".to_owned()];
        for i in expected_order {
            expected.extend(apps[i].stack_files.iter().cloned());
        }
        prop_assert_eq!(list.into_vec(), expected);
    }
}
